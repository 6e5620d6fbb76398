//! SchemaFlow - schema changelog tool
//!
//! Diffs snapshot documents, generates changelogs and applies or rolls them
//! back. Statements are written to stdout as a script; applied changesets are
//! tracked in a JSON execution log.

use anyhow::Context;
use clap::{Parser, Subcommand};
use schemaflow_changelog::changelog::ChangeLog;
use schemaflow_changelog::config::{LoggingConfig, Settings};
use schemaflow_changelog::execution::{
    DryRunVisitor, ExecutingVisitor, JsonFileExecutionLog, ScriptExecutor,
};
use schemaflow_changelog::snapshot::Snapshot;
use schemaflow_changelog::Engine;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "schemaflow")]
#[command(about = "Schema diffing and reversible changelog tool")]
#[command(version)]
struct Cli {
    /// Changelog document (overrides the configured path)
    #[arg(long, global = true)]
    changelog: Option<PathBuf>,

    /// Execution log file (overrides the configured path)
    #[arg(long, global = true)]
    execution_log: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Compare two snapshot documents
    Diff {
        reference: PathBuf,
        observed: PathBuf,
    },

    /// Generate the changelog that turns the observed snapshot into the reference
    #[command(alias = "generate-changelog")]
    Generate {
        reference: PathBuf,
        observed: PathBuf,

        /// Write the changelog here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Apply pending changesets
    Apply {
        /// Number of changesets to apply (default: all pending)
        #[arg(long)]
        steps: Option<usize>,

        /// Print the script without recording anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Roll back the most recently applied changesets
    Rollback {
        /// Number of changesets to roll back
        #[arg(default_value = "1")]
        steps: usize,
    },

    /// Show applied, pending and tampered changesets
    Status,

    /// Load and validate the changelog
    Validate,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::load()?;
    if let Some(path) = cli.changelog {
        settings.paths.changelog = path;
    }
    if let Some(path) = cli.execution_log {
        settings.paths.execution_log = path;
    }
    init_tracing(&settings.logging);

    let engine = Engine::from_settings(&settings);

    match cli.command {
        Commands::Diff { reference, observed } => {
            let diff = engine.diff(&read_snapshot(&engine, &reference)?, &read_snapshot(&engine, &observed)?)?;
            let summary = diff.summary();
            info!(
                "Diff: {} missing, {} unexpected, {} changed",
                summary.missing, summary.unexpected, summary.changed
            );
            println!("{}", serde_json::to_string_pretty(&diff.report())?);
        }
        Commands::Generate { reference, observed, out } => {
            let changelog = engine.generate_changelog(
                &read_snapshot(&engine, &reference)?,
                &read_snapshot(&engine, &observed)?,
            )?;
            match out {
                Some(path) => {
                    changelog.save(&path)?;
                    info!("Wrote {} changesets to {}", changelog.len(), path.display());
                }
                None => println!("{}", changelog.to_json()?),
            }
        }
        Commands::Apply { steps, dry_run } => {
            let changelog = load_changelog(&settings)?;
            let mut log = JsonFileExecutionLog::open(&settings.paths.execution_log)?;
            let traversal = engine.traversal(&changelog).steps(steps);
            if dry_run {
                let mut visitor = DryRunVisitor::new(engine.backend());
                traversal.forward(&mut log, &mut visitor)?;
                print!("{}", visitor.script());
            } else {
                let stdout = std::io::stdout();
                let mut visitor = ExecutingVisitor::new(ScriptExecutor::new(stdout.lock()), engine.backend());
                let report = traversal.forward(&mut log, &mut visitor)?;
                info!("Applied {} changesets", report.executed());
            }
        }
        Commands::Rollback { steps } => {
            let changelog = load_changelog(&settings)?;
            let mut log = JsonFileExecutionLog::open(&settings.paths.execution_log)?;
            let stdout = std::io::stdout();
            let mut visitor = ExecutingVisitor::new(ScriptExecutor::new(stdout.lock()), engine.backend());
            let report = engine.traversal(&changelog).reverse(steps, &mut log, &mut visitor)?;
            info!("Rolled back {} changesets", report.visited.len());
        }
        Commands::Status => {
            let changelog = load_changelog(&settings)?;
            let log = JsonFileExecutionLog::open(&settings.paths.execution_log)?;
            let status = engine.traversal(&changelog).status(&log)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Validate => {
            let changelog = load_changelog(&settings)?;
            println!("{} changesets, no issues", changelog.len());
        }
    }
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing(logging: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));

    let registry = tracing_subscriber::registry().with(env_filter);
    // Logs go to stderr so scripts on stdout stay clean
    if logging.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .init();
    }
}

/// Load a snapshot document and normalize it like a live capture
fn read_snapshot(engine: &Engine, path: &Path) -> anyhow::Result<Snapshot> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading snapshot {}", path.display()))?;
    let stored: Snapshot =
        serde_json::from_str(&contents).with_context(|| format!("parsing snapshot {}", path.display()))?;
    engine
        .normalize(&stored)
        .with_context(|| format!("normalizing snapshot {}", path.display()))
}

/// Load and validate the configured changelog
fn load_changelog(settings: &Settings) -> anyhow::Result<ChangeLog> {
    let path = &settings.paths.changelog;
    ChangeLog::load(path).with_context(|| format!("loading changelog {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> Commands {
        Cli::try_parse_from(std::iter::once("schemaflow").chain(args.iter().copied()))
            .unwrap()
            .command
    }

    #[test]
    fn test_subcommands_parse() {
        assert_eq!(
            parse(&["generate-changelog", "ref.json", "obs.json"]),
            Commands::Generate {
                reference: "ref.json".into(),
                observed: "obs.json".into(),
                out: None,
            }
        );
        assert_eq!(
            parse(&["apply", "--steps", "2", "--dry-run"]),
            Commands::Apply { steps: Some(2), dry_run: true }
        );
        assert_eq!(parse(&["rollback"]), Commands::Rollback { steps: 1 });
        assert_eq!(parse(&["rollback", "3"]), Commands::Rollback { steps: 3 });
        assert_eq!(parse(&["status"]), Commands::Status);
    }

    #[test]
    fn test_paths_override_and_bad_counts_fail() {
        let cli = Cli::try_parse_from(["schemaflow", "status", "--changelog", "db/changelog.json"]).unwrap();
        assert_eq!(cli.changelog, Some(PathBuf::from("db/changelog.json")));
        assert!(Cli::try_parse_from(["schemaflow", "rollback", "many"]).is_err());
        assert!(Cli::try_parse_from(["schemaflow", "diff", "only-one.json"]).is_err());
    }
}
