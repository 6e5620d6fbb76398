//! Engine configuration module
//!
//! Settings are layered: built-in defaults, then an optional `schemaflow`
//! file (toml, json or yaml) in the working directory, then environment
//! variables such as `SCHEMAFLOW__ENGINE__BACKEND=mysql`. A `.env` file is
//! loaded into the environment first.

use crate::changelog::GroupingPolicy;
use crate::execution::TamperPolicy;
use crate::model::Backend;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use validator::Validate;

pub const ENV_PREFIX: &str = "SCHEMAFLOW";
pub const ENV_SEPARATOR: &str = "__";
pub const DEFAULT_CONFIG_FILE: &str = "schemaflow";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Generation and traversal defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct EngineConfig {
    /// Backend statements are materialized for
    pub backend: Backend,
    #[validate(length(min = 1, max = 255, message = "engine.author must not be empty"))]
    pub author: String,
    pub tamper_policy: TamperPolicy,
    pub grouping: GroupingPolicy,
    #[validate(length(min = 1, max = 200, message = "engine.id_prefix must not be empty"))]
    pub id_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Postgres,
            author: "schemaflow".to_string(),
            tamper_policy: TamperPolicy::Halt,
            grouping: GroupingPolicy::PerObject,
            id_prefix: "changeset".to_string(),
        }
    }
}

/// Where the changelog and execution log live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub changelog: PathBuf,
    pub execution_log: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            changelog: PathBuf::from("changelog.json"),
            execution_log: PathBuf::from("schemaflow-executed.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, used when `RUST_LOG` is unset
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,schemaflow_changelog=info".to_string(),
            json: false,
        }
    }
}

/// Complete settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineConfig,
    pub paths: PathsConfig,
    pub logging: LoggingConfig,
}

impl Settings {
    /// Load settings from `.env`, `./schemaflow.*` and the environment
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();
        Self::load_from(None)
    }

    /// Load settings, reading `file` instead of `./schemaflow.*` when given
    pub fn load_from(file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::build(file, environment())
    }

    fn build(file: Option<&Path>, env: config::Environment) -> Result<Self, ConfigError> {
        let file_source = match file {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let settings: Settings = config::Config::builder()
            .add_source(file_source)
            .add_source(env)
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.engine
            .validate()
            .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
        if self.paths.changelog == self.paths.execution_log {
            return Err(ConfigError::InvalidValue(
                "paths.changelog and paths.execution_log must differ".to_string(),
            ));
        }
        Ok(())
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn env_from(vars: &[(&str, &str)]) -> config::Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        environment().source(Some(map))
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::build(None, env_from(&[])).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.engine.backend, Backend::Postgres);
        assert_eq!(settings.engine.tamper_policy, TamperPolicy::Halt);
    }

    #[test]
    fn test_environment_overrides() {
        let settings = Settings::build(
            None,
            env_from(&[
                ("SCHEMAFLOW__ENGINE__BACKEND", "mysql"),
                ("SCHEMAFLOW__ENGINE__TAMPER_POLICY", "warn"),
                ("SCHEMAFLOW__LOGGING__JSON", "true"),
            ]),
        )
        .unwrap();
        assert_eq!(settings.engine.backend, Backend::Mysql);
        assert_eq!(settings.engine.tamper_policy, TamperPolicy::Warn);
        assert!(settings.logging.json);
        assert_eq!(settings.engine.author, "schemaflow");
    }

    #[test]
    fn test_file_then_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schemaflow.toml");
        std::fs::write(
            &path,
            "[engine]\nauthor = \"release-bot\"\ngrouping = \"single\"\n\n[paths]\nchangelog = \"db/changelog.json\"\n",
        )
        .unwrap();
        let settings = Settings::build(
            Some(&path),
            env_from(&[("SCHEMAFLOW__ENGINE__AUTHOR", "ci")]),
        )
        .unwrap();
        assert_eq!(settings.engine.author, "ci");
        assert_eq!(settings.engine.grouping, GroupingPolicy::Single);
        assert_eq!(settings.paths.changelog, PathBuf::from("db/changelog.json"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Settings::build(None, env_from(&[("SCHEMAFLOW__ENGINE__BACKEND", "oracle")])).is_err());
        assert!(matches!(
            Settings::build(None, env_from(&[("SCHEMAFLOW__ENGINE__AUTHOR", "")])),
            Err(ConfigError::InvalidValue(_))
        ));
    }
}
