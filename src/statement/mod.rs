//! Statement materialization
//!
//! Converts change operations into backend-specific statement text wrapped in
//! a backend-agnostic envelope: the text, the objects it affects and how it is
//! delimited when concatenated into a script.

pub mod sql;

use crate::model::ObjectId;
use serde::{Deserialize, Serialize};

pub use sql::{materialize, materialize_op, materialize_ops, materialize_reverse, SqlGenerator};

/// How a statement is delimited in a script
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Terminator {
    /// `;` at the end of the statement
    #[default]
    Semicolon,
    /// The line break alone (comments)
    Newline,
    /// A delimiter on its own line, e.g. `GO` or `$$`
    Custom(String),
}

/// A single statement ready for an executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statement {
    pub sql: String,
    #[serde(default)]
    pub affects: Vec<ObjectId>,
    #[serde(default)]
    pub terminator: Terminator,
}

impl Statement {
    pub fn new(sql: impl Into<String>, affects: Vec<ObjectId>) -> Self {
        Self {
            sql: sql.into(),
            affects,
            terminator: Terminator::Semicolon,
        }
    }

    /// A comment; every line is prefixed with `-- `
    pub fn comment(text: &str, affects: Vec<ObjectId>) -> Self {
        let sql = text
            .lines()
            .map(|line| format!("-- {line}").trim_end().to_string())
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            sql,
            affects,
            terminator: Terminator::Newline,
        }
    }

    pub fn with_terminator(mut self, terminator: Terminator) -> Self {
        self.terminator = terminator;
        self
    }

    pub fn is_comment(&self) -> bool {
        self.terminator == Terminator::Newline && self.sql.lines().all(|l| l.starts_with("--"))
    }

    /// The statement with its terminator applied
    pub fn render(&self) -> String {
        match &self.terminator {
            Terminator::Semicolon => format!("{};\n", self.sql.trim_end().trim_end_matches(';')),
            Terminator::Newline => format!("{}\n", self.sql.trim_end()),
            Terminator::Custom(delimiter) => format!("{}\n{}\n", self.sql.trim_end(), delimiter),
        }
    }
}

/// Concatenate statements into a script
pub fn render_script(statements: &[Statement]) -> String {
    statements.iter().map(Statement::render).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_terminators() {
        let statements = vec![
            Statement::comment("create users\nsecond line", vec![]),
            Statement::new("CREATE TABLE t (id integer)", vec![]),
            Statement::new("EXEC sp_refresh", vec![]).with_terminator(Terminator::Custom("GO".into())),
        ];
        assert_eq!(
            render_script(&statements),
            "-- create users\n-- second line\nCREATE TABLE t (id integer);\nEXEC sp_refresh\nGO\n"
        );
        assert!(statements[0].is_comment());
        assert!(!statements[1].is_comment());
    }

    #[test]
    fn test_semicolon_not_doubled() {
        assert_eq!(Statement::new("SELECT 1;", vec![]).render(), "SELECT 1;\n");
    }
}
