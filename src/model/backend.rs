//! Backend (store dialect) tags

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of store a snapshot was captured from or a statement targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Postgres,
    Mysql,
    Sqlite,
    /// Dialect-neutral output (ANSI-leaning SQL)
    Generic,
}

impl Backend {
    pub const ALL: [Backend; 4] = [
        Backend::Postgres,
        Backend::Mysql,
        Backend::Sqlite,
        Backend::Generic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Postgres => "postgres",
            Backend::Mysql => "mysql",
            Backend::Sqlite => "sqlite",
            Backend::Generic => "generic",
        }
    }

    /// Quote an identifier the way this backend expects
    pub fn quote(&self, ident: &str) -> String {
        match self {
            Backend::Mysql => format!("`{}`", ident.replace('`', "``")),
            _ => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// Whether the backend has real schemas (namespaces) for relations
    pub fn supports_schemas(&self) -> bool {
        !matches!(self, Backend::Sqlite)
    }

    /// Longest identifier the backend accepts, if it has a limit
    pub fn max_identifier_len(&self) -> Option<usize> {
        match self {
            Backend::Postgres => Some(63),
            Backend::Mysql => Some(64),
            Backend::Sqlite | Backend::Generic => None,
        }
    }

    /// Identifier length in the unit the limit is counted in: bytes on
    /// Postgres, characters elsewhere
    pub fn identifier_len(&self, ident: &str) -> usize {
        match self {
            Backend::Postgres => ident.len(),
            _ => ident.chars().count(),
        }
    }

    /// Whether constraints can be added to or dropped from an existing table
    pub fn alters_constraints(&self) -> bool {
        !matches!(self, Backend::Sqlite)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Backend::Postgres),
            "mysql" | "mariadb" => Ok(Backend::Mysql),
            "sqlite" | "sqlite3" => Ok(Backend::Sqlite),
            "generic" | "ansi" => Ok(Backend::Generic),
            other => Err(format!("unknown backend '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!("PostgreSQL".parse::<Backend>().unwrap(), Backend::Postgres);
        assert_eq!("mariadb".parse::<Backend>().unwrap(), Backend::Mysql);
        assert!("oracle".parse::<Backend>().is_err());
    }

    #[test]
    fn test_quoting() {
        assert_eq!(Backend::Postgres.quote("users"), "\"users\"");
        assert_eq!(Backend::Mysql.quote("users"), "`users`");
        assert_eq!(Backend::Sqlite.quote("we\"ird"), "\"we\"\"ird\"");
    }
}
