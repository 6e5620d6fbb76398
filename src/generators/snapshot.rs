//! Snapshot normalization generators

use super::{BACKEND_PRIORITY, POSTGRES_COLUMN_SNAPSHOT, STANDARD_PRIORITY, STANDARD_SNAPSHOT};
use crate::error::{EngineError, EngineResult};
use crate::model::{attr, AttrValue, Backend, ObjectKind, StructuralObject};
use crate::registry::{Generator, SnapshotGenerator};
use once_cell::sync::OnceCell;
use regex::Regex;

/// Trims text and list values; applies to every kind on every backend
pub struct StandardSnapshotGenerator;

impl Generator for StandardSnapshotGenerator {
    fn id(&self) -> &str {
        STANDARD_SNAPSHOT
    }

    fn priority(&self) -> i32 {
        STANDARD_PRIORITY
    }

    fn applies_to(&self, _kind: ObjectKind, _backend: Backend) -> bool {
        true
    }
}

impl SnapshotGenerator for StandardSnapshotGenerator {
    fn snapshot(&self, mut object: StructuralObject, _backend: Backend) -> EngineResult<StructuralObject> {
        let names: Vec<String> = object.attributes.keys().cloned().collect();
        for name in names {
            let value = match object.get(&name) {
                AttrValue::Text(s) => AttrValue::Text(s.trim().to_string()),
                AttrValue::List(items) => {
                    AttrValue::List(items.iter().map(|i| i.trim().to_string()).collect())
                }
                other => other.clone(),
            };
            object.set(&name, value);
        }
        // An unqualified reference points into the key's own schema
        if object.kind() == ObjectKind::ForeignKey && object.get(attr::REFERENCED_SCHEMA).is_null() {
            let schema = object.id.schema.clone();
            object.set(attr::REFERENCED_SCHEMA, schema);
        }
        Ok(object)
    }
}

/// Canonical PostgreSQL column types and cast-free defaults
pub struct PostgresColumnSnapshotGenerator;

impl Generator for PostgresColumnSnapshotGenerator {
    fn id(&self) -> &str {
        POSTGRES_COLUMN_SNAPSHOT
    }

    fn priority(&self) -> i32 {
        BACKEND_PRIORITY
    }

    fn applies_to(&self, kind: ObjectKind, backend: Backend) -> bool {
        kind == ObjectKind::Column && backend == Backend::Postgres
    }
}

impl SnapshotGenerator for PostgresColumnSnapshotGenerator {
    fn snapshot(&self, object: StructuralObject, backend: Backend) -> EngineResult<StructuralObject> {
        let mut object = StandardSnapshotGenerator.snapshot(object, backend)?;
        if let Some(data_type) = object.text(attr::DATA_TYPE) {
            let canonical = canonical_postgres_type(data_type);
            object.set(attr::DATA_TYPE, canonical);
        }
        if let Some(default) = object.text(attr::DEFAULT_VALUE) {
            let stripped = strip_casts(default).map_err(|e| EngineError::GenerationFailed {
                object: object.id.clone(),
                reason: e.to_string(),
            })?;
            object.set(attr::DEFAULT_VALUE, stripped);
        }
        Ok(object)
    }
}

/// Map PostgreSQL's internal type aliases to their SQL names
pub fn canonical_postgres_type(data_type: &str) -> String {
    let lower = data_type.trim().to_lowercase();
    let (base, params) = match lower.find('(') {
        Some(at) => (lower[..at].trim(), &lower[at..]),
        None => (lower.as_str(), ""),
    };
    let base = match base {
        "int" | "int4" => "integer",
        "int8" => "bigint",
        "int2" => "smallint",
        "varchar" => "character varying",
        "char" | "bpchar" => "character",
        "bool" => "boolean",
        "float8" => "double precision",
        "float4" => "real",
        "decimal" => "numeric",
        "timestamp" => "timestamp without time zone",
        "timestamptz" => "timestamp with time zone",
        "time" => "time without time zone",
        "timetz" => "time with time zone",
        other => other,
    };
    format!("{base}{params}")
}

fn cast_pattern() -> Result<&'static Regex, regex::Error> {
    static PATTERN: OnceCell<Regex> = OnceCell::new();
    PATTERN.get_or_try_init(|| Regex::new(r"::[A-Za-z_][A-Za-z0-9_]*(?: [A-Za-z_][A-Za-z0-9_]*)*(?:\[\])?"))
}

/// Remove `::type` casts from a default expression, leaving quoted literals
/// untouched
pub fn strip_casts(expression: &str) -> Result<String, regex::Error> {
    let pattern = cast_pattern()?;
    let mut stripped = String::with_capacity(expression.len());
    // Odd segments are inside quotes; a doubled '' escape keeps the parity
    for (i, segment) in expression.split('\'').enumerate() {
        if i > 0 {
            stripped.push('\'');
        }
        if i % 2 == 0 {
            stripped.push_str(&pattern.replace_all(segment, ""));
        } else {
            stripped.push_str(segment);
        }
    }
    Ok(stripped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ObjectId;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_canonical_types() {
        assert_eq!(canonical_postgres_type("int4"), "integer");
        assert_eq!(canonical_postgres_type("VARCHAR(255)"), "character varying(255)");
        assert_eq!(canonical_postgres_type("timestamptz"), "timestamp with time zone");
        assert_eq!(canonical_postgres_type("uuid"), "uuid");
    }

    #[test]
    fn test_strip_casts() {
        assert_eq!(strip_casts("'active'::character varying").unwrap(), "'active'");
        assert_eq!(strip_casts("nextval('s'::regclass)").unwrap(), "nextval('s')");
        assert_eq!(strip_casts("now()").unwrap(), "now()");
    }

    #[test]
    fn test_strip_casts_keeps_quoted_text() {
        assert_eq!(strip_casts("'a::b'::text").unwrap(), "'a::b'");
        assert_eq!(strip_casts("'it''s::x'::text").unwrap(), "'it''s::x'");
        assert_eq!(strip_casts("('x'::text || 'y::z'::text)").unwrap(), "('x' || 'y::z')");
    }

    #[test]
    fn test_standard_trims_values() {
        let object = StructuralObject::new(ObjectId::top_level(ObjectKind::View, "public", "v"))
            .with(attr::DEFINITION, "  SELECT 1  ");
        let normalized = StandardSnapshotGenerator.snapshot(object, Backend::Mysql).unwrap();
        assert_eq!(normalized.text(attr::DEFINITION), Some("SELECT 1"));
    }

    #[test]
    fn test_foreign_key_reference_qualified() {
        let object = StructuralObject::new(ObjectId::contained(ObjectKind::ForeignKey, "sales", "orders", "fk_customer"))
            .with(attr::REFERENCED_TABLE, "customers");
        let normalized = StandardSnapshotGenerator.snapshot(object, Backend::Postgres).unwrap();
        assert_eq!(normalized.text(attr::REFERENCED_SCHEMA), Some("sales"));
    }
}
