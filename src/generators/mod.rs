//! Built-in generators
//!
//! The standard table registered at process start: attribute-table diffing,
//! snapshot normalization and change generation for every object kind, plus
//! backend-specific overrides at a higher priority.

use crate::registry::{GeneratorRegistry, RegisteredGenerator};

/// Implements `Generator` for a generator handling a single kind on every backend
macro_rules! kind_generator {
    ($ty:ident, $id:expr, $kind:expr) => {
        impl $crate::registry::Generator for $ty {
            fn id(&self) -> &str {
                $id
            }

            fn priority(&self) -> i32 {
                $crate::generators::STANDARD_PRIORITY
            }

            fn applies_to(&self, kind: $crate::model::ObjectKind, _backend: $crate::model::Backend) -> bool {
                kind == $kind
            }
        }
    };
}

pub mod constraint;
pub mod diff;
pub mod snapshot;
pub mod structure;

pub use constraint::{
    ForeignKeyChangeGenerator, IndexChangeGenerator, PrimaryKeyChangeGenerator,
    UniqueConstraintChangeGenerator,
};
pub use diff::AttributeTableDiffGenerator;
pub use snapshot::{PostgresColumnSnapshotGenerator, StandardSnapshotGenerator};
pub use structure::{
    ColumnChangeGenerator, SchemaChangeGenerator, SequenceChangeGenerator,
    SqliteColumnChangeGenerator, TableChangeGenerator, ViewChangeGenerator,
};

/// Priority of the generic generators
pub const STANDARD_PRIORITY: i32 = 1;
/// Priority of backend-specific overrides
pub const BACKEND_PRIORITY: i32 = 10;

pub const STANDARD_SNAPSHOT: &str = "core.snapshot.standard";
pub const POSTGRES_COLUMN_SNAPSHOT: &str = "postgres.snapshot.column";
pub const ATTRIBUTE_TABLE_DIFF: &str = "core.diff.attribute_table";
pub const SCHEMA_CHANGE: &str = "core.change.schema";
pub const SEQUENCE_CHANGE: &str = "core.change.sequence";
pub const TABLE_CHANGE: &str = "core.change.table";
pub const COLUMN_CHANGE: &str = "core.change.column";
pub const SQLITE_COLUMN_CHANGE: &str = "sqlite.change.column";
pub const PRIMARY_KEY_CHANGE: &str = "core.change.primary_key";
pub const UNIQUE_CONSTRAINT_CHANGE: &str = "core.change.unique_constraint";
pub const INDEX_CHANGE: &str = "core.change.index";
pub const FOREIGN_KEY_CHANGE: &str = "core.change.foreign_key";
pub const VIEW_CHANGE: &str = "core.change.view";

/// Every built-in generator
pub fn standard_generators() -> Vec<RegisteredGenerator> {
    vec![
        RegisteredGenerator::snapshot(StandardSnapshotGenerator),
        RegisteredGenerator::snapshot(PostgresColumnSnapshotGenerator),
        RegisteredGenerator::diff(AttributeTableDiffGenerator),
        RegisteredGenerator::change(SchemaChangeGenerator),
        RegisteredGenerator::change(SequenceChangeGenerator),
        RegisteredGenerator::change(TableChangeGenerator),
        RegisteredGenerator::change(ColumnChangeGenerator),
        RegisteredGenerator::change(SqliteColumnChangeGenerator),
        RegisteredGenerator::change(PrimaryKeyChangeGenerator),
        RegisteredGenerator::change(UniqueConstraintChangeGenerator),
        RegisteredGenerator::change(IndexChangeGenerator),
        RegisteredGenerator::change(ForeignKeyChangeGenerator),
        RegisteredGenerator::change(ViewChangeGenerator),
    ]
}

/// A registry populated with the built-in generators
pub fn standard_registry() -> GeneratorRegistry {
    standard_generators().into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Backend, ObjectKind};
    use crate::registry::Capability;

    #[test]
    fn test_every_kind_resolves_on_every_backend() {
        let registry = standard_registry();
        for kind in ObjectKind::ALL {
            for backend in Backend::ALL {
                for capability in [Capability::Snapshot, Capability::Diff, Capability::ChangeGenerate] {
                    assert!(
                        registry.resolve(capability, kind, backend).is_ok(),
                        "{capability} {kind} {backend}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_backend_overrides_win() {
        let registry = standard_registry();
        let column_pg = registry
            .resolve(Capability::Snapshot, ObjectKind::Column, Backend::Postgres)
            .unwrap();
        assert_eq!(column_pg.id(), POSTGRES_COLUMN_SNAPSHOT);
        let column_sqlite = registry
            .resolve(Capability::ChangeGenerate, ObjectKind::Column, Backend::Sqlite)
            .unwrap();
        assert_eq!(column_sqlite.id(), SQLITE_COLUMN_CHANGE);
        let column_mysql = registry
            .resolve(Capability::ChangeGenerate, ObjectKind::Column, Backend::Mysql)
            .unwrap();
        assert_eq!(column_mysql.id(), COLUMN_CHANGE);
    }

    #[test]
    fn test_standard_ids_are_unique() {
        let mut registry = GeneratorRegistry::new();
        registry.merge(standard_generators()).unwrap();
        assert_eq!(registry.len(), standard_generators().len());
    }
}
