//! Change generators for schemas, sequences, tables, columns and views

use super::{BACKEND_PRIORITY, COLUMN_CHANGE, SCHEMA_CHANGE, SEQUENCE_CHANGE, SQLITE_COLUMN_CHANGE, TABLE_CHANGE, VIEW_CHANGE};
use crate::changelog::{Change, ChangeOp, ColumnAspect, GenerationContext};
use crate::error::{EngineError, EngineResult};
use crate::model::{
    attr, AttributeDelta, Backend, ColumnDef, Definition, ObjectKind, SchemaDef, SequenceDef,
    StructuralObject, TableDef, ViewDef,
};
use crate::registry::{ChangeGenerator, Generator};

pub struct SchemaChangeGenerator;

kind_generator!(SchemaChangeGenerator, SCHEMA_CHANGE, ObjectKind::Schema);

impl ChangeGenerator for SchemaChangeGenerator {
    fn fix_missing(&self, object: &StructuralObject, _ctx: &GenerationContext<'_>) -> EngineResult<Vec<Change>> {
        Ok(vec![Change::reversible(ChangeOp::CreateSchema(SchemaDef::from_object(object)?))])
    }

    fn fix_unexpected(&self, object: &StructuralObject, _ctx: &GenerationContext<'_>) -> EngineResult<Vec<Change>> {
        Ok(vec![Change::reversible(ChangeOp::DropSchema(SchemaDef::from_object(object)?))])
    }

    // Schemas carry no compared attributes
    fn fix_changed(
        &self,
        _reference: &StructuralObject,
        _observed: &StructuralObject,
        _deltas: &[AttributeDelta],
        _ctx: &GenerationContext<'_>,
    ) -> EngineResult<Vec<Change>> {
        Ok(Vec::new())
    }
}

pub struct SequenceChangeGenerator;

kind_generator!(SequenceChangeGenerator, SEQUENCE_CHANGE, ObjectKind::Sequence);

impl ChangeGenerator for SequenceChangeGenerator {
    fn fix_missing(&self, object: &StructuralObject, _ctx: &GenerationContext<'_>) -> EngineResult<Vec<Change>> {
        Ok(vec![Change::reversible(ChangeOp::CreateSequence(SequenceDef::from_object(object)?))])
    }

    fn fix_unexpected(&self, object: &StructuralObject, _ctx: &GenerationContext<'_>) -> EngineResult<Vec<Change>> {
        Ok(vec![Change::reversible(ChangeOp::DropSequence(SequenceDef::from_object(object)?))])
    }

    fn fix_changed(
        &self,
        reference: &StructuralObject,
        observed: &StructuralObject,
        _deltas: &[AttributeDelta],
        _ctx: &GenerationContext<'_>,
    ) -> EngineResult<Vec<Change>> {
        Ok(vec![Change::reversible(ChangeOp::AlterSequence {
            from: SequenceDef::from_object(observed)?,
            to: SequenceDef::from_object(reference)?,
        })])
    }
}

/// Tables are created and dropped together with their columns and primary
/// key, and with their foreign keys where the backend needs them inline
pub struct TableChangeGenerator;

kind_generator!(TableChangeGenerator, TABLE_CHANGE, ObjectKind::Table);

impl ChangeGenerator for TableChangeGenerator {
    fn fix_missing(&self, object: &StructuralObject, ctx: &GenerationContext<'_>) -> EngineResult<Vec<Change>> {
        let mut table = TableDef::from_object(object)?;
        table.columns = ctx.missing_columns(&object.id)?;
        table.primary_key = ctx.missing_primary_key(&object.id)?;
        if ctx.inlines_foreign_keys() {
            table.foreign_keys = ctx.missing_foreign_keys(&object.id)?;
        }
        Ok(vec![Change::reversible(ChangeOp::CreateTable(table))])
    }

    fn fix_unexpected(&self, object: &StructuralObject, ctx: &GenerationContext<'_>) -> EngineResult<Vec<Change>> {
        let mut table = TableDef::from_object(object)?;
        table.columns = ctx.unexpected_columns(&object.id)?;
        table.primary_key = ctx.unexpected_primary_key(&object.id)?;
        if ctx.inlines_foreign_keys() {
            table.foreign_keys = ctx.unexpected_foreign_keys(&object.id)?;
        }
        Ok(vec![Change::reversible(ChangeOp::DropTable(table))])
    }

    fn fix_changed(
        &self,
        reference: &StructuralObject,
        observed: &StructuralObject,
        _deltas: &[AttributeDelta],
        _ctx: &GenerationContext<'_>,
    ) -> EngineResult<Vec<Change>> {
        let schema = reference.id.schema.clone();
        let table = reference.id.name.clone();
        let remarks = |o: &StructuralObject| o.text(attr::REMARKS).map(str::to_string);
        Ok(vec![Change::with_reverse(
            ChangeOp::SetTableRemarks {
                schema: schema.clone(),
                table: table.clone(),
                remarks: remarks(reference),
            },
            ChangeOp::SetTableRemarks {
                schema,
                table,
                remarks: remarks(observed),
            },
        )])
    }
}

fn column_aspects(deltas: &[AttributeDelta]) -> Vec<ColumnAspect> {
    let mut aspects: Vec<ColumnAspect> = deltas
        .iter()
        .filter_map(|d| match d.attribute.as_str() {
            attr::DATA_TYPE => Some(ColumnAspect::DataType),
            attr::NULLABLE => Some(ColumnAspect::Nullability),
            attr::DEFAULT_VALUE => Some(ColumnAspect::Default),
            _ => None,
        })
        .collect();
    aspects.sort();
    aspects.dedup();
    aspects
}

/// Columns of existing tables; columns of created or dropped tables are
/// handled by the table change
pub struct ColumnChangeGenerator;

kind_generator!(ColumnChangeGenerator, COLUMN_CHANGE, ObjectKind::Column);

impl ChangeGenerator for ColumnChangeGenerator {
    fn fix_missing(&self, object: &StructuralObject, ctx: &GenerationContext<'_>) -> EngineResult<Vec<Change>> {
        if ctx.relation_is_missing(object) {
            return Ok(Vec::new());
        }
        Ok(vec![Change::reversible(ChangeOp::AddColumn(ColumnDef::from_object(object)?))])
    }

    fn fix_unexpected(&self, object: &StructuralObject, ctx: &GenerationContext<'_>) -> EngineResult<Vec<Change>> {
        if ctx.relation_is_unexpected(object) {
            return Ok(Vec::new());
        }
        Ok(vec![Change::reversible(ChangeOp::DropColumn(ColumnDef::from_object(object)?))])
    }

    fn fix_changed(
        &self,
        reference: &StructuralObject,
        observed: &StructuralObject,
        deltas: &[AttributeDelta],
        _ctx: &GenerationContext<'_>,
    ) -> EngineResult<Vec<Change>> {
        let aspects = column_aspects(deltas);
        if aspects.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Change::reversible(ChangeOp::AlterColumn {
            from: ColumnDef::from_object(observed)?,
            to: ColumnDef::from_object(reference)?,
            aspects,
        })])
    }
}

/// SQLite cannot alter a column in place
pub struct SqliteColumnChangeGenerator;

impl Generator for SqliteColumnChangeGenerator {
    fn id(&self) -> &str {
        SQLITE_COLUMN_CHANGE
    }

    fn priority(&self) -> i32 {
        BACKEND_PRIORITY
    }

    fn applies_to(&self, kind: ObjectKind, backend: Backend) -> bool {
        kind == ObjectKind::Column && backend == Backend::Sqlite
    }
}

impl ChangeGenerator for SqliteColumnChangeGenerator {
    fn fix_missing(&self, object: &StructuralObject, ctx: &GenerationContext<'_>) -> EngineResult<Vec<Change>> {
        ColumnChangeGenerator.fix_missing(object, ctx)
    }

    fn fix_unexpected(&self, object: &StructuralObject, ctx: &GenerationContext<'_>) -> EngineResult<Vec<Change>> {
        ColumnChangeGenerator.fix_unexpected(object, ctx)
    }

    fn fix_changed(
        &self,
        reference: &StructuralObject,
        _observed: &StructuralObject,
        deltas: &[AttributeDelta],
        _ctx: &GenerationContext<'_>,
    ) -> EngineResult<Vec<Change>> {
        let attributes: Vec<&str> = deltas.iter().map(|d| d.attribute.as_str()).collect();
        Err(EngineError::GenerationFailed {
            object: reference.id.clone(),
            reason: format!(
                "sqlite cannot alter a column in place ({}); rebuild the table instead",
                attributes.join(", ")
            ),
        })
    }
}

pub struct ViewChangeGenerator;

kind_generator!(ViewChangeGenerator, VIEW_CHANGE, ObjectKind::View);

impl ChangeGenerator for ViewChangeGenerator {
    fn fix_missing(&self, object: &StructuralObject, _ctx: &GenerationContext<'_>) -> EngineResult<Vec<Change>> {
        Ok(vec![Change::reversible(ChangeOp::CreateView {
            view: ViewDef::from_object(object)?,
            replace: false,
        })])
    }

    fn fix_unexpected(&self, object: &StructuralObject, _ctx: &GenerationContext<'_>) -> EngineResult<Vec<Change>> {
        Ok(vec![Change::reversible(ChangeOp::DropView(ViewDef::from_object(object)?))])
    }

    fn fix_changed(
        &self,
        reference: &StructuralObject,
        observed: &StructuralObject,
        _deltas: &[AttributeDelta],
        _ctx: &GenerationContext<'_>,
    ) -> EngineResult<Vec<Change>> {
        Ok(vec![Change::with_reverse(
            ChangeOp::CreateView {
                view: ViewDef::from_object(reference)?,
                replace: true,
            },
            ChangeOp::CreateView {
                view: ViewDef::from_object(observed)?,
                replace: true,
            },
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changelog::{ChangeLogGenerator, GenerationOptions};
    use crate::generators::standard_registry;
    use crate::model::ObjectId;
    use crate::snapshot::{Snapshot, SnapshotComparator};
    use pretty_assertions::assert_eq;

    fn users(data_type: &str, nullable: bool) -> Vec<StructuralObject> {
        vec![
            StructuralObject::new(ObjectId::top_level(ObjectKind::Table, "main", "users")),
            StructuralObject::new(ObjectId::contained(ObjectKind::Column, "main", "users", "email"))
                .with(attr::DATA_TYPE, data_type)
                .with(attr::NULLABLE, nullable),
        ]
    }

    fn generate(backend: Backend, reference: Vec<StructuralObject>, observed: Vec<StructuralObject>) -> EngineResult<Vec<crate::changelog::ChangeSet>> {
        let registry = standard_registry();
        let reference = Snapshot::new(backend, reference)?;
        let observed = Snapshot::new(backend, observed)?;
        let diff = SnapshotComparator::new(&registry).diff(&reference, &observed)?;
        ChangeLogGenerator::new(&registry).generate_changesets(&diff, &GenerationOptions::default())
    }

    #[test]
    fn test_alter_column_lists_aspects() {
        let changesets = generate(Backend::Postgres, users("text", false), users("varchar(20)", true)).unwrap();
        assert_eq!(changesets.len(), 1);
        match &changesets[0].changes()[0].forward {
            ChangeOp::AlterColumn { from, to, aspects } => {
                assert_eq!(aspects, &vec![ColumnAspect::DataType, ColumnAspect::Nullability]);
                assert_eq!(from.data_type, "varchar(20)");
                assert_eq!(to.data_type, "text");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_sqlite_refuses_in_place_alter() {
        let err = generate(Backend::Sqlite, users("text", false), users("integer", false)).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("column main.users.email"), "{message}");
        assert!(message.contains("data_type"), "{message}");
    }

    #[test]
    fn test_sqlite_still_adds_columns() {
        let mut observed = users("text", false);
        observed.pop();
        let changesets = generate(Backend::Sqlite, users("text", false), observed).unwrap();
        assert_eq!(changesets[0].changes()[0].description(), "Add column email to main.users");
    }

    #[test]
    fn test_changed_view_is_replaced_both_ways() {
        let view = |definition: &str| {
            vec![StructuralObject::new(ObjectId::top_level(ObjectKind::View, "public", "active"))
                .with(attr::DEFINITION, definition)]
        };
        let changesets = generate(Backend::Postgres, view("SELECT 2"), view("SELECT 1")).unwrap();
        let change = &changesets[0].changes()[0];
        assert!(matches!(&change.forward, ChangeOp::CreateView { replace: true, view } if view.definition == "SELECT 2"));
        assert!(matches!(&change.reverse, Some(ChangeOp::CreateView { replace: true, view }) if view.definition == "SELECT 1"));
    }

    #[test]
    fn test_remarks_change_is_reversible() {
        let table = |remarks: &str| {
            vec![StructuralObject::new(ObjectId::top_level(ObjectKind::Table, "public", "t"))
                .with(attr::REMARKS, remarks)]
        };
        let changesets = generate(Backend::Mysql, table("new"), table("old")).unwrap();
        assert!(changesets[0].is_reversible());
    }
}
