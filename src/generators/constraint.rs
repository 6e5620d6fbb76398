//! Change generators for primary keys, unique constraints, indexes and
//! foreign keys
//!
//! A changed constraint is dropped and re-created. Primary keys of created
//! or dropped tables travel with the table change, as do their foreign keys
//! on backends that only declare them inline.

use super::{FOREIGN_KEY_CHANGE, INDEX_CHANGE, PRIMARY_KEY_CHANGE, UNIQUE_CONSTRAINT_CHANGE};
use crate::changelog::{Change, ChangeOp, GenerationContext};
use crate::error::EngineResult;
use crate::model::{
    AttributeDelta, Definition, ForeignKeyDef, IndexDef, ObjectKind, PrimaryKeyDef,
    StructuralObject, UniqueConstraintDef,
};
use crate::registry::ChangeGenerator;

/// Drop the observed definition, then add the reference one
fn recreate<D: Definition>(
    reference: &StructuralObject,
    observed: &StructuralObject,
    add: fn(D) -> ChangeOp,
    drop: fn(D) -> ChangeOp,
) -> EngineResult<Vec<Change>> {
    let old = D::from_object(observed)?;
    let new = D::from_object(reference)?;
    Ok(vec![
        Change::reversible(drop(old)),
        Change::reversible(add(new)),
    ])
}

pub struct PrimaryKeyChangeGenerator;

kind_generator!(PrimaryKeyChangeGenerator, PRIMARY_KEY_CHANGE, ObjectKind::PrimaryKey);

impl ChangeGenerator for PrimaryKeyChangeGenerator {
    fn fix_missing(&self, object: &StructuralObject, ctx: &GenerationContext<'_>) -> EngineResult<Vec<Change>> {
        if ctx.relation_is_missing(object) {
            return Ok(Vec::new());
        }
        Ok(vec![Change::reversible(ChangeOp::AddPrimaryKey(PrimaryKeyDef::from_object(object)?))])
    }

    fn fix_unexpected(&self, object: &StructuralObject, ctx: &GenerationContext<'_>) -> EngineResult<Vec<Change>> {
        if ctx.relation_is_unexpected(object) {
            return Ok(Vec::new());
        }
        Ok(vec![Change::reversible(ChangeOp::DropPrimaryKey(PrimaryKeyDef::from_object(object)?))])
    }

    fn fix_changed(
        &self,
        reference: &StructuralObject,
        observed: &StructuralObject,
        _deltas: &[AttributeDelta],
        _ctx: &GenerationContext<'_>,
    ) -> EngineResult<Vec<Change>> {
        recreate::<PrimaryKeyDef>(reference, observed, ChangeOp::AddPrimaryKey, ChangeOp::DropPrimaryKey)
    }
}

pub struct UniqueConstraintChangeGenerator;

kind_generator!(UniqueConstraintChangeGenerator, UNIQUE_CONSTRAINT_CHANGE, ObjectKind::UniqueConstraint);

impl ChangeGenerator for UniqueConstraintChangeGenerator {
    fn fix_missing(&self, object: &StructuralObject, _ctx: &GenerationContext<'_>) -> EngineResult<Vec<Change>> {
        Ok(vec![Change::reversible(ChangeOp::AddUniqueConstraint(
            UniqueConstraintDef::from_object(object)?,
        ))])
    }

    fn fix_unexpected(&self, object: &StructuralObject, _ctx: &GenerationContext<'_>) -> EngineResult<Vec<Change>> {
        Ok(vec![Change::reversible(ChangeOp::DropUniqueConstraint(
            UniqueConstraintDef::from_object(object)?,
        ))])
    }

    fn fix_changed(
        &self,
        reference: &StructuralObject,
        observed: &StructuralObject,
        _deltas: &[AttributeDelta],
        _ctx: &GenerationContext<'_>,
    ) -> EngineResult<Vec<Change>> {
        recreate::<UniqueConstraintDef>(
            reference,
            observed,
            ChangeOp::AddUniqueConstraint,
            ChangeOp::DropUniqueConstraint,
        )
    }
}

pub struct IndexChangeGenerator;

kind_generator!(IndexChangeGenerator, INDEX_CHANGE, ObjectKind::Index);

impl ChangeGenerator for IndexChangeGenerator {
    fn fix_missing(&self, object: &StructuralObject, _ctx: &GenerationContext<'_>) -> EngineResult<Vec<Change>> {
        Ok(vec![Change::reversible(ChangeOp::CreateIndex(IndexDef::from_object(object)?))])
    }

    fn fix_unexpected(&self, object: &StructuralObject, _ctx: &GenerationContext<'_>) -> EngineResult<Vec<Change>> {
        Ok(vec![Change::reversible(ChangeOp::DropIndex(IndexDef::from_object(object)?))])
    }

    fn fix_changed(
        &self,
        reference: &StructuralObject,
        observed: &StructuralObject,
        _deltas: &[AttributeDelta],
        _ctx: &GenerationContext<'_>,
    ) -> EngineResult<Vec<Change>> {
        recreate::<IndexDef>(reference, observed, ChangeOp::CreateIndex, ChangeOp::DropIndex)
    }
}

pub struct ForeignKeyChangeGenerator;

kind_generator!(ForeignKeyChangeGenerator, FOREIGN_KEY_CHANGE, ObjectKind::ForeignKey);

impl ChangeGenerator for ForeignKeyChangeGenerator {
    fn fix_missing(&self, object: &StructuralObject, ctx: &GenerationContext<'_>) -> EngineResult<Vec<Change>> {
        if ctx.inlines_foreign_keys() && ctx.relation_is_missing(object) {
            return Ok(Vec::new());
        }
        Ok(vec![Change::reversible(ChangeOp::AddForeignKey(ForeignKeyDef::from_object(object)?))])
    }

    fn fix_unexpected(&self, object: &StructuralObject, ctx: &GenerationContext<'_>) -> EngineResult<Vec<Change>> {
        if ctx.inlines_foreign_keys() && ctx.relation_is_unexpected(object) {
            return Ok(Vec::new());
        }
        Ok(vec![Change::reversible(ChangeOp::DropForeignKey(ForeignKeyDef::from_object(object)?))])
    }

    fn fix_changed(
        &self,
        reference: &StructuralObject,
        observed: &StructuralObject,
        _deltas: &[AttributeDelta],
        _ctx: &GenerationContext<'_>,
    ) -> EngineResult<Vec<Change>> {
        recreate::<ForeignKeyDef>(reference, observed, ChangeOp::AddForeignKey, ChangeOp::DropForeignKey)
    }
}

#[cfg(test)]
mod tests {
    use crate::changelog::{ChangeLogGenerator, ChangeOp, GenerationOptions};
    use crate::generators::standard_registry;
    use crate::model::{attr, Backend, ObjectId, ObjectKind, StructuralObject};
    use crate::snapshot::{Snapshot, SnapshotComparator};
    use crate::statement::materialize_op;
    use pretty_assertions::assert_eq;

    fn table_with_pk(columns: &[&str]) -> Vec<StructuralObject> {
        vec![
            StructuralObject::new(ObjectId::top_level(ObjectKind::Table, "public", "t")),
            StructuralObject::new(ObjectId::contained(ObjectKind::PrimaryKey, "public", "t", "t_pkey"))
                .with(attr::COLUMNS, columns.iter().map(|c| c.to_string()).collect::<Vec<_>>()),
        ]
    }

    #[test]
    fn test_changed_primary_key_is_recreated() {
        let registry = standard_registry();
        let reference = Snapshot::new(Backend::Postgres, table_with_pk(&["id", "tenant"])).unwrap();
        let observed = Snapshot::new(Backend::Postgres, table_with_pk(&["id"])).unwrap();
        let diff = SnapshotComparator::new(&registry).diff(&reference, &observed).unwrap();
        let changesets = ChangeLogGenerator::new(&registry)
            .generate_changesets(&diff, &GenerationOptions::default())
            .unwrap();

        // The old key goes in the drop phase, the new one in the create phase
        assert_eq!(changesets.len(), 2);
        let drop = changesets[0].forward_ops();
        let add = changesets[1].forward_ops();
        assert!(matches!(&drop[..], [ChangeOp::DropPrimaryKey(pk)] if pk.columns == vec!["id".to_string()]));
        assert!(matches!(&add[..], [ChangeOp::AddPrimaryKey(pk)] if pk.columns.len() == 2));

        // Each half rolls back on its own
        let undo_add = changesets[1].reverse_ops().unwrap();
        assert!(matches!(&undo_add[..], [ChangeOp::DropPrimaryKey(pk)] if pk.columns.len() == 2));
        let undo_drop = changesets[0].reverse_ops().unwrap();
        assert!(matches!(&undo_drop[..], [ChangeOp::AddPrimaryKey(pk)] if pk.columns.len() == 1));
    }

    fn parent_and_child(with_child: bool) -> Vec<StructuralObject> {
        let mut objects = vec![
            StructuralObject::new(ObjectId::top_level(ObjectKind::Table, "main", "parent")),
            StructuralObject::new(ObjectId::contained(ObjectKind::Column, "main", "parent", "id"))
                .with(attr::DATA_TYPE, "integer")
                .with(attr::NULLABLE, false)
                .with(attr::POSITION, 1i64),
        ];
        if with_child {
            objects.extend([
                StructuralObject::new(ObjectId::top_level(ObjectKind::Table, "main", "child")),
                StructuralObject::new(ObjectId::contained(ObjectKind::Column, "main", "child", "id"))
                    .with(attr::DATA_TYPE, "integer")
                    .with(attr::NULLABLE, false)
                    .with(attr::POSITION, 1i64),
                StructuralObject::new(ObjectId::contained(ObjectKind::Column, "main", "child", "parent_id"))
                    .with(attr::DATA_TYPE, "integer")
                    .with(attr::POSITION, 2i64),
                StructuralObject::new(ObjectId::contained(ObjectKind::ForeignKey, "main", "child", "child_fk"))
                    .with(attr::COLUMNS, vec!["parent_id".to_string()])
                    .with(attr::REFERENCED_SCHEMA, "main")
                    .with(attr::REFERENCED_TABLE, "parent")
                    .with(attr::REFERENCED_COLUMNS, vec!["id".to_string()]),
            ]);
        }
        objects
    }

    fn forward_ops(backend: Backend, reference: &Snapshot, observed: &Snapshot) -> Vec<ChangeOp> {
        let registry = standard_registry();
        let diff = SnapshotComparator::new(&registry).diff(reference, observed).unwrap();
        ChangeLogGenerator::new(&registry)
            .generate_changesets(&diff, &GenerationOptions::default())
            .unwrap()
            .iter()
            .flat_map(|cs| cs.forward_ops())
            .inspect(|op| assert!(materialize_op(op, backend).is_ok(), "{op:?}"))
            .collect()
    }

    #[test]
    fn test_sqlite_child_table_declares_foreign_key_inline() {
        let with_child = Snapshot::new(Backend::Sqlite, parent_and_child(true)).unwrap();
        let parent_only = Snapshot::new(Backend::Sqlite, parent_and_child(false)).unwrap();

        let ops = forward_ops(Backend::Sqlite, &with_child, &parent_only);
        assert_eq!(ops.len(), 1);
        let ChangeOp::CreateTable(table) = &ops[0] else {
            panic!("expected a table creation, got {ops:?}");
        };
        assert_eq!(table.foreign_keys.len(), 1);
        let statements = materialize_op(&ops[0], Backend::Sqlite).unwrap();
        assert_eq!(
            statements[0].sql,
            "CREATE TABLE \"child\" (\n  \"id\" integer NOT NULL,\n  \"parent_id\" integer,\n  \
             CONSTRAINT \"child_fk\" FOREIGN KEY (\"parent_id\") REFERENCES \"parent\" (\"id\")\n)"
        );

        let registry = standard_registry();
        let applied = parent_only.apply(&ops).unwrap();
        assert!(SnapshotComparator::new(&registry).diff(&with_child, &applied).unwrap().is_empty());

        // Dropping the child takes its key along
        let ops = forward_ops(Backend::Sqlite, &parent_only, &with_child);
        assert!(matches!(&ops[..], [ChangeOp::DropTable(t)] if t.foreign_keys.len() == 1));
    }

    #[test]
    fn test_foreign_key_stays_separate_where_backend_alters_constraints() {
        let with_child = Snapshot::new(Backend::Postgres, parent_and_child(true)).unwrap();
        let parent_only = Snapshot::new(Backend::Postgres, parent_and_child(false)).unwrap();
        let ops = forward_ops(Backend::Postgres, &with_child, &parent_only);
        assert!(matches!(&ops[0], ChangeOp::CreateTable(t) if t.foreign_keys.is_empty()));
        assert!(matches!(&ops[1], ChangeOp::AddForeignKey(fk) if fk.name == "child_fk"));
    }

    #[test]
    fn test_primary_key_of_new_table_folded_into_table() {
        let registry = standard_registry();
        let reference = Snapshot::new(Backend::Postgres, table_with_pk(&["id"])).unwrap();
        let observed = Snapshot::empty(Backend::Postgres);
        let diff = SnapshotComparator::new(&registry).diff(&reference, &observed).unwrap();
        let changesets = ChangeLogGenerator::new(&registry)
            .generate_changesets(&diff, &GenerationOptions::default())
            .unwrap();
        assert_eq!(changesets.len(), 1);
        assert!(matches!(
            &changesets[0].changes()[0].forward,
            ChangeOp::CreateTable(t) if t.primary_key.is_some()
        ));
    }
}
