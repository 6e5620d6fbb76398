//! Structural simulation
//!
//! Applies change operations to an in-memory snapshot. The result is what a
//! capture of the store would return after the same operations executed.

use crate::changelog::ChangeOp;
use crate::error::{simulation_error, EngineResult};
use crate::model::{attr, Definition, ObjectId, ObjectKind, StructuralObject};
use crate::snapshot::Snapshot;
use std::collections::BTreeMap;
use tracing::{debug, warn};

impl Snapshot {
    /// Apply operations in order, producing a new snapshot.
    ///
    /// Creating an object that exists, or dropping or altering one that does
    /// not, fails naming the object. Raw SQL is opaque and left out.
    pub fn apply<'a>(&self, ops: impl IntoIterator<Item = &'a ChangeOp>) -> EngineResult<Snapshot> {
        let mut objects = self.object_map().clone();
        for op in ops {
            apply_op(&mut objects, op)?;
        }
        Ok(self.successor(objects))
    }
}

fn apply_op(objects: &mut BTreeMap<ObjectId, StructuralObject>, op: &ChangeOp) -> EngineResult<()> {
    debug!("Simulating: {}", op.description());
    match op {
        ChangeOp::CreateSchema(d) => insert(objects, d.to_object()),
        ChangeOp::DropSchema(d) => {
            let id = d.id();
            if objects.keys().any(|other| other.schema == d.name && *other != id) {
                return Err(simulation_error(&id, "schema still contains objects"));
            }
            remove(objects, &id)
        }
        ChangeOp::CreateSequence(d) => insert(objects, d.to_object()),
        ChangeOp::DropSequence(d) => remove(objects, &d.id()),
        ChangeOp::AlterSequence { to, .. } => replace(objects, to.to_object()),
        ChangeOp::CreateTable(d) => {
            for object in d.objects() {
                insert(objects, object)?;
            }
            Ok(())
        }
        ChangeOp::DropTable(d) => {
            let table = d.id();
            remove(objects, &table)?;
            // Contained objects go with the table
            objects.retain(|id, _| {
                !(id.kind.is_contained()
                    && id.schema == table.schema
                    && id.relation.as_deref() == Some(table.name.as_str()))
            });
            Ok(())
        }
        ChangeOp::SetTableRemarks { schema, table, remarks } => {
            let id = ObjectId::top_level(ObjectKind::Table, schema.clone(), table.clone());
            let object = objects
                .get_mut(&id)
                .ok_or_else(|| simulation_error(&id, "object does not exist"))?;
            object.set(attr::REMARKS, remarks.clone());
            Ok(())
        }
        ChangeOp::AddColumn(d) => insert(objects, d.to_object()),
        ChangeOp::DropColumn(d) => remove(objects, &d.id()),
        ChangeOp::AlterColumn { to, .. } => replace(objects, to.to_object()),
        ChangeOp::AddPrimaryKey(d) => insert(objects, d.to_object()),
        ChangeOp::DropPrimaryKey(d) => remove(objects, &d.id()),
        ChangeOp::AddUniqueConstraint(d) => insert(objects, d.to_object()),
        ChangeOp::DropUniqueConstraint(d) => remove(objects, &d.id()),
        ChangeOp::CreateIndex(d) => insert(objects, d.to_object()),
        ChangeOp::DropIndex(d) => remove(objects, &d.id()),
        ChangeOp::AddForeignKey(d) => insert(objects, d.to_object()),
        ChangeOp::DropForeignKey(d) => remove(objects, &d.id()),
        ChangeOp::CreateView { view, replace: false } => insert(objects, view.to_object()),
        ChangeOp::CreateView { view, replace: true } => {
            objects.insert(view.id(), view.to_object());
            Ok(())
        }
        ChangeOp::DropView(d) => remove(objects, &d.id()),
        ChangeOp::Sql { sql, .. } => {
            warn!(
                "Raw SQL cannot be simulated and is left out of the snapshot: {}",
                sql.lines().next().unwrap_or_default()
            );
            Ok(())
        }
        ChangeOp::Comment { .. } => Ok(()),
    }
}

fn insert(objects: &mut BTreeMap<ObjectId, StructuralObject>, object: StructuralObject) -> EngineResult<()> {
    if objects.contains_key(&object.id) {
        return Err(simulation_error(&object.id, "object already exists"));
    }
    if let Some(relation) = object.id.relation_id() {
        if !objects.contains_key(&relation) {
            return Err(simulation_error(
                &object.id,
                format!("owning {relation} does not exist"),
            ));
        }
    }
    objects.insert(object.id.clone(), object);
    Ok(())
}

fn remove(objects: &mut BTreeMap<ObjectId, StructuralObject>, id: &ObjectId) -> EngineResult<()> {
    objects
        .remove(id)
        .map(|_| ())
        .ok_or_else(|| simulation_error(id, "object does not exist"))
}

fn replace(objects: &mut BTreeMap<ObjectId, StructuralObject>, object: StructuralObject) -> EngineResult<()> {
    match objects.get_mut(&object.id) {
        Some(existing) => {
            *existing = object;
            Ok(())
        }
        None => Err(simulation_error(&object.id, "object does not exist")),
    }
}
