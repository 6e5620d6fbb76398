//! Change generator dispatch
//!
//! Turns a `DiffResult` into ordered changesets in two phases. The drop phase
//! walks kinds in drop order and removes unexpected objects along with the old
//! half of every re-created constraint. The create phase walks kinds in create
//! order, adding missing objects, then altered and re-created ones. Foreign
//! keys that reference a re-created key are dropped and re-added around it.
//! Any failure aborts the whole call so a partial, ordering-broken changelog
//! is never produced.

use super::change::{Change, ChangeAction, ChangeOp};
use super::changeset::{ChangeLog, ChangeSet};
use super::ordering::{GenerationMode, KindGraph};
use crate::error::{EngineError, EngineResult};
use crate::model::{
    Backend, ColumnDef, Definition, ForeignKeyDef, ObjectId, ObjectKind, PrimaryKeyDef,
    StructuralObject, UniqueConstraintDef,
};
use crate::registry::GeneratorRegistry;
use crate::snapshot::DiffResult;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// How generated changes are grouped into changesets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingPolicy {
    /// One changeset per change
    PerChange,
    /// One changeset per diffed object and phase (a table with its columns;
    /// a re-created constraint yields a drop changeset and an add changeset)
    #[default]
    PerObject,
    /// Everything in one changeset
    Single,
}

/// Options for a generation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOptions {
    pub author: String,
    /// Changeset ids are `<prefix>-<n>`, numbered from 1
    pub id_prefix: String,
    pub grouping: GroupingPolicy,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            author: "schemaflow".to_string(),
            id_prefix: "changeset".to_string(),
            grouping: GroupingPolicy::default(),
        }
    }
}

/// Read-only view of the diff handed to change generators
pub struct GenerationContext<'a> {
    diff: &'a DiffResult,
}

impl<'a> GenerationContext<'a> {
    pub fn new(diff: &'a DiffResult) -> Self {
        Self { diff }
    }

    pub fn diff(&self) -> &DiffResult {
        self.diff
    }

    /// Backend the changes target
    pub fn backend(&self) -> Backend {
        self.diff.observed_backend()
    }

    /// The object's owning table is itself missing
    pub fn relation_is_missing(&self, object: &StructuralObject) -> bool {
        object
            .id
            .relation_id()
            .is_some_and(|table| self.diff.is_missing(&table))
    }

    /// The object's owning table is itself unexpected
    pub fn relation_is_unexpected(&self, object: &StructuralObject) -> bool {
        object
            .id
            .relation_id()
            .is_some_and(|table| self.diff.is_unexpected(&table))
    }

    /// Missing columns of a table, by position then name
    pub fn missing_columns(&self, table: &ObjectId) -> EngineResult<Vec<ColumnDef>> {
        columns_of(self.diff.missing_of_kind(ObjectKind::Column), table)
    }

    pub fn missing_primary_key(&self, table: &ObjectId) -> EngineResult<Option<PrimaryKeyDef>> {
        primary_key_of(self.diff.missing_of_kind(ObjectKind::PrimaryKey), table)
    }

    pub fn unexpected_columns(&self, table: &ObjectId) -> EngineResult<Vec<ColumnDef>> {
        columns_of(self.diff.unexpected_of_kind(ObjectKind::Column), table)
    }

    pub fn unexpected_primary_key(&self, table: &ObjectId) -> EngineResult<Option<PrimaryKeyDef>> {
        primary_key_of(self.diff.unexpected_of_kind(ObjectKind::PrimaryKey), table)
    }

    /// Foreign keys travel with created and dropped tables when the backend
    /// cannot add them to an existing table
    pub fn inlines_foreign_keys(&self) -> bool {
        !self.backend().alters_constraints()
    }

    pub fn missing_foreign_keys(&self, table: &ObjectId) -> EngineResult<Vec<ForeignKeyDef>> {
        foreign_keys_of(self.diff.missing_of_kind(ObjectKind::ForeignKey), table)
    }

    pub fn unexpected_foreign_keys(&self, table: &ObjectId) -> EngineResult<Vec<ForeignKeyDef>> {
        foreign_keys_of(self.diff.unexpected_of_kind(ObjectKind::ForeignKey), table)
    }
}

fn belongs_to(object: &StructuralObject, table: &ObjectId) -> bool {
    object.id.schema == table.schema && object.id.relation.as_deref() == Some(table.name.as_str())
}

fn columns_of<'a>(
    objects: impl Iterator<Item = &'a StructuralObject>,
    table: &ObjectId,
) -> EngineResult<Vec<ColumnDef>> {
    let mut columns = objects
        .filter(|o| belongs_to(o, table))
        .map(ColumnDef::from_object)
        .collect::<EngineResult<Vec<_>>>()?;
    columns.sort_by(|a, b| {
        let pos = |c: &ColumnDef| c.position.unwrap_or(i64::MAX);
        pos(a).cmp(&pos(b)).then_with(|| a.name.cmp(&b.name))
    });
    Ok(columns)
}

fn foreign_keys_of<'a>(
    objects: impl Iterator<Item = &'a StructuralObject>,
    table: &ObjectId,
) -> EngineResult<Vec<ForeignKeyDef>> {
    objects
        .filter(|o| belongs_to(o, table))
        .map(ForeignKeyDef::from_object)
        .collect()
}

fn primary_key_of<'a>(
    mut objects: impl Iterator<Item = &'a StructuralObject>,
    table: &ObjectId,
) -> EngineResult<Option<PrimaryKeyDef>> {
    objects
        .find(|o| belongs_to(o, table))
        .map(PrimaryKeyDef::from_object)
        .transpose()
}

/// Produces ordered changesets from a diff
pub struct ChangeLogGenerator<'a> {
    registry: &'a GeneratorRegistry,
    graph: KindGraph,
}

impl<'a> ChangeLogGenerator<'a> {
    pub fn new(registry: &'a GeneratorRegistry) -> Self {
        Self {
            registry,
            graph: KindGraph::standard(),
        }
    }

    pub fn with_graph(registry: &'a GeneratorRegistry, graph: KindGraph) -> Self {
        Self { registry, graph }
    }

    pub fn graph(&self) -> &KindGraph {
        &self.graph
    }

    /// Generate changesets for every difference in the diff
    pub fn generate_changesets(
        &self,
        diff: &DiffResult,
        options: &GenerationOptions,
    ) -> EngineResult<Vec<ChangeSet>> {
        let ctx = GenerationContext::new(diff);
        let backend = ctx.backend();
        let declared: BTreeSet<ObjectKind> = self.graph.kinds().collect();
        self.check_declared(diff, &declared)?;

        let mut altered = self.split_changed(diff, &ctx)?;
        let dependents = dependent_foreign_keys(diff)?;
        let mut groups: Vec<(ObjectId, Vec<Change>)> = Vec::new();

        // Drop phase: unexpected objects and the drop half of re-created ones
        for kind in self.graph.order_for(GenerationMode::Unexpected)? {
            for object in diff.unexpected_of_kind(kind) {
                let generator = self
                    .registry
                    .resolve_change(kind, backend)
                    .map_err(|e| e.for_object(&object.id))?;
                let changes = generator
                    .fix_unexpected(object, &ctx)
                    .map_err(|e| e.for_object(&object.id))?;
                push_group(&mut groups, &object.id, changes, GenerationMode::Unexpected);
            }
            for changed in diff.changed_of_kind(kind) {
                let id = &changed.reference.id;
                if let Some(split) = altered.get_mut(id) {
                    push_group(&mut groups, id, std::mem::take(&mut split.drops), GenerationMode::Changed);
                }
            }
            if kind == ObjectKind::ForeignKey {
                for fk in &dependents {
                    let changes = vec![Change::reversible(ChangeOp::DropForeignKey(fk.clone()))];
                    push_group(&mut groups, &fk.id(), changes, GenerationMode::Changed);
                }
            }
        }

        // Create phase: missing objects, then alterations and re-adds
        for kind in self.graph.order_for(GenerationMode::Missing)? {
            for object in diff.missing_of_kind(kind) {
                let generator = self
                    .registry
                    .resolve_change(kind, backend)
                    .map_err(|e| e.for_object(&object.id))?;
                let changes = generator
                    .fix_missing(object, &ctx)
                    .map_err(|e| e.for_object(&object.id))?;
                push_group(&mut groups, &object.id, changes, GenerationMode::Missing);
            }
            for changed in diff.changed_of_kind(kind) {
                let id = &changed.reference.id;
                if let Some(split) = altered.remove(id) {
                    push_group(&mut groups, id, split.rest, GenerationMode::Changed);
                }
            }
            if kind == ObjectKind::ForeignKey {
                for fk in &dependents {
                    let changes = vec![Change::reversible(ChangeOp::AddForeignKey(fk.clone()))];
                    push_group(&mut groups, &fk.id(), changes, GenerationMode::Changed);
                }
            }
        }

        let changesets = group_changesets(groups, options);
        info!(
            "Generated {} changesets ({} changes) for {}",
            changesets.len(),
            changesets.iter().map(|cs| cs.changes().len()).sum::<usize>(),
            backend
        );
        Ok(changesets)
    }

    // Changed objects resolved once, their drops split from everything else
    fn split_changed(
        &self,
        diff: &DiffResult,
        ctx: &GenerationContext<'_>,
    ) -> EngineResult<BTreeMap<ObjectId, AlteredObject>> {
        let mut altered = BTreeMap::new();
        for changed in diff.changed() {
            let id = &changed.reference.id;
            let generator = self
                .registry
                .resolve_change(id.kind, ctx.backend())
                .map_err(|e| e.for_object(id))?;
            let changes = generator
                .fix_changed(&changed.reference, &changed.observed, &changed.deltas, ctx)
                .map_err(|e| e.for_object(id))?;
            let (drops, rest): (Vec<Change>, Vec<Change>) = changes
                .into_iter()
                .partition(|c| c.action() == ChangeAction::Drop);
            altered.insert(id.clone(), AlteredObject { drops, rest });
        }
        Ok(altered)
    }

    /// Generate a changelog document
    pub fn generate_changelog(&self, diff: &DiffResult, options: &GenerationOptions) -> EngineResult<ChangeLog> {
        Ok(ChangeLog::from_changesets(self.generate_changesets(diff, options)?))
    }

    // Objects of a kind the graph does not order would be silently skipped
    fn check_declared(&self, diff: &DiffResult, declared: &BTreeSet<ObjectKind>) -> EngineResult<()> {
        let undeclared = diff
            .missing()
            .chain(diff.unexpected())
            .map(|o| &o.id)
            .chain(diff.changed().map(|c| &c.reference.id))
            .find(|id| !declared.contains(&id.kind));
        match undeclared {
            Some(id) => Err(EngineError::GenerationFailed {
                object: id.clone(),
                reason: format!("kind '{}' is not declared in the dependency graph", id.kind),
            }),
            None => Ok(()),
        }
    }
}

struct AlteredObject {
    drops: Vec<Change>,
    rest: Vec<Change>,
}

/// Unchanged foreign keys whose referenced key is dropped and re-added
fn dependent_foreign_keys(diff: &DiffResult) -> EngineResult<Vec<ForeignKeyDef>> {
    let mut rebuilt: Vec<(ObjectId, Vec<String>)> = Vec::new();
    for changed in diff
        .changed_of_kind(ObjectKind::PrimaryKey)
        .chain(diff.changed_of_kind(ObjectKind::UniqueConstraint))
    {
        if let Some(table) = changed.observed.id.relation_id() {
            let columns = match changed.observed.kind() {
                ObjectKind::PrimaryKey => PrimaryKeyDef::from_object(&changed.observed)?.columns,
                _ => UniqueConstraintDef::from_object(&changed.observed)?.columns,
            };
            rebuilt.push((table, columns));
        }
    }
    if rebuilt.is_empty() {
        return Ok(Vec::new());
    }

    let mut dependents = Vec::new();
    for object in diff.equal_of_kind(ObjectKind::ForeignKey) {
        let fk = ForeignKeyDef::from_object(object)?;
        let target = ObjectId::top_level(ObjectKind::Table, fk.referenced_schema.clone(), fk.referenced_table.clone());
        if rebuilt
            .iter()
            .any(|(table, columns)| *table == target && *columns == fk.referenced_columns)
        {
            debug!("{} depends on a re-created key", object.id);
            dependents.push(fk);
        }
    }
    Ok(dependents)
}

fn push_group(groups: &mut Vec<(ObjectId, Vec<Change>)>, id: &ObjectId, changes: Vec<Change>, mode: GenerationMode) {
    debug!("{:?} {}: {} change(s)", mode, id, changes.len());
    if !changes.is_empty() {
        groups.push((id.clone(), changes));
    }
}

fn group_changesets(groups: Vec<(ObjectId, Vec<Change>)>, options: &GenerationOptions) -> Vec<ChangeSet> {
    let mut counter = 0usize;
    let mut next_id = || {
        counter += 1;
        format!("{}-{}", options.id_prefix, counter)
    };

    match options.grouping {
        GroupingPolicy::PerChange => groups
            .into_iter()
            .flat_map(|(_, changes)| changes)
            .map(|change| ChangeSet::new(next_id(), options.author.clone()).with_change(change))
            .collect(),
        GroupingPolicy::PerObject => groups
            .into_iter()
            .map(|(_, changes)| {
                let mut changeset = ChangeSet::new(next_id(), options.author.clone());
                for change in changes {
                    changeset.push(change);
                }
                changeset
            })
            .collect(),
        GroupingPolicy::Single => {
            let changes: Vec<Change> = groups.into_iter().flat_map(|(_, changes)| changes).collect();
            if changes.is_empty() {
                return Vec::new();
            }
            let mut changeset = ChangeSet::new(next_id(), options.author.clone());
            for change in changes {
                changeset.push(change);
            }
            vec![changeset]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::standard_registry;
    use crate::model::attr;
    use crate::snapshot::{Snapshot, SnapshotComparator};
    use pretty_assertions::assert_eq;

    fn table(name: &str) -> StructuralObject {
        StructuralObject::new(ObjectId::top_level(ObjectKind::Table, "public", name))
    }

    fn column(table: &str, name: &str, position: i64) -> StructuralObject {
        StructuralObject::new(ObjectId::contained(ObjectKind::Column, "public", table, name))
            .with(attr::DATA_TYPE, "integer")
            .with(attr::POSITION, position)
    }

    fn index(table: &str, name: &str) -> StructuralObject {
        StructuralObject::new(ObjectId::contained(ObjectKind::Index, "public", table, name))
            .with(attr::COLUMNS, vec!["id".to_string()])
    }

    fn diff(reference: Vec<StructuralObject>, observed: Vec<StructuralObject>) -> DiffResult {
        let reference = Snapshot::new(Backend::Postgres, reference).unwrap();
        let observed = Snapshot::new(Backend::Postgres, observed).unwrap();
        SnapshotComparator::new(&standard_registry())
            .diff(&reference, &observed)
            .unwrap()
    }

    fn descriptions(changesets: &[ChangeSet]) -> Vec<String> {
        changesets
            .iter()
            .flat_map(|cs| cs.changes())
            .map(|c| c.description())
            .collect()
    }

    #[test]
    fn test_table_folds_in_columns() {
        let d = diff(
            vec![table("t"), column("t", "name", 2), column("t", "id", 1), index("t", "t_idx")],
            vec![],
        );
        let registry = standard_registry();
        let changesets = ChangeLogGenerator::new(&registry)
            .generate_changesets(&d, &GenerationOptions::default())
            .unwrap();

        assert_eq!(changesets.len(), 2);
        assert_eq!(changesets[0].id(), "changeset-1");
        match &changesets[0].changes()[0].forward {
            ChangeOp::CreateTable(def) => {
                let names: Vec<_> = def.columns.iter().map(|c| c.name.as_str()).collect();
                assert_eq!(names, vec!["id", "name"]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(changesets[1].changes()[0].description(), "Create index t_idx on public.t");
    }

    #[test]
    fn test_drops_precede_creates() {
        let d = diff(vec![table("new")], vec![table("old"), index("old", "old_idx")]);
        let registry = standard_registry();
        let changesets = ChangeLogGenerator::new(&registry)
            .generate_changesets(&d, &GenerationOptions::default())
            .unwrap();
        assert_eq!(
            descriptions(&changesets),
            vec![
                "Drop index old_idx from public.old".to_string(),
                "Drop table public.old".to_string(),
                "Create table public.new (0 columns)".to_string(),
            ]
        );
        assert!(changesets.iter().all(|cs| cs.is_reversible()));
    }

    #[test]
    fn test_grouping_policies() {
        let d = diff(vec![table("a"), table("b")], vec![]);
        let registry = standard_registry();
        let generator = ChangeLogGenerator::new(&registry);

        let single = generator
            .generate_changesets(
                &d,
                &GenerationOptions {
                    grouping: GroupingPolicy::Single,
                    id_prefix: "init".into(),
                    author: "ci".into(),
                },
            )
            .unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].key().to_string(), "init-1::ci");
        assert_eq!(single[0].changes().len(), 2);

        let per_change = generator
            .generate_changesets(
                &d,
                &GenerationOptions {
                    grouping: GroupingPolicy::PerChange,
                    ..GenerationOptions::default()
                },
            )
            .unwrap();
        assert_eq!(per_change.len(), 2);
    }

    #[test]
    fn test_generation_is_deterministic() {
        let reference = vec![table("a"), table("b"), column("a", "id", 1), index("b", "b_idx")];
        let registry = standard_registry();
        let first = ChangeLogGenerator::new(&registry)
            .generate_changesets(&diff(reference.clone(), vec![]), &GenerationOptions::default())
            .unwrap();
        for _ in 0..10 {
            let again = ChangeLogGenerator::new(&registry)
                .generate_changesets(&diff(reference.clone(), vec![]), &GenerationOptions::default())
                .unwrap();
            assert_eq!(again, first);
        }
    }

    #[test]
    fn test_missing_generator_aborts_with_object() {
        let d = diff(vec![table("a"), table("b")], vec![]);
        let mut registry = standard_registry();
        registry.unregister(crate::generators::TABLE_CHANGE).unwrap();
        let err = ChangeLogGenerator::new(&registry)
            .generate_changesets(&d, &GenerationOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("table public.a"), "{err}");
    }

    #[test]
    fn test_undeclared_kind_is_reported() {
        let d = diff(vec![table("a")], vec![]);
        let registry = standard_registry();
        let graph = KindGraph::from_declarations([(ObjectKind::Schema, vec![])]);
        let err = ChangeLogGenerator::with_graph(&registry, graph)
            .generate_changesets(&d, &GenerationOptions::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::GenerationFailed { .. }));
    }
}
