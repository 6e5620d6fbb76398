//! Snapshot Comparator
//!
//! The core comparison engine: classifies every object of two snapshots as
//! missing, unexpected, changed or equal. This is the "git diff" for a schema.

use super::model::Snapshot;
use crate::error::EngineResult;
use crate::model::{AttributeDelta, Backend, ObjectId, ObjectKind, StructuralObject};
use crate::registry::GeneratorRegistry;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Which bucket an object landed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffBucket {
    /// In the reference, absent from the observed snapshot
    Missing,
    /// In the observed snapshot, absent from the reference
    Unexpected,
    Changed,
    Equal,
}

/// An object present in both snapshots with attribute differences
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedObject {
    pub reference: StructuralObject,
    pub observed: StructuralObject,
    pub deltas: Vec<AttributeDelta>,
}

/// Classification of two snapshots, computed once and never mutated
#[derive(Debug, Clone)]
pub struct DiffResult {
    reference_backend: Backend,
    observed_backend: Backend,
    missing: BTreeMap<ObjectId, StructuralObject>,
    unexpected: BTreeMap<ObjectId, StructuralObject>,
    changed: BTreeMap<ObjectId, ChangedObject>,
    /// Observed side of objects that match
    equal: BTreeMap<ObjectId, StructuralObject>,
}

impl DiffResult {
    pub fn reference_backend(&self) -> Backend {
        self.reference_backend
    }

    /// Backend changes will be generated for
    pub fn observed_backend(&self) -> Backend {
        self.observed_backend
    }

    pub fn missing(&self) -> impl Iterator<Item = &StructuralObject> {
        self.missing.values()
    }

    pub fn unexpected(&self) -> impl Iterator<Item = &StructuralObject> {
        self.unexpected.values()
    }

    pub fn changed(&self) -> impl Iterator<Item = &ChangedObject> {
        self.changed.values()
    }

    pub fn equal(&self) -> impl Iterator<Item = &ObjectId> {
        self.equal.keys()
    }

    pub fn equal_of_kind(&self, kind: ObjectKind) -> impl Iterator<Item = &StructuralObject> {
        self.equal.values().filter(move |o| o.kind() == kind)
    }

    pub fn missing_of_kind(&self, kind: ObjectKind) -> impl Iterator<Item = &StructuralObject> {
        self.missing.values().filter(move |o| o.kind() == kind)
    }

    pub fn unexpected_of_kind(&self, kind: ObjectKind) -> impl Iterator<Item = &StructuralObject> {
        self.unexpected.values().filter(move |o| o.kind() == kind)
    }

    pub fn changed_of_kind(&self, kind: ObjectKind) -> impl Iterator<Item = &ChangedObject> {
        self.changed.values().filter(move |c| c.reference.kind() == kind)
    }

    pub fn is_missing(&self, id: &ObjectId) -> bool {
        self.missing.contains_key(id)
    }

    pub fn is_unexpected(&self, id: &ObjectId) -> bool {
        self.unexpected.contains_key(id)
    }

    pub fn bucket_of(&self, id: &ObjectId) -> Option<DiffBucket> {
        if self.missing.contains_key(id) {
            Some(DiffBucket::Missing)
        } else if self.unexpected.contains_key(id) {
            Some(DiffBucket::Unexpected)
        } else if self.changed.contains_key(id) {
            Some(DiffBucket::Changed)
        } else if self.equal.contains_key(id) {
            Some(DiffBucket::Equal)
        } else {
            None
        }
    }

    /// No structural difference at all
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty() && self.changed.is_empty()
    }

    pub fn summary(&self) -> DiffSummary {
        let mut per_kind: BTreeMap<ObjectKind, KindCounts> = BTreeMap::new();
        for id in self.missing.keys() {
            per_kind.entry(id.kind).or_default().missing += 1;
        }
        for id in self.unexpected.keys() {
            per_kind.entry(id.kind).or_default().unexpected += 1;
        }
        for id in self.changed.keys() {
            per_kind.entry(id.kind).or_default().changed += 1;
        }
        for id in self.equal.keys() {
            per_kind.entry(id.kind).or_default().equal += 1;
        }
        DiffSummary {
            missing: self.missing.len(),
            unexpected: self.unexpected.len(),
            changed: self.changed.len(),
            equal: self.equal.len(),
            per_kind,
        }
    }

    /// Serializable view for reports
    pub fn report(&self) -> DiffReport {
        DiffReport {
            summary: self.summary(),
            missing: self.missing.keys().cloned().collect(),
            unexpected: self.unexpected.keys().cloned().collect(),
            changed: self
                .changed
                .iter()
                .map(|(id, c)| ChangedEntry {
                    id: id.clone(),
                    deltas: c.deltas.clone(),
                })
                .collect(),
        }
    }
}

/// Per-kind bucket counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindCounts {
    pub missing: usize,
    pub unexpected: usize,
    pub changed: usize,
    pub equal: usize,
}

/// Summary statistics for the diff
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffSummary {
    pub missing: usize,
    pub unexpected: usize,
    pub changed: usize,
    pub equal: usize,
    pub per_kind: BTreeMap<ObjectKind, KindCounts>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangedEntry {
    pub id: ObjectId,
    pub deltas: Vec<AttributeDelta>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffReport {
    pub summary: DiffSummary,
    pub missing: Vec<ObjectId>,
    pub unexpected: Vec<ObjectId>,
    pub changed: Vec<ChangedEntry>,
}

/// Compares snapshots using the registered diff generators
pub struct SnapshotComparator<'a> {
    registry: &'a GeneratorRegistry,
}

impl<'a> SnapshotComparator<'a> {
    pub fn new(registry: &'a GeneratorRegistry) -> Self {
        Self { registry }
    }

    /// Compare a reference (desired) snapshot with an observed (current) one
    pub fn diff(&self, reference: &Snapshot, observed: &Snapshot) -> EngineResult<DiffResult> {
        let backend = observed.backend();
        let mut missing = BTreeMap::new();
        let mut unexpected = BTreeMap::new();
        let mut changed = BTreeMap::new();
        let mut equal = BTreeMap::new();

        let from_map = reference.object_map();
        let to_map = observed.object_map();

        for (id, object) in from_map {
            match to_map.get(id) {
                None => {
                    missing.insert(id.clone(), object.clone());
                }
                Some(current) => {
                    let generator = self
                        .registry
                        .resolve_diff(id.kind, backend)
                        .map_err(|e| e.for_object(id))?;
                    let deltas = generator.compare(object, current);
                    if deltas.is_empty() {
                        equal.insert(id.clone(), current.clone());
                    } else {
                        debug!("{} changed: {} attribute(s)", id, deltas.len());
                        changed.insert(
                            id.clone(),
                            ChangedObject {
                                reference: object.clone(),
                                observed: current.clone(),
                                deltas,
                            },
                        );
                    }
                }
            }
        }

        for (id, object) in to_map {
            if !from_map.contains_key(id) {
                unexpected.insert(id.clone(), object.clone());
            }
        }

        let result = DiffResult {
            reference_backend: reference.backend(),
            observed_backend: backend,
            missing,
            unexpected,
            changed,
            equal,
        };
        info!(
            "Diff complete: {} missing, {} unexpected, {} changed, {} equal",
            result.missing.len(),
            result.unexpected.len(),
            result.changed.len(),
            result.equal.len()
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::standard_registry;
    use crate::model::attr;
    use pretty_assertions::assert_eq;

    fn table(name: &str) -> StructuralObject {
        StructuralObject::new(ObjectId::top_level(ObjectKind::Table, "public", name))
    }

    fn column(table: &str, name: &str, data_type: &str) -> StructuralObject {
        StructuralObject::new(ObjectId::contained(ObjectKind::Column, "public", table, name))
            .with(attr::DATA_TYPE, data_type)
    }

    #[test]
    fn test_every_object_classified_once() {
        let reference = Snapshot::new(
            Backend::Postgres,
            vec![table("a"), table("b"), column("a", "id", "integer"), column("a", "name", "text")],
        )
        .unwrap();
        let observed = Snapshot::new(
            Backend::Postgres,
            vec![table("a"), table("c"), column("a", "id", "bigint"), column("a", "name", "TEXT")],
        )
        .unwrap();

        let diff = SnapshotComparator::new(&standard_registry())
            .diff(&reference, &observed)
            .unwrap();

        let b = ObjectId::top_level(ObjectKind::Table, "public", "b");
        let c = ObjectId::top_level(ObjectKind::Table, "public", "c");
        let id = ObjectId::contained(ObjectKind::Column, "public", "a", "id");
        let name = ObjectId::contained(ObjectKind::Column, "public", "a", "name");

        assert_eq!(diff.bucket_of(&b), Some(DiffBucket::Missing));
        assert_eq!(diff.bucket_of(&c), Some(DiffBucket::Unexpected));
        assert_eq!(diff.bucket_of(&id), Some(DiffBucket::Changed));
        assert_eq!(diff.bucket_of(&name), Some(DiffBucket::Equal));

        let summary = diff.summary();
        assert_eq!(summary.missing + summary.unexpected + summary.changed + summary.equal, 5);
        assert_eq!(summary.per_kind[&ObjectKind::Column].changed, 1);

        let changed = diff.changed().next().unwrap();
        assert_eq!(changed.deltas[0].attribute, attr::DATA_TYPE);
        assert_eq!(changed.deltas[0].reference, crate::model::AttrValue::from("integer"));
    }

    #[test]
    fn test_identical_snapshots_are_empty() {
        let objects = vec![table("a"), column("a", "id", "integer")];
        let reference = Snapshot::new(Backend::Mysql, objects.clone()).unwrap();
        let observed = Snapshot::new(Backend::Mysql, objects).unwrap();
        let diff = SnapshotComparator::new(&standard_registry())
            .diff(&reference, &observed)
            .unwrap();
        assert!(diff.is_empty());
        assert_eq!(diff.equal().count(), 2);
    }

    #[test]
    fn test_report_serializes() {
        let reference = Snapshot::new(Backend::Postgres, vec![table("a")]).unwrap();
        let observed = Snapshot::empty(Backend::Postgres);
        let diff = SnapshotComparator::new(&standard_registry())
            .diff(&reference, &observed)
            .unwrap();
        let json = serde_json::to_value(diff.report()).unwrap();
        assert_eq!(json["summary"]["missing"], 1);
        assert_eq!(json["missing"][0]["name"], "a");
    }

    #[test]
    fn test_missing_diff_generator_is_reported() {
        let objects = vec![table("a")];
        let reference = Snapshot::new(Backend::Postgres, objects.clone()).unwrap();
        let observed = Snapshot::new(Backend::Postgres, objects).unwrap();
        let err = SnapshotComparator::new(&GeneratorRegistry::new())
            .diff(&reference, &observed)
            .unwrap_err();
        assert!(err.to_string().contains("table public.a"));
    }
}
