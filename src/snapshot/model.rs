//! Immutable schema snapshots

use crate::error::{EngineError, EngineResult};
use crate::model::{Backend, ObjectId, ObjectKind, StructuralObject};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Complete structural snapshot at a point in time
///
/// Objects are keyed by identity; a snapshot is never mutated after it is
/// built. Simulated changes produce a new snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "SnapshotDocument", into = "SnapshotDocument")]
pub struct Snapshot {
    id: Uuid,
    backend: Backend,
    captured_at: DateTime<Utc>,
    objects: BTreeMap<ObjectId, StructuralObject>,
    checksum: String,
}

impl Snapshot {
    /// Build a snapshot from captured objects; duplicate identities are rejected
    pub fn new(backend: Backend, objects: impl IntoIterator<Item = StructuralObject>) -> EngineResult<Self> {
        Self::assemble(Uuid::new_v4(), backend, Utc::now(), objects)
    }

    /// An empty snapshot
    pub fn empty(backend: Backend) -> Self {
        Self {
            id: Uuid::new_v4(),
            backend,
            captured_at: Utc::now(),
            objects: BTreeMap::new(),
            checksum: Self::compute_checksum(std::iter::empty()),
        }
    }

    fn assemble(
        id: Uuid,
        backend: Backend,
        captured_at: DateTime<Utc>,
        objects: impl IntoIterator<Item = StructuralObject>,
    ) -> EngineResult<Self> {
        let mut map = BTreeMap::new();
        for object in objects {
            if map.contains_key(&object.id) {
                return Err(EngineError::DuplicateObject(object.id));
            }
            map.insert(object.id.clone(), object);
        }
        let checksum = Self::compute_checksum(map.values());
        Ok(Self {
            id,
            backend,
            captured_at,
            objects: map,
            checksum,
        })
    }

    /// Compute checksum from snapshot content, in identity order
    pub fn compute_checksum<'a>(objects: impl Iterator<Item = &'a StructuralObject>) -> String {
        let mut hasher = Sha256::new();
        for object in objects {
            hasher.update(object.id.to_string().as_bytes());
            for (name, value) in &object.attributes {
                hasher.update(format!("|{name}={value:?}").as_bytes());
            }
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn get(&self, id: &ObjectId) -> Option<&StructuralObject> {
        self.objects.get(id)
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.objects.contains_key(id)
    }

    /// All objects in identity order
    pub fn objects(&self) -> impl Iterator<Item = &StructuralObject> {
        self.objects.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ObjectId> {
        self.objects.keys()
    }

    pub fn of_kind(&self, kind: ObjectKind) -> impl Iterator<Item = &StructuralObject> {
        self.objects.values().filter(move |o| o.kind() == kind)
    }

    /// Objects contained in the given table (columns, keys, indexes)
    pub fn contained_in<'a>(&'a self, table: &'a ObjectId) -> impl Iterator<Item = &'a StructuralObject> + 'a {
        self.objects.values().filter(move |o| {
            o.id.relation.as_deref() == Some(table.name.as_str()) && o.id.schema == table.schema
        })
    }

    /// Same identities and equal attributes under each kind's table.
    /// Snapshot id, capture time and checksum are not compared.
    pub fn structurally_equals(&self, other: &Snapshot) -> bool {
        self.objects.len() == other.objects.len()
            && self.objects.iter().all(|(id, object)| {
                other
                    .objects
                    .get(id)
                    .is_some_and(|o| object.structurally_equals(o))
            })
    }

    /// Schemas referenced by any object
    pub fn schemas(&self) -> BTreeSet<&str> {
        self.objects.keys().map(|id| id.schema.as_str()).collect()
    }

    /// Build the successor of this snapshot with the given object set
    pub(crate) fn successor(&self, objects: BTreeMap<ObjectId, StructuralObject>) -> Self {
        let checksum = Self::compute_checksum(objects.values());
        Self {
            id: Uuid::new_v4(),
            backend: self.backend,
            captured_at: Utc::now(),
            objects,
            checksum,
        }
    }

    pub(crate) fn object_map(&self) -> &BTreeMap<ObjectId, StructuralObject> {
        &self.objects
    }
}

/// Serialized form of a snapshot
///
/// Hand-written documents may omit the id, time and checksum. A checksum
/// that is present must match the content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDocument {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub backend: Backend,
    #[serde(default = "Utc::now")]
    pub captured_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default)]
    pub objects: Vec<StructuralObject>,
}

impl TryFrom<SnapshotDocument> for Snapshot {
    type Error = EngineError;

    fn try_from(doc: SnapshotDocument) -> Result<Self, Self::Error> {
        let snapshot = Snapshot::assemble(doc.id, doc.backend, doc.captured_at, doc.objects)?;
        if let Some(declared) = doc.checksum {
            if declared != snapshot.checksum {
                return Err(EngineError::ChecksumMismatch {
                    snapshot: doc.id.to_string(),
                    declared,
                    computed: snapshot.checksum,
                });
            }
        }
        Ok(snapshot)
    }
}

impl From<Snapshot> for SnapshotDocument {
    fn from(snapshot: Snapshot) -> Self {
        SnapshotDocument {
            id: snapshot.id,
            backend: snapshot.backend,
            captured_at: snapshot.captured_at,
            checksum: Some(snapshot.checksum),
            objects: snapshot.objects.into_values().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::attr;
    use pretty_assertions::assert_eq;

    fn users_table() -> Vec<StructuralObject> {
        vec![
            StructuralObject::new(ObjectId::top_level(ObjectKind::Table, "public", "users")),
            StructuralObject::new(ObjectId::contained(ObjectKind::Column, "public", "users", "id"))
                .with(attr::DATA_TYPE, "integer")
                .with(attr::NULLABLE, false),
        ]
    }

    #[test]
    fn test_duplicate_identity_rejected() {
        let mut objects = users_table();
        objects.push(objects[0].clone());
        assert!(matches!(
            Snapshot::new(Backend::Postgres, objects),
            Err(EngineError::DuplicateObject(_))
        ));
    }

    #[test]
    fn test_checksum_independent_of_input_order() {
        let a = Snapshot::new(Backend::Postgres, users_table()).unwrap();
        let b = Snapshot::new(Backend::Postgres, users_table().into_iter().rev()).unwrap();
        assert_eq!(a.checksum(), b.checksum());
        assert_ne!(a.id(), b.id());
        assert!(a.structurally_equals(&b));
    }

    #[test]
    fn test_document_round_trip_sorted() {
        let snapshot = Snapshot::new(Backend::Sqlite, users_table().into_iter().rev()).unwrap();
        let json = serde_json::to_string(&snapshot).unwrap();
        let doc: SnapshotDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(doc.objects[0].kind(), ObjectKind::Table);
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.checksum(), snapshot.checksum());
        assert_eq!(back.id(), snapshot.id());
    }

    #[test]
    fn test_tampered_document_rejected() {
        let snapshot = Snapshot::new(Backend::Postgres, users_table()).unwrap();
        let mut doc = SnapshotDocument::from(snapshot);
        doc.objects.pop();
        let json = serde_json::to_string(&doc).unwrap();
        assert!(serde_json::from_str::<Snapshot>(&json).is_err());

        let declared = doc.checksum.clone().unwrap();
        match Snapshot::try_from(doc) {
            Err(EngineError::ChecksumMismatch { declared: d, computed, .. }) => {
                assert_eq!(d, declared);
                assert_ne!(computed, declared);
            }
            other => panic!("expected checksum mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_minimal_document_accepted() {
        let json = r#"{"backend":"postgres","objects":[{"id":{"kind":"schema","schema":"app","name":"app"}}]}"#;
        let snapshot: Snapshot = serde_json::from_str(json).unwrap();
        assert!(snapshot.contains(&ObjectId::schema("app")));
    }

    #[test]
    fn test_contained_in_filters_by_table() {
        let snapshot = Snapshot::new(Backend::Postgres, users_table()).unwrap();
        let table = ObjectId::top_level(ObjectKind::Table, "public", "users");
        assert_eq!(snapshot.contained_in(&table).count(), 1);
    }
}
