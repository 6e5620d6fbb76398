//! Snapshot capture
//!
//! Reading live metadata belongs to an external `MetadataSource`; this module
//! only filters what it returns and routes every object through the
//! best-ranked snapshot generator for its kind.

use super::model::Snapshot;
use crate::error::{EngineError, EngineResult};
use crate::model::{Backend, ObjectId, ObjectKind, StructuralObject};
use crate::registry::GeneratorRegistry;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Which objects a capture should include
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KindFilter {
    kinds: Option<BTreeSet<ObjectKind>>,
    schemas: Option<BTreeSet<String>>,
}

impl KindFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn only(kinds: impl IntoIterator<Item = ObjectKind>) -> Self {
        Self {
            kinds: Some(kinds.into_iter().collect()),
            schemas: None,
        }
    }

    pub fn in_schemas(mut self, schemas: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.schemas = Some(schemas.into_iter().map(Into::into).collect());
        self
    }

    pub fn includes_kind(&self, kind: ObjectKind) -> bool {
        self.kinds.as_ref().map_or(true, |k| k.contains(&kind))
    }

    pub fn includes(&self, id: &ObjectId) -> bool {
        self.includes_kind(id.kind)
            && self.schemas.as_ref().map_or(true, |s| s.contains(&id.schema))
    }
}

/// External reader of structural metadata
pub trait MetadataSource {
    fn read_objects(&self, backend: Backend, filter: &KindFilter) -> anyhow::Result<Vec<StructuralObject>>;
}

/// A stored snapshot replays its own objects
impl MetadataSource for Snapshot {
    fn read_objects(&self, _backend: Backend, filter: &KindFilter) -> anyhow::Result<Vec<StructuralObject>> {
        Ok(self
            .objects()
            .filter(|o| filter.includes(&o.id))
            .cloned()
            .collect())
    }
}

/// Capture a snapshot from a metadata source
pub fn capture(
    registry: &GeneratorRegistry,
    source: &dyn MetadataSource,
    backend: Backend,
    filter: &KindFilter,
) -> EngineResult<Snapshot> {
    let raw = source
        .read_objects(backend, filter)
        .map_err(|source| EngineError::Capture { backend, source })?;

    let mut objects = Vec::with_capacity(raw.len());
    for object in raw.into_iter().filter(|o| filter.includes(&o.id)) {
        let id = object.id.clone();
        let generator = registry
            .resolve_snapshot(id.kind, backend)
            .map_err(|e| e.for_object(&id))?;
        debug!("Normalizing {} with '{}'", id, generator.id());
        let normalized = generator.snapshot(object, backend).map_err(|e| e.for_object(&id))?;
        if normalized.id != id {
            return Err(EngineError::GenerationFailed {
                object: id,
                reason: format!("snapshot generator '{}' changed the object identity", generator.id()),
            });
        }
        objects.push(normalized);
    }

    let snapshot = Snapshot::new(backend, objects)?;
    info!(
        "Captured {} snapshot with {} objects (checksum {})",
        backend,
        snapshot.len(),
        &snapshot.checksum()[..12]
    );
    Ok(snapshot)
}
