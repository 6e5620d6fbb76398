//! Explicit generator registration table
//!
//! Populated once at process start; extensions are merged in at init time or
//! added and removed with explicit `register` / `unregister` calls.

use super::generator::{
    rank_generators, Capability, ChangeGenerator, DiffGenerator, RegisteredGenerator,
    SnapshotGenerator,
};
use crate::error::{EngineError, EngineResult};
use crate::model::{Backend, ObjectKind};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct GeneratorRegistry {
    generators: BTreeMap<String, RegisteredGenerator>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a generator. Identifiers are unique across capabilities.
    pub fn register(&mut self, generator: RegisteredGenerator) -> EngineResult<()> {
        let id = generator.id().to_string();
        if self.generators.contains_key(&id) {
            return Err(EngineError::DuplicateGenerator(id));
        }
        debug!(
            "Registered {} generator '{}' (priority {})",
            generator.capability(),
            id,
            generator.priority()
        );
        self.generators.insert(id, generator);
        Ok(())
    }

    /// Remove a generator; returns it if it was registered
    pub fn unregister(&mut self, id: &str) -> Option<RegisteredGenerator> {
        let removed = self.generators.remove(id);
        if removed.is_some() {
            debug!("Unregistered generator '{}'", id);
        }
        removed
    }

    /// Merge externally supplied generators.
    ///
    /// Either all are registered or none: a duplicate identifier (against
    /// the table or within the batch) leaves the registry unchanged.
    pub fn merge<I>(&mut self, generators: I) -> EngineResult<()>
    where
        I: IntoIterator<Item = RegisteredGenerator>,
    {
        let mut staged = self.generators.clone();
        for generator in generators {
            let id = generator.id().to_string();
            if staged.contains_key(&id) {
                return Err(EngineError::DuplicateGenerator(id));
            }
            staged.insert(id, generator);
        }
        self.generators = staged;
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.generators.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.generators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }

    /// Every applicable generator for the capability, best first
    pub fn candidates(
        &self,
        capability: Capability,
        kind: ObjectKind,
        backend: Backend,
    ) -> Vec<&RegisteredGenerator> {
        let mut matching: Vec<&RegisteredGenerator> = self
            .generators
            .values()
            .filter(|g| g.capability() == capability && g.applies_to(kind, backend))
            .collect();
        matching.sort_by(|a, b| rank_generators(a, b));
        matching
    }

    /// The single best-ranked generator for the capability
    pub fn resolve(
        &self,
        capability: Capability,
        kind: ObjectKind,
        backend: Backend,
    ) -> EngineResult<&RegisteredGenerator> {
        self.generators
            .values()
            .filter(|g| g.capability() == capability && g.applies_to(kind, backend))
            .min_by(|a, b| rank_generators(a, b))
            .ok_or(EngineError::NoGeneratorFound {
                capability,
                kind,
                backend,
                object: None,
            })
    }

    pub fn resolve_snapshot(
        &self,
        kind: ObjectKind,
        backend: Backend,
    ) -> EngineResult<Arc<dyn SnapshotGenerator>> {
        match self.resolve(Capability::Snapshot, kind, backend)? {
            RegisteredGenerator::Snapshot(g) => Ok(Arc::clone(g)),
            _ => Err(mismatch(Capability::Snapshot, kind, backend)),
        }
    }

    pub fn resolve_diff(&self, kind: ObjectKind, backend: Backend) -> EngineResult<Arc<dyn DiffGenerator>> {
        match self.resolve(Capability::Diff, kind, backend)? {
            RegisteredGenerator::Diff(g) => Ok(Arc::clone(g)),
            _ => Err(mismatch(Capability::Diff, kind, backend)),
        }
    }

    pub fn resolve_change(
        &self,
        kind: ObjectKind,
        backend: Backend,
    ) -> EngineResult<Arc<dyn ChangeGenerator>> {
        match self.resolve(Capability::ChangeGenerate, kind, backend)? {
            RegisteredGenerator::Change(g) => Ok(Arc::clone(g)),
            _ => Err(mismatch(Capability::ChangeGenerate, kind, backend)),
        }
    }
}

/// Builds a table from a static list; a later entry replaces an earlier one
/// with the same identifier
impl FromIterator<RegisteredGenerator> for GeneratorRegistry {
    fn from_iter<I: IntoIterator<Item = RegisteredGenerator>>(iter: I) -> Self {
        Self {
            generators: iter
                .into_iter()
                .map(|g| (g.id().to_string(), g))
                .collect(),
        }
    }
}

// `resolve` filters on capability, so the tag always matches
fn mismatch(capability: Capability, kind: ObjectKind, backend: Backend) -> EngineError {
    EngineError::NoGeneratorFound {
        capability,
        kind,
        backend,
        object: None,
    }
}
