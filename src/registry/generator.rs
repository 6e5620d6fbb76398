//! Generator capability traits
//!
//! A generator is a stateless strategy for one capability (snapshot
//! normalization, structural comparison or change generation) that declares
//! which object kinds and backends it handles and how strongly it wants them.

use crate::changelog::{Change, GenerationContext};
use crate::error::EngineResult;
use crate::model::{AttributeDelta, Backend, ObjectKind, StructuralObject};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// The closed set of generator capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Snapshot,
    Diff,
    ChangeGenerate,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Capability::Snapshot => "snapshot",
            Capability::Diff => "diff",
            Capability::ChangeGenerate => "change",
        })
    }
}

/// Shared identity and applicability of every generator
pub trait Generator: Send + Sync {
    /// Fully qualified identifier, unique within a registry
    fn id(&self) -> &str;

    /// Higher priority wins resolution
    fn priority(&self) -> i32;

    fn applies_to(&self, kind: ObjectKind, backend: Backend) -> bool;
}

/// Normalizes raw captured objects into their canonical form
pub trait SnapshotGenerator: Generator {
    fn snapshot(&self, object: StructuralObject, backend: Backend) -> EngineResult<StructuralObject>;
}

/// Compares two objects with the same identity
pub trait DiffGenerator: Generator {
    /// Attribute-level differences; empty when structurally equal
    fn compare(&self, reference: &StructuralObject, observed: &StructuralObject) -> Vec<AttributeDelta>;
}

/// Produces changes that move the observed state towards the reference
pub trait ChangeGenerator: Generator {
    /// The object exists in the reference but not in the observed state
    fn fix_missing(&self, object: &StructuralObject, ctx: &GenerationContext<'_>) -> EngineResult<Vec<Change>>;

    /// The object exists in the observed state but not in the reference
    fn fix_unexpected(&self, object: &StructuralObject, ctx: &GenerationContext<'_>) -> EngineResult<Vec<Change>>;

    fn fix_changed(
        &self,
        reference: &StructuralObject,
        observed: &StructuralObject,
        deltas: &[AttributeDelta],
        ctx: &GenerationContext<'_>,
    ) -> EngineResult<Vec<Change>>;
}

/// A registry entry, tagged by capability
#[derive(Clone)]
pub enum RegisteredGenerator {
    Snapshot(Arc<dyn SnapshotGenerator>),
    Diff(Arc<dyn DiffGenerator>),
    Change(Arc<dyn ChangeGenerator>),
}

impl RegisteredGenerator {
    pub fn capability(&self) -> Capability {
        match self {
            RegisteredGenerator::Snapshot(_) => Capability::Snapshot,
            RegisteredGenerator::Diff(_) => Capability::Diff,
            RegisteredGenerator::Change(_) => Capability::ChangeGenerate,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            RegisteredGenerator::Snapshot(g) => g.id(),
            RegisteredGenerator::Diff(g) => g.id(),
            RegisteredGenerator::Change(g) => g.id(),
        }
    }

    pub fn priority(&self) -> i32 {
        match self {
            RegisteredGenerator::Snapshot(g) => g.priority(),
            RegisteredGenerator::Diff(g) => g.priority(),
            RegisteredGenerator::Change(g) => g.priority(),
        }
    }

    pub fn applies_to(&self, kind: ObjectKind, backend: Backend) -> bool {
        match self {
            RegisteredGenerator::Snapshot(g) => g.applies_to(kind, backend),
            RegisteredGenerator::Diff(g) => g.applies_to(kind, backend),
            RegisteredGenerator::Change(g) => g.applies_to(kind, backend),
        }
    }

    pub fn snapshot<G: SnapshotGenerator + 'static>(generator: G) -> Self {
        RegisteredGenerator::Snapshot(Arc::new(generator))
    }

    pub fn diff<G: DiffGenerator + 'static>(generator: G) -> Self {
        RegisteredGenerator::Diff(Arc::new(generator))
    }

    pub fn change<G: ChangeGenerator + 'static>(generator: G) -> Self {
        RegisteredGenerator::Change(Arc::new(generator))
    }
}

impl fmt::Debug for RegisteredGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredGenerator")
            .field("capability", &self.capability())
            .field("id", &self.id())
            .field("priority", &self.priority())
            .finish()
    }
}

/// Resolution order between two candidates.
///
/// `Less` means `a` is preferred. Strictly higher priority wins; equal
/// priorities fall back to the identifier, so distinct ids never compare equal.
pub fn rank(a_priority: i32, a_id: &str, b_priority: i32, b_id: &str) -> Ordering {
    b_priority.cmp(&a_priority).then_with(|| a_id.cmp(b_id))
}

pub fn rank_generators(a: &RegisteredGenerator, b: &RegisteredGenerator) -> Ordering {
    rank(a.priority(), a.id(), b.priority(), b.id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_higher_priority_ranks_first() {
        assert_eq!(rank(10, "z", 1, "a"), Ordering::Less);
        assert_eq!(rank(1, "a", 10, "z"), Ordering::Greater);
    }

    #[test]
    fn test_ties_break_on_id() {
        assert_eq!(rank(5, "alpha", 5, "beta"), Ordering::Less);
        assert_eq!(rank(5, "beta", 5, "alpha"), Ordering::Greater);
        assert_eq!(rank(5, "same", 5, "same"), Ordering::Equal);
    }
}
