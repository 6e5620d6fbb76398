//! Generator registry
//!
//! Holds the registered snapshot, diff and change generators and resolves
//! the single best-ranked one for an object kind on a backend.

pub mod generator;
#[allow(clippy::module_inception)]
pub mod registry;

pub use generator::{
    rank, rank_generators, Capability, ChangeGenerator, DiffGenerator, Generator,
    RegisteredGenerator, SnapshotGenerator,
};
pub use registry::GeneratorRegistry;
