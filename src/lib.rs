//! SchemaFlow changelog engine
//!
//! Compares two structural snapshots of a store, turns the differences into
//! dependency-ordered, reversible changesets and drives them forward or back
//! through pluggable visitors.
//!
//! - `model`: object kinds, identities, attributes and typed definitions
//! - `snapshot`: immutable snapshots, capture and the comparator
//! - `registry`: prioritized generator registry
//! - `generators`: the built-in snapshot, diff and change generators
//! - `changelog`: changes, changesets, ordering, dispatch and validation
//! - `statement`: backend-specific statement materialization
//! - `execution`: execution log, visitors, traversal and simulation

pub mod changelog;
pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod generators;
pub mod model;
pub mod registry;
pub mod snapshot;
pub mod statement;

pub use engine::Engine;
pub use error::{EngineError, EngineResult};
