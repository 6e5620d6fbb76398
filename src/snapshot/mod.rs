//! Schema Snapshot Module
//!
//! Detecting what differs between two states of a store.
//! This module provides:
//! - Immutable snapshots (point-in-time captures)
//! - Capture through an external metadata source
//! - The snapshot comparator (missing / unexpected / changed / equal)

pub mod capture;
pub mod diff;
pub mod model;

pub use capture::{capture, KindFilter, MetadataSource};
pub use diff::{
    ChangedEntry, ChangedObject, DiffBucket, DiffReport, DiffResult, DiffSummary, KindCounts,
    SnapshotComparator,
};
pub use model::{Snapshot, SnapshotDocument};
