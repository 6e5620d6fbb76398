//! Changelog Module
//!
//! Changes, changesets and the generation of dependency-ordered changelogs
//! from a snapshot diff:
//! - Concrete change operations with derivable reverse actions
//! - Kind dependency ordering (deterministic topological sort)
//! - Dispatch of diffed objects to change generators
//! - Changeset fingerprints, persistence and validation

pub mod change;
pub mod changeset;
pub mod generate;
pub mod ordering;
pub mod validation;

pub use change::{Change, ChangeAction, ChangeOp, ColumnAspect};
pub use changeset::{
    ChangeLog, ChangeLogDocument, ChangeSet, ChangeSetKey, ChangeSetRecord, OnFail, Precondition,
    FORMAT_VERSION,
};
pub use generate::{ChangeLogGenerator, GenerationContext, GenerationOptions, GroupingPolicy};
pub use ordering::{GenerationMode, KindGraph};
pub use validation::{validate_changelog, validate_identifier, ValidationError, ValidationReport};
