//! Error handling module
//!
//! Provides the unified error type for the whole engine. Every fatal variant
//! names the object identity or changeset it concerns.

use crate::changelog::{ChangeSetKey, ValidationReport};
use crate::model::{Backend, ObjectId, ObjectKind};
use crate::registry::Capability;
use thiserror::Error;

/// Engine-wide error type
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("No {capability} generator registered for {kind} on {backend}{}", object_suffix(.object))]
    NoGeneratorFound {
        capability: Capability,
        kind: ObjectKind,
        backend: Backend,
        object: Option<ObjectId>,
    },

    #[error("Generator '{0}' is already registered")]
    DuplicateGenerator(String),

    #[error("Changelog validation failed:\n{0}")]
    Validation(ValidationReport),

    #[error(
        "Changeset {key} was modified after being applied (stored fingerprint: {stored}, current: {current})"
    )]
    TamperedChangeSet {
        key: ChangeSetKey,
        stored: String,
        current: String,
    },

    #[error("Changeset {key} failed while executing `{statement}`: {source}")]
    ExecutionFailure {
        key: ChangeSetKey,
        statement: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Precondition '{precondition}' of changeset {key} failed")]
    PreconditionFailed { key: ChangeSetKey, precondition: String },

    #[error("Change generation failed for {object}: {reason}")]
    GenerationFailed { object: ObjectId, reason: String },

    #[error("Cyclic dependency declared between object kinds: {}", .0.join(", "))]
    CyclicKindDependency(Vec<String>),

    #[error("Invalid {object}: {reason}")]
    InvalidObject { object: ObjectId, reason: String },

    #[error("Snapshot contains {0} more than once")]
    DuplicateObject(ObjectId),

    #[error("Cannot apply change to {object}: {reason}")]
    Simulation { object: ObjectId, reason: String },

    #[error("Changeset {0} is recorded as applied but is not part of the changelog")]
    UnknownChangeSet(ChangeSetKey),

    #[error("Changeset {0} has no reverse actions and cannot be rolled back")]
    Irreversible(ChangeSetKey),

    #[error("Snapshot {snapshot} checksum mismatch (declared {declared}, computed {computed})")]
    ChecksumMismatch {
        snapshot: String,
        declared: String,
        computed: String,
    },

    #[error("Snapshot capture failed on {backend}: {source}")]
    Capture {
        backend: Backend,
        #[source]
        source: anyhow::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<crate::config::ConfigError> for EngineError {
    fn from(err: crate::config::ConfigError) -> Self {
        EngineError::Config(err.to_string())
    }
}

fn object_suffix(object: &Option<ObjectId>) -> String {
    object
        .as_ref()
        .map(|id| format!(" (needed for {id})"))
        .unwrap_or_default()
}

impl EngineError {
    /// Attach the object being processed to an error raised while handling it.
    ///
    /// Errors that already name an object are returned unchanged; anything
    /// else is wrapped into `GenerationFailed` for that object.
    pub fn for_object(self, id: &ObjectId) -> Self {
        match self {
            EngineError::NoGeneratorFound {
                capability,
                kind,
                backend,
                object: None,
            } => EngineError::NoGeneratorFound {
                capability,
                kind,
                backend,
                object: Some(id.clone()),
            },
            e @ (EngineError::NoGeneratorFound { .. }
            | EngineError::GenerationFailed { .. }
            | EngineError::InvalidObject { .. }
            | EngineError::Simulation { .. }) => e,
            other => EngineError::GenerationFailed {
                object: id.clone(),
                reason: other.to_string(),
            },
        }
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Helper function to create an invalid-object error
pub fn invalid_object(object: &ObjectId, reason: impl Into<String>) -> EngineError {
    EngineError::InvalidObject {
        object: object.clone(),
        reason: reason.into(),
    }
}

/// Helper function to create a simulation error
pub fn simulation_error(object: &ObjectId, reason: impl Into<String>) -> EngineError {
    EngineError::Simulation {
        object: object.clone(),
        reason: reason.into(),
    }
}
