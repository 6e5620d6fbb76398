//! ChangeSets and the changelog document
//!
//! A changeset is an identified, fingerprinted, append-only group of changes
//! applied as a unit. Whether it has been applied is not stored here; that is
//! derived from the execution log.

use super::change::{Change, ChangeOp};
use super::validation::{validate_changelog, ValidationError, ValidationReport};
use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::debug;
use validator::Validate;

/// Current changelog document version
pub const FORMAT_VERSION: u32 = 1;

/// Identity of a changeset: (id, author)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChangeSetKey {
    pub id: String,
    pub author: String,
}

impl ChangeSetKey {
    pub fn new(id: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            author: author.into(),
        }
    }
}

impl fmt::Display for ChangeSetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.id, self.author)
    }
}

/// What to do when a precondition does not hold
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnFail {
    /// Abort the traversal
    #[default]
    Halt,
    /// Leave the changeset pending and continue
    Skip,
    /// Record the changeset as applied without executing it
    MarkRan,
    /// Log and execute anyway
    Warn,
}

/// A free-form check evaluated by the executor before a changeset runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Precondition {
    #[validate(length(min = 1, message = "Precondition name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "Precondition check must not be empty"))]
    pub check: String,
    #[serde(default)]
    pub on_fail: OnFail,
}

impl Precondition {
    pub fn new(name: impl Into<String>, check: impl Into<String>, on_fail: OnFail) -> Self {
        Self {
            name: name.into(),
            check: check.into(),
            on_fail,
        }
    }
}

/// An identified group of changes applied as one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    id: String,
    author: String,
    comment: Option<String>,
    changes: Vec<Change>,
    rollback: Option<Vec<ChangeOp>>,
    preconditions: Vec<Precondition>,
    run_always: bool,
    run_on_change: bool,
}

impl ChangeSet {
    pub fn new(id: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            author: author.into(),
            comment: None,
            changes: Vec::new(),
            rollback: None,
            preconditions: Vec::new(),
            run_always: false,
            run_on_change: false,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_change(mut self, change: Change) -> Self {
        self.changes.push(change);
        self
    }

    /// Explicit rollback, used instead of the per-change reverse actions
    pub fn with_rollback(mut self, ops: Vec<ChangeOp>) -> Self {
        self.rollback = Some(ops);
        self
    }

    pub fn with_precondition(mut self, precondition: Precondition) -> Self {
        self.preconditions.push(precondition);
        self
    }

    /// Execute on every forward traversal, even when already applied
    pub fn run_always(mut self, yes: bool) -> Self {
        self.run_always = yes;
        self
    }

    /// Re-execute when the content changed since it was applied
    pub fn run_on_change(mut self, yes: bool) -> Self {
        self.run_on_change = yes;
        self
    }

    /// Append a change
    pub fn push(&mut self, change: Change) {
        self.changes.push(change);
    }

    pub fn key(&self) -> ChangeSetKey {
        ChangeSetKey::new(self.id.clone(), self.author.clone())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn explicit_rollback(&self) -> Option<&[ChangeOp]> {
        self.rollback.as_deref()
    }

    pub fn preconditions(&self) -> &[Precondition] {
        &self.preconditions
    }

    pub fn is_run_always(&self) -> bool {
        self.run_always
    }

    pub fn is_run_on_change(&self) -> bool {
        self.run_on_change
    }

    /// Forward operations in order
    pub fn forward_ops(&self) -> Vec<ChangeOp> {
        self.changes.iter().map(|c| c.forward.clone()).collect()
    }

    /// Operations that undo this changeset: the explicit rollback if any,
    /// otherwise each change's reverse in reverse order. `None` when some
    /// change has no reverse.
    pub fn reverse_ops(&self) -> Option<Vec<ChangeOp>> {
        if let Some(rollback) = &self.rollback {
            return Some(rollback.clone());
        }
        self.changes.iter().rev().map(|c| c.reverse.clone()).collect()
    }

    pub fn is_reversible(&self) -> bool {
        self.rollback.is_some() || self.changes.iter().all(Change::is_reversible)
    }

    /// Hex SHA-256 over the canonical JSON of the changes and explicit rollback
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        // Plain data with string keys; serialization cannot fail
        hasher.update(serde_json::to_vec(&self.changes).unwrap_or_default());
        if let Some(rollback) = &self.rollback {
            hasher.update(b"\0rollback\0");
            hasher.update(serde_json::to_vec(rollback).unwrap_or_default());
        }
        format!("{:x}", hasher.finalize())
    }

    pub fn description(&self) -> String {
        match (&self.comment, self.changes.as_slice()) {
            (Some(comment), _) => comment.clone(),
            (None, [only]) => only.description(),
            (None, changes) => format!("{} changes", changes.len()),
        }
    }

    pub fn is_destructive(&self) -> bool {
        self.changes.iter().any(Change::is_destructive)
    }
}

/// Ordered changesets in authored order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeLog {
    changesets: Vec<ChangeSet>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_changesets(changesets: Vec<ChangeSet>) -> Self {
        Self { changesets }
    }

    pub fn push(&mut self, changeset: ChangeSet) {
        self.changesets.push(changeset);
    }

    pub fn extend(&mut self, changesets: impl IntoIterator<Item = ChangeSet>) {
        self.changesets.extend(changesets);
    }

    pub fn changesets(&self) -> &[ChangeSet] {
        &self.changesets
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChangeSet> {
        self.changesets.iter()
    }

    pub fn get(&self, key: &ChangeSetKey) -> Option<&ChangeSet> {
        self.changesets
            .iter()
            .find(|cs| cs.id == key.id && cs.author == key.author)
    }

    pub fn len(&self) -> usize {
        self.changesets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changesets.is_empty()
    }

    pub fn to_document(&self) -> ChangeLogDocument {
        ChangeLogDocument {
            format_version: FORMAT_VERSION,
            changesets: self.changesets.iter().map(ChangeSetRecord::from).collect(),
        }
    }

    pub fn to_json(&self) -> EngineResult<String> {
        Ok(serde_json::to_string_pretty(&self.to_document())?)
    }

    /// Parse and validate a changelog document.
    ///
    /// Every issue (invalid records, stale fingerprints, structural
    /// validation) is collected into a single `Validation` error.
    pub fn from_json(json: &str) -> EngineResult<Self> {
        let document: ChangeLogDocument = serde_json::from_str(json)?;
        Self::from_document(document)
    }

    pub fn from_document(document: ChangeLogDocument) -> EngineResult<Self> {
        let mut report = ValidationReport::default();
        if document.format_version > FORMAT_VERSION {
            report.push(
                None,
                format!(
                    "unsupported format version {} (latest is {})",
                    document.format_version, FORMAT_VERSION
                ),
            );
        }

        let mut changesets = Vec::with_capacity(document.changesets.len());
        for record in document.changesets {
            let declared = record.fingerprint.clone();
            let changeset = ChangeSet::from(record);
            if let Some(declared) = declared {
                let current = changeset.fingerprint();
                if declared != current {
                    report.issues.push(ValidationError {
                        changeset: Some(changeset.key()),
                        message: format!(
                            "declared fingerprint {declared} does not match content ({current})"
                        ),
                    });
                }
            }
            changesets.push(changeset);
        }

        let log = ChangeLog { changesets };
        report.merge(validate_changelog(&log, None));
        if !report.is_empty() {
            return Err(EngineError::Validation(report));
        }
        debug!("Loaded changelog with {} changesets", log.len());
        Ok(log)
    }

    pub fn load(path: &Path) -> EngineResult<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Write the document next to the target and rename it into place
    pub fn save(&self, path: &Path) -> EngineResult<()> {
        let json = self.to_json()?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl<'a> IntoIterator for &'a ChangeLog {
    type Item = &'a ChangeSet;
    type IntoIter = std::slice::Iter<'a, ChangeSet>;

    fn into_iter(self) -> Self::IntoIter {
        self.changesets.iter()
    }
}

/// Serialized changelog
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeLogDocument {
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    #[serde(default)]
    pub changesets: Vec<ChangeSetRecord>,
}

fn default_format_version() -> u32 {
    FORMAT_VERSION
}

/// Serialized changeset
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSetRecord {
    #[validate(length(min = 1, max = 255, message = "Changeset id must be between 1 and 255 characters"))]
    pub id: String,
    #[validate(length(min = 1, max = 255, message = "Changeset author must be between 1 and 255 characters"))]
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Always written; optional on input for hand-authored changelogs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub run_always: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub run_on_change: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[validate(nested)]
    pub preconditions: Vec<Precondition>,
    #[validate(length(min = 1, message = "Changeset must contain at least one change"))]
    pub changes: Vec<Change>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<Vec<ChangeOp>>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl From<&ChangeSet> for ChangeSetRecord {
    fn from(cs: &ChangeSet) -> Self {
        ChangeSetRecord {
            id: cs.id.clone(),
            author: cs.author.clone(),
            comment: cs.comment.clone(),
            fingerprint: Some(cs.fingerprint()),
            run_always: cs.run_always,
            run_on_change: cs.run_on_change,
            preconditions: cs.preconditions.clone(),
            changes: cs.changes.clone(),
            rollback: cs.rollback.clone(),
        }
    }
}

impl From<ChangeSetRecord> for ChangeSet {
    fn from(record: ChangeSetRecord) -> Self {
        ChangeSet {
            id: record.id,
            author: record.author,
            comment: record.comment,
            changes: record.changes,
            rollback: record.rollback,
            preconditions: record.preconditions,
            run_always: record.run_always,
            run_on_change: record.run_on_change,
        }
    }
}
