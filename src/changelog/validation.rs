//! Changelog validation
//!
//! Validation never stops at the first problem: every issue in the changelog
//! is collected and reported together before anything executes.

use super::change::ChangeOp;
use super::changeset::{ChangeLog, ChangeSetKey, ChangeSetRecord};
use crate::model::{Backend, ObjectId};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use validator::Validate;

/// A single validation problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    /// Changeset the issue belongs to, if any
    pub changeset: Option<ChangeSetKey>,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.changeset {
            Some(key) => write!(f, "[{}] {}", key, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Every issue found in a changelog
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub issues: Vec<ValidationError>,
}

impl ValidationReport {
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn push(&mut self, changeset: Option<&ChangeSetKey>, message: impl Into<String>) {
        self.issues.push(ValidationError {
            changeset: changeset.cloned(),
            message: message.into(),
        });
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.issues.extend(other.issues);
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for issue in &self.issues {
            writeln!(f, "  - {issue}")?;
        }
        Ok(())
    }
}

/// Validate an identifier. Every identifier is quoted when rendered, so
/// only names quoting cannot carry are rejected: empty names, names with a
/// NUL character, and names over the backend's length limit.
pub fn validate_identifier(name: &str, backend: Option<Backend>) -> Result<(), String> {
    if name.is_empty() {
        return Err("empty identifier".to_string());
    }
    if name.contains('\0') {
        return Err(format!("invalid identifier {name:?}: contains a NUL character"));
    }
    if let Some(backend) = backend {
        if let Some(max) = backend.max_identifier_len() {
            if backend.identifier_len(name) > max {
                return Err(format!("identifier '{name}' is longer than {max} characters on {backend}"));
            }
        }
    }
    Ok(())
}

fn object_identifiers(id: &ObjectId) -> impl Iterator<Item = &str> {
    std::iter::once(id.schema.as_str())
        .chain(id.relation.as_deref())
        .chain(std::iter::once(id.name.as_str()))
}

fn check_op(
    op: &ChangeOp,
    key: &ChangeSetKey,
    backend: Option<Backend>,
    seen: &mut BTreeSet<String>,
    report: &mut ValidationReport,
) {
    match op {
        ChangeOp::Sql { sql, .. } if sql.trim().is_empty() => {
            report.push(Some(key), "raw SQL change is empty");
        }
        ChangeOp::Comment { text } if text.trim().is_empty() => {
            report.push(Some(key), "comment change is empty");
        }
        _ => {}
    }
    for id in op.affected_ids() {
        for ident in object_identifiers(&id) {
            if let Err(message) = validate_identifier(ident, backend) {
                // One report per bad identifier per changeset
                if seen.insert(message.clone()) {
                    report.push(Some(key), format!("{id}: {message}"));
                }
            }
        }
    }
}

fn collect_messages(errors: &validator::ValidationErrors, out: &mut Vec<String>) {
    use validator::ValidationErrorsKind;

    for (field, kind) in errors.errors() {
        match kind {
            ValidationErrorsKind::Field(list) => {
                out.extend(list.iter().map(|e| match &e.message {
                    Some(message) => message.to_string(),
                    None => format!("{field}: {}", e.code),
                }));
            }
            ValidationErrorsKind::Struct(nested) => collect_messages(nested, out),
            ValidationErrorsKind::List(items) => {
                for nested in items.values() {
                    collect_messages(nested, out);
                }
            }
        }
    }
}

/// Validate a whole changelog, collecting every issue. Identifier length
/// limits apply only when the target backend is known.
pub fn validate_changelog(log: &ChangeLog, backend: Option<Backend>) -> ValidationReport {
    let mut report = ValidationReport::default();
    let mut keys = BTreeSet::new();

    for changeset in log {
        let key = changeset.key();

        if let Err(errors) = ChangeSetRecord::from(changeset).validate() {
            let mut messages = Vec::new();
            collect_messages(&errors, &mut messages);
            // validator reports in hash order
            messages.sort();
            for message in messages {
                report.push(Some(&key), message);
            }
        }

        if !keys.insert(key.clone()) {
            report.push(Some(&key), "duplicate changeset identity");
        }

        let mut seen = BTreeSet::new();
        for change in changeset.changes() {
            check_op(&change.forward, &key, backend, &mut seen, &mut report);
            if let Some(reverse) = &change.reverse {
                check_op(reverse, &key, backend, &mut seen, &mut report);
            }
        }
        for op in changeset.explicit_rollback().unwrap_or_default() {
            check_op(op, &key, backend, &mut seen, &mut report);
        }
    }

    report
}
