//! Changeset visitors
//!
//! A traversal hands each selected changeset to a visitor together with the
//! operations to deliver: the forward changes, or the reverse actions when
//! rolling back. What a visit does (list, render, execute, simulate) is up to
//! the visitor.

use super::executor::StatementExecutor;
use crate::changelog::{ChangeOp, ChangeSet, ChangeSetKey, OnFail};
use crate::error::{EngineError, EngineResult};
use crate::model::Backend;
use crate::snapshot::Snapshot;
use crate::statement::{materialize_ops, render_script, Statement};
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Reverse,
}

/// One changeset as presented to a visitor
#[derive(Debug, Clone)]
pub struct ChangeSetVisit<'a> {
    pub changeset: &'a ChangeSet,
    pub direction: Direction,
    /// Operations to deliver, in order
    pub ops: Vec<ChangeOp>,
    /// Already applied with the same content and selected again
    pub rerun: bool,
}

impl<'a> ChangeSetVisit<'a> {
    pub fn forward(changeset: &'a ChangeSet, rerun: bool) -> Self {
        Self {
            changeset,
            direction: Direction::Forward,
            ops: changeset.forward_ops(),
            rerun,
        }
    }

    /// Reverse visit; `None` when the changeset cannot be undone
    pub fn reverse(changeset: &'a ChangeSet) -> Option<Self> {
        Some(Self {
            changeset,
            direction: Direction::Reverse,
            ops: changeset.reverse_ops()?,
            rerun: false,
        })
    }

    pub fn key(&self) -> ChangeSetKey {
        self.changeset.key()
    }
}

/// What became of a visited changeset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitOutcome {
    Executed,
    /// Counted as applied without running
    MarkRan,
    /// Left untouched; stays pending
    Skipped,
}

pub trait ChangeSetVisitor {
    fn visit(&mut self, visit: &ChangeSetVisit<'_>) -> EngineResult<VisitOutcome>;

    /// Whether successful visits update the execution log
    fn records_execution(&self) -> bool {
        true
    }
}

/// A listed changeset
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedChangeSet {
    pub key: ChangeSetKey,
    pub direction: Direction,
    pub description: String,
    pub changes: Vec<String>,
}

/// Collects what a traversal would visit
#[derive(Debug, Default)]
pub struct ListVisitor {
    entries: Vec<ListedChangeSet>,
}

impl ListVisitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[ListedChangeSet] {
        &self.entries
    }
}

impl ChangeSetVisitor for ListVisitor {
    fn visit(&mut self, visit: &ChangeSetVisit<'_>) -> EngineResult<VisitOutcome> {
        self.entries.push(ListedChangeSet {
            key: visit.key(),
            direction: visit.direction,
            description: visit.changeset.description(),
            changes: visit.ops.iter().map(ChangeOp::description).collect(),
        });
        Ok(VisitOutcome::Executed)
    }

    fn records_execution(&self) -> bool {
        false
    }
}

/// Materializes statements without executing or recording anything
#[derive(Debug)]
pub struct DryRunVisitor {
    backend: Backend,
    statements: Vec<Statement>,
}

impl DryRunVisitor {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            statements: Vec::new(),
        }
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn script(&self) -> String {
        render_script(&self.statements)
    }
}

impl ChangeSetVisitor for DryRunVisitor {
    fn visit(&mut self, visit: &ChangeSetVisit<'_>) -> EngineResult<VisitOutcome> {
        let header = match visit.direction {
            Direction::Forward => format!("Changeset {}", visit.key()),
            Direction::Reverse => format!("Rolling back changeset {}", visit.key()),
        };
        self.statements.push(Statement::comment(&header, Vec::new()));
        self.statements.extend(materialize_ops(&visit.ops, self.backend)?);
        Ok(VisitOutcome::Executed)
    }

    fn records_execution(&self) -> bool {
        false
    }
}

/// Checks preconditions, then executes every statement of a changeset
#[derive(Debug)]
pub struct ExecutingVisitor<E: StatementExecutor> {
    executor: E,
    backend: Backend,
}

impl<E: StatementExecutor> ExecutingVisitor<E> {
    pub fn new(executor: E, backend: Backend) -> Self {
        Self { executor, backend }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn into_executor(self) -> E {
        self.executor
    }

    /// `Some(outcome)` when a failed precondition decides the visit
    fn check_preconditions(&mut self, visit: &ChangeSetVisit<'_>) -> EngineResult<Option<VisitOutcome>> {
        let key = visit.key();
        for precondition in visit.changeset.preconditions() {
            let holds = self
                .executor
                .check_precondition(precondition)
                .map_err(|source| EngineError::ExecutionFailure {
                    key: key.clone(),
                    statement: precondition.check.clone(),
                    source,
                })?;
            if holds {
                continue;
            }
            match precondition.on_fail {
                OnFail::Halt => {
                    return Err(EngineError::PreconditionFailed {
                        key,
                        precondition: precondition.name.clone(),
                    })
                }
                OnFail::Skip => {
                    info!("Precondition '{}' failed, skipping changeset {}", precondition.name, key);
                    return Ok(Some(VisitOutcome::Skipped));
                }
                OnFail::MarkRan => {
                    info!("Precondition '{}' failed, marking changeset {} as ran", precondition.name, key);
                    return Ok(Some(VisitOutcome::MarkRan));
                }
                OnFail::Warn => {
                    warn!("Precondition '{}' failed for changeset {}, running anyway", precondition.name, key);
                }
            }
        }
        Ok(None)
    }
}

impl<E: StatementExecutor> ChangeSetVisitor for ExecutingVisitor<E> {
    fn visit(&mut self, visit: &ChangeSetVisit<'_>) -> EngineResult<VisitOutcome> {
        if visit.direction == Direction::Forward {
            if let Some(outcome) = self.check_preconditions(visit)? {
                return Ok(outcome);
            }
        }

        // Materialize everything first so an unsupported operation fails
        // before the first statement runs
        let statements = materialize_ops(&visit.ops, self.backend)?;
        let key = visit.key();
        for statement in &statements {
            debug!("Executing for {}: {}", key, statement.sql);
            self.executor
                .execute(statement)
                .map_err(|source| EngineError::ExecutionFailure {
                    key: key.clone(),
                    statement: statement.sql.clone(),
                    source,
                })?;
        }
        Ok(VisitOutcome::Executed)
    }
}

/// Applies each visit to an in-memory snapshot
#[derive(Debug, Clone)]
pub struct SnapshotApplyVisitor {
    snapshot: Snapshot,
}

impl SnapshotApplyVisitor {
    pub fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn into_snapshot(self) -> Snapshot {
        self.snapshot
    }
}

impl ChangeSetVisitor for SnapshotApplyVisitor {
    fn visit(&mut self, visit: &ChangeSetVisit<'_>) -> EngineResult<VisitOutcome> {
        self.snapshot = self.snapshot.apply(&visit.ops)?;
        Ok(VisitOutcome::Executed)
    }

    fn records_execution(&self) -> bool {
        false
    }
}
