//! Changelog traversal
//!
//! Selects which changesets a visitor sees, in which direction, and keeps the
//! execution log in step with the visits.
//!
//! Every check that can reject a traversal (validation, tampering,
//! irreversibility, unknown records) runs before the first visit. A failing
//! visit stops the traversal; records written for earlier changesets stay.

use super::log::{AppliedRecord, ExecType, ExecutionLog};
use super::visitor::{ChangeSetVisit, ChangeSetVisitor, VisitOutcome};
use crate::changelog::{validate_changelog, ChangeLog, ChangeSet, ChangeSetKey};
use crate::error::{EngineError, EngineResult};
use crate::model::Backend;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// What to do with an applied changeset whose content changed since
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TamperPolicy {
    /// Refuse the traversal before anything runs
    #[default]
    Halt,
    /// Log and leave the changeset alone
    Warn,
}

impl fmt::Display for TamperPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TamperPolicy::Halt => "halt",
            TamperPolicy::Warn => "warn",
        })
    }
}

impl FromStr for TamperPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "halt" => Ok(TamperPolicy::Halt),
            "warn" => Ok(TamperPolicy::Warn),
            other => Err(format!("unknown tamper policy '{other}'")),
        }
    }
}

/// A visit that happened
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitedChangeSet {
    pub key: ChangeSetKey,
    pub outcome: VisitOutcome,
}

/// Summary of one traversal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraversalReport {
    pub visited: Vec<VisitedChangeSet>,
    /// Already applied with unchanged content
    pub already_applied: usize,
    /// Skipped under `TamperPolicy::Warn`
    pub tampered: Vec<ChangeSetKey>,
}

impl TraversalReport {
    pub fn executed(&self) -> usize {
        self.visited
            .iter()
            .filter(|v| v.outcome == VisitOutcome::Executed)
            .count()
    }
}

/// Where a changeset stands against the execution log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ChangeSetState {
    Pending,
    Applied { order_executed: u64, exec_type: ExecType },
    /// Applied, changed since, and allowed to re-run
    Modified { order_executed: u64 },
    Tampered { stored: String, current: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSetStatus {
    pub key: ChangeSetKey,
    pub description: String,
    #[serde(flatten)]
    pub state: ChangeSetState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub changesets: Vec<ChangeSetStatus>,
    /// Records for changesets the changelog does not contain
    pub unknown: Vec<AppliedRecord>,
}

impl StatusReport {
    pub fn pending(&self) -> impl Iterator<Item = &ChangeSetStatus> {
        self.changesets
            .iter()
            .filter(|s| matches!(s.state, ChangeSetState::Pending | ChangeSetState::Modified { .. }))
    }
}

enum ReversePlan<'a> {
    Visit(ChangeSetVisit<'a>),
    /// Marked as ran: drop the record without visiting
    Forget(ChangeSetKey),
}

/// Drives visitors over a changelog
#[derive(Debug, Clone)]
pub struct ChangeLogTraversal<'a> {
    changelog: &'a ChangeLog,
    tamper_policy: TamperPolicy,
    force: bool,
    steps: Option<usize>,
    backend: Option<Backend>,
}

impl<'a> ChangeLogTraversal<'a> {
    pub fn new(changelog: &'a ChangeLog) -> Self {
        Self {
            changelog,
            tamper_policy: TamperPolicy::default(),
            force: false,
            steps: None,
            backend: None,
        }
    }

    /// Backend the changelog targets; enables its identifier limits
    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn tamper_policy(mut self, policy: TamperPolicy) -> Self {
        self.tamper_policy = policy;
        self
    }

    /// Re-visit changesets that are already applied
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Visit at most `steps` changesets
    pub fn steps(mut self, steps: Option<usize>) -> Self {
        self.steps = steps;
        self
    }

    fn validate(&self) -> EngineResult<()> {
        let report = validate_changelog(self.changelog, self.backend);
        if report.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Validation(report))
        }
    }

    /// Deliver forward changes of every changeset that should run, in
    /// authored order
    pub fn forward(
        &self,
        log: &mut dyn ExecutionLog,
        visitor: &mut dyn ChangeSetVisitor,
    ) -> EngineResult<TraversalReport> {
        self.validate()?;
        let applied: BTreeMap<ChangeSetKey, AppliedRecord> =
            log.records()?.into_iter().map(|r| (r.key(), r)).collect();

        let mut report = TraversalReport::default();
        let mut plan: Vec<(&ChangeSet, bool)> = Vec::new();
        for changeset in self.changelog {
            let key = changeset.key();
            let Some(record) = applied.get(&key) else {
                plan.push((changeset, false));
                continue;
            };
            let current = changeset.fingerprint();
            if record.fingerprint == current {
                if self.force || changeset.is_run_always() {
                    plan.push((changeset, true));
                } else {
                    report.already_applied += 1;
                }
            } else if changeset.is_run_on_change() {
                plan.push((changeset, true));
            } else {
                match self.tamper_policy {
                    TamperPolicy::Halt => {
                        return Err(EngineError::TamperedChangeSet {
                            key,
                            stored: record.fingerprint.clone(),
                            current,
                        })
                    }
                    TamperPolicy::Warn => {
                        warn!("Changeset {} was modified after it was applied; skipping", key);
                        report.tampered.push(key);
                    }
                }
            }
        }
        if let Some(steps) = self.steps {
            plan.truncate(steps);
        }

        info!(
            "Forward traversal: {} to visit, {} already applied",
            plan.len(),
            report.already_applied
        );
        let mut order = log.next_order()?;
        for (changeset, rerun) in plan {
            let visit = ChangeSetVisit::forward(changeset, rerun);
            let outcome = visitor.visit(&visit)?;
            debug!("Changeset {} visited: {:?}", visit.key(), outcome);
            let exec_type = match outcome {
                VisitOutcome::Executed if rerun => Some(ExecType::Rerun),
                VisitOutcome::Executed => Some(ExecType::Executed),
                VisitOutcome::MarkRan => Some(ExecType::MarkRan),
                VisitOutcome::Skipped => None,
            };
            if let (Some(exec_type), true) = (exec_type, visitor.records_execution()) {
                log.record(AppliedRecord {
                    id: changeset.id().to_string(),
                    author: changeset.author().to_string(),
                    fingerprint: changeset.fingerprint(),
                    applied_at: Utc::now(),
                    order_executed: order,
                    exec_type,
                    description: changeset.description(),
                })?;
                order += 1;
            }
            report.visited.push(VisitedChangeSet {
                key: visit.key(),
                outcome,
            });
        }
        Ok(report)
    }

    /// Deliver the reverse actions of the last `count` applied changesets,
    /// most recent first
    pub fn reverse(
        &self,
        count: usize,
        log: &mut dyn ExecutionLog,
        visitor: &mut dyn ChangeSetVisitor,
    ) -> EngineResult<TraversalReport> {
        self.validate()?;
        let mut records = log.records()?;
        records.sort_by(|a, b| b.order_executed.cmp(&a.order_executed));
        records.truncate(count);

        let mut report = TraversalReport::default();
        let mut plan = Vec::new();
        for record in records {
            let key = record.key();
            let changeset = self
                .changelog
                .get(&key)
                .ok_or_else(|| EngineError::UnknownChangeSet(key.clone()))?;
            // Nothing ran forward, so there is nothing to undo
            if record.exec_type == ExecType::MarkRan {
                plan.push(ReversePlan::Forget(key));
                continue;
            }
            let current = changeset.fingerprint();
            if record.fingerprint != current && !changeset.is_run_on_change() {
                match self.tamper_policy {
                    TamperPolicy::Halt => {
                        return Err(EngineError::TamperedChangeSet {
                            key,
                            stored: record.fingerprint,
                            current,
                        })
                    }
                    TamperPolicy::Warn => {
                        warn!("Changeset {} was modified after it was applied; not rolling back", key);
                        report.tampered.push(key);
                        continue;
                    }
                }
            }
            let visit = ChangeSetVisit::reverse(changeset).ok_or(EngineError::Irreversible(key))?;
            plan.push(ReversePlan::Visit(visit));
        }

        info!("Reverse traversal: {} to roll back", plan.len());
        for step in plan {
            let visit = match step {
                ReversePlan::Visit(visit) => visit,
                ReversePlan::Forget(key) => {
                    debug!("Changeset {} was only marked as ran; forgetting it", key);
                    if visitor.records_execution() {
                        log.remove(&key)?;
                    }
                    report.visited.push(VisitedChangeSet {
                        key,
                        outcome: VisitOutcome::MarkRan,
                    });
                    continue;
                }
            };
            let outcome = visitor.visit(&visit)?;
            debug!("Changeset {} rolled back: {:?}", visit.key(), outcome);
            if outcome != VisitOutcome::Skipped && visitor.records_execution() {
                log.remove(&visit.key())?;
            }
            report.visited.push(VisitedChangeSet {
                key: visit.key(),
                outcome,
            });
        }
        Ok(report)
    }

    /// Where every changeset stands, plus records the changelog does not know
    pub fn status(&self, log: &dyn ExecutionLog) -> EngineResult<StatusReport> {
        let mut applied: BTreeMap<ChangeSetKey, AppliedRecord> =
            log.records()?.into_iter().map(|r| (r.key(), r)).collect();

        let changesets = self
            .changelog
            .iter()
            .map(|changeset| {
                let state = match applied.remove(&changeset.key()) {
                    None => ChangeSetState::Pending,
                    Some(record) => {
                        let current = changeset.fingerprint();
                        if record.fingerprint == current {
                            ChangeSetState::Applied {
                                order_executed: record.order_executed,
                                exec_type: record.exec_type,
                            }
                        } else if changeset.is_run_on_change() {
                            ChangeSetState::Modified {
                                order_executed: record.order_executed,
                            }
                        } else {
                            ChangeSetState::Tampered {
                                stored: record.fingerprint,
                                current,
                            }
                        }
                    }
                };
                ChangeSetStatus {
                    key: changeset.key(),
                    description: changeset.description(),
                    state,
                }
            })
            .collect();

        let mut unknown: Vec<AppliedRecord> = applied.into_values().collect();
        unknown.sort_by_key(|r| r.order_executed);
        Ok(StatusReport { changesets, unknown })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changelog::{Change, ChangeOp};
    use crate::execution::{ListVisitor, MemoryExecutionLog};
    use crate::model::SchemaDef;
    use pretty_assertions::assert_eq;

    fn schema_changeset(id: &str, schema: &str) -> ChangeSet {
        ChangeSet::new(id, "dev").with_change(Change::reversible(ChangeOp::CreateSchema(SchemaDef {
            name: schema.into(),
        })))
    }

    fn changelog() -> ChangeLog {
        ChangeLog::from_changesets(vec![
            schema_changeset("1", "a"),
            schema_changeset("2", "b"),
            schema_changeset("3", "c"),
        ])
    }

    struct Recorder(Vec<String>);

    impl ChangeSetVisitor for Recorder {
        fn visit(&mut self, visit: &ChangeSetVisit<'_>) -> EngineResult<VisitOutcome> {
            self.0.push(format!("{:?} {}", visit.direction, visit.key()));
            Ok(VisitOutcome::Executed)
        }
    }

    #[test]
    fn test_forward_is_idempotent() {
        let changelog = changelog();
        let mut log = MemoryExecutionLog::new();
        let traversal = ChangeLogTraversal::new(&changelog);

        let first = traversal.forward(&mut log, &mut Recorder(Vec::new())).unwrap();
        assert_eq!(first.executed(), 3);

        let mut recorder = Recorder(Vec::new());
        let second = traversal.forward(&mut log, &mut recorder).unwrap();
        assert!(recorder.0.is_empty());
        assert_eq!(second.already_applied, 3);
    }

    #[test]
    fn test_steps_and_force() {
        let changelog = changelog();
        let mut log = MemoryExecutionLog::new();
        ChangeLogTraversal::new(&changelog)
            .steps(Some(2))
            .forward(&mut log, &mut Recorder(Vec::new()))
            .unwrap();
        assert_eq!(log.len(), 2);

        let mut recorder = Recorder(Vec::new());
        ChangeLogTraversal::new(&changelog)
            .force(true)
            .forward(&mut log, &mut recorder)
            .unwrap();
        assert_eq!(recorder.0.len(), 3);
        let records = log.records().unwrap();
        assert_eq!(records.iter().filter(|r| r.exec_type == ExecType::Rerun).count(), 2);
        assert_eq!(records.iter().map(|r| r.order_executed).max(), Some(5));
    }

    #[test]
    fn test_reverse_most_recent_first() {
        let changelog = changelog();
        let mut log = MemoryExecutionLog::new();
        let traversal = ChangeLogTraversal::new(&changelog);
        traversal.forward(&mut log, &mut Recorder(Vec::new())).unwrap();

        let mut recorder = Recorder(Vec::new());
        traversal.reverse(2, &mut log, &mut recorder).unwrap();
        assert_eq!(recorder.0, vec!["Reverse 3::dev", "Reverse 2::dev"]);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_listing_records_nothing() {
        let changelog = changelog();
        let mut log = MemoryExecutionLog::new();
        let mut visitor = ListVisitor::new();
        ChangeLogTraversal::new(&changelog)
            .forward(&mut log, &mut visitor)
            .unwrap();
        assert_eq!(visitor.entries().len(), 3);
        assert_eq!(visitor.entries()[0].changes, vec!["Create schema a".to_string()]);
        assert!(log.is_empty());
    }

    #[test]
    fn test_status_reports_unknown_records() {
        let changelog = changelog();
        let mut log = MemoryExecutionLog::new();
        log.record(AppliedRecord {
            id: "99".into(),
            author: "dev".into(),
            fingerprint: "x".into(),
            applied_at: Utc::now(),
            order_executed: 1,
            exec_type: ExecType::Executed,
            description: String::new(),
        })
        .unwrap();
        let status = ChangeLogTraversal::new(&changelog).status(&log).unwrap();
        assert_eq!(status.pending().count(), 3);
        assert_eq!(status.unknown.len(), 1);

        // Rolling back a changeset the changelog lacks is refused up front
        let err = ChangeLogTraversal::new(&changelog)
            .reverse(1, &mut log, &mut Recorder(Vec::new()))
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownChangeSet(_)));
    }

    #[test]
    fn test_tamper_policy_parse() {
        assert_eq!("WARN".parse::<TamperPolicy>().unwrap(), TamperPolicy::Warn);
        assert!("ignore".parse::<TamperPolicy>().is_err());
    }
}
