//! Execution log
//!
//! The record of which changesets have been applied, with the fingerprint
//! each had when it ran. Traversal derives all execution state from here.

use crate::changelog::ChangeSetKey;
use crate::error::EngineResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// How a changeset came to be recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecType {
    Executed,
    Rerun,
    /// Recorded without executing (precondition `on_fail = mark_ran`)
    MarkRan,
}

/// One applied changeset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedRecord {
    pub id: String,
    pub author: String,
    pub fingerprint: String,
    pub applied_at: DateTime<Utc>,
    pub order_executed: u64,
    pub exec_type: ExecType,
    #[serde(default)]
    pub description: String,
}

impl AppliedRecord {
    pub fn key(&self) -> ChangeSetKey {
        ChangeSetKey::new(self.id.clone(), self.author.clone())
    }
}

/// Persistent store of applied changesets
pub trait ExecutionLog {
    /// All records, ordered by `order_executed`
    fn records(&self) -> EngineResult<Vec<AppliedRecord>>;

    /// Insert a record, replacing any existing one with the same key
    fn record(&mut self, record: AppliedRecord) -> EngineResult<()>;

    /// Forget a changeset; absent keys are ignored
    fn remove(&mut self, key: &ChangeSetKey) -> EngineResult<()>;

    fn get(&self, key: &ChangeSetKey) -> EngineResult<Option<AppliedRecord>> {
        Ok(self.records()?.into_iter().find(|r| r.key() == *key))
    }

    /// The order number the next execution receives
    fn next_order(&self) -> EngineResult<u64> {
        Ok(self
            .records()?
            .iter()
            .map(|r| r.order_executed)
            .max()
            .map_or(1, |max| max + 1))
    }
}

fn upsert(records: &mut Vec<AppliedRecord>, record: AppliedRecord) {
    let key = record.key();
    records.retain(|r| r.key() != key);
    records.push(record);
    records.sort_by_key(|r| r.order_executed);
}

/// Execution log held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryExecutionLog {
    records: Vec<AppliedRecord>,
}

impl MemoryExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl ExecutionLog for MemoryExecutionLog {
    fn records(&self) -> EngineResult<Vec<AppliedRecord>> {
        Ok(self.records.clone())
    }

    fn record(&mut self, record: AppliedRecord) -> EngineResult<()> {
        upsert(&mut self.records, record);
        Ok(())
    }

    fn remove(&mut self, key: &ChangeSetKey) -> EngineResult<()> {
        self.records.retain(|r| r.key() != *key);
        Ok(())
    }
}

/// Execution log persisted as a JSON array; every update rewrites the file
#[derive(Debug, Clone)]
pub struct JsonFileExecutionLog {
    path: PathBuf,
    records: Vec<AppliedRecord>,
}

impl JsonFileExecutionLog {
    /// Open the log at `path`; a missing file is an empty log
    pub fn open(path: impl Into<PathBuf>) -> EngineResult<Self> {
        let path = path.into();
        let mut records: Vec<AppliedRecord> = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            if contents.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&contents)?
            }
        } else {
            Vec::new()
        };
        records.sort_by_key(|r| r.order_executed);
        debug!("Opened execution log {} with {} records", path.display(), records.len());
        Ok(Self { path, records })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `records` to disk, then adopt them; a failed write leaves the
    /// in-memory view matching the file
    fn commit(&mut self, records: Vec<AppliedRecord>) -> EngineResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&records)?)?;
        fs::rename(&tmp, &self.path)?;
        self.records = records;
        Ok(())
    }
}

impl ExecutionLog for JsonFileExecutionLog {
    fn records(&self) -> EngineResult<Vec<AppliedRecord>> {
        Ok(self.records.clone())
    }

    fn record(&mut self, record: AppliedRecord) -> EngineResult<()> {
        let mut staged = self.records.clone();
        upsert(&mut staged, record);
        self.commit(staged)
    }

    fn remove(&mut self, key: &ChangeSetKey) -> EngineResult<()> {
        let mut staged = self.records.clone();
        staged.retain(|r| r.key() != *key);
        self.commit(staged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn applied(id: &str, order: u64) -> AppliedRecord {
        AppliedRecord {
            id: id.into(),
            author: "dev".into(),
            fingerprint: "abc".into(),
            applied_at: Utc::now(),
            order_executed: order,
            exec_type: ExecType::Executed,
            description: String::new(),
        }
    }

    #[test]
    fn test_record_replaces_same_key() {
        let mut log = MemoryExecutionLog::new();
        log.record(applied("a", 1)).unwrap();
        log.record(applied("b", 2)).unwrap();
        let mut rerun = applied("a", 3);
        rerun.exec_type = ExecType::Rerun;
        log.record(rerun).unwrap();

        let records = log.records().unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(records[1].exec_type, ExecType::Rerun);
        assert_eq!(log.next_order().unwrap(), 4);
    }

    #[test]
    fn test_json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("executed.json");

        let mut log = JsonFileExecutionLog::open(&path).unwrap();
        assert_eq!(log.next_order().unwrap(), 1);
        log.record(applied("a", 1)).unwrap();
        log.record(applied("b", 2)).unwrap();
        log.remove(&ChangeSetKey::new("a", "dev")).unwrap();

        let reopened = JsonFileExecutionLog::open(&path).unwrap();
        let records = reopened.records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key(), ChangeSetKey::new("b", "dev"));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_failed_write_leaves_records_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state");
        let mut log = JsonFileExecutionLog::open(state.join("executed.json")).unwrap();
        log.record(applied("a", 1)).unwrap();

        // The directory turns into a plain file, so the next write fails
        fs::remove_dir_all(&state).unwrap();
        fs::write(&state, "").unwrap();

        assert!(log.record(applied("b", 2)).is_err());
        assert!(log.remove(&ChangeSetKey::new("a", "dev")).is_err());
        let ids: Vec<_> = log.records().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["a".to_string()]);
        assert_eq!(log.next_order().unwrap(), 2);
    }
}
