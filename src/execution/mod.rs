//! Execution Module
//!
//! Applying and rolling back changelogs:
//! - Statement executors (the boundary to a live store)
//! - The execution log of applied changesets
//! - Visitors that list, render, execute or simulate changesets
//! - Forward and reverse traversal with tamper detection
//! - Structural simulation of change operations on snapshots

pub mod executor;
pub mod log;
pub mod simulate;
pub mod traversal;
pub mod visitor;

pub use executor::{ScriptExecutor, StatementExecutor};
pub use log::{AppliedRecord, ExecType, ExecutionLog, JsonFileExecutionLog, MemoryExecutionLog};
pub use traversal::{
    ChangeLogTraversal, ChangeSetState, ChangeSetStatus, StatusReport, TamperPolicy, TraversalReport,
    VisitedChangeSet,
};
pub use visitor::{
    ChangeSetVisit, ChangeSetVisitor, Direction, DryRunVisitor, ExecutingVisitor, ListVisitor,
    ListedChangeSet, SnapshotApplyVisitor, VisitOutcome,
};
