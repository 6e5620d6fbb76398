//! Statement executors
//!
//! The engine never talks to a store directly. An executor receives
//! materialized statements one at a time.

use crate::changelog::Precondition;
use crate::statement::Statement;
use std::io::Write;

/// Runs statements against a store
pub trait StatementExecutor {
    fn execute(&mut self, statement: &Statement) -> anyhow::Result<()>;

    /// Evaluate a precondition check; holds unless the executor knows better
    fn check_precondition(&mut self, _precondition: &Precondition) -> anyhow::Result<bool> {
        Ok(true)
    }
}

/// Writes rendered statements to a script instead of a live store
#[derive(Debug)]
pub struct ScriptExecutor<W: Write> {
    out: W,
    executed: usize,
}

impl<W: Write> ScriptExecutor<W> {
    pub fn new(out: W) -> Self {
        Self { out, executed: 0 }
    }

    /// Number of statements written so far
    pub fn executed(&self) -> usize {
        self.executed
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> StatementExecutor for ScriptExecutor<W> {
    fn execute(&mut self, statement: &Statement) -> anyhow::Result<()> {
        self.out.write_all(statement.render().as_bytes())?;
        self.executed += 1;
        Ok(())
    }
}

impl<E: StatementExecutor + ?Sized> StatementExecutor for &mut E {
    fn execute(&mut self, statement: &Statement) -> anyhow::Result<()> {
        (**self).execute(statement)
    }

    fn check_precondition(&mut self, precondition: &Precondition) -> anyhow::Result<bool> {
        (**self).check_precondition(precondition)
    }
}
