//! Lifecycle tracking of import runs, one per dump period.
//!
//! The store is the single concurrency gate of the pipeline: at most one run
//! may be outside a terminal state at any time.

mod models;
mod schema;
mod sqlite_import_run_store;

pub use models::{BeginRun, ImportRun, ImportRunStatus};
pub use schema::SYNC_VERSIONED_SCHEMAS;
pub use sqlite_import_run_store::SqliteImportRunStore;

use crate::sync::Period;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportRunError {
    #[error("Import run {active_id} for {active_period} is still {status}")]
    Conflict {
        active_id: i64,
        active_period: Period,
        status: ImportRunStatus,
    },

    #[error("Import run {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: i64,
        from: ImportRunStatus,
        to: ImportRunStatus,
    },

    #[error("Import run {0} not found")]
    NotFound(i64),

    #[error("A failed import run needs an error message")]
    MissingErrorMessage,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),
}

pub trait ImportRunStore: Send + Sync {
    /// Start a run for `period`.
    ///
    /// Checks for a completed run of the period and for any other
    /// non-terminal run in one transaction. Any non-terminal run, pending
    /// ones of the same period included, is a [`ImportRunError::Conflict`].
    fn begin_run(&self, period: Period) -> Result<BeginRun, ImportRunError>;

    /// Move a run to `next`. Failing requires `error_message`; terminal runs
    /// never change again.
    fn transition(
        &self,
        run_id: i64,
        next: ImportRunStatus,
        error_message: Option<&str>,
    ) -> Result<ImportRun, ImportRunError>;

    /// Attach a statistics summary to a run that is not yet terminal.
    fn record_stats(&self, run_id: i64, stats: &serde_json::Value) -> Result<(), ImportRunError>;

    fn get_run(&self, run_id: i64) -> Result<Option<ImportRun>, ImportRunError>;

    /// Most recent run of `period`, in any state.
    fn latest_run_for_period(&self, period: Period) -> Result<Option<ImportRun>, ImportRunError>;

    /// Most recent runs first.
    fn list_runs(&self, limit: usize) -> Result<Vec<ImportRun>, ImportRunError>;

    /// The run currently outside a terminal state, if any.
    fn active_run(&self) -> Result<Option<ImportRun>, ImportRunError>;

    /// Fail every non-terminal run with `reason`. Used to recover after a
    /// crash left a run behind.
    fn fail_interrupted_runs(&self, reason: &str) -> Result<usize, ImportRunError>;
}
