use crate::dump::{DecodeError, EntityKind};
use crate::import_runs::ImportRunError;
use thiserror::Error;

/// Errors that end an import run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Failed to open {kind} dump: {error:#}")]
    Source {
        kind: EntityKind,
        error: anyhow::Error,
    },

    #[error("Unreadable {kind} dump: {error}")]
    Stream { kind: EntityKind, error: DecodeError },

    #[error("Store error: {0:#}")]
    Store(#[from] anyhow::Error),

    #[error("Import run error: {0}")]
    Run(#[from] ImportRunError),

    #[error("cancelled")]
    Cancelled,
}

impl SyncError {
    /// Another run holds the pipeline; nothing was done.
    pub fn is_conflict(&self) -> bool {
        matches!(self, SyncError::Run(ImportRunError::Conflict { .. }))
    }
}
