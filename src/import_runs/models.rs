use crate::sync::Period;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Lifecycle of one import run.
///
/// `Pending -> Downloading -> ReadyForProcessing -> Processing -> Completed`,
/// and any non-terminal state may fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportRunStatus {
    Pending,
    Downloading,
    ReadyForProcessing,
    Processing,
    Completed,
    Failed,
}

impl ImportRunStatus {
    pub const NON_TERMINAL: [ImportRunStatus; 4] = [
        ImportRunStatus::Pending,
        ImportRunStatus::Downloading,
        ImportRunStatus::ReadyForProcessing,
        ImportRunStatus::Processing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImportRunStatus::Pending => "pending",
            ImportRunStatus::Downloading => "downloading",
            ImportRunStatus::ReadyForProcessing => "ready_for_processing",
            ImportRunStatus::Processing => "processing",
            ImportRunStatus::Completed => "completed",
            ImportRunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ImportRunStatus::Pending),
            "downloading" => Some(ImportRunStatus::Downloading),
            "ready_for_processing" => Some(ImportRunStatus::ReadyForProcessing),
            "processing" => Some(ImportRunStatus::Processing),
            "completed" => Some(ImportRunStatus::Completed),
            "failed" => Some(ImportRunStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ImportRunStatus::Completed | ImportRunStatus::Failed)
    }

    pub fn can_transition_to(&self, next: ImportRunStatus) -> bool {
        use ImportRunStatus::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Pending, Downloading)
            | (Downloading, ReadyForProcessing)
            | (ReadyForProcessing, Processing)
            | (Processing, Completed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ImportRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportRun {
    pub id: i64,
    pub period: Period,
    pub status: ImportRunStatus,
    /// Set when the run failed.
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Per-entity statistics, JSON.
    pub stats: Option<serde_json::Value>,
}

/// What [`ImportRunStore::begin_run`](super::ImportRunStore::begin_run)
/// decided for a period.
#[derive(Debug, Clone)]
pub enum BeginRun {
    /// A new pending run was created for the caller.
    Started(ImportRun),
    /// The period already has a completed run.
    AlreadyCompleted(ImportRun),
}
