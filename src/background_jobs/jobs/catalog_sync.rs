//! Monthly catalog import job.
//!
//! Imports the four dumps of one period in dependency order (labels, artists,
//! masters, releases) and records the run lifecycle in the import run store.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError},
};
use crate::dump::EntityKind;
use crate::import_runs::{BeginRun, ImportRun, ImportRunStatus};
use crate::sync::{CatalogSync, Period, RunStats, SyncError, SyncSettings};
use serde_json::Value as JsonValue;
use std::io::BufRead;
use tracing::{error, info, warn};

/// Result of a run that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// The period had already been imported; nothing was touched.
    AlreadyCompleted { run_id: i64 },
    Completed { run_id: i64, stats: RunStats },
}

impl SyncOutcome {
    pub fn run_id(&self) -> i64 {
        match self {
            SyncOutcome::AlreadyCompleted { run_id } | SyncOutcome::Completed { run_id, .. } => {
                *run_id
            }
        }
    }
}

pub struct CatalogSyncJob {
    settings: SyncSettings,
}

impl CatalogSyncJob {
    pub fn new(settings: SyncSettings) -> Self {
        Self { settings }
    }

    /// Import `period`.
    ///
    /// A completed period is a no-op. Any error after the run was started
    /// moves it to `Failed` with the error text before being returned; data
    /// committed by earlier batches stays in place.
    pub fn run_period(&self, ctx: &JobContext, period: Period) -> Result<SyncOutcome, SyncError> {
        let run = match ctx.import_runs.begin_run(period)? {
            BeginRun::AlreadyCompleted(run) => {
                info!(period = %period, run_id = run.id, "Period already imported, skipping");
                return Ok(SyncOutcome::AlreadyCompleted { run_id: run.id });
            }
            BeginRun::Started(run) => run,
        };
        info!(period = %period, run_id = run.id, "Starting catalog import");

        let mut stats = RunStats::default();
        match self.drive(ctx, &run, &mut stats) {
            Ok(()) => {
                ctx.import_runs
                    .transition(run.id, ImportRunStatus::Completed, None)?;
                info!(
                    period = %period,
                    run_id = run.id,
                    stats = %stats.to_json(),
                    "Catalog import completed"
                );
                Ok(SyncOutcome::Completed {
                    run_id: run.id,
                    stats,
                })
            }
            Err(err) => {
                let message = err.to_string();
                if let Err(e) = ctx.import_runs.record_stats(run.id, &stats.to_json()) {
                    warn!(run_id = run.id, "Failed to record partial stats: {}", e);
                }
                if let Err(e) =
                    ctx.import_runs
                        .transition(run.id, ImportRunStatus::Failed, Some(&message))
                {
                    error!(run_id = run.id, "Failed to mark import run failed: {}", e);
                }
                if matches!(err, SyncError::Cancelled) {
                    info!(period = %period, run_id = run.id, "Catalog import cancelled");
                } else {
                    error!(period = %period, run_id = run.id, "Catalog import failed: {}", message);
                }
                Err(err)
            }
        }
    }

    fn drive(&self, ctx: &JobContext, run: &ImportRun, stats: &mut RunStats) -> Result<(), SyncError> {
        let runs = &ctx.import_runs;

        runs.transition(run.id, ImportRunStatus::Downloading, None)?;
        let mut streams: Vec<(EntityKind, Box<dyn BufRead + Send>)> = Vec::new();
        for kind in EntityKind::IMPORT_ORDER {
            if ctx.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let stream = ctx
                .dump_source
                .open(run.period, kind)
                .map_err(|error| SyncError::Source { kind, error })?;
            streams.push((kind, stream));
        }
        runs.transition(run.id, ImportRunStatus::ReadyForProcessing, None)?;

        runs.transition(run.id, ImportRunStatus::Processing, None)?;
        let sync = CatalogSync::new(&ctx.catalog_store, &self.settings, &ctx.cancellation_token);
        for (kind, stream) in streams {
            sync.sync_kind(kind, stream, stats.entity_mut(kind))?;
            runs.record_stats(run.id, &stats.to_json())?;
        }
        Ok(())
    }

    fn resolve_period(ctx: &JobContext, params: Option<&JsonValue>) -> Result<Period, JobError> {
        if let Some(raw) = params.and_then(|p| p.get("period")) {
            let text = raw
                .as_str()
                .ok_or_else(|| JobError::InvalidParams("period must be a string".to_string()))?;
            return text
                .parse()
                .map_err(|e| JobError::InvalidParams(format!("{}", e)));
        }
        ctx.dump_source
            .latest_period()
            .map_err(|e| JobError::ExecutionFailed(format!("{:#}", e)))?
            .ok_or_else(|| JobError::ExecutionFailed("no complete dump set available".to_string()))
    }
}

impl From<SyncError> for JobError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Cancelled => JobError::Cancelled,
            err if err.is_conflict() => JobError::AlreadyRunning(err.to_string()),
            err => JobError::ExecutionFailed(err.to_string()),
        }
    }
}

impl BackgroundJob for CatalogSyncJob {
    fn id(&self) -> &'static str {
        "catalog_sync"
    }

    fn name(&self) -> &'static str {
        "Catalog Sync"
    }

    fn description(&self) -> &'static str {
        "Import the monthly catalog dumps of one period"
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        self.execute_with_params(ctx, None)
    }

    /// Accepts `{"period": "YYYY-MM"}`; defaults to the latest complete dump set.
    fn execute_with_params(&self, ctx: &JobContext, params: Option<JsonValue>) -> Result<(), JobError> {
        let period = Self::resolve_period(ctx, params.as_ref())?;
        self.run_period(ctx, period)?;
        Ok(())
    }
}
