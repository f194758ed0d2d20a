use super::models::{BeginRun, ImportRun, ImportRunStatus};
use super::schema::SYNC_VERSIONED_SCHEMAS;
use super::{ImportRunError, ImportRunStore};
use crate::sqlite_persistence::migrate_if_needed;
use crate::sync::Period;
use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{info, warn};

const RUN_COLUMNS: &str =
    "id, period, status, error_message, created_at, updated_at, finished_at, stats";

pub struct SqliteImportRunStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteImportRunStore {
    pub fn new<P: AsRef<Path>>(db_path: P, op_timeout: Duration) -> anyhow::Result<Self> {
        let conn = Connection::open(db_path.as_ref()).context("Failed to open sync database")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn, op_timeout)
    }

    pub fn in_memory() -> anyhow::Result<Self> {
        Self::init(Connection::open_in_memory()?, Duration::from_secs(5))
    }

    fn init(mut conn: Connection, op_timeout: Duration) -> anyhow::Result<Self> {
        conn.busy_timeout(op_timeout)?;
        migrate_if_needed(&mut conn, SYNC_VERSIONED_SCHEMAS, "sync")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, ImportRunError> {
        self.conn
            .lock()
            .map_err(|_| ImportRunError::Store(anyhow!("sync connection mutex poisoned")))
    }

    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339()
    }

    fn parse_datetime(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&value)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    }

    fn row_to_run(row: &rusqlite::Row) -> rusqlite::Result<ImportRun> {
        let period: String = row.get("period")?;
        let period = period
            .parse::<Period>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;

        let status_str: String = row.get("status")?;
        let status = ImportRunStatus::parse(&status_str).unwrap_or_else(|| {
            warn!("Unknown import run status '{}', treating as failed", status_str);
            ImportRunStatus::Failed
        });

        let stats: Option<String> = row.get("stats")?;
        let finished_at: Option<String> = row.get("finished_at")?;

        Ok(ImportRun {
            id: row.get("id")?,
            period,
            status,
            error_message: row.get("error_message")?,
            created_at: Self::parse_datetime(4, row.get("created_at")?)?,
            updated_at: Self::parse_datetime(5, row.get("updated_at")?)?,
            finished_at: finished_at
                .map(|s| Self::parse_datetime(6, s))
                .transpose()?,
            stats: stats.and_then(|s| serde_json::from_str(&s).ok()),
        })
    }

    fn non_terminal_placeholders() -> String {
        ImportRunStatus::NON_TERMINAL
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn query_active(conn: &Connection) -> rusqlite::Result<Option<ImportRun>> {
        conn.query_row(
            &format!(
                "SELECT {} FROM import_runs WHERE status IN ({}) ORDER BY id LIMIT 1",
                RUN_COLUMNS,
                Self::non_terminal_placeholders()
            ),
            [],
            Self::row_to_run,
        )
        .optional()
    }

    fn query_run(conn: &Connection, run_id: i64) -> rusqlite::Result<Option<ImportRun>> {
        conn.query_row(
            &format!("SELECT {} FROM import_runs WHERE id = ?1", RUN_COLUMNS),
            params![run_id],
            Self::row_to_run,
        )
        .optional()
    }
}

impl ImportRunStore for SqliteImportRunStore {
    fn begin_run(&self, period: Period) -> Result<BeginRun, ImportRunError> {
        let mut conn = self.lock()?;
        // IMMEDIATE takes the write lock up front, so the check below and the
        // insert cannot interleave with another process doing the same.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let completed = tx
            .query_row(
                &format!(
                    "SELECT {} FROM import_runs WHERE period = ?1 AND status = ?2
                     ORDER BY id DESC LIMIT 1",
                    RUN_COLUMNS
                ),
                params![period.to_string(), ImportRunStatus::Completed.as_str()],
                Self::row_to_run,
            )
            .optional()?;
        if let Some(run) = completed {
            return Ok(BeginRun::AlreadyCompleted(run));
        }

        // Pending counts too: its creator is about to drive it
        if let Some(active) = Self::query_active(&tx)? {
            return Err(ImportRunError::Conflict {
                active_id: active.id,
                active_period: active.period,
                status: active.status,
            });
        }

        let now = Self::format_datetime(&Utc::now());
        tx.execute(
            "INSERT INTO import_runs (period, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)",
            params![period.to_string(), ImportRunStatus::Pending.as_str(), now],
        )?;
        let run_id = tx.last_insert_rowid();
        let run = Self::query_run(&tx, run_id)?.ok_or(ImportRunError::NotFound(run_id))?;
        tx.commit()?;

        info!(run_id, period = %period, "Created import run");
        Ok(BeginRun::Started(run))
    }

    fn transition(
        &self,
        run_id: i64,
        next: ImportRunStatus,
        error_message: Option<&str>,
    ) -> Result<ImportRun, ImportRunError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let run = Self::query_run(&tx, run_id)?.ok_or(ImportRunError::NotFound(run_id))?;
        if !run.status.can_transition_to(next) {
            return Err(ImportRunError::InvalidTransition {
                id: run_id,
                from: run.status,
                to: next,
            });
        }
        let error_message = match (next, error_message) {
            (ImportRunStatus::Failed, None) => return Err(ImportRunError::MissingErrorMessage),
            (ImportRunStatus::Failed, Some(message)) => Some(message),
            _ => None,
        };

        let now = Self::format_datetime(&Utc::now());
        let finished_at = next.is_terminal().then(|| now.clone());
        tx.execute(
            "UPDATE import_runs SET status = ?1, error_message = ?2, updated_at = ?3, finished_at = ?4
             WHERE id = ?5",
            params![next.as_str(), error_message, now, finished_at, run_id],
        )?;
        let updated = Self::query_run(&tx, run_id)?.ok_or(ImportRunError::NotFound(run_id))?;
        tx.commit()?;

        info!(run_id, from = %run.status, to = %next, "Import run transition");
        Ok(updated)
    }

    fn record_stats(&self, run_id: i64, stats: &serde_json::Value) -> Result<(), ImportRunError> {
        let conn = self.lock()?;
        let run = Self::query_run(&conn, run_id)?.ok_or(ImportRunError::NotFound(run_id))?;
        if run.status.is_terminal() {
            return Err(ImportRunError::InvalidTransition {
                id: run_id,
                from: run.status,
                to: run.status,
            });
        }
        conn.execute(
            "UPDATE import_runs SET stats = ?1, updated_at = ?2 WHERE id = ?3",
            params![
                stats.to_string(),
                Self::format_datetime(&Utc::now()),
                run_id
            ],
        )?;
        Ok(())
    }

    fn get_run(&self, run_id: i64) -> Result<Option<ImportRun>, ImportRunError> {
        let conn = self.lock()?;
        Ok(Self::query_run(&conn, run_id)?)
    }

    fn latest_run_for_period(&self, period: Period) -> Result<Option<ImportRun>, ImportRunError> {
        let conn = self.lock()?;
        let run = conn
            .query_row(
                &format!(
                    "SELECT {} FROM import_runs WHERE period = ?1 ORDER BY id DESC LIMIT 1",
                    RUN_COLUMNS
                ),
                params![period.to_string()],
                Self::row_to_run,
            )
            .optional()?;
        Ok(run)
    }

    fn list_runs(&self, limit: usize) -> Result<Vec<ImportRun>, ImportRunError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM import_runs ORDER BY id DESC LIMIT ?1",
            RUN_COLUMNS
        ))?;
        let runs = stmt
            .query_map(params![limit as i64], Self::row_to_run)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(runs)
    }

    fn active_run(&self) -> Result<Option<ImportRun>, ImportRunError> {
        let conn = self.lock()?;
        Ok(Self::query_active(&conn)?)
    }

    fn fail_interrupted_runs(&self, reason: &str) -> Result<usize, ImportRunError> {
        let conn = self.lock()?;
        let now = Self::format_datetime(&Utc::now());
        let count = conn.execute(
            &format!(
                "UPDATE import_runs SET status = ?1, error_message = ?2, updated_at = ?3, finished_at = ?3
                 WHERE status IN ({})",
                Self::non_terminal_placeholders()
            ),
            params![ImportRunStatus::Failed.as_str(), reason, now],
        )?;
        if count > 0 {
            warn!("Marked {} interrupted import run(s) as failed", count);
        }
        Ok(count)
    }
}
