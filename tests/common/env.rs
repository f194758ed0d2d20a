//! Temporary databases and dump directory wired into a job context.

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use vinyl_catalog_sync::{
    CatalogSyncJob, DirectoryDumpSource, DumpSource, JobContext, Period, SqliteCatalogStore,
    SqliteImportRunStore, SyncError, SyncOutcome, SyncSettings,
};

const DB_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestEnv {
    db_dir: TempDir,
    dump_dir: TempDir,
    pub catalog: Arc<SqliteCatalogStore>,
    pub runs: Arc<SqliteImportRunStore>,
    pub settings: SyncSettings,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_settings(SyncSettings {
            batch_size: 2,
            chunk_size: 3,
            ..Default::default()
        })
    }

    pub fn with_settings(settings: SyncSettings) -> Self {
        let db_dir = TempDir::new().unwrap();
        let dump_dir = TempDir::new().unwrap();
        let catalog = Arc::new(
            SqliteCatalogStore::new(db_dir.path().join("catalog.db"), DB_TIMEOUT).unwrap(),
        );
        let runs = Arc::new(
            SqliteImportRunStore::new(db_dir.path().join("sync.db"), DB_TIMEOUT).unwrap(),
        );
        Self {
            db_dir,
            dump_dir,
            catalog,
            runs,
            settings,
        }
    }

    pub fn dump_dir(&self) -> &Path {
        self.dump_dir.path()
    }

    pub fn sync_db_path(&self) -> PathBuf {
        self.db_dir.path().join("sync.db")
    }

    /// Separate connection to the catalog database for raw SQL checks.
    pub fn catalog_conn(&self) -> Connection {
        Connection::open(self.db_dir.path().join("catalog.db")).unwrap()
    }

    /// Another handle on the run database, as a second process would open it.
    pub fn other_run_store(&self) -> SqliteImportRunStore {
        SqliteImportRunStore::new(self.sync_db_path(), DB_TIMEOUT).unwrap()
    }

    pub fn source(&self) -> Arc<dyn DumpSource> {
        Arc::new(DirectoryDumpSource::new(self.dump_dir()).unwrap())
    }

    pub fn context(&self, token: CancellationToken, source: Arc<dyn DumpSource>) -> JobContext {
        JobContext::new(token, self.catalog.clone(), self.runs.clone(), source)
    }

    pub fn run(&self, period: &str) -> Result<SyncOutcome, SyncError> {
        let ctx = self.context(CancellationToken::new(), self.source());
        self.run_with(&ctx, period)
    }

    pub fn run_with(&self, ctx: &JobContext, period: &str) -> Result<SyncOutcome, SyncError> {
        let period: Period = period.parse().unwrap();
        CatalogSyncJob::new(self.settings.clone()).run_period(ctx, period)
    }
}
