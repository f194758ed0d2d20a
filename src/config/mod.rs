mod file_config;

pub use file_config::{FileConfig, SyncConfig};

use crate::catalog_store::DEFAULT_CHUNK_SIZE;
use crate::dump::DEFAULT_RELEASE_FORMAT;
use crate::sync::{SyncSettings, DEFAULT_BATCH_SIZE, DEFAULT_PROGRESS_INTERVAL};
use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_DB_OP_TIMEOUT_SECS: u64 = 30;

/// Values taken from the command line. Any of them can be overridden by the
/// TOML file.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub dump_dir: Option<PathBuf>,
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub dump_dir: PathBuf,
    /// SQLite busy timeout, applied to every database operation.
    pub db_op_timeout: Duration,
    pub sync: SyncSettings,
}

impl AppConfig {
    /// Merge the command line with the optional config file. A value set in
    /// the file wins over the same value given on the command line.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| anyhow::anyhow!("db_dir is required (--db-dir or config file)"))?;
        require_dir(&db_dir, "db_dir")?;

        // Dumps live next to the databases unless told otherwise
        let dump_dir = file
            .dump_dir
            .map(PathBuf::from)
            .or_else(|| cli.dump_dir.clone())
            .unwrap_or_else(|| db_dir.clone());
        require_dir(&dump_dir, "dump_dir")?;

        let db_op_timeout = Duration::from_secs(
            file.db_op_timeout_secs
                .unwrap_or(DEFAULT_DB_OP_TIMEOUT_SECS),
        );

        let sync_file = file.sync.unwrap_or_default();
        let sync = SyncSettings {
            batch_size: sync_file
                .batch_size
                .or(cli.batch_size)
                .unwrap_or(DEFAULT_BATCH_SIZE),
            chunk_size: sync_file.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
            release_format: sync_file
                .release_format
                .unwrap_or_else(|| DEFAULT_RELEASE_FORMAT.to_string()),
            progress_interval: sync_file
                .progress_interval
                .unwrap_or(DEFAULT_PROGRESS_INTERVAL),
        };
        if sync.batch_size == 0 || sync.chunk_size == 0 {
            bail!("batch_size and chunk_size must be positive");
        }
        if sync.release_format.trim().is_empty() {
            bail!("release_format must not be empty");
        }

        Ok(Self {
            db_dir,
            dump_dir,
            db_op_timeout,
            sync,
        })
    }

    pub fn catalog_db_path(&self) -> PathBuf {
        self.db_dir.join("catalog.db")
    }

    pub fn sync_db_path(&self) -> PathBuf {
        self.db_dir.join("sync.db")
    }
}

fn require_dir(path: &Path, what: &str) -> Result<()> {
    if !path.exists() {
        bail!("{} {:?} does not exist", what, path);
    }
    if !path.is_dir() {
        bail!("{} {:?} is not a directory", what, path);
    }
    Ok(())
}
