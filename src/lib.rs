//! Vinyl Catalog Sync Library
//!
//! Imports monthly catalog dumps into a local SQLite catalog, writing only
//! what changed since the previous import.

pub mod background_jobs;
pub mod catalog_store;
pub mod config;
pub mod dump;
pub mod import_runs;
pub mod sqlite_persistence;
pub mod sync;

// Re-export commonly used types for convenience
pub use background_jobs::jobs::{CatalogSyncJob, SyncOutcome};
pub use background_jobs::JobContext;
pub use catalog_store::SqliteCatalogStore;
pub use dump::{DirectoryDumpSource, DumpSource};
pub use import_runs::{ImportRunStore, SqliteImportRunStore};
pub use sync::{Period, SyncError, SyncSettings};
