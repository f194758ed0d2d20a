//! Specific background job implementations.

pub mod catalog_sync;

pub use catalog_sync::{CatalogSyncJob, SyncOutcome};
