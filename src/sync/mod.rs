//! Change detection and the import pipeline built on it.

mod classifier;
pub mod fingerprint;
mod error;
mod period;
mod pipeline;
mod relations;

pub use classifier::{classify, Classification};
pub use error::SyncError;
pub use fingerprint::content_hash;
pub use period::{InvalidPeriod, Period};
pub use pipeline::{
    CatalogSync, EntityStats, RunStats, SyncSettings, DEFAULT_BATCH_SIZE,
    DEFAULT_PROGRESS_INTERVAL,
};
pub use relations::{BatchRelations, SyncEntity};
