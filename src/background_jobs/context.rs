use crate::catalog_store::SqliteCatalogStore;
use crate::dump::DumpSource;
use crate::import_runs::ImportRunStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared stores and the shutdown signal handed to a running job.
#[derive(Clone)]
pub struct JobContext {
    /// Cancelled on shutdown; jobs stop at the next batch boundary.
    pub cancellation_token: CancellationToken,

    /// The catalog database the dumps are imported into.
    pub catalog_store: Arc<SqliteCatalogStore>,

    /// Import run history and the single-run gate.
    pub import_runs: Arc<dyn ImportRunStore>,

    /// Where dump streams are opened from.
    pub dump_source: Arc<dyn DumpSource>,
}

impl JobContext {
    pub fn new(
        cancellation_token: CancellationToken,
        catalog_store: Arc<SqliteCatalogStore>,
        import_runs: Arc<dyn ImportRunStore>,
        dump_source: Arc<dyn DumpSource>,
    ) -> Self {
        Self {
            cancellation_token,
            catalog_store,
            import_runs,
            dump_source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
