use super::context::JobContext;
use serde_json::Value as JsonValue;

/// Why a job run did not succeed.
#[derive(Debug)]
pub enum JobError {
    /// Another run holds the pipeline.
    AlreadyRunning(String),
    InvalidParams(String),
    ExecutionFailed(String),
    Cancelled,
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobError::AlreadyRunning(msg) => write!(f, "Another run is active: {}", msg),
            JobError::InvalidParams(msg) => write!(f, "Invalid parameters: {}", msg),
            JobError::ExecutionFailed(msg) => write!(f, "Execution failed: {}", msg),
            JobError::Cancelled => write!(f, "Job cancelled"),
        }
    }
}

impl std::error::Error for JobError {}

/// A unit of work that can be triggered by name.
///
/// Whatever triggers a job (the CLI or a scheduler) only relies on
/// this contract.
pub trait BackgroundJob: Send + Sync {
    /// Stable identifier, used in logs and when triggering by name.
    fn id(&self) -> &'static str;

    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Run once with default parameters, on a blocking thread. Work is
    /// expected to poll `ctx.is_cancelled()` between units and stop early.
    fn execute(&self, ctx: &JobContext) -> Result<(), JobError>;

    /// Run once with caller supplied JSON parameters. Jobs without
    /// parameters keep the default, which ignores them.
    fn execute_with_params(
        &self,
        ctx: &JobContext,
        _params: Option<JsonValue>,
    ) -> Result<(), JobError> {
        self.execute(ctx)
    }
}
