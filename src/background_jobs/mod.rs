//! Background job contract and the jobs built on it.
//!
//! Jobs run synchronously on a blocking thread and receive a [`JobContext`]
//! with the stores they work on and a cancellation token.

mod context;
mod job;
pub mod jobs;

pub use context::JobContext;
pub use job::{BackgroundJob, JobError};
