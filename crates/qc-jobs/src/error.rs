//! Error types for job polling and scheduling.

use qc_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PollError {
    /// The wait was cancelled.
    #[error("Polling cancelled")]
    Cancelled,

    /// The overall deadline passed before the job settled.
    #[error("Timed out waiting for job {job_id}")]
    TimedOut { job_id: String },

    /// A job disappeared from the executor while being polled.
    #[error("Unable to find job: {0}")]
    MissingJob(String),

    /// The job executor could not be queried.
    #[error(transparent)]
    Source(#[from] CoreError),
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No `<module>-schema.json` on the project.
    #[error("Missing validation schema for {module}")]
    MissingSchema { module: String },

    /// Starting the first pipeline stage failed.
    #[error("Failed to trigger {stage} for {file}: {source}")]
    Trigger {
        stage: String,
        file: String,
        #[source]
        source: CoreError,
    },

    /// The scheduler was started without a usable configuration.
    #[error("Scheduler not configured: {0}")]
    NotConfigured(String),

    #[error(transparent)]
    Poll(#[from] PollError),

    #[error(transparent)]
    Source(#[from] CoreError),
}

impl SchedulerError {
    /// True if the run stopped because it was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Poll(PollError::Cancelled))
    }
}
