//! # qc-jobs
//!
//! Pipeline job plumbing for qcflow:
//!
//! - [`JobPoll`] waits for jobs to settle, following retried jobs.
//! - [`ModuleQueues`] sorts tagged project files into per-module FIFOs and
//!   hands them out round-robin.
//! - [`SubmissionScheduler`] drains those queues through the submission
//!   pipeline one file at a time.
//!
//! Every wait is cancellable through a `CancellationToken` and may be bounded
//! by an overall deadline.

pub mod error;
pub mod poll;
pub mod queue;
pub mod scheduler;

pub use error::{PollError, SchedulerError};
pub use poll::{JobPoll, PollSettings};
pub use queue::ModuleQueues;
pub use scheduler::{
    LoggingObserver, SchedulerReport, Submission, SubmissionObserver, SubmissionScheduler,
};
