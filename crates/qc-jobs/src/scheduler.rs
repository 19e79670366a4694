//! Submission scheduler run loop.
//!
//! Drains the per-module queues of one project through the submission
//! pipeline, one file at a time. Before each trigger the scheduler waits
//! until no pipeline stage has an active job on the project, then triggers
//! the first stage and waits again. The loop rescans the project after the
//! queues drain and stops once a rescan finds nothing new.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;

use qc_config::SchedulerConfig;
use qc_core::entities::{ContainerRef, ProjectFile};
use qc_core::query::JobQuery;
use qc_core::traits::{JobSource, PipelineTrigger, ProjectFiles};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{PollError, SchedulerError};
use crate::poll::{JobPoll, PollSettings};
use crate::queue::ModuleQueues;

/// Trigger input naming the submitted file.
pub const INPUT_FILE: &str = "input_file";
/// Trigger input naming the module's validation schema file.
pub const VALIDATION_SCHEMA: &str = "validation_schema";

/// Told about every file once the pipeline has finished with it.
pub trait SubmissionObserver: Send + Sync {
    fn submission_finished(
        &self,
        file: &ProjectFile,
        module: &str,
        job_id: &str,
    ) -> impl Future<Output = ()> + Send;
}

/// Default observer: logs the finished submission and its uploader.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingObserver;

impl SubmissionObserver for LoggingObserver {
    async fn submission_finished(&self, file: &ProjectFile, module: &str, job_id: &str) {
        match file.uploader() {
            Some(user) => tracing::info!(
                file = %file.name,
                module,
                job = job_id,
                uploader = user,
                "submission processed"
            ),
            None => tracing::info!(file = %file.name, module, job = job_id, "submission processed"),
        }
    }
}

/// One triggered file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submission {
    pub file_id: String,
    pub file_name: String,
    pub module: String,
    pub job_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerReport {
    /// Files triggered, in trigger order.
    pub triggered: Vec<Submission>,
    /// Project scans performed, including the final empty one.
    pub scans: usize,
}

pub struct SubmissionScheduler<'a, B, O = LoggingObserver> {
    backend: &'a B,
    config: &'a SchedulerConfig,
    poll: JobPoll<'a, B>,
    observer: O,
}

impl<'a, B> SubmissionScheduler<'a, B, LoggingObserver>
where
    B: ProjectFiles + JobSource + PipelineTrigger,
{
    #[must_use]
    pub const fn new(
        backend: &'a B,
        config: &'a SchedulerConfig,
        settings: PollSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            backend,
            config,
            poll: JobPoll::new(backend, settings, cancel),
            observer: LoggingObserver,
        }
    }
}

impl<'a, B, O> SubmissionScheduler<'a, B, O>
where
    B: ProjectFiles + JobSource + PipelineTrigger,
    O: SubmissionObserver,
{
    #[must_use]
    pub fn with_observer<P: SubmissionObserver>(self, observer: P) -> SubmissionScheduler<'a, B, P> {
        SubmissionScheduler {
            backend: self.backend,
            config: self.config,
            poll: self.poll,
            observer,
        }
    }

    /// Drain the project until a rescan adds no files.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::NotConfigured` for an unusable configuration,
    /// `SchedulerError::MissingSchema` when a module has no schema file,
    /// `SchedulerError::Trigger` when the first stage cannot be started, and
    /// `SchedulerError::Poll` when a wait is cancelled or times out.
    pub async fn run(&self) -> Result<SchedulerReport, SchedulerError> {
        self.config
            .validate()
            .map_err(|e| SchedulerError::NotConfigured(e.to_string()))?;
        let stage = self
            .config
            .first_stage()
            .ok_or_else(|| SchedulerError::NotConfigured("no pipeline stages".to_string()))?;
        let destination = ContainerRef::Project(self.config.project_id.clone());
        let tags: BTreeSet<String> = self.config.queue_tags.iter().cloned().collect();

        let mut queues = ModuleQueues::new(self.config);
        let mut report = SchedulerReport::default();
        loop {
            self.check_cancelled()?;
            let files = self.backend.list_files(&self.config.project_id).await?;
            let added = queues.add_files(files);
            report.scans += 1;
            tracing::info!(
                project = %self.config.project_id,
                added,
                pending = queues.len(),
                "scanned project files"
            );
            if added == 0 {
                break;
            }

            while !queues.is_empty() {
                self.check_cancelled()?;
                let Some((module, queue)) = queues.next_queue() else {
                    break;
                };
                if queue.is_empty() {
                    continue;
                }
                let module = module.to_string();

                self.wait_for_pipeline().await?;
                let Some(file) = queue.pop_front() else {
                    continue;
                };

                let schema_name = format!("{module}-schema.json");
                let schema = self
                    .backend
                    .find_file(&self.config.project_id, &schema_name)
                    .await?
                    .ok_or_else(|| SchedulerError::MissingSchema {
                        module: module.clone(),
                    })?;

                let inputs = BTreeMap::from([
                    (INPUT_FILE.to_string(), file.id.clone()),
                    (VALIDATION_SCHEMA.to_string(), schema.id.clone()),
                ]);
                let job_id = self
                    .backend
                    .trigger(stage, &inputs, &destination)
                    .await
                    .map_err(|source| SchedulerError::Trigger {
                        stage: stage.to_string(),
                        file: file.name.clone(),
                        source,
                    })?;
                tracing::info!(file = %file.name, %module, job = %job_id, "triggered submission");
                self.backend.remove_tags(&file.id, &tags).await?;

                self.wait_for_pipeline().await?;
                self.observer
                    .submission_finished(&file, &module, &job_id)
                    .await;
                report.triggered.push(Submission {
                    file_id: file.id,
                    file_name: file.name,
                    module,
                    job_id,
                });
            }
        }
        Ok(report)
    }

    /// Poll every active pipeline job under the project, on any container,
    /// until none remain.
    async fn wait_for_pipeline(&self) -> Result<(), SchedulerError> {
        let query = JobQuery::new()
            .project(self.config.project_id.clone())
            .stages(self.config.pipeline_stages.iter().cloned())
            .active();
        loop {
            let jobs = self.backend.find_jobs(&query).await?;
            if jobs.is_empty() {
                return Ok(());
            }
            tracing::debug!(active = jobs.len(), %query, "waiting for pipeline");
            for job in jobs {
                self.poll.poll_status(job).await?;
            }
        }
    }

    fn check_cancelled(&self) -> Result<(), SchedulerError> {
        if self.poll.cancel_token().is_cancelled() {
            return Err(PollError::Cancelled.into());
        }
        Ok(())
    }
}
