//! Job completion polling.
//!
//! A job is re-fetched every `interval` while pending or running. A failed
//! job gets one more look after `grace`, since the executor may still mark
//! it retried. A completed job is held for `grace` before returning so that
//! back-to-back triggers leave the executor some room.

use std::time::Duration;

use qc_config::PollConfig;
use qc_core::entities::Job;
use qc_core::enums::JobState;
use qc_core::query::JobQuery;
use qc_core::traits::JobSource;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::PollError;

/// Timing knobs for [`JobPoll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub grace: Duration,
    /// Retried jobs followed before giving up.
    pub max_retries: u32,
    /// Overall bound on one `poll_status` / `is_complete` call.
    pub timeout: Option<Duration>,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from(&PollConfig::default())
    }
}

impl From<&PollConfig> for PollSettings {
    fn from(config: &PollConfig) -> Self {
        Self {
            interval: config.interval(),
            grace: config.grace(),
            max_retries: config.max_retries,
            timeout: config.timeout(),
        }
    }
}

/// Waits for jobs reported by a [`JobSource`].
pub struct JobPoll<'a, S> {
    source: &'a S,
    settings: PollSettings,
    cancel: CancellationToken,
}

impl<'a, S: JobSource> JobPoll<'a, S> {
    #[must_use]
    pub const fn new(source: &'a S, settings: PollSettings, cancel: CancellationToken) -> Self {
        Self {
            source,
            settings,
            cancel,
        }
    }

    #[must_use]
    pub const fn settings(&self) -> &PollSettings {
        &self.settings
    }

    #[must_use]
    pub const fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Wait until `job` leaves the pending/running states and return its
    /// final state.
    ///
    /// # Errors
    ///
    /// Returns `PollError::Cancelled` or `PollError::TimedOut` if the wait is
    /// interrupted, `PollError::MissingJob` if the job disappears, and
    /// `PollError::Source` if the executor cannot be queried.
    pub async fn poll_status(&self, job: Job) -> Result<JobState, PollError> {
        let deadline = self.deadline();
        self.settle(job, deadline).await
    }

    /// [`JobPoll::poll_status`] for a job known only by id.
    ///
    /// # Errors
    ///
    /// Returns `PollError::MissingJob` if no job has this id, otherwise as
    /// [`JobPoll::poll_status`].
    pub async fn poll_status_by_id(&self, job_id: &str) -> Result<JobState, PollError> {
        let job = self
            .source
            .get_job(job_id)
            .await?
            .ok_or_else(|| PollError::MissingJob(job_id.to_string()))?;
        self.poll_status(job).await
    }

    /// True iff the job, or the last of up to `max_retries` retries of it,
    /// completed. An unknown id is not complete.
    ///
    /// # Errors
    ///
    /// Returns `PollError::Cancelled` or `PollError::TimedOut` if the wait is
    /// interrupted and `PollError::Source` if the executor cannot be queried.
    pub async fn is_complete(&self, job_id: &str) -> Result<bool, PollError> {
        let deadline = self.deadline();
        let Some(job) = self.source.get_job(job_id).await? else {
            tracing::error!(job = job_id, "cannot find a job with this id");
            return Ok(false);
        };

        let mut current_id = job.id.clone();
        let mut status = self.settle(job, deadline).await?;
        let mut hops = 0;
        while status == JobState::Retried && hops < self.settings.max_retries {
            let query = JobQuery::new().retry_of(current_id.as_str());
            let Some(next) = self.source.find_jobs(&query).await?.into_iter().next() else {
                tracing::error!(previous_job_id = %current_id, "cannot find the retried job");
                break;
            };
            tracing::info!(previous = %current_id, job = %next.id, "following retried job");
            current_id = next.id.clone();
            hops += 1;
            status = self.settle(next, deadline).await?;
        }
        Ok(status == JobState::Completed)
    }

    async fn settle(&self, mut job: Job, deadline: Option<Instant>) -> Result<JobState, PollError> {
        while job.state.is_active() {
            self.pause(self.settings.interval, deadline, &job.id).await?;
            job = self.reload(&job.id).await?;
        }
        if job.state == JobState::Failed {
            self.pause(self.settings.grace, deadline, &job.id).await?;
            job = self.reload(&job.id).await?;
        }
        if job.state == JobState::Completed {
            self.pause(self.settings.grace, deadline, &job.id).await?;
        }
        tracing::info!(job = %job.id, state = %job.state, "job finished");
        Ok(job.state)
    }

    async fn reload(&self, job_id: &str) -> Result<Job, PollError> {
        self.source
            .get_job(job_id)
            .await?
            .ok_or_else(|| PollError::MissingJob(job_id.to_string()))
    }

    fn deadline(&self) -> Option<Instant> {
        self.settings.timeout.map(|t| Instant::now() + t)
    }

    /// Sleep for `duration`, cut short by cancellation or the deadline.
    async fn pause(
        &self,
        duration: Duration,
        deadline: Option<Instant>,
        job_id: &str,
    ) -> Result<(), PollError> {
        let wake = Instant::now() + duration;
        let (until, hits_deadline) = match deadline {
            Some(deadline) if deadline < wake => (deadline, true),
            _ => (wake, false),
        };
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(PollError::Cancelled),
            () = tokio::time::sleep_until(until) => {
                if hits_deadline {
                    Err(PollError::TimedOut { job_id: job_id.to_string() })
                } else {
                    Ok(())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use qc_core::CoreError;
    use qc_core::entities::ContainerRef;
    use std::collections::{BTreeMap, HashMap, VecDeque};
    use std::sync::Mutex;

    /// Job executor whose jobs walk through scripted states, one per fetch.
    #[derive(Default)]
    struct ScriptedJobs {
        scripts: Mutex<HashMap<String, VecDeque<JobState>>>,
        retries: HashMap<String, String>,
    }

    impl ScriptedJobs {
        fn with(mut self, id: &str, states: &[JobState], retry_of: Option<&str>) -> Self {
            self.scripts
                .get_mut()
                .unwrap()
                .insert(id.to_string(), states.iter().copied().collect());
            if let Some(prev) = retry_of {
                self.retries.insert(prev.to_string(), id.to_string());
            }
            self
        }

        fn job(id: &str, state: JobState) -> Job {
            Job {
                id: id.to_string(),
                stage: "form-qc-checker".to_string(),
                state,
                previous_job_id: None,
                destination: ContainerRef::Acquisition("acq".to_string()),
                project_id: None,
                inputs: BTreeMap::new(),
                created_at: Utc::now(),
            }
        }
    }

    impl JobSource for ScriptedJobs {
        async fn get_job(&self, job_id: &str) -> Result<Option<Job>, CoreError> {
            let mut scripts = self.scripts.lock().unwrap();
            let Some(script) = scripts.get_mut(job_id) else {
                return Ok(None);
            };
            let state = if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script[0]
            };
            Ok(Some(Self::job(job_id, state)))
        }

        async fn find_jobs(&self, query: &JobQuery) -> Result<Vec<Job>, CoreError> {
            let Some(prev) = &query.previous_job_id else {
                return Ok(Vec::new());
            };
            match self.retries.get(prev) {
                Some(id) => Ok(self.get_job(id).await?.into_iter().collect()),
                None => Ok(Vec::new()),
            }
        }
    }

    fn poll(source: &ScriptedJobs) -> JobPoll<'_, ScriptedJobs> {
        JobPoll::new(source, PollSettings::default(), CancellationToken::new())
    }

    #[tokio::test(start_paused = true)]
    async fn pending_running_completed_waits_two_intervals_and_one_grace() {
        use JobState::*;
        let jobs = ScriptedJobs::default().with("j1", &[Pending, Running, Completed], None);
        let start = Instant::now();
        assert!(poll(&jobs).is_complete("j1").await.unwrap());
        assert_eq!(start.elapsed(), Duration::from_secs(65));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_job_is_not_complete() {
        let jobs = ScriptedJobs::default();
        assert!(!poll(&jobs).is_complete("nope").await.unwrap());
        assert!(matches!(
            poll(&jobs).poll_status_by_id("nope").await,
            Err(PollError::MissingJob(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_job_is_rechecked_after_grace() {
        use JobState::*;
        let jobs = ScriptedJobs::default().with("j1", &[Failed, Failed], None);
        let start = Instant::now();
        assert_eq!(poll(&jobs).poll_status_by_id("j1").await.unwrap(), Failed);
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn follows_retried_jobs() {
        use JobState::*;
        let jobs = ScriptedJobs::default()
            .with("j1", &[Running, Failed, Retried], None)
            .with("j2", &[Pending, Completed], Some("j1"));
        assert!(poll(&jobs).is_complete("j1").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn retry_chain_is_bounded() {
        use JobState::*;
        let jobs = ScriptedJobs::default()
            .with("j1", &[Retried], None)
            .with("j2", &[Retried], Some("j1"))
            .with("j3", &[Retried], Some("j2"))
            .with("j4", &[Retried], Some("j3"))
            .with("j5", &[Completed], Some("j4"));
        assert!(!poll(&jobs).is_complete("j1").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_retry_is_not_complete() {
        let jobs = ScriptedJobs::default().with("j1", &[JobState::Retried], None);
        assert!(!poll(&jobs).is_complete("j1").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_wait() {
        let jobs = ScriptedJobs::default().with("j1", &[JobState::Pending], None);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let poll = JobPoll::new(&jobs, PollSettings::default(), cancel);
        assert!(matches!(
            poll.is_complete("j1").await,
            Err(PollError::Cancelled)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_bounds_wait() {
        let jobs = ScriptedJobs::default().with("j1", &[JobState::Running], None);
        let settings = PollSettings {
            timeout: Some(Duration::from_secs(100)),
            ..PollSettings::default()
        };
        let poll = JobPoll::new(&jobs, settings, CancellationToken::new());
        let start = Instant::now();
        assert!(matches!(
            poll.is_complete("j1").await,
            Err(PollError::TimedOut { .. })
        ));
        assert_eq!(start.elapsed(), Duration::from_secs(100));
    }
}
