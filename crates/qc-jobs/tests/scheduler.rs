//! Run-loop tests against an in-memory project and job executor.
//!
//! Jobs advance one state per fetch (pending, running, completed), so every
//! wait exercises the poller; time is paused and auto-advanced.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use chrono::{Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use qc_config::SchedulerConfig;
use qc_core::CoreError;
use qc_core::entities::{ContainerRef, FileOrigin, Job, OriginKind, ProjectFile};
use qc_core::enums::JobState;
use qc_core::query::JobQuery;
use qc_core::traits::{JobSource, PipelineTrigger, ProjectFiles};
use qc_jobs::scheduler::{INPUT_FILE, VALIDATION_SCHEMA};
use qc_jobs::{PollSettings, SchedulerError, SubmissionObserver, SubmissionScheduler};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct FakeProject {
    files: Mutex<Vec<ProjectFile>>,
    jobs: Mutex<Vec<Job>>,
    /// Uploaded when the first trigger happens.
    late_upload: Mutex<Option<ProjectFile>>,
    /// File tagged again the first time a job is polled.
    retag_on_poll: Mutex<Option<String>>,
    fail_trigger: bool,
}

impl FakeProject {
    fn with_files(files: Vec<ProjectFile>) -> Self {
        Self {
            files: Mutex::new(files),
            ..Self::default()
        }
    }

    fn triggered_inputs(&self) -> Vec<BTreeMap<String, String>> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .map(|j| j.inputs.clone())
            .collect()
    }

    fn tags_of(&self, id: &str) -> BTreeSet<String> {
        self.files
            .lock()
            .unwrap()
            .iter()
            .find(|f| f.id == id)
            .map(|f| f.tags.clone())
            .unwrap_or_default()
    }
}

impl ProjectFiles for FakeProject {
    async fn list_files(&self, container_id: &str) -> Result<Vec<ProjectFile>, CoreError> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.container_id == container_id)
            .cloned()
            .collect())
    }

    async fn find_file(
        &self,
        container_id: &str,
        name: &str,
    ) -> Result<Option<ProjectFile>, CoreError> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .iter()
            .find(|f| f.container_id == container_id && f.name == name)
            .cloned())
    }

    async fn remove_tags(&self, file_id: &str, tags: &BTreeSet<String>) -> Result<(), CoreError> {
        let mut files = self.files.lock().unwrap();
        let file = files
            .iter_mut()
            .find(|f| f.id == file_id)
            .ok_or_else(|| CoreError::not_found("file", file_id))?;
        file.tags.retain(|t| !tags.contains(t));
        Ok(())
    }
}

impl JobSource for FakeProject {
    async fn get_job(&self, job_id: &str) -> Result<Option<Job>, CoreError> {
        if let Some(file_id) = self.retag_on_poll.lock().unwrap().take() {
            let mut files = self.files.lock().unwrap();
            if let Some(file) = files.iter_mut().find(|f| f.id == file_id) {
                file.tags.insert("queued".to_string());
            }
        }
        let mut jobs = self.jobs.lock().unwrap();
        let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) else {
            return Ok(None);
        };
        job.state = match job.state {
            JobState::Pending => JobState::Running,
            _ => JobState::Completed,
        };
        Ok(Some(job.clone()))
    }

    async fn find_jobs(&self, query: &JobQuery) -> Result<Vec<Job>, CoreError> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| query.matches(j))
            .cloned()
            .collect())
    }
}

impl PipelineTrigger for FakeProject {
    async fn trigger(
        &self,
        stage: &str,
        inputs: &BTreeMap<String, String>,
        destination: &ContainerRef,
    ) -> Result<String, CoreError> {
        if self.fail_trigger {
            return Err(CoreError::Backend("executor offline".to_string()));
        }
        if let Some(upload) = self.late_upload.lock().unwrap().take() {
            self.files.lock().unwrap().push(upload);
        }
        let mut jobs = self.jobs.lock().unwrap();
        let id = format!("job-{}", jobs.len() + 1);
        jobs.push(Job {
            id: id.clone(),
            stage: stage.to_string(),
            state: JobState::Pending,
            previous_job_id: None,
            destination: destination.clone(),
            project_id: Some(destination.id().to_string()),
            inputs: inputs.clone(),
            created_at: Utc::now(),
        });
        Ok(id)
    }
}

type Finished = Arc<Mutex<Vec<(String, String, Option<String>)>>>;

#[derive(Default)]
struct RecordingObserver {
    seen: Finished,
}

impl SubmissionObserver for RecordingObserver {
    async fn submission_finished(&self, file: &ProjectFile, module: &str, _job_id: &str) {
        self.seen.lock().unwrap().push((
            file.name.clone(),
            module.to_string(),
            file.uploader().map(str::to_string),
        ));
    }
}

fn file(id: &str, name: &str, minute: i64, queued: bool) -> ProjectFile {
    ProjectFile {
        id: id.to_string(),
        container_id: "proj".to_string(),
        name: name.to_string(),
        tags: if queued {
            BTreeSet::from(["queued".to_string()])
        } else {
            BTreeSet::new()
        },
        modified: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap() + Duration::minutes(minute),
        origin: Some(FileOrigin {
            kind: OriginKind::User,
            id: "coordinator@example.org".to_string(),
        }),
    }
}

fn schemas() -> Vec<ProjectFile> {
    vec![
        file("s-form", "form-schema.json", 0, false),
        file("s-dicom", "dicom-schema.json", 0, false),
    ]
}

fn config() -> SchedulerConfig {
    SchedulerConfig {
        project_id: "proj".to_string(),
        module_order: vec!["form".to_string(), "dicom".to_string()],
        ..SchedulerConfig::default()
    }
}

fn input_files(project: &FakeProject) -> Vec<String> {
    project
        .triggered_inputs()
        .iter()
        .map(|i| i[INPUT_FILE].clone())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn drains_modules_round_robin() {
    let mut files = schemas();
    files.extend([
        file("f2", "site-b-form.csv", 2, true),
        file("f1", "site-a-form.csv", 1, true),
        file("d1", "site-a-dicom.json", 3, true),
    ]);
    let project = FakeProject::with_files(files);
    let config = config();
    let scheduler = SubmissionScheduler::new(
        &project,
        &config,
        PollSettings::default(),
        CancellationToken::new(),
    );

    let report = scheduler.run().await.unwrap();

    assert_eq!(input_files(&project), vec!["f1", "d1", "f2"]);
    assert_eq!(report.triggered.len(), 3);
    assert_eq!(report.scans, 2);
    let inputs = project.triggered_inputs();
    assert_eq!(inputs[0][VALIDATION_SCHEMA], "s-form");
    assert_eq!(inputs[1][VALIDATION_SCHEMA], "s-dicom");
    for id in ["f1", "f2", "d1"] {
        assert!(project.tags_of(id).is_empty(), "{id} still queued");
    }
}

#[tokio::test(start_paused = true)]
async fn notifies_observer_after_pipeline_settles() {
    let mut files = schemas();
    files.push(file("f1", "a-form.csv", 1, true));
    let project = FakeProject::with_files(files);
    let config = config();
    let observer = RecordingObserver::default();
    let seen = Arc::clone(&observer.seen);
    let scheduler = SubmissionScheduler::new(
        &project,
        &config,
        PollSettings::default(),
        CancellationToken::new(),
    )
    .with_observer(observer);

    scheduler.run().await.unwrap();

    assert_eq!(
        seen.lock().unwrap().clone(),
        vec![(
            "a-form.csv".to_string(),
            "form".to_string(),
            Some("coordinator@example.org".to_string())
        )]
    );
    let jobs = project.jobs.lock().unwrap().clone();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].state, JobState::Completed);
}

#[tokio::test(start_paused = true)]
async fn rescans_pick_up_late_uploads() {
    let mut files = schemas();
    files.push(file("f1", "a-form.csv", 1, true));
    let project = FakeProject::with_files(files);
    *project.late_upload.lock().unwrap() = Some(file("f9", "z-dicom.csv", 9, true));
    let config = config();
    let scheduler = SubmissionScheduler::new(
        &project,
        &config,
        PollSettings::default(),
        CancellationToken::new(),
    );

    let report = scheduler.run().await.unwrap();
    assert_eq!(input_files(&project), vec!["f1", "f9"]);
    assert_eq!(report.scans, 3);
}

#[tokio::test(start_paused = true)]
async fn waits_for_downstream_jobs_on_subjects() {
    let mut files = schemas();
    files.push(file("f1", "a-form.csv", 1, true));
    let project = FakeProject::with_files(files);
    project.jobs.lock().unwrap().push(Job {
        id: "job-coordinator".to_string(),
        stage: "form-qc-coordinator".to_string(),
        state: JobState::Pending,
        previous_job_id: None,
        destination: ContainerRef::Subject("subj-in-proj".to_string()),
        project_id: Some("proj".to_string()),
        inputs: BTreeMap::new(),
        created_at: Utc::now(),
    });
    let config = config();
    let scheduler = SubmissionScheduler::new(
        &project,
        &config,
        PollSettings::default(),
        CancellationToken::new(),
    );

    let report = scheduler.run().await.unwrap();

    assert_eq!(report.triggered.len(), 1);
    let jobs = project.jobs.lock().unwrap().clone();
    assert_eq!(jobs[0].id, "job-coordinator");
    assert_eq!(jobs[0].state, JobState::Completed);
}

#[tokio::test(start_paused = true)]
async fn retagged_file_is_submitted_again() {
    let mut files = schemas();
    files.push(file("f1", "a-form.csv", 1, true));
    let project = FakeProject::with_files(files);
    *project.retag_on_poll.lock().unwrap() = Some("f1".to_string());
    let config = config();
    let scheduler = SubmissionScheduler::new(
        &project,
        &config,
        PollSettings::default(),
        CancellationToken::new(),
    );

    let report = scheduler.run().await.unwrap();

    assert_eq!(input_files(&project), vec!["f1", "f1"]);
    assert_eq!(report.scans, 3);
    assert!(project.tags_of("f1").is_empty());
}

#[tokio::test(start_paused = true)]
async fn missing_schema_is_fatal() {
    let project = FakeProject::with_files(vec![file("f1", "a-form.csv", 1, true)]);
    let config = config();
    let scheduler = SubmissionScheduler::new(
        &project,
        &config,
        PollSettings::default(),
        CancellationToken::new(),
    );

    let err = scheduler.run().await.unwrap_err();
    assert!(matches!(err, SchedulerError::MissingSchema { ref module } if module == "form"));
    assert!(project.triggered_inputs().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_trigger_keeps_queue_tags() {
    let mut files = schemas();
    files.push(file("f1", "a-form.csv", 1, true));
    let project = FakeProject {
        fail_trigger: true,
        ..FakeProject::with_files(files)
    };
    let config = config();
    let scheduler = SubmissionScheduler::new(
        &project,
        &config,
        PollSettings::default(),
        CancellationToken::new(),
    );

    let err = scheduler.run().await.unwrap_err();
    assert!(matches!(err, SchedulerError::Trigger { .. }));
    assert_eq!(project.tags_of("f1"), BTreeSet::from(["queued".to_string()]));
}

#[tokio::test(start_paused = true)]
async fn cancelled_before_start() {
    let mut files = schemas();
    files.push(file("f1", "a-form.csv", 1, true));
    let project = FakeProject::with_files(files);
    let config = config();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let scheduler = SubmissionScheduler::new(&project, &config, PollSettings::default(), cancel);

    let err = scheduler.run().await.unwrap_err();
    assert!(err.is_cancelled());
    assert!(project.triggered_inputs().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unconfigured_project_is_rejected() {
    let project = FakeProject::default();
    let config = SchedulerConfig::default();
    let scheduler = SubmissionScheduler::new(
        &project,
        &config,
        PollSettings::default(),
        CancellationToken::new(),
    );
    assert!(matches!(
        scheduler.run().await,
        Err(SchedulerError::NotConfigured(_))
    ));
}
