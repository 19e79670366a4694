//! Seams to the external collaborators.
//!
//! The engine and the scheduler are generic over these traits. `qc-store`
//! implements all of them on top of libSQL; tests substitute in-memory fakes.
//! Methods return `Send` futures so implementations can be driven from a
//! multi-threaded runtime.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;

use crate::CoreError;
use crate::entities::{ContainerRef, GateEntry, GateSnapshot, Job, Locator, ProjectFile, VisitRow};
use crate::enums::{Dataset, QcState};
use crate::qc::{QcMetadata, QcResult};
use crate::query::{JobQuery, VisitQuery};
use crate::value::FieldMap;

/// Query access to submitted (current) and imported (legacy) visits.
pub trait VisitStore: Send + Sync {
    /// True if the participant has no visits in either dataset.
    fn is_new_participant(
        &self,
        participant: &str,
    ) -> impl Future<Output = Result<bool, CoreError>> + Send;

    /// Rows of one participant/module matching the query. No ordering is
    /// guaranteed.
    fn query(
        &self,
        dataset: Dataset,
        query: &VisitQuery,
    ) -> impl Future<Output = Result<Vec<VisitRow>, CoreError>> + Send;

    /// Full record stored in a visit file, or `None` if the file is gone.
    fn read_visit(
        &self,
        dataset: Dataset,
        locator: &Locator,
    ) -> impl Future<Output = Result<Option<FieldMap>, CoreError>> + Send;
}

/// Persistence for failure-gate entries on participant metadata.
pub trait GateRepository: Send + Sync {
    fn load_gate(
        &self,
        participant: &str,
        module: &str,
    ) -> impl Future<Output = Result<GateSnapshot, CoreError>> + Send;

    /// Write `entry` if the stored revision still equals `expected_revision`.
    /// Returns `false` when another writer got there first.
    fn store_gate(
        &self,
        participant: &str,
        module: &str,
        entry: &GateEntry,
        expected_revision: i64,
    ) -> impl Future<Output = Result<bool, CoreError>> + Send;
}

/// Per-file QC metadata and status tags.
pub trait QcRecorder: Send + Sync {
    /// Replace the stage's QC result on the file.
    fn record_qc(
        &self,
        locator: &Locator,
        stage: &str,
        result: &QcResult,
    ) -> impl Future<Output = Result<(), CoreError>> + Send;

    fn read_qc(
        &self,
        locator: &Locator,
    ) -> impl Future<Output = Result<QcMetadata, CoreError>> + Send;

    /// Tag the file `<stage>-PASS` or `<stage>-FAIL`, dropping the other one.
    fn tag_outcome(
        &self,
        locator: &Locator,
        stage: &str,
        state: QcState,
    ) -> impl Future<Output = Result<(), CoreError>> + Send;
}

/// Files attached to project-level containers.
pub trait ProjectFiles: Send + Sync {
    fn list_files(
        &self,
        container_id: &str,
    ) -> impl Future<Output = Result<Vec<ProjectFile>, CoreError>> + Send;

    fn find_file(
        &self,
        container_id: &str,
        name: &str,
    ) -> impl Future<Output = Result<Option<ProjectFile>, CoreError>> + Send;

    fn remove_tags(
        &self,
        file_id: &str,
        tags: &BTreeSet<String>,
    ) -> impl Future<Output = Result<(), CoreError>> + Send;
}

/// Read access to the job executor.
pub trait JobSource: Send + Sync {
    fn get_job(&self, job_id: &str)
    -> impl Future<Output = Result<Option<Job>, CoreError>> + Send;

    /// Jobs matching the query, oldest first.
    fn find_jobs(
        &self,
        query: &JobQuery,
    ) -> impl Future<Output = Result<Vec<Job>, CoreError>> + Send;
}

/// Starts pipeline stages.
pub trait PipelineTrigger: Send + Sync {
    /// Queue `stage` on `destination` and return the new job id.
    fn trigger(
        &self,
        stage: &str,
        inputs: &BTreeMap<String, String>,
        destination: &ContainerRef,
    ) -> impl Future<Output = Result<String, CoreError>> + Send;
}
