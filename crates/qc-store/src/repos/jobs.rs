//! Pipeline job ledger.
//!
//! Triggering a stage records a `pending` job; whatever executes the stage
//! moves it through its states with [`QcDb::set_job_state`]. A retry marks
//! the original `retried` and records a new job pointing back at it.
//!
//! Every job may carry the project its destination belongs to, so waits can
//! cover a whole pipeline whose later stages run on subjects or acquisitions.

use std::collections::BTreeMap;

use chrono::Utc;
use qc_core::CoreError;
use qc_core::entities::{ContainerRef, Job};
use qc_core::enums::JobState;
use qc_core::query::JobQuery;
use qc_core::traits::{JobSource, PipelineTrigger};

use crate::error::DatabaseError;
use crate::helpers::{get_opt_string, parse_datetime, parse_enum, parse_json};
use crate::{PREFIX_JOB, QcDb};

const JOB_COLUMNS: &str = "id, stage, state, previous_job_id, destination_type, destination_id, \
                           inputs, created_at, project_id";

fn row_to_job(row: &libsql::Row) -> Result<Job, DatabaseError> {
    let kind = row.get::<String>(4)?;
    let destination = ContainerRef::from_parts(&kind, row.get::<String>(5)?)
        .ok_or_else(|| DatabaseError::Query(format!("Unknown container type '{kind}'")))?;
    Ok(Job {
        id: row.get::<String>(0)?,
        stage: row.get::<String>(1)?,
        state: parse_enum(&row.get::<String>(2)?)?,
        previous_job_id: get_opt_string(row, 3)?,
        destination,
        project_id: get_opt_string(row, 8)?,
        inputs: parse_json(&row.get::<String>(6)?)?,
        created_at: parse_datetime(&row.get::<String>(7)?)?,
    })
}

impl QcDb {
    /// Record a new pending job under `project_id` and return its id.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the insert fails.
    pub async fn insert_job(
        &self,
        stage: &str,
        inputs: &BTreeMap<String, String>,
        destination: &ContainerRef,
        project_id: Option<&str>,
        previous_job_id: Option<&str>,
    ) -> Result<String, DatabaseError> {
        let id = self.generate_id(PREFIX_JOB).await?;
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO jobs ({JOB_COLUMNS}) \
                     VALUES (?1, ?2, 'pending', ?3, ?4, ?5, ?6, ?7, ?8)"
                ),
                libsql::params![
                    id.as_str(),
                    stage,
                    previous_job_id,
                    destination.kind(),
                    destination.id(),
                    serde_json::to_string(inputs)?,
                    Utc::now().to_rfc3339(),
                    project_id
                ],
            )
            .await?;
        tracing::info!(job = %id, stage, destination = %destination, project = ?project_id, "queued job");
        Ok(id)
    }

    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn job(&self, job_id: &str) -> Result<Option<Job>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                [job_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_job(&row)?)),
            None => Ok(None),
        }
    }

    /// Jobs matching `query`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn jobs_matching(&self, query: &JobQuery) -> Result<Vec<Job>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {JOB_COLUMNS} FROM jobs ORDER BY rowid"),
                (),
            )
            .await?;
        let mut jobs = Vec::new();
        while let Some(row) = rows.next().await? {
            let job = row_to_job(&row)?;
            if query.matches(&job) {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    /// # Errors
    ///
    /// Returns `DatabaseError::NotFound` if the job is unknown.
    pub async fn set_job_state(&self, job_id: &str, state: JobState) -> Result<(), DatabaseError> {
        let changed = self
            .conn()
            .execute(
                "UPDATE jobs SET state = ?1, updated_at = datetime('now') WHERE id = ?2",
                libsql::params![state.as_str(), job_id],
            )
            .await?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                entity: "job",
                id: job_id.to_string(),
            });
        }
        tracing::debug!(job = job_id, %state, "job state changed");
        Ok(())
    }

    /// Mark a job `retried` and queue its replacement. Returns the new id.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::NotFound` if the job is unknown.
    pub async fn retry_job(&self, job_id: &str) -> Result<String, DatabaseError> {
        let job = self.job(job_id).await?.ok_or_else(|| DatabaseError::NotFound {
            entity: "job",
            id: job_id.to_string(),
        })?;
        self.set_job_state(job_id, JobState::Retried).await?;
        self.insert_job(
            &job.stage,
            &job.inputs,
            &job.destination,
            job.project_id.as_deref(),
            Some(job_id),
        )
        .await
    }
}

impl JobSource for QcDb {
    async fn get_job(&self, job_id: &str) -> Result<Option<Job>, CoreError> {
        Ok(self.job(job_id).await?)
    }

    async fn find_jobs(&self, query: &JobQuery) -> Result<Vec<Job>, CoreError> {
        Ok(self.jobs_matching(query).await?)
    }
}

impl PipelineTrigger for QcDb {
    async fn trigger(
        &self,
        stage: &str,
        inputs: &BTreeMap<String, String>,
        destination: &ContainerRef,
    ) -> Result<String, CoreError> {
        let project_id = match destination {
            ContainerRef::Project(id) => Some(id.as_str()),
            _ => None,
        };
        Ok(self
            .insert_job(stage, inputs, destination, project_id, None)
            .await?)
    }
}
