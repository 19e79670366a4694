//! Visit repository: both datasets, QC metadata and outcome tags.

use std::collections::BTreeSet;

use chrono::Utc;
use qc_core::CoreError;
use qc_core::FieldMap;
use qc_core::entities::{Locator, VisitRow};
use qc_core::enums::{Dataset, QcState};
use qc_core::keys;
use qc_core::qc::{QcMetadata, QcResult, StageQc};
use qc_core::query::VisitQuery;
use qc_core::traits::{QcRecorder, VisitStore};

use crate::error::DatabaseError;
use crate::helpers::{get_opt_string, parse_json};
use crate::{PREFIX_VISIT, QcDb};

/// A visit file to be stored.
#[derive(Debug, Clone)]
pub struct NewVisit {
    pub dataset: Dataset,
    pub participant: String,
    pub module: String,
    pub locator: Locator,
    pub session_id: Option<String>,
    pub fields: FieldMap,
}

fn not_found(locator: &Locator) -> DatabaseError {
    DatabaseError::NotFound {
        entity: "visit file",
        id: format!("{}/{}", locator.container_id, locator.file_name),
    }
}

impl QcDb {
    /// Insert a visit file, replacing the fields of an existing file with the
    /// same dataset, acquisition and name. QC metadata and tags are kept.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the insert fails.
    pub async fn upsert_visit(&self, visit: &NewVisit) -> Result<(), DatabaseError> {
        let id = self.generate_id(PREFIX_VISIT).await?;
        let fields = serde_json::to_string(&visit.fields)?;
        self.conn()
            .execute(
                "INSERT INTO visits (id, dataset, participant, module, file_name, file_id,
                                     acquisition_id, session_id, fields)
                 VALUES (?1, ?2, ?3, upper(?4), ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT (dataset, acquisition_id, file_name) DO UPDATE SET
                     participant = excluded.participant,
                     module = excluded.module,
                     file_id = excluded.file_id,
                     session_id = excluded.session_id,
                     fields = excluded.fields,
                     updated_at = datetime('now')",
                libsql::params![
                    id.as_str(),
                    visit.dataset.as_str(),
                    visit.participant.as_str(),
                    visit.module.as_str(),
                    visit.locator.file_name.as_str(),
                    visit.locator.file_id.clone(),
                    visit.locator.container_id.as_str(),
                    visit.session_id.clone(),
                    fields,
                ],
            )
            .await?;
        tracing::debug!(
            participant = %visit.participant,
            module = %visit.module,
            file = %visit.locator.file_name,
            dataset = %visit.dataset,
            "stored visit"
        );
        Ok(())
    }

    /// True if the participant has a visit in any dataset.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn participant_exists(&self, participant: &str) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT 1 FROM visits WHERE participant = ?1 LIMIT 1",
                [participant],
            )
            .await?;
        Ok(rows.next().await?.is_some())
    }

    /// Rows of one participant/module matching `query`, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails or a JSON column is corrupt.
    pub async fn query_visits(
        &self,
        dataset: Dataset,
        query: &VisitQuery,
    ) -> Result<Vec<VisitRow>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT file_name, file_id, acquisition_id, session_id, fields, qc
                 FROM visits
                 WHERE dataset = ?1 AND participant = ?2 AND module = upper(?3)
                 ORDER BY rowid",
                libsql::params![
                    dataset.as_str(),
                    query.participant.as_str(),
                    query.module.as_str()
                ],
            )
            .await?;

        let mut result = Vec::new();
        while let Some(row) = rows.next().await? {
            if let Some(stage) = &query.passed_stage {
                let qc: QcMetadata = parse_json(&row.get::<String>(5)?)?;
                let passed = qc
                    .get(stage)
                    .is_some_and(|s| s.validation.state == QcState::Pass);
                if !passed {
                    continue;
                }
            }
            let visit = VisitRow {
                file_name: row.get::<String>(0)?,
                file_id: get_opt_string(&row, 1)?,
                acquisition_id: row.get::<String>(2)?,
                session_id: get_opt_string(&row, 3)?,
                columns: parse_json(&row.get::<String>(4)?)?,
            };
            if query.matches(&visit) {
                result.push(query.project(visit));
            }
        }
        Ok(result)
    }

    /// Stored fields of one visit file.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn read_visit_fields(
        &self,
        dataset: Dataset,
        locator: &Locator,
    ) -> Result<Option<FieldMap>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT fields FROM visits
                 WHERE dataset = ?1 AND acquisition_id = ?2 AND file_name = ?3",
                libsql::params![
                    dataset.as_str(),
                    locator.container_id.as_str(),
                    locator.file_name.as_str()
                ],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(parse_json(&row.get::<String>(0)?)?)),
            None => Ok(None),
        }
    }

    /// QC metadata of a current-dataset visit file.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::NotFound` if the file is unknown.
    pub async fn qc_metadata(&self, locator: &Locator) -> Result<QcMetadata, DatabaseError> {
        let (qc, _) = self.qc_and_tags(locator).await?;
        Ok(qc)
    }

    /// Tags of a current-dataset visit file.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::NotFound` if the file is unknown.
    pub async fn visit_tags(&self, locator: &Locator) -> Result<BTreeSet<String>, DatabaseError> {
        let (_, tags) = self.qc_and_tags(locator).await?;
        Ok(tags)
    }

    async fn qc_and_tags(
        &self,
        locator: &Locator,
    ) -> Result<(QcMetadata, BTreeSet<String>), DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT qc, tags FROM visits
                 WHERE dataset = 'current' AND acquisition_id = ?1 AND file_name = ?2",
                libsql::params![locator.container_id.as_str(), locator.file_name.as_str()],
            )
            .await?;
        let row = rows.next().await?.ok_or_else(|| not_found(locator))?;
        Ok((
            parse_json(&row.get::<String>(0)?)?,
            parse_json(&row.get::<String>(1)?)?,
        ))
    }

    /// Replace one stage's QC result on a visit file.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::NotFound` if the file is unknown.
    pub async fn write_qc(
        &self,
        locator: &Locator,
        stage: &str,
        result: &QcResult,
    ) -> Result<(), DatabaseError> {
        let mut qc = self.qc_metadata(locator).await?;
        qc.insert(
            stage.to_string(),
            StageQc {
                validation: result.clone(),
            },
        );
        self.conn()
            .execute(
                "UPDATE visits SET qc = ?1, updated_at = ?2
                 WHERE dataset = 'current' AND acquisition_id = ?3 AND file_name = ?4",
                libsql::params![
                    serde_json::to_string(&qc)?,
                    Utc::now().to_rfc3339(),
                    locator.container_id.as_str(),
                    locator.file_name.as_str()
                ],
            )
            .await?;
        tracing::debug!(file = %locator.file_name, stage, state = %result.state, "recorded QC");
        Ok(())
    }

    /// Swap the `<stage>-PASS` / `<stage>-FAIL` tag on a visit file.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::NotFound` if the file is unknown.
    pub async fn set_outcome_tag(
        &self,
        locator: &Locator,
        stage: &str,
        state: QcState,
    ) -> Result<(), DatabaseError> {
        let mut tags = self.visit_tags(locator).await?;
        let pass = format!("{stage}-{}", keys::PASS_TAG_SUFFIX);
        let fail = format!("{stage}-{}", keys::FAIL_TAG_SUFFIX);
        tags.remove(&pass);
        tags.remove(&fail);
        tags.insert(match state {
            QcState::Pass => pass,
            QcState::Fail => fail,
        });
        self.conn()
            .execute(
                "UPDATE visits SET tags = ?1
                 WHERE dataset = 'current' AND acquisition_id = ?2 AND file_name = ?3",
                libsql::params![
                    serde_json::to_string(&tags)?,
                    locator.container_id.as_str(),
                    locator.file_name.as_str()
                ],
            )
            .await?;
        Ok(())
    }
}

impl VisitStore for QcDb {
    async fn is_new_participant(&self, participant: &str) -> Result<bool, CoreError> {
        Ok(!self.participant_exists(participant).await?)
    }

    async fn query(
        &self,
        dataset: Dataset,
        query: &VisitQuery,
    ) -> Result<Vec<VisitRow>, CoreError> {
        Ok(self.query_visits(dataset, query).await?)
    }

    async fn read_visit(
        &self,
        dataset: Dataset,
        locator: &Locator,
    ) -> Result<Option<FieldMap>, CoreError> {
        Ok(self.read_visit_fields(dataset, locator).await?)
    }
}

impl QcRecorder for QcDb {
    async fn record_qc(
        &self,
        locator: &Locator,
        stage: &str,
        result: &QcResult,
    ) -> Result<(), CoreError> {
        Ok(self.write_qc(locator, stage, result).await?)
    }

    async fn read_qc(&self, locator: &Locator) -> Result<QcMetadata, CoreError> {
        Ok(self.qc_metadata(locator).await?)
    }

    async fn tag_outcome(
        &self,
        locator: &Locator,
        stage: &str,
        state: QcState,
    ) -> Result<(), CoreError> {
        Ok(self.set_outcome_tag(locator, stage, state).await?)
    }
}
