//! Ways of validating a single visit file.
//!
//! [`JobValidation`] hands the file to the QC pipeline stage and reads back
//! what the stage recorded. [`InlineValidation`] loads the rule definitions
//! and runs a [`RuleValidator`] in-process, recording the result itself.

use std::collections::BTreeMap;
use std::future::Future;

use qc_core::entities::{ContainerRef, Locator};
use qc_core::enums::{Dataset, QcState};
use qc_core::qc::{QcResult, ValidationOutcome};
use qc_core::traits::{JobSource, PipelineTrigger, QcRecorder, VisitStore};
use qc_core::FieldMap;
use qc_jobs::{JobPoll, PollError};

use crate::definitions::DefinitionsLoader;
use crate::error::{CoordinatorError, DefinitionError};
use crate::validator::RuleValidator;

/// Trigger input naming the visit file to check.
pub const FORM_DATA_FILE: &str = "form_data_file";

/// What happened when a visit was validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationRun {
    /// Validation ran; its outcome is already recorded on the file.
    Completed(ValidationOutcome),
    /// Validation could not run. Nothing has been recorded.
    SystemFailure(String),
}

pub trait VisitValidation: Send + Sync {
    fn validate_visit(
        &self,
        module: &str,
        locator: &Locator,
    ) -> impl Future<Output = Result<ValidationRun, CoordinatorError>> + Send;
}

/// Validates by triggering the QC stage on the file's acquisition.
pub struct JobValidation<'a, B> {
    backend: &'a B,
    poll: JobPoll<'a, B>,
    stage: String,
}

impl<'a, B> JobValidation<'a, B>
where
    B: PipelineTrigger + JobSource + QcRecorder,
{
    #[must_use]
    pub fn new(backend: &'a B, poll: JobPoll<'a, B>, stage: impl Into<String>) -> Self {
        Self {
            backend,
            poll,
            stage: stage.into(),
        }
    }
}

impl<B> VisitValidation for JobValidation<'_, B>
where
    B: PipelineTrigger + JobSource + QcRecorder,
{
    async fn validate_visit(
        &self,
        module: &str,
        locator: &Locator,
    ) -> Result<ValidationRun, CoordinatorError> {
        let input = locator
            .file_id
            .clone()
            .unwrap_or_else(|| locator.file_name.clone());
        let inputs = BTreeMap::from([(FORM_DATA_FILE.to_string(), input)]);
        let destination = ContainerRef::Acquisition(locator.container_id.clone());

        let job_id = match self.backend.trigger(&self.stage, &inputs, &destination).await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(file = %locator.file_name, error = %e, "failed to trigger validation");
                return Ok(ValidationRun::SystemFailure(format!(
                    "Failed to trigger {} on {}: {e}",
                    self.stage, locator.file_name
                )));
            }
        };
        tracing::info!(file = %locator.file_name, module, job = %job_id, "triggered validation");

        match self.poll.is_complete(&job_id).await {
            Ok(true) => {}
            Ok(false) => {
                return Ok(ValidationRun::SystemFailure(format!(
                    "Validation job {job_id} for {} did not complete",
                    locator.file_name
                )));
            }
            Err(PollError::Cancelled) => return Err(CoordinatorError::Cancelled),
            Err(e) => {
                return Ok(ValidationRun::SystemFailure(format!(
                    "Error waiting for validation job {job_id}: {e}"
                )));
            }
        }

        let qc = self.backend.read_qc(locator).await?;
        let Some(stage) = qc.get(&self.stage) else {
            return Ok(ValidationRun::SystemFailure(format!(
                "No {} QC results recorded on {}",
                self.stage, locator.file_name
            )));
        };
        Ok(ValidationRun::Completed(ValidationOutcome {
            passed: stage.validation.state == QcState::Pass,
            errors: stage.validation.data.clone(),
        }))
    }
}

/// Validates in-process against definitions from the object store.
pub struct InlineValidation<'a, S, V> {
    store: &'a S,
    loader: &'a DefinitionsLoader,
    validator: V,
    stage: String,
}

impl<'a, S, V> InlineValidation<'a, S, V>
where
    S: VisitStore + QcRecorder,
    V: RuleValidator,
{
    #[must_use]
    pub fn new(
        store: &'a S,
        loader: &'a DefinitionsLoader,
        validator: V,
        stage: impl Into<String>,
    ) -> Self {
        Self {
            store,
            loader,
            validator,
            stage: stage.into(),
        }
    }

    /// Load the definitions for `fields` and validate them. Records nothing.
    ///
    /// # Errors
    ///
    /// Returns the `DefinitionError` raised while loading definitions.
    pub async fn validate_fields(
        &self,
        module: &str,
        fields: &FieldMap,
    ) -> Result<ValidationOutcome, DefinitionError> {
        let definitions = self.loader.load_for_record(module, fields).await?;
        Ok(self
            .validator
            .validate(fields, &definitions.rules, definitions.codes.as_ref()))
    }

    /// Write the outcome under this runner's stage and tag the file.
    ///
    /// # Errors
    ///
    /// Returns `CoreError` if the file is unknown to the store.
    pub async fn record(
        &self,
        locator: &Locator,
        outcome: &ValidationOutcome,
    ) -> Result<(), qc_core::CoreError> {
        self.store
            .record_qc(locator, &self.stage, &QcResult::from(outcome))
            .await?;
        self.store
            .tag_outcome(locator, &self.stage, outcome.state())
            .await
    }

    #[must_use]
    pub fn stage(&self) -> &str {
        &self.stage
    }
}

impl<S, V> VisitValidation for InlineValidation<'_, S, V>
where
    S: VisitStore + QcRecorder,
    V: RuleValidator,
{
    async fn validate_visit(
        &self,
        module: &str,
        locator: &Locator,
    ) -> Result<ValidationRun, CoordinatorError> {
        let Some(fields) = self.store.read_visit(Dataset::Current, locator).await? else {
            return Ok(ValidationRun::SystemFailure(format!(
                "Cannot read visit file {}",
                locator.file_name
            )));
        };

        let outcome = match self.validate_fields(module, &fields).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(file = %locator.file_name, error = %e, "cannot load rule definitions");
                return Ok(ValidationRun::SystemFailure(e.to_string()));
            }
        };
        self.record(locator, &outcome).await?;
        tracing::info!(
            file = %locator.file_name,
            module,
            passed = outcome.passed,
            errors = outcome.errors.len(),
            stage = %self.stage,
            "validated visit"
        );
        Ok(ValidationRun::Completed(outcome))
    }
}
