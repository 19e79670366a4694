//! Single-file validation against the failure gate.

use qc_core::entities::{FailedVisit, Locator, RecordKeys, VisitRecord};
use qc_core::qc::{ValidationOutcome, empty_file_error, previous_visit_failed_error};
use qc_core::traits::{GateRepository, QcRecorder, VisitStore};
use qc_core::FieldMap;

use crate::error::CheckError;
use crate::gate::{FailureGate, decide};
use crate::runner::InlineValidation;
use crate::validator::RuleValidator;

/// Validates one visit file in-process, honouring and updating the gate of
/// its participant/module.
pub struct VisitChecker<'a, S, R, V> {
    inline: &'a InlineValidation<'a, S, V>,
    gate: &'a FailureGate<'a, R>,
    keys: RecordKeys,
}

impl<'a, S, R, V> VisitChecker<'a, S, R, V>
where
    S: VisitStore + QcRecorder,
    R: GateRepository,
    V: RuleValidator,
{
    #[must_use]
    pub const fn new(
        inline: &'a InlineValidation<'a, S, V>,
        gate: &'a FailureGate<'a, R>,
        keys: RecordKeys,
    ) -> Self {
        Self { inline, gate, keys }
    }

    /// Check the visit in `locator` whose raw fields are `fields`.
    ///
    /// Shape problems (empty file, missing participant, module, version or
    /// date) fail the file without touching the gate or the store. A visit
    /// after a recorded failure fails with `failed-previous-visit` and is not
    /// validated. Otherwise the outcome is recorded and the gate updated.
    ///
    /// # Errors
    ///
    /// Returns `CheckError::Gate` when the visit is dated at or before the
    /// recorded failure, `Definitions` when rules cannot be loaded, and
    /// `Store` when the outcome cannot be recorded.
    pub async fn check(
        &self,
        locator: &Locator,
        fields: FieldMap,
    ) -> Result<ValidationOutcome, CheckError> {
        if fields.is_empty() {
            tracing::warn!(file = %locator.file_name, "empty visit file");
            return Ok(ValidationOutcome::fail(vec![empty_file_error()]));
        }
        let record = match VisitRecord::from_fields(fields, &self.keys, None) {
            Ok(record) => record,
            Err(errors) => {
                tracing::warn!(file = %locator.file_name, errors = errors.len(), "malformed visit");
                return Ok(ValidationOutcome::fail(errors));
            }
        };
        let participant = record.participant.as_str();
        let module = record.module.as_str();

        let prior = self.gate.current(participant, module).await?;
        if let Some(failed) = decide(prior.as_ref(), locator, record.visit_date)?.blocking() {
            tracing::info!(
                file = %locator.file_name,
                failed = %failed.file_name,
                "visit blocked by earlier failure"
            );
            let outcome = ValidationOutcome::fail(vec![previous_visit_failed_error(
                &failed.file_name,
                Some(participant),
                record.visit_number.as_ref(),
            )]);
            self.inline.record(locator, &outcome).await?;
            return Ok(outcome);
        }

        let outcome = self.inline.validate_fields(module, &record.fields).await?;
        self.inline.record(locator, &outcome).await?;
        if outcome.passed {
            self.gate
                .clear_if_matches(participant, module, locator)
                .await?;
        } else {
            self.gate
                .mark_failed(participant, module, FailedVisit::new(locator, record.visit_date))
                .await?;
        }
        tracing::info!(
            file = %locator.file_name,
            participant,
            module,
            passed = outcome.passed,
            stage = self.inline.stage(),
            "checked visit"
        );
        Ok(outcome)
    }
}
