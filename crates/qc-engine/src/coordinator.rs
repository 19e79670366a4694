//! Visit-by-visit validation of one participant/module in date order.
//!
//! The coordinator walks the stored visits from the cutoff date onward. The
//! first visit that fails (or cannot be validated) becomes the gate's failed
//! visit, and every later visit is recorded as blocked without being
//! validated. A visit that passes clears the gate if the gate recorded it.
//!
//! Blocked visits and system errors are recorded under the coordinator's own
//! stage, apart from the validation stage's results.

use chrono::NaiveDate;
use qc_config::{CoordinatorConfig, RecheckPolicy};
use qc_core::dates::format_visit_date;
use qc_core::entities::{FailedVisit, Locator, QueuedVisits, VisitRow};
use qc_core::enums::{Dataset, QcState, SearchOp};
use qc_core::keys;
use qc_core::qc::{QcResult, previous_visit_failed_error, system_error};
use qc_core::query::{FieldFilter, VisitQuery};
use qc_core::traits::{GateRepository, QcRecorder, VisitStore};
use schemars::JsonSchema;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::CoordinatorError;
use crate::gate::{FailureGate, decide};
use crate::runner::{ValidationRun, VisitValidation};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VisitStatus {
    Passed,
    Failed,
    /// Validation could not run; recorded as a system error.
    SystemError,
    /// Not validated because an earlier visit failed.
    Blocked { failed_file: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct VisitReport {
    pub file_name: String,
    pub visit_date: NaiveDate,
    #[serde(flatten)]
    pub status: VisitStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct BatchReport {
    pub participant: String,
    pub module: String,
    /// Every visit considered, in date order.
    pub visits: Vec<VisitReport>,
    /// Gate state after the batch.
    pub gate: Option<FailedVisit>,
}

impl BatchReport {
    /// Visits that were actually validated.
    #[must_use]
    pub fn validated(&self) -> usize {
        self.visits
            .iter()
            .filter(|v| !matches!(v.status, VisitStatus::Blocked { .. }))
            .count()
    }
}

/// A stored visit with its parsed ordering date.
struct DatedRow {
    date: NaiveDate,
    row: VisitRow,
}

pub struct QcCoordinator<'a, S, R, V> {
    store: &'a S,
    gate: &'a FailureGate<'a, R>,
    runner: &'a V,
    config: &'a CoordinatorConfig,
}

impl<'a, S, R, V> QcCoordinator<'a, S, R, V>
where
    S: VisitStore + QcRecorder,
    R: GateRepository,
    V: VisitValidation,
{
    #[must_use]
    pub const fn new(
        store: &'a S,
        gate: &'a FailureGate<'a, R>,
        runner: &'a V,
        config: &'a CoordinatorConfig,
    ) -> Self {
        Self {
            store,
            gate,
            runner,
            config,
        }
    }

    /// Validate the queued visits and every later stored visit in date order.
    ///
    /// # Errors
    ///
    /// Returns `CoordinatorError::EmptyBatch` for an empty batch, `NoVisits`
    /// when nothing is stored from the cutoff onward, `Gate` when a visit is
    /// out of order with the recorded failure (checked before anything is
    /// written), and `Cancelled` when `cancel` fires between visits.
    pub async fn run(
        &self,
        queued: &QueuedVisits,
        cancel: &CancellationToken,
    ) -> Result<BatchReport, CoordinatorError> {
        let participant = queued.participant.as_str();
        let module = queued.module.as_str();
        let Some(earliest) = queued.earliest_date() else {
            return Err(CoordinatorError::EmptyBatch {
                participant: participant.to_string(),
                module: module.to_string(),
            });
        };

        let mut failed = self.gate.current(participant, module).await?;
        let cutoff = self.cutoff(earliest, failed.as_ref());
        let rows = self.visits_from(participant, module, cutoff).await?;
        if rows.is_empty() {
            return Err(CoordinatorError::NoVisits {
                participant: participant.to_string(),
                module: module.to_string(),
                cutoff: cutoff.map_or_else(|| "*".to_string(), format_visit_date),
            });
        }
        tracing::info!(
            participant,
            module,
            queued = queued.visits.len(),
            visits = rows.len(),
            cutoff = ?cutoff,
            "coordinating visits"
        );

        for visit in &queued.visits {
            let locator = Locator {
                file_name: visit.file_name.clone(),
                file_id: visit.file_id.clone(),
                container_id: String::new(),
            };
            decide(failed.as_ref(), &locator, visit.visit_date)?;
        }
        for dated in &rows {
            if !is_before_failure(failed.as_ref(), &dated.row.locator(), dated.date) {
                decide(failed.as_ref(), &dated.row.locator(), dated.date)?;
            }
        }

        let mut report = BatchReport {
            participant: participant.to_string(),
            module: module.to_string(),
            visits: Vec::with_capacity(rows.len()),
            gate: None,
        };

        for (index, dated) in rows.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(CoordinatorError::Cancelled);
            }
            let locator = dated.row.locator();

            let blocked_by = if is_before_failure(failed.as_ref(), &locator, dated.date) {
                None
            } else {
                decide(failed.as_ref(), &locator, dated.date)?
                    .blocking()
                    .map(|f| f.file_name.clone())
            };
            if let Some(failed_file) = blocked_by {
                self.write_blocked(participant, &dated.row, &failed_file).await?;
                report.visits.push(visit_report(dated, VisitStatus::Blocked { failed_file }));
                continue;
            }

            let status = match self.runner.validate_visit(module, &locator).await? {
                ValidationRun::Completed(outcome) if outcome.passed => VisitStatus::Passed,
                ValidationRun::Completed(_) => VisitStatus::Failed,
                ValidationRun::SystemFailure(message) => {
                    tracing::error!(file = %locator.file_name, %message, "validation did not run");
                    self.write_system_error(&locator, message).await?;
                    VisitStatus::SystemError
                }
            };

            if status == VisitStatus::Passed {
                if failed.as_ref().is_some_and(|f| f.is_file(&locator))
                    && self
                        .gate
                        .clear_if_matches(participant, module, &locator)
                        .await?
                {
                    failed = None;
                }
                report.visits.push(visit_report(dated, status));
                continue;
            }

            let failure = FailedVisit::new(&locator, dated.date);
            self.gate
                .mark_failed(participant, module, failure.clone())
                .await?;
            report.visits.push(visit_report(dated, status));
            for later in &rows[index + 1..] {
                self.write_blocked(participant, &later.row, &locator.file_name)
                    .await?;
                report.visits.push(visit_report(
                    later,
                    VisitStatus::Blocked {
                        failed_file: locator.file_name.clone(),
                    },
                ));
            }
            tracing::warn!(
                participant,
                module,
                file = %locator.file_name,
                blocked = rows.len() - index - 1,
                "visit failed, later visits blocked"
            );
            failed = Some(failure);
            break;
        }

        report.gate = failed;
        Ok(report)
    }

    /// Earliest date to (re)validate from. `None` means every stored visit.
    fn cutoff(&self, earliest: NaiveDate, failed: Option<&FailedVisit>) -> Option<NaiveDate> {
        if !self.config.check_all {
            return Some(earliest);
        }
        match self.config.recheck_policy {
            RecheckPolicy::All => None,
            RecheckPolicy::FromEarliestFailure => {
                Some(failed.map_or(earliest, |f| f.visit_date.min(earliest)))
            }
        }
    }

    async fn visits_from(
        &self,
        participant: &str,
        module: &str,
        cutoff: Option<NaiveDate>,
    ) -> Result<Vec<DatedRow>, CoordinatorError> {
        let date_field = self.config.date_field.as_str();
        let mut query = VisitQuery::new(participant, module);
        if let Some(cutoff) = cutoff {
            query = query.filter(FieldFilter::new(date_field, SearchOp::Ge, cutoff));
        }

        let mut rows: Vec<DatedRow> = Vec::new();
        for row in self.store.query(Dataset::Current, &query).await? {
            match row.date(date_field) {
                Some(date) => rows.push(DatedRow { date, row }),
                None => tracing::warn!(file = %row.file_name, date_field, "visit has no usable date, skipped"),
            }
        }
        rows.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then_with(|| a.row.file_name.cmp(&b.row.file_name))
        });
        Ok(rows)
    }

    async fn write_blocked(
        &self,
        participant: &str,
        row: &VisitRow,
        failed_file: &str,
    ) -> Result<(), CoordinatorError> {
        let error = previous_visit_failed_error(failed_file, Some(participant), row.get(keys::VISITNUM));
        let result = QcResult {
            state: QcState::Fail,
            data: vec![error],
        };
        self.write_failure(&row.locator(), &result).await
    }

    async fn write_system_error(&self, locator: &Locator, message: String) -> Result<(), CoordinatorError> {
        let result = QcResult {
            state: QcState::Fail,
            data: vec![system_error(message, Some(locator.container_id.as_str()))],
        };
        self.write_failure(locator, &result).await
    }

    async fn write_failure(&self, locator: &Locator, result: &QcResult) -> Result<(), CoordinatorError> {
        let stage = self.config.coordinator_stage.as_str();
        self.store.record_qc(locator, stage, result).await?;
        self.store.tag_outcome(locator, stage, QcState::Fail).await?;
        Ok(())
    }
}

/// A different file strictly earlier than the recorded failure. Only a full
/// re-check reaches these, and they are validated normally.
fn is_before_failure(failed: Option<&FailedVisit>, locator: &Locator, date: NaiveDate) -> bool {
    failed.is_some_and(|f| date < f.visit_date && !f.is_file(locator))
}

fn visit_report(dated: &DatedRow, status: VisitStatus) -> VisitReport {
    VisitReport {
        file_name: dated.row.file_name.clone(),
        visit_date: dated.date,
        status,
    }
}
