//! Admission checks run on a visit before it is accepted into the current
//! dataset.
//!
//! Every check runs and every finding is collected into the
//! [`PreprocessReport`]. The preprocessor only reads from the store.

use qc_config::PreprocessConfig;
use qc_core::FieldValue;
use qc_core::entities::{ModuleConfig, VisitRecord, VisitRow};
use qc_core::enums::{Dataset, SearchOp};
use qc_core::keys;
use qc_core::qc::{ErrorCode, StructuredError, empty_field_error, preprocessing_error};
use qc_core::query::{FieldFilter, VisitQuery};
use qc_core::traits::VisitStore;
use schemars::JsonSchema;
use serde::Serialize;

use crate::error::PreprocessError;

/// Findings of one admission run. Empty means the visit is admitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, JsonSchema)]
pub struct PreprocessReport {
    pub errors: Vec<StructuredError>,
}

impl PreprocessReport {
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.errors.is_empty()
    }

    /// True if any finding carries `code`.
    #[must_use]
    pub fn has(&self, code: ErrorCode) -> bool {
        self.errors.iter().any(|e| e.is(code))
    }
}

/// One dataset's view of a module: its label and date column.
struct Scope<'c> {
    dataset: Dataset,
    module: &'c str,
    date_field: &'c str,
}

pub struct Preprocessor<'a, S> {
    store: &'a S,
    config: &'a PreprocessConfig,
}

impl<'a, S: VisitStore> Preprocessor<'a, S> {
    #[must_use]
    pub const fn new(store: &'a S, config: &'a PreprocessConfig) -> Self {
        Self { store, config }
    }

    /// Run all admission checks for `record` under `module`'s settings.
    ///
    /// # Errors
    ///
    /// Returns `PreprocessError::UnknownModule` when `module` has no settings,
    /// `PreprocessError::UnreadableVisit` when the existing initial visit
    /// cannot be read back, and `PreprocessError::Store` on query failure.
    pub async fn preprocess(
        &self,
        record: &VisitRecord,
        module: &str,
        line: Option<u64>,
    ) -> Result<PreprocessReport, PreprocessError> {
        let cfg = self
            .config
            .module(module)
            .ok_or_else(|| PreprocessError::UnknownModule(module.to_string()))?;
        tracing::info!(participant = %record.participant, module, "running preprocessing checks");

        let check = Check {
            store: self.store,
            cfg,
            record,
            module,
            line,
        };
        let mut errors = Vec::new();

        if !cfg.accepts_version(&record.version) {
            tracing::error!(module, version = %record.version, "unsupported form version");
            errors.push(check.error(ErrorCode::InvalidVersion, keys::FORMVER, &record.version));
        }

        match record.packet.as_deref() {
            Some(packet) if cfg.is_initial_packet(packet) || cfg.is_followup_packet(packet) => {
                if let Some(err) = check.initial_visit(packet).await? {
                    errors.push(err);
                }
                if packet == keys::UDS_I4_PACKET {
                    if let Some(err) = check.legacy_continuity().await? {
                        errors.push(err);
                    }
                }
            }
            other => {
                tracing::error!(module, packet = ?other, "unsupported packet");
                let value = other.map_or(FieldValue::Null, FieldValue::from);
                errors.push(check.error(ErrorCode::InvalidPacket, keys::PACKET, &value));
            }
        }

        if record.visit_number.is_some() {
            errors.extend(check.date_number_consistency().await?);
        } else {
            errors.push(
                empty_field_error(keys::VISITNUM, line)
                    .with_visit(Some(&record.participant), None),
            );
        }

        Ok(PreprocessReport { errors })
    }
}

/// State shared by the individual checks of one record.
struct Check<'c, S> {
    store: &'c S,
    cfg: &'c ModuleConfig,
    record: &'c VisitRecord,
    module: &'c str,
    line: Option<u64>,
}

impl<S: VisitStore> Check<'_, S> {
    fn error(&self, code: ErrorCode, field: &str, value: &FieldValue) -> StructuredError {
        preprocessing_error(
            code,
            field,
            value,
            self.line,
            Some(&self.record.participant),
            self.record.visit_number.as_ref(),
        )
    }

    fn current(&self) -> Scope<'_> {
        Scope {
            dataset: Dataset::Current,
            module: self.module,
            date_field: &self.cfg.date_field,
        }
    }

    fn legacy(&self) -> Scope<'_> {
        Scope {
            dataset: Dataset::Legacy,
            module: self.cfg.legacy_module_or(self.module),
            date_field: self.cfg.legacy_date_field(),
        }
    }

    async fn rows(&self, scope: &Scope<'_>, filter: FieldFilter) -> Result<Vec<VisitRow>, PreprocessError> {
        let query = VisitQuery::new(&self.record.participant, scope.module)
            .filter(filter)
            .columns([keys::PACKET, keys::VISITNUM, scope.date_field]);
        Ok(self.store.query(scope.dataset, &query).await?)
    }

    /// At most one initial visit per participant/module.
    async fn initial_visit(&self, packet: &str) -> Result<Option<StructuredError>, PreprocessError> {
        let packet_value = FieldValue::from(packet);
        let is_initial = self.cfg.is_initial_packet(packet);

        if self.store.is_new_participant(&self.record.participant).await? {
            if is_initial {
                return Ok(None);
            }
            tracing::error!(participant = %self.record.participant, packet, "no initial visit for new participant");
            return Ok(Some(self.error(ErrorCode::MissingIvp, keys::PACKET, &packet_value)));
        }

        let initial = FieldFilter::one_of(
            keys::PACKET,
            self.cfg
                .initial_packets
                .iter()
                .map(|p| FieldValue::from(p.as_str()))
                .collect(),
        );
        let mut scope = self.current();
        let mut found = self.rows(&scope, initial.clone()).await?;
        if found.is_empty() {
            scope = self.legacy();
            found = self.rows(&scope, initial).await?;
        }

        if found.len() > 1 {
            return Ok(Some(self.error(ErrorCode::MultipleIvp, keys::PACKET, &packet_value)));
        }
        let Some(existing) = found.pop() else {
            if is_initial {
                return Ok(None);
            }
            return Ok(Some(self.error(ErrorCode::MissingIvp, keys::PACKET, &packet_value)));
        };
        if !is_initial {
            return Ok(None);
        }

        let locator = existing.locator();
        let ivp = self
            .store
            .read_visit(scope.dataset, &locator)
            .await?
            .ok_or_else(|| PreprocessError::UnreadableVisit {
                file: locator.file_name.clone(),
            })?;

        let same_date = ivp
            .get(scope.date_field)
            .and_then(FieldValue::as_date)
            .is_some_and(|d| d == self.record.visit_date);
        let same_number = match (ivp.get(keys::VISITNUM), self.record.visit_number.as_ref()) {
            (Some(a), Some(b)) => a.loose_eq(b),
            _ => false,
        };
        if same_date && same_number {
            return Ok(None);
        }

        let existing_packet = ivp.get(keys::PACKET).map(FieldValue::render);
        if existing_packet.as_deref() == Some(keys::UDS_I_PACKET) && packet == keys::UDS_I4_PACKET {
            return Ok(None);
        }

        tracing::error!(
            participant = %self.record.participant,
            existing = %locator.file_name,
            "initial visit packet already exists"
        );
        Ok(Some(self.error(ErrorCode::IvpExists, keys::PACKET, &packet_value)))
    }

    /// An `I4` visit must come after the latest legacy visit, both by date
    /// and by visit number.
    async fn legacy_continuity(&self) -> Result<Option<StructuredError>, PreprocessError> {
        let scope = self.legacy();
        let filter = FieldFilter::new(scope.date_field, SearchOp::Le, self.record.visit_date);
        let rows = self.rows(&scope, filter).await?;

        let latest = rows
            .iter()
            .filter_map(|row| row.date(scope.date_field).map(|d| (d, row)))
            .max_by_key(|(d, _)| *d);

        let date_value = self.record.visit_date_value();
        let Some((latest_date, latest)) = latest else {
            return Ok(Some(self.date_error(ErrorCode::LowerI4VisitDate, &date_value)));
        };
        if latest_date >= self.record.visit_date {
            return Ok(Some(self.date_error(ErrorCode::LowerI4VisitDate, &date_value)));
        }

        if let (Some(legacy_num), Some(num)) =
            (latest.get(keys::VISITNUM), self.record.visit_number.as_ref())
        {
            if legacy_num.loose_cmp(num).is_ge() {
                return Ok(Some(self.error(ErrorCode::LowerI4VisitNum, keys::VISITNUM, num)));
            }
        }
        Ok(None)
    }

    fn date_error(&self, code: ErrorCode, value: &FieldValue) -> StructuredError {
        self.error(code, &self.cfg.date_field, value)
    }

    /// Equal dates imply equal visit numbers and vice versa, against the
    /// current dataset first and then the legacy one.
    async fn date_number_consistency(&self) -> Result<Vec<StructuredError>, PreprocessError> {
        let mut errors = Vec::new();
        let Some(number) = self.record.visit_number.as_ref() else {
            return Ok(errors);
        };
        let date = self.record.visit_date;

        for scope in [self.current(), self.legacy()] {
            let same_date = self
                .rows(&scope, FieldFilter::new(scope.date_field, SearchOp::Eq, date))
                .await?;
            if let Some(row) = same_date
                .iter()
                .find(|r| r.get(keys::VISITNUM).is_some_and(|n| !n.loose_eq(number)))
            {
                tracing::error!(file = %row.file_name, dataset = %scope.dataset, "visit with same date has a different visit number");
                errors.push(self.date_error(ErrorCode::DiffVisitNum, &self.record.visit_date_value()));
                break;
            }
        }

        for scope in [self.current(), self.legacy()] {
            let same_number = self
                .rows(&scope, FieldFilter::new(keys::VISITNUM, SearchOp::Eq, number.clone()))
                .await?;
            if let Some(row) = same_number
                .iter()
                .find(|r| r.date(scope.date_field).is_some_and(|d| d != date))
            {
                tracing::error!(file = %row.file_name, dataset = %scope.dataset, "visit with same visit number has a different date");
                errors.push(self.error(ErrorCode::DiffVisitDate, keys::VISITNUM, number));
                break;
            }
        }
        Ok(errors)
    }
}
