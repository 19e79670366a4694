//! JSON Schemas of the persisted and reported qcflow types.
//!
//! Gate entries and QC metadata are stored as JSON, and the CLI prints
//! reports as JSON. The registry generates their schemas with
//! [`schemars::schema_for!`] and validates values with `jsonschema`.

use std::collections::HashMap;

use schemars::schema_for;

use crate::error::SchemaError;

pub struct SchemaRegistry {
    schemas: HashMap<&'static str, serde_json::Value>,
}

/// Insert a generated schema. Panics only if `schemars` output fails to
/// serialize, which it does not.
macro_rules! register {
    ($map:expr, $name:expr, $ty:ty) => {
        $map.insert($name, serde_json::to_value(schema_for!($ty)).unwrap());
    };
}

impl SchemaRegistry {
    /// # Panics
    ///
    /// Panics if a generated schema cannot be converted to a JSON value.
    #[must_use]
    pub fn new() -> Self {
        let mut schemas = HashMap::new();

        // Stored state
        register!(schemas, "gate_entry", qc_core::entities::GateEntry);
        register!(schemas, "failed_visit", qc_core::entities::FailedVisit);
        register!(schemas, "qc_metadata", qc_core::qc::QcMetadata);
        register!(schemas, "qc_result", qc_core::qc::QcResult);
        register!(schemas, "structured_error", qc_core::qc::StructuredError);
        register!(schemas, "job", qc_core::entities::Job);
        register!(schemas, "project_file", qc_core::entities::ProjectFile);

        // Inputs
        register!(schemas, "queued_visits", qc_core::entities::QueuedVisits);
        register!(schemas, "module_config", qc_core::entities::ModuleConfig);
        register!(schemas, "visit_row", qc_core::entities::VisitRow);

        // Reports
        register!(
            schemas,
            "validation_outcome",
            qc_core::qc::ValidationOutcome
        );
        register!(
            schemas,
            "preprocess_report",
            crate::preprocess::PreprocessReport
        );
        register!(schemas, "batch_report", crate::coordinator::BatchReport);

        Self { schemas }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.schemas.get(name)
    }

    /// Validate `instance` against the named schema.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError::NotFound` for an unknown name and
    /// `SchemaError::ValidationFailed` listing every violation.
    pub fn validate(&self, name: &str, instance: &serde_json::Value) -> Result<(), SchemaError> {
        let schema = self
            .get(name)
            .ok_or_else(|| SchemaError::NotFound(name.to_string()))?;
        let validator =
            jsonschema::validator_for(schema).map_err(|e| SchemaError::Compile(format!("{e}")))?;

        let errors: Vec<String> = validator
            .iter_errors(instance)
            .map(|e| format!("{e}"))
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::ValidationFailed { errors })
        }
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn list(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.schemas.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use qc_core::entities::{FailedVisit, GateEntry};
    use qc_core::qc::{QcResult, ValidationOutcome, previous_visit_failed_error};
    use serde_json::json;

    #[test]
    fn list_is_sorted_and_complete() {
        let reg = SchemaRegistry::new();
        let names = reg.list();
        assert_eq!(names.len(), 13);
        assert!(names.windows(2).all(|w| w[0] < w[1]));
        assert!(names.contains(&"gate_entry"));
    }

    #[test]
    fn stored_gate_entry_validates() {
        let reg = SchemaRegistry::new();
        let entry = GateEntry::failed(FailedVisit {
            file_name: "p1-v1.json".to_string(),
            file_id: None,
            visit_date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
        });
        reg.validate("gate_entry", &serde_json::to_value(&entry).unwrap())
            .unwrap();
        reg.validate("gate_entry", &json!({})).unwrap();
    }

    #[test]
    fn qc_result_with_blocked_error_validates() {
        let reg = SchemaRegistry::new();
        let result = QcResult::from(&ValidationOutcome::fail(vec![
            previous_visit_failed_error("p1-v1.json", Some("P1"), None),
        ]));
        reg.validate("qc_result", &serde_json::to_value(&result).unwrap())
            .unwrap();
    }

    #[test]
    fn wrong_state_is_rejected() {
        let reg = SchemaRegistry::new();
        let err = reg
            .validate("qc_result", &json!({"state": "MAYBE", "data": []}))
            .unwrap_err();
        assert!(matches!(err, SchemaError::ValidationFailed { .. }));
    }

    #[test]
    fn unknown_schema() {
        let reg = SchemaRegistry::new();
        assert!(matches!(
            reg.validate("nope", &json!({})),
            Err(SchemaError::NotFound(_))
        ));
    }
}
