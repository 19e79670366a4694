//! Structured QC errors and the per-stage QC metadata written on each file.
//!
//! Every finding produced by the preprocessor, the coordinator or a rule
//! validator is a [`StructuredError`]. A file's QC metadata maps each pipeline
//! stage to a [`QcResult`]:
//!
//! ```text
//! { "<stage>": { "validation": { "state": "PASS" | "FAIL", "data": [StructuredError] } } }
//! ```

use std::collections::BTreeMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::{ErrorType, QcState};
use crate::keys;
use crate::value::FieldValue;

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Well-known error codes emitted by qcflow itself.
///
/// Rule validators emit their own codes; those travel as plain strings in
/// [`StructuredError::error_code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    IvpExists,
    DiffVisitDate,
    DiffVisitNum,
    LowerI4VisitNum,
    LowerI4VisitDate,
    InvalidPacket,
    MissingIvp,
    MultipleIvp,
    InvalidVersion,
    FailedPreviousVisit,
    SystemError,
    EmptyField,
    EmptyFile,
    MalformedFile,
}

impl ErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IvpExists => "preprocess-002",
            Self::DiffVisitDate => "preprocess-006",
            Self::DiffVisitNum => "preprocess-007",
            Self::LowerI4VisitNum => "preprocess-009",
            Self::LowerI4VisitDate => "preprocess-013",
            Self::InvalidPacket => "preprocess-019",
            Self::MissingIvp => "preprocess-020",
            Self::MultipleIvp => "preprocess-021",
            Self::InvalidVersion => "preprocess-022",
            Self::FailedPreviousVisit => "failed-previous-visit",
            Self::SystemError => "system-error",
            Self::EmptyField => "empty-field",
            Self::EmptyFile => "empty-file",
            Self::MalformedFile => "malformed-file",
        }
    }

    /// Default human-readable message for the code.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::IvpExists => "An initial visit packet already exists for this participant",
            Self::DiffVisitDate => "Another visit with the same visit number has a different visit date",
            Self::DiffVisitNum => "Another visit with the same visit date has a different visit number",
            Self::LowerI4VisitNum => {
                "Visit number must be greater than the last legacy visit number"
            }
            Self::LowerI4VisitDate => "Visit date must be after the last legacy visit date",
            Self::InvalidPacket => "Unsupported packet for this module",
            Self::MissingIvp => "No initial visit packet found for this participant",
            Self::MultipleIvp => "More than one initial visit packet found for this participant",
            Self::InvalidVersion => "Unsupported form version for this module",
            Self::FailedPreviousVisit => "A previous visit for this participant failed validation",
            Self::SystemError => "System error while validating the visit",
            Self::EmptyField => "Required field is missing or empty",
            Self::EmptyFile => "Empty input file",
            Self::MalformedFile => "Malformed input file",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// StructuredError
// ---------------------------------------------------------------------------

/// Where in the submitted file a finding applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ErrorLocation {
    Csv { line: u64, column_name: String },
    Json { key_path: String },
}

/// One QC finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StructuredError {
    pub error_type: ErrorType,
    pub error_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<ErrorLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ptid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visitnum: Option<String>,
}

impl StructuredError {
    /// Bare error with the code's default message.
    #[must_use]
    pub fn new(code: ErrorCode) -> Self {
        Self {
            error_type: ErrorType::Error,
            error_code: code.as_str().to_string(),
            location: None,
            container_id: None,
            value: None,
            expected: None,
            message: code.message().to_string(),
            ptid: None,
            visitnum: None,
        }
    }

    /// Error carrying a code defined by a rule set rather than by qcflow.
    #[must_use]
    pub fn coded(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: code.into(),
            message: message.into(),
            ..Self::new(ErrorCode::SystemError)
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    #[must_use]
    pub fn with_location(mut self, location: ErrorLocation) -> Self {
        self.location = Some(location);
        self
    }

    #[must_use]
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    #[must_use]
    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    #[must_use]
    pub fn with_container(mut self, container_id: impl Into<String>) -> Self {
        self.container_id = Some(container_id.into());
        self
    }

    #[must_use]
    pub fn with_visit(mut self, ptid: Option<&str>, visitnum: Option<&FieldValue>) -> Self {
        self.ptid = ptid.map(str::to_string);
        self.visitnum = visitnum.map(FieldValue::render);
        self
    }

    /// True if this error carries the given well-known code.
    #[must_use]
    pub fn is(&self, code: ErrorCode) -> bool {
        self.error_code == code.as_str()
    }
}

/// Location for a field, as a CSV column when the line is known and as a
/// JSON key path otherwise.
#[must_use]
pub fn field_location(field: &str, line: Option<u64>) -> ErrorLocation {
    match line {
        Some(line) => ErrorLocation::Csv {
            line,
            column_name: field.to_string(),
        },
        None => ErrorLocation::Json {
            key_path: field.to_string(),
        },
    }
}

/// Finding raised by an admission check.
#[must_use]
pub fn preprocessing_error(
    code: ErrorCode,
    field: &str,
    value: &FieldValue,
    line: Option<u64>,
    ptid: Option<&str>,
    visitnum: Option<&FieldValue>,
) -> StructuredError {
    StructuredError::new(code)
        .with_location(field_location(field, line))
        .with_value(value.render())
        .with_visit(ptid, visitnum)
}

/// Finding written on a visit held back by an earlier failed visit.
#[must_use]
pub fn previous_visit_failed_error(
    failed_file: &str,
    ptid: Option<&str>,
    visitnum: Option<&FieldValue>,
) -> StructuredError {
    StructuredError::new(ErrorCode::FailedPreviousVisit)
        .with_location(ErrorLocation::Json {
            key_path: keys::VISITDATE.to_string(),
        })
        .with_value(failed_file)
        .with_message(format!(
            "Visit file {failed_file} has to be approved before evaluating any subsequent visits"
        ))
        .with_visit(ptid, visitnum)
}

/// Finding recorded when validation infrastructure failed for a visit.
#[must_use]
pub fn system_error(message: impl Into<String>, container_id: Option<&str>) -> StructuredError {
    let mut error = StructuredError::new(ErrorCode::SystemError).with_message(message);
    error.container_id = container_id.map(str::to_string);
    error
}

/// Required field missing or blank.
#[must_use]
pub fn empty_field_error(field: &str, line: Option<u64>) -> StructuredError {
    StructuredError::new(ErrorCode::EmptyField)
        .with_location(field_location(field, line))
        .with_message(format!("Required field '{field}' is missing or empty"))
}

#[must_use]
pub fn empty_file_error() -> StructuredError {
    StructuredError::new(ErrorCode::EmptyFile)
}

#[must_use]
pub fn malformed_file_error(detail: impl Into<String>) -> StructuredError {
    StructuredError::new(ErrorCode::MalformedFile).with_message(detail)
}

// ---------------------------------------------------------------------------
// Outcomes and metadata
// ---------------------------------------------------------------------------

/// Result of validating one visit.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ValidationOutcome {
    pub passed: bool,
    pub errors: Vec<StructuredError>,
}

impl ValidationOutcome {
    #[must_use]
    pub const fn pass() -> Self {
        Self {
            passed: true,
            errors: Vec::new(),
        }
    }

    #[must_use]
    pub const fn fail(errors: Vec<StructuredError>) -> Self {
        Self {
            passed: false,
            errors,
        }
    }

    /// Outcome that passes iff `errors` is empty.
    #[must_use]
    pub fn from_errors(errors: Vec<StructuredError>) -> Self {
        Self {
            passed: errors.is_empty(),
            errors,
        }
    }

    #[must_use]
    pub const fn state(&self) -> QcState {
        QcState::from_passed(self.passed)
    }
}

/// Persisted result of a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct QcResult {
    pub state: QcState,
    #[serde(default)]
    pub data: Vec<StructuredError>,
}

impl From<&ValidationOutcome> for QcResult {
    fn from(outcome: &ValidationOutcome) -> Self {
        Self {
            state: outcome.state(),
            data: outcome.errors.clone(),
        }
    }
}

/// QC entry for one pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StageQc {
    pub validation: QcResult,
}

/// QC metadata of one file, keyed by stage name.
pub type QcMetadata = BTreeMap<String, StageQc>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn preprocessing_error_uses_csv_location_when_line_known() {
        let err = preprocessing_error(
            ErrorCode::DiffVisitNum,
            keys::VISITNUM,
            &FieldValue::from("2"),
            Some(3),
            Some("P1"),
            Some(&FieldValue::Integer(2)),
        );
        assert!(err.is(ErrorCode::DiffVisitNum));
        assert_eq!(
            err.location,
            Some(ErrorLocation::Csv {
                line: 3,
                column_name: "visitnum".to_string()
            })
        );
        assert_eq!(err.visitnum.as_deref(), Some("2"));
    }

    #[test]
    fn metadata_shape() {
        let outcome = ValidationOutcome::fail(vec![system_error("boom", Some("acq-1"))]);
        let mut meta = QcMetadata::new();
        meta.insert(
            keys::QC_STAGE.to_string(),
            StageQc {
                validation: QcResult::from(&outcome),
            },
        );
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["form-qc-checker"]["validation"]["state"], "FAIL");
        assert_eq!(
            json["form-qc-checker"]["validation"]["data"][0]["error_code"],
            "system-error"
        );
    }

    #[test]
    fn blocked_error_references_failed_file() {
        let err = previous_visit_failed_error("p1-v1.json", Some("P1"), None);
        assert!(err.is(ErrorCode::FailedPreviousVisit));
        assert_eq!(err.value.as_deref(), Some("p1-v1.json"));
        assert!(err.message.contains("p1-v1.json"));
    }
}
