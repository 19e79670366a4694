//! Status enums, dataset selectors, and search operators for qcflow.
//!
//! Job and container enums use `snake_case` serialization; QC states are
//! persisted as `PASS` / `FAIL` because downstream tooling reads them that way.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

/// Which visit store a query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    /// Visits submitted through this pipeline.
    Current,
    /// Visits imported from the previous system.
    Legacy,
}

impl Dataset {
    /// Return the string representation used in SQL storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Legacy => "legacy",
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SearchOp
// ---------------------------------------------------------------------------

/// Comparison operator for visit store queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SearchOp {
    Eq,
    Gt,
    Lt,
    Ne,
    Ge,
    Le,
    /// Matches when the field equals any of the given values.
    OneOf,
}

impl SearchOp {
    /// Operator text as rendered in search strings.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ne => "!=",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::OneOf => "=|",
        }
    }
}

impl fmt::Display for SearchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// QcState
// ---------------------------------------------------------------------------

/// Outcome recorded for one pipeline stage of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum QcState {
    Pass,
    Fail,
}

impl QcState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
        }
    }

    #[must_use]
    pub const fn from_passed(passed: bool) -> Self {
        if passed { Self::Pass } else { Self::Fail }
    }
}

impl fmt::Display for QcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// JobState
// ---------------------------------------------------------------------------

/// Lifecycle state of a pipeline job.
///
/// ```text
/// pending → running → completed
///                   → failed
///                   → cancelled
///                   → retried   (a new job carries previous_job_id)
///                   → aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Retried,
    Aborted,
}

impl JobState {
    /// Return the string representation used in SQL storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Retried => "retried",
            Self::Aborted => "aborted",
        }
    }

    /// Job has not reached a terminal state yet.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobState {
    type Err = crate::errors::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "retried" => Ok(Self::Retried),
            "aborted" => Ok(Self::Aborted),
            other => Err(crate::errors::CoreError::Validation(format!(
                "Unknown job state '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// ErrorType
// ---------------------------------------------------------------------------

/// Severity of a structured QC error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    Alert,
    Error,
}

impl ErrorType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Alert => "alert",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn qc_state_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&QcState::Pass).unwrap(), "\"PASS\"");
        assert_eq!(
            serde_json::from_str::<QcState>("\"FAIL\"").unwrap(),
            QcState::Fail
        );
    }

    #[rstest]
    #[case(JobState::Pending, true)]
    #[case(JobState::Running, true)]
    #[case(JobState::Completed, false)]
    #[case(JobState::Failed, false)]
    #[case(JobState::Retried, false)]
    fn active_job_states(#[case] state: JobState, #[case] active: bool) {
        assert_eq!(state.is_active(), active);
    }

    #[test]
    fn job_state_parses_its_own_rendering() {
        for state in [
            JobState::Pending,
            JobState::Running,
            JobState::Completed,
            JobState::Failed,
            JobState::Cancelled,
            JobState::Retried,
            JobState::Aborted,
        ] {
            assert_eq!(state.as_str().parse::<JobState>().unwrap(), state);
        }
        assert!("exploded".parse::<JobState>().is_err());
    }
}
