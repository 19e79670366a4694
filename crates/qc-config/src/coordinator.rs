//! Visit coordination configuration.

use qc_core::keys;
use serde::{Deserialize, Serialize};

/// Which earlier visits a full re-check re-validates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecheckPolicy {
    /// Every visit of the participant/module.
    All,
    /// Visits from the recorded failure onward, or from the earliest queued
    /// visit when nothing has failed.
    #[default]
    FromEarliestFailure,
}

/// How a single visit is validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Trigger the QC stage as a pipeline job and wait for it.
    #[default]
    Job,
    /// Run the rule validator in-process.
    Inline,
}

fn default_date_field() -> String {
    keys::VISITDATE.to_string()
}

fn default_validation_stage() -> String {
    keys::QC_STAGE.to_string()
}

fn default_coordinator_stage() -> String {
    keys::COORDINATOR_STAGE.to_string()
}

const fn default_strict_mode() -> bool {
    true
}

const fn default_gate_retries() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CoordinatorConfig {
    #[serde(default = "default_date_field")]
    pub date_field: String,

    /// Stage whose QC result decides pass/fail.
    #[serde(default = "default_validation_stage")]
    pub validation_stage: String,

    /// Stage the coordinator records blocked visits and system errors under.
    #[serde(default = "default_coordinator_stage")]
    pub coordinator_stage: String,

    /// Re-validate earlier visits, not just the queued ones.
    #[serde(default)]
    pub check_all: bool,

    #[serde(default)]
    pub recheck_policy: RecheckPolicy,

    #[serde(default)]
    pub mode: ValidationMode,

    /// Treat missing optional-form mode variables as errors.
    #[serde(default = "default_strict_mode")]
    pub strict_mode: bool,

    /// Attempts at a gate write before giving up on contention.
    #[serde(default = "default_gate_retries")]
    pub gate_retries: u32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            date_field: default_date_field(),
            validation_stage: default_validation_stage(),
            coordinator_stage: default_coordinator_stage(),
            check_all: false,
            recheck_policy: RecheckPolicy::default(),
            mode: ValidationMode::default(),
            strict_mode: default_strict_mode(),
            gate_retries: default_gate_retries(),
        }
    }
}
