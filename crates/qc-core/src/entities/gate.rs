use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::visit::Locator;

/// The visit that most recently failed validation for one participant/module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FailedVisit {
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    pub visit_date: NaiveDate,
}

impl FailedVisit {
    #[must_use]
    pub fn new(locator: &Locator, visit_date: NaiveDate) -> Self {
        Self {
            file_name: locator.file_name.clone(),
            file_id: locator.file_id.clone(),
            visit_date,
        }
    }

    /// Same file as `locator`: ids equal when both known, else names equal.
    #[must_use]
    pub fn is_file(&self, locator: &Locator) -> bool {
        match (&self.file_id, &locator.file_id) {
            (Some(a), Some(b)) if a == b => true,
            _ => self.file_name == locator.file_name,
        }
    }
}

/// Gate metadata stored on the participant under the module key.
///
/// No `failed` entry means nothing blocks the module.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct GateEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed: Option<FailedVisit>,
}

impl GateEntry {
    #[must_use]
    pub const fn failed(visit: FailedVisit) -> Self {
        Self {
            failed: Some(visit),
        }
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.failed.is_none()
    }
}

/// A gate entry together with the revision it was read at.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct GateSnapshot {
    pub entry: GateEntry,
    /// Zero when the participant has no stored gate yet.
    pub revision: i64,
}
