use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::container::ContainerRef;
use crate::enums::JobState;

/// A pipeline job as reported by the job executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    pub id: String,
    /// Pipeline stage (gear) the job runs.
    pub stage: String,
    pub state: JobState,
    /// Set when this job is the retry of another.
    pub previous_job_id: Option<String>,
    pub destination: ContainerRef,
    /// Project the destination belongs to, when the executor reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Input name to file id.
    pub inputs: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}
