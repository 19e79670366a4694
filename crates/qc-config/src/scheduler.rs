//! Submission scheduler configuration.

use qc_core::keys;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

fn default_pipeline_stages() -> Vec<String> {
    [
        keys::FILE_VALIDATOR_STAGE,
        "identifier-lookup",
        "form-transformer",
        keys::COORDINATOR_STAGE,
        keys::QC_STAGE,
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_queue_tags() -> Vec<String> {
    vec![String::from("queued")]
}

fn default_extensions() -> Vec<String> {
    vec![String::from(".csv"), String::from(".json")]
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    /// Project whose files are drained.
    #[serde(default)]
    pub project_id: String,

    /// Stages of the submission pipeline, first stage first.
    #[serde(default = "default_pipeline_stages")]
    pub pipeline_stages: Vec<String>,

    /// Modules in round-robin order.
    #[serde(default)]
    pub module_order: Vec<String>,

    /// Tags a file must carry to be queued; removed after triggering.
    #[serde(default = "default_queue_tags")]
    pub queue_tags: Vec<String>,

    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            pipeline_stages: default_pipeline_stages(),
            module_order: Vec::new(),
            queue_tags: default_queue_tags(),
            extensions: default_extensions(),
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.project_id.is_empty() && !self.module_order.is_empty()
    }

    /// First pipeline stage, the one the scheduler triggers.
    #[must_use]
    pub fn first_stage(&self) -> Option<&str> {
        self.pipeline_stages.first().map(String::as_str)
    }

    /// # Errors
    ///
    /// Returns `ConfigError::NotConfigured` without a project or modules and
    /// `ConfigError::InvalidValue` when the pipeline does not start with the
    /// file validator or an extension lacks its leading dot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.is_configured() {
            return Err(ConfigError::NotConfigured {
                section: "scheduler".to_string(),
            });
        }
        match self.first_stage() {
            Some(keys::FILE_VALIDATOR_STAGE) => {}
            other => {
                return Err(ConfigError::invalid(
                    "scheduler.pipeline_stages",
                    format!(
                        "first stage must be '{}', found {other:?}",
                        keys::FILE_VALIDATOR_STAGE
                    ),
                ));
            }
        }
        if let Some(ext) = self.extensions.iter().find(|e| !e.starts_with('.')) {
            return Err(ConfigError::invalid(
                "scheduler.extensions",
                format!("'{ext}' must start with '.'"),
            ));
        }
        Ok(())
    }
}
