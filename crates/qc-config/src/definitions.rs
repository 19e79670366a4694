//! Rule definitions storage configuration.

use qc_core::keys;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Object store holding rule definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionsBackend {
    /// Directory on the local filesystem.
    #[default]
    Local,
    /// S3 or an S3-compatible service.
    S3,
    /// Empty in-memory store, for dry runs.
    Memory,
}

fn default_root_path() -> String {
    String::from(".qcflow/rules")
}

fn default_prefix() -> String {
    keys::QC_JSON_DIR.to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DefinitionsConfig {
    #[serde(default)]
    pub backend: DefinitionsBackend,

    /// Directory used by the local backend.
    #[serde(default = "default_root_path")]
    pub root_path: String,

    #[serde(default)]
    pub bucket: String,

    #[serde(default)]
    pub region: String,

    /// Custom endpoint for S3-compatible services.
    #[serde(default)]
    pub endpoint: String,

    /// Key prefix of the rule tree inside the store.
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

impl Default for DefinitionsConfig {
    fn default() -> Self {
        Self {
            backend: DefinitionsBackend::default(),
            root_path: default_root_path(),
            bucket: String::new(),
            region: String::new(),
            endpoint: String::new(),
            prefix: default_prefix(),
        }
    }
}

impl DefinitionsConfig {
    /// # Errors
    ///
    /// Returns `ConfigError::NotConfigured` when the S3 backend has no bucket.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend == DefinitionsBackend::S3 && self.bucket.is_empty() {
            return Err(ConfigError::NotConfigured {
                section: "definitions".to_string(),
            });
        }
        Ok(())
    }
}
