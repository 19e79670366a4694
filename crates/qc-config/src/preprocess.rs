//! Admission check configuration.

use std::collections::BTreeMap;

use qc_core::entities::ModuleConfig;
use qc_core::keys;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

fn default_primary_key() -> String {
    keys::PTID.to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PreprocessConfig {
    /// Field holding the participant id.
    #[serde(default = "default_primary_key")]
    pub primary_key: String,

    /// Per-module settings keyed by upper-case module label.
    #[serde(default)]
    pub modules: BTreeMap<String, ModuleConfig>,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            primary_key: default_primary_key(),
            modules: BTreeMap::new(),
        }
    }
}

impl PreprocessConfig {
    /// Settings for `module`, matched case-insensitively.
    #[must_use]
    pub fn module(&self, module: &str) -> Option<&ModuleConfig> {
        self.modules
            .iter()
            .find(|(label, _)| label.eq_ignore_ascii_case(module))
            .map(|(_, cfg)| cfg)
    }

    /// Check each module has packets, versions and a date field.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (label, cfg) in &self.modules {
            if cfg.initial_packets.is_empty() && cfg.followup_packets.is_empty() {
                return Err(ConfigError::invalid(
                    format!("preprocess.modules.{label}"),
                    "no packets configured",
                ));
            }
            if cfg.versions.is_empty() {
                return Err(ConfigError::invalid(
                    format!("preprocess.modules.{label}.versions"),
                    "no form versions configured",
                ));
            }
            if cfg.date_field.trim().is_empty() {
                return Err(ConfigError::invalid(
                    format!("preprocess.modules.{label}.date_field"),
                    "must not be empty",
                ));
            }
        }
        Ok(())
    }
}
