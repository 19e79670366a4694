//! # qc-config
//!
//! Layered configuration loading for qcflow using figment.
//!
//! Configuration sources (in priority order, highest wins):
//! 1. Environment variables (`QCFLOW_*` prefix, `__` as separator)
//! 2. Project-level `.qcflow/config.toml`
//! 3. User-level `~/.config/qcflow/config.toml`
//! 4. Built-in defaults
//!
//! # Environment Variable Mapping
//!
//! Figment maps `QCFLOW_POLL__INTERVAL_SECS` -> `poll.interval_secs`,
//! `QCFLOW_SCHEDULER__PROJECT_ID` -> `scheduler.project_id`, etc.
//! The `__` (double underscore) separates nested config sections.
//!
//! # Usage
//!
//! ```no_run
//! use qc_config::QcConfig;
//!
//! let config = QcConfig::load_with_dotenv().expect("config");
//! config.validate().expect("valid config");
//! println!("polling every {:?}", config.poll.interval());
//! ```

mod coordinator;
mod definitions;
mod error;
mod poll;
mod preprocess;
mod scheduler;
mod store;

pub use coordinator::{CoordinatorConfig, RecheckPolicy, ValidationMode};
pub use definitions::{DefinitionsBackend, DefinitionsConfig};
pub use error::ConfigError;
pub use poll::PollConfig;
pub use preprocess::PreprocessConfig;
pub use scheduler::SchedulerConfig;
pub use store::StoreConfig;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct QcConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub preprocess: PreprocessConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub definitions: DefinitionsConfig,
}

impl QcConfig {
    /// Load configuration from all sources (TOML files + environment variables).
    ///
    /// Does NOT call `dotenvy`; use [`QcConfig::load_with_dotenv`] for `.env` support.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Figment` if a source fails to parse or extract.
    pub fn load() -> Result<Self, ConfigError> {
        Self::figment().extract().map_err(ConfigError::from)
    }

    /// Load configuration with `.env` file support.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Figment` if a source fails to parse or extract.
    pub fn load_with_dotenv() -> Result<Self, ConfigError> {
        Self::load_dotenv_from_workspace();
        Self::load()
    }

    /// Build the figment provider chain.
    ///
    /// Public so tests and the CLI can layer extra providers on top.
    #[must_use]
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                figment = figment.merge(Toml::file(global_path));
            }
        }

        let local_path = PathBuf::from(".qcflow/config.toml");
        if local_path.exists() {
            figment = figment.merge(Toml::file(local_path));
        }

        figment.merge(Env::prefixed("QCFLOW_").split("__"))
    }

    /// Cross-section sanity checks that serde defaults cannot express.
    ///
    /// The scheduler section is only checked once a project is set, so
    /// commands that never schedule can run without it.
    ///
    /// # Errors
    ///
    /// Returns the first `ConfigError::InvalidValue` or `NotConfigured` found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.preprocess.validate()?;
        self.definitions.validate()?;
        if !self.scheduler.project_id.is_empty() {
            self.scheduler.validate()?;
        }
        if self.poll.interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "poll.interval_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.coordinator.validation_stage.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "coordinator.validation_stage".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.coordinator.coordinator_stage.trim().is_empty()
            || self.coordinator.coordinator_stage == self.coordinator.validation_stage
        {
            return Err(ConfigError::InvalidValue {
                field: "coordinator.coordinator_stage".to_string(),
                reason: "must be set and differ from coordinator.validation_stage".to_string(),
            });
        }
        Ok(())
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("qcflow").join("config.toml"))
    }

    /// Load `.env` from the workspace root, falling back to the current dir.
    fn load_dotenv_from_workspace() {
        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let mut dir = PathBuf::from(manifest_dir);
            for _ in 0..3 {
                let env_path = dir.join(".env");
                if env_path.exists() {
                    let _ = dotenvy::from_path(&env_path);
                    return;
                }
                if !dir.pop() {
                    break;
                }
            }
        }

        let _ = dotenvy::dotenv();
    }
}
