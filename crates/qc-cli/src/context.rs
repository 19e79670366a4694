use std::path::PathBuf;

use anyhow::Context;
use qc_config::QcConfig;
use qc_engine::DefinitionsLoader;
use qc_store::QcDb;
use tokio_util::sync::CancellationToken;

use crate::bootstrap;

/// Shared application resources initialized once at startup.
pub struct AppContext {
    pub db: QcDb,
    pub config: QcConfig,
    pub project_root: PathBuf,
    /// Cancelled on Ctrl-C.
    pub cancel: CancellationToken,
}

impl AppContext {
    pub async fn init(
        project_root: PathBuf,
        config: QcConfig,
        cancel: CancellationToken,
    ) -> anyhow::Result<Self> {
        let path = bootstrap::store_path(&project_root, &config)?;
        let db = QcDb::open_local(&path)
            .await
            .with_context(|| format!("failed to open visit store at {path}"))?;
        Ok(Self {
            db,
            config,
            project_root,
            cancel,
        })
    }

    /// Rule definitions loader for in-process validation. A relative local
    /// root is taken from the project root.
    pub fn definitions(&self) -> anyhow::Result<DefinitionsLoader> {
        let mut config = self.config.definitions.clone();
        if !config.root_path.is_empty() && PathBuf::from(&config.root_path).is_relative() {
            config.root_path = self
                .project_root
                .join(&config.root_path)
                .to_string_lossy()
                .into_owned();
        }
        DefinitionsLoader::from_config(&config, self.config.coordinator.strict_mode)
            .context("failed to open rule definitions")
    }
}
