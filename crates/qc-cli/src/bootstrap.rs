use std::path::{Path, PathBuf};

use anyhow::Context;
use figment::providers::{Env, Format, Toml};
use qc_config::QcConfig;

/// Directory marking a qcflow project root.
pub const PROJECT_DIR: &str = ".qcflow";

/// Resolve the project root from `--project` or by walking up from the
/// current directory. Without a `.qcflow` directory anywhere above, the
/// current directory is used.
pub fn resolve_project_root(project_override: Option<&str>) -> anyhow::Result<PathBuf> {
    if let Some(path) = project_override {
        let explicit = PathBuf::from(path);
        if explicit.file_name().and_then(|n| n.to_str()) == Some(PROJECT_DIR) {
            return explicit
                .parent()
                .map(Path::to_path_buf)
                .context("invalid --project path: '.qcflow' directory has no parent");
        }
        if explicit.is_dir() {
            return Ok(explicit);
        }
        anyhow::bail!(
            "invalid --project '{}': directory does not exist",
            explicit.display()
        );
    }

    let cwd = std::env::current_dir().context("failed to read current directory")?;
    Ok(find_project_root(&cwd).unwrap_or(cwd))
}

fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(PROJECT_DIR).is_dir())
        .map(Path::to_path_buf)
}

/// Load `.env` from the project root, then the layered configuration with the
/// project's `.qcflow/config.toml` above the user and working-directory files.
pub fn load_config(project_root: &Path) -> anyhow::Result<QcConfig> {
    let env_path = project_root.join(".env");
    if env_path.exists() {
        dotenvy::from_path(&env_path)
            .with_context(|| format!("failed to load dotenv file at {}", env_path.display()))?;
    } else {
        let _ = dotenvy::dotenv();
    }

    let mut figment = QcConfig::figment();
    let project_config = project_root.join(PROJECT_DIR).join("config.toml");
    if project_config.exists() {
        figment = figment
            .merge(Toml::file(project_config))
            .merge(Env::prefixed("QCFLOW_").split("__"));
    }
    let config: QcConfig = figment.extract().context("failed to load qcflow configuration")?;
    config.validate().context("invalid qcflow configuration")?;
    Ok(config)
}

/// Store path resolved against the project root. `:memory:` is kept as is.
pub fn store_path(project_root: &Path, config: &QcConfig) -> anyhow::Result<String> {
    if config.store.is_in_memory() {
        return Ok(config.store.path.clone());
    }
    let path = project_root.join(&config.store.path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    Ok(path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_root_from_nested_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(PROJECT_DIR)).unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(find_project_root(&nested).as_deref(), Some(dir.path()));
    }

    #[test]
    fn explicit_qcflow_dir_resolves_to_parent() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join(PROJECT_DIR);
        let root = resolve_project_root(marker.to_str()).unwrap();
        assert_eq!(root, dir.path());
    }

    #[test]
    fn missing_project_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(resolve_project_root(missing.to_str()).is_err());
    }

    #[test]
    fn relative_store_path_is_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let path = store_path(dir.path(), &QcConfig::default()).unwrap();
        assert!(path.ends_with("qcflow.db"));
        assert!(dir.path().join(PROJECT_DIR).is_dir());
    }
}
