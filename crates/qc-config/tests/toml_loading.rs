//! Integration tests for TOML configuration loading.
//!
//! Uses `figment::Jail` for sandboxed files and env vars.

use figment::{
    Figment, Jail,
    providers::{Env, Format, Serialized, Toml},
};
use pretty_assertions::assert_eq;
use qc_config::{DefinitionsBackend, QcConfig, RecheckPolicy, ValidationMode};

#[test]
fn loads_module_configs_from_toml() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
[preprocess]
primary_key = "ptid"

[preprocess.modules.UDS]
initial_packets = ["I", "I4"]
followup_packets = ["F"]
versions = ["4.0"]
date_field = "visitdate"

[preprocess.modules.FTLD]
initial_packets = ["IF"]
followup_packets = ["FF"]
versions = ["3.0", "3.1"]
legacy_module = "FTD"
legacy_date = "vstdate"
"#,
        )?;

        let config: QcConfig = Figment::from(Serialized::defaults(QcConfig::default()))
            .merge(Toml::file("config.toml"))
            .extract()?;

        let uds = config.preprocess.module("uds").expect("UDS configured");
        assert_eq!(uds.initial_packets, vec!["I", "I4"]);
        assert_eq!(uds.legacy_module_or("UDS"), "UDS");

        let ftld = config.preprocess.module("FTLD").expect("FTLD configured");
        assert_eq!(ftld.date_field, "visitdate");
        assert_eq!(ftld.legacy_module_or("FTLD"), "FTD");
        assert_eq!(ftld.legacy_date_field(), "vstdate");
        assert!(config.validate().is_ok());
        Ok(())
    });
}

#[test]
fn loads_coordinator_and_scheduler_from_toml() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
[coordinator]
check_all = true
recheck_policy = "all"
mode = "inline"

[scheduler]
project_id = "proj-1"
module_order = ["UDS", "FTLD", "LBD"]

[definitions]
backend = "memory"
"#,
        )?;

        let config: QcConfig = Figment::from(Serialized::defaults(QcConfig::default()))
            .merge(Toml::file("config.toml"))
            .extract()?;

        assert!(config.coordinator.check_all);
        assert_eq!(config.coordinator.recheck_policy, RecheckPolicy::All);
        assert_eq!(config.coordinator.mode, ValidationMode::Inline);
        assert_eq!(config.scheduler.module_order, vec!["UDS", "FTLD", "LBD"]);
        assert_eq!(config.scheduler.first_stage(), Some("file-validator"));
        assert_eq!(config.definitions.backend, DefinitionsBackend::Memory);
        assert!(config.validate().is_ok());
        Ok(())
    });
}

#[test]
fn env_beats_toml() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r"
[poll]
interval_secs = 10
",
        )?;
        jail.set_env("QCFLOW_POLL__INTERVAL_SECS", "2");

        let config: QcConfig = Figment::from(Serialized::defaults(QcConfig::default()))
            .merge(Toml::file("config.toml"))
            .merge(Env::prefixed("QCFLOW_").split("__"))
            .extract()?;

        assert_eq!(config.poll.interval_secs, 2);
        assert_eq!(config.poll.grace_secs, 5);
        Ok(())
    });
}

#[test]
fn project_local_file_is_picked_up() {
    Jail::expect_with(|jail| {
        jail.create_dir(".qcflow")?;
        jail.create_file(
            ".qcflow/config.toml",
            r#"
[store]
path = ":memory:"
"#,
        )?;

        let config = QcConfig::load().expect("config loads");
        assert!(config.store.is_in_memory());
        Ok(())
    });
}

#[test]
fn s3_backend_without_bucket_is_not_configured() {
    Jail::expect_with(|jail| {
        jail.set_env("QCFLOW_DEFINITIONS__BACKEND", "s3");
        let config = QcConfig::load().expect("config loads");
        assert!(config.validate().is_err());
        Ok(())
    });
}
