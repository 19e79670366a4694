use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::keys;

/// Admission settings for one module.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ModuleConfig {
    /// Packets that mark an initial visit.
    #[serde(default)]
    pub initial_packets: Vec<String>,
    #[serde(default)]
    pub followup_packets: Vec<String>,
    /// Accepted form versions, e.g. `"4.0"`.
    #[serde(default)]
    pub versions: Vec<String>,
    #[serde(default = "default_date_field")]
    pub date_field: String,
    /// Module label in the legacy store. Defaults to the module's own label.
    #[serde(default)]
    pub legacy_module: Option<String>,
    /// Date field in the legacy store. Defaults to `date_field`.
    #[serde(default)]
    pub legacy_date: Option<String>,
}

fn default_date_field() -> String {
    keys::VISITDATE.to_string()
}

impl ModuleConfig {
    #[must_use]
    pub fn legacy_module_or<'a>(&'a self, label: &'a str) -> &'a str {
        self.legacy_module.as_deref().unwrap_or(label)
    }

    #[must_use]
    pub fn legacy_date_field(&self) -> &str {
        self.legacy_date.as_deref().unwrap_or(&self.date_field)
    }

    #[must_use]
    pub fn is_initial_packet(&self, packet: &str) -> bool {
        self.initial_packets.iter().any(|p| p.eq_ignore_ascii_case(packet))
    }

    #[must_use]
    pub fn is_followup_packet(&self, packet: &str) -> bool {
        self.followup_packets.iter().any(|p| p.eq_ignore_ascii_case(packet))
    }

    /// Whether a form version is accepted, comparing numerically when possible.
    #[must_use]
    pub fn accepts_version(&self, version: &crate::FieldValue) -> bool {
        self.versions
            .iter()
            .any(|v| version.loose_eq(&crate::FieldValue::from(v.as_str())))
    }
}
