use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to a container in the project hierarchy.
///
/// `Project → Subject → Session → Acquisition`; files live on acquisitions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum ContainerRef {
    Project(String),
    Subject(String),
    Session(String),
    Acquisition(String),
}

impl ContainerRef {
    /// Container kind as stored in the job ledger.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Project(_) => "project",
            Self::Subject(_) => "subject",
            Self::Session(_) => "session",
            Self::Acquisition(_) => "acquisition",
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Project(id) | Self::Subject(id) | Self::Session(id) | Self::Acquisition(id) => {
                id
            }
        }
    }

    /// Rebuild a reference from its stored kind and id.
    #[must_use]
    pub fn from_parts(kind: &str, id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        match kind {
            "project" => Some(Self::Project(id)),
            "subject" => Some(Self::Subject(id)),
            "session" => Some(Self::Session(id)),
            "acquisition" => Some(Self::Acquisition(id)),
            _ => None,
        }
    }
}

impl fmt::Display for ContainerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.kind(), self.id())
    }
}
