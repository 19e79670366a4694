use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Who uploaded a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OriginKind {
    User,
    Job,
    Device,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FileOrigin {
    #[serde(rename = "type")]
    pub kind: OriginKind,
    pub id: String,
}

/// A file attached to a project-level container, as seen by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProjectFile {
    pub id: String,
    pub container_id: String,
    pub name: String,
    pub tags: BTreeSet<String>,
    pub modified: DateTime<Utc>,
    pub origin: Option<FileOrigin>,
}

impl ProjectFile {
    /// True if the file carries every one of `tags`.
    #[must_use]
    pub fn has_tags(&self, tags: &BTreeSet<String>) -> bool {
        tags.is_subset(&self.tags)
    }

    /// Id of the uploading user, if a user uploaded it.
    #[must_use]
    pub fn uploader(&self) -> Option<&str> {
        self.origin
            .as_ref()
            .filter(|o| o.kind == OriginKind::User)
            .map(|o| o.id.as_str())
    }
}
