//! Shapes returned by `/rest/bundles/{id}/contents/info/`.

use serde::Deserialize;
use serde::Serialize;

/// The info endpoint wraps its payload in a `data` member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentsInfoEnvelope {
    #[serde(default)]
    pub data: Option<ContentsInfo>,
}

/// Target info for the bundle root (or any path inside it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentsInfo {
    #[serde(rename = "type")]
    pub kind: TargetKind,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub perm: Option<u32>,
    /// Link target, present only for `link` entries.
    #[serde(default)]
    pub link: Option<String>,
    /// Child entries, present only for directories fetched with `depth >= 1`.
    #[serde(default)]
    pub contents: Vec<ContentsEntry>,
}

impl ContentsInfo {
    pub fn has_entry(&self, name: &str) -> bool {
        self.contents.iter().any(|entry| entry.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentsEntry {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: Option<TargetKind>,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TargetKind {
    File,
    Link,
    Directory,
    /// Anything else the backend may report. Carries no content action.
    #[serde(other)]
    Unknown,
}
