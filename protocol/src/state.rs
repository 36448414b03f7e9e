use serde::Deserialize;
use serde::Serialize;
use std::fmt;

/// Lifecycle state reported in a bundle's `state` attribute.
///
/// Parsing is total: any string the backend sends maps to a variant, with
/// states this client does not know about carried in [`BundleState::Other`].
/// Matching is exact and case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BundleState {
    Uploading,
    Created,
    Staged,
    Making,
    Starting,
    Preparing,
    Running,
    Finalizing,
    WorkerOffline,
    Ready,
    Failed,
    Killed,
    Other(String),
}

impl BundleState {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Uploading => "uploading",
            Self::Created => "created",
            Self::Staged => "staged",
            Self::Making => "making",
            Self::Starting => "starting",
            Self::Preparing => "preparing",
            Self::Running => "running",
            Self::Finalizing => "finalizing",
            Self::WorkerOffline => "worker_offline",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Killed => "killed",
            Self::Other(raw) => raw,
        }
    }
}

impl From<&str> for BundleState {
    fn from(raw: &str) -> Self {
        match raw {
            "uploading" => Self::Uploading,
            "created" => Self::Created,
            "staged" => Self::Staged,
            "making" => Self::Making,
            "starting" => Self::Starting,
            "preparing" => Self::Preparing,
            "running" => Self::Running,
            "finalizing" => Self::Finalizing,
            "worker_offline" => Self::WorkerOffline,
            "ready" => Self::Ready,
            "failed" => Self::Failed,
            "killed" => Self::Killed,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for BundleState {
    fn from(raw: String) -> Self {
        match Self::from(raw.as_str()) {
            Self::Other(_) => Self::Other(raw),
            known => known,
        }
    }
}

impl From<BundleState> for String {
    fn from(state: BundleState) -> Self {
        match state {
            BundleState::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for BundleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
