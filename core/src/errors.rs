//! Error taxonomy for the sync engine.
//!
//! Transport failures surface as [`BackendError`]. The engine wraps them in a
//! [`SyncError`] naming which fetch failed, then records a cloneable
//! [`ErrorRecord`] in the per-bundle [`ErrorLog`]. Nothing here is ever
//! propagated out of the polling loops.

use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

use crate::content::SummaryTarget;

/// Failure reported by a [`crate::BundleBackend`].
#[derive(Debug, Error)]
pub enum BackendError {
    /// Request never produced a response (connect, TLS, timeout).
    #[error("network error: {0}")]
    Network(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Backend answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// Response body did not have the expected shape.
    #[error("invalid response: {0}")]
    Decode(String),

    /// Request URL could not be built.
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl BackendError {
    pub fn network(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Network(Box::new(source))
    }
}

/// Which fetch failed, and why.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to fetch metadata for bundle {bundle_id}: {source}")]
    MetadataFetch {
        bundle_id: String,
        #[source]
        source: BackendError,
    },

    #[error("failed to fetch contents info for bundle {bundle_id}: {source}")]
    ContentsInfoFetch {
        bundle_id: String,
        #[source]
        source: BackendError,
    },

    #[error("failed to fetch {target} summary for bundle {bundle_id}: {source}")]
    SummaryFetch {
        bundle_id: String,
        target: SummaryTarget,
        #[source]
        source: BackendError,
    },

    /// The metadata document parsed but could not be normalized.
    #[error("malformed metadata for bundle {bundle_id}: {message}")]
    MalformedMetadata { bundle_id: String, message: String },
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MetadataFetch { .. } | Self::MalformedMetadata { .. } => ErrorKind::Metadata,
            Self::ContentsInfoFetch { .. } => ErrorKind::ContentsInfo,
            Self::SummaryFetch { target, .. } => ErrorKind::Summary(*target),
        }
    }

    pub fn bundle_id(&self) -> &str {
        match self {
            Self::MetadataFetch { bundle_id, .. }
            | Self::ContentsInfoFetch { bundle_id, .. }
            | Self::SummaryFetch { bundle_id, .. }
            | Self::MalformedMetadata { bundle_id, .. } => bundle_id,
        }
    }
}

/// Error category exposed to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "target", rename_all = "snake_case")]
pub enum ErrorKind {
    Metadata,
    ContentsInfo,
    Summary(SummaryTarget),
}

impl ErrorKind {
    /// Machine-readable code for logging
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Metadata => "METADATA_FETCH",
            Self::ContentsInfo => "CONTENTS_INFO_FETCH",
            Self::Summary(_) => "SUMMARY_FETCH",
        }
    }
}

/// One recorded failure. Snapshots share these, so they are plain data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub bundle_id: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl From<&SyncError> for ErrorRecord {
    fn from(err: &SyncError) -> Self {
        Self {
            kind: err.kind(),
            bundle_id: err.bundle_id().to_string(),
            message: err.to_string(),
            at: Utc::now(),
        }
    }
}

/// Ordered failures for the bundle currently being synchronized.
///
/// Append-only while the identity stays the same; identical failures are
/// recorded every time they happen.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ErrorLog {
    records: Vec<ErrorRecord>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: ErrorRecord) {
        self.records.push(record);
    }

    /// Called on identity change only.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&ErrorRecord> {
        self.records.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ErrorRecord> {
        self.records.iter()
    }
}

impl<'a> IntoIterator for &'a ErrorLog {
    type Item = &'a ErrorRecord;
    type IntoIter = std::slice::Iter<'a, ErrorRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
