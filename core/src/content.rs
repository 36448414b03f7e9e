//! Contents synchronization.
//!
//! One contents fetch is a small pipeline: root target info first, then
//! either the root blob summary (file/link) or the `stdout`/`stderr`
//! summaries (directory). The whole pipeline runs under the contents guard
//! and its result is applied in one step.

use bundlesync_protocol::TargetKind;
use serde::Serialize;

use crate::BundleBackend;
use crate::BundleId;
use crate::config::SummaryErrorPolicy;
use crate::errors::ErrorLog;
use crate::errors::ErrorRecord;
use crate::errors::SyncError;

/// Blob whose summary the engine fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SummaryTarget {
    /// The bundle root itself, when it is a file or link.
    File,
    Stdout,
    Stderr,
}

impl SummaryTarget {
    pub fn path(self) -> &'static str {
        match self {
            Self::File => "/",
            Self::Stdout => "/stdout",
            Self::Stderr => "/stderr",
        }
    }

    /// Directory entry name, for the directory-root targets.
    fn entry_name(self) -> Option<&'static str> {
        match self {
            Self::File => None,
            Self::Stdout => Some("stdout"),
            Self::Stderr => Some("stderr"),
        }
    }
}

/// Content-derived fields of the view. `None` means "nothing to show", which
/// is a normal state and not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContentSummary {
    pub file_contents: Option<String>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

impl ContentSummary {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        self.file_contents.is_none() && self.stdout.is_none() && self.stderr.is_none()
    }

    fn slot(&mut self, target: SummaryTarget) -> &mut Option<String> {
        match target {
            SummaryTarget::File => &mut self.file_contents,
            SummaryTarget::Stdout => &mut self.stdout,
            SummaryTarget::Stderr => &mut self.stderr,
        }
    }
}

/// Result of one stdout/stderr sub-fetch.
#[derive(Debug)]
pub enum SubFetch {
    /// No directory entry with that name; nothing was requested.
    Absent,
    Fetched(String),
    Failed(SyncError),
}

/// Everything one contents fetch produced, ready to apply.
#[derive(Debug)]
pub enum ContentsOutcome {
    InfoFailed(SyncError),
    /// Info request succeeded but carried no target.
    NoTarget,
    File(Result<String, SyncError>),
    Directory { stdout: SubFetch, stderr: SubFetch },
    Unsupported(TargetKind),
}

/// Run the contents pipeline for `bundle_id`.
pub async fn fetch_contents(backend: &dyn BundleBackend, bundle_id: &BundleId) -> ContentsOutcome {
    let info = match backend.fetch_contents_info(bundle_id).await {
        Ok(Some(info)) => info,
        Ok(None) => return ContentsOutcome::NoTarget,
        Err(source) => {
            return ContentsOutcome::InfoFailed(SyncError::ContentsInfoFetch {
                bundle_id: bundle_id.to_string(),
                source,
            });
        }
    };

    match info.kind {
        TargetKind::File | TargetKind::Link => {
            ContentsOutcome::File(fetch_summary(backend, bundle_id, SummaryTarget::File).await)
        }
        TargetKind::Directory => {
            let fetch_entry = |target: SummaryTarget| {
                let present = target
                    .entry_name()
                    .is_some_and(|name| info.has_entry(name));
                async move {
                    if !present {
                        return SubFetch::Absent;
                    }
                    match fetch_summary(backend, bundle_id, target).await {
                        Ok(blob) => SubFetch::Fetched(blob),
                        Err(err) => SubFetch::Failed(err),
                    }
                }
            };
            let (stdout, stderr) = tokio::join!(
                fetch_entry(SummaryTarget::Stdout),
                fetch_entry(SummaryTarget::Stderr)
            );
            ContentsOutcome::Directory { stdout, stderr }
        }
        TargetKind::Unknown => ContentsOutcome::Unsupported(info.kind),
    }
}

async fn fetch_summary(
    backend: &dyn BundleBackend,
    bundle_id: &BundleId,
    target: SummaryTarget,
) -> Result<String, SyncError> {
    backend
        .fetch_summary(bundle_id, target.path())
        .await
        .map_err(|source| SyncError::SummaryFetch {
            bundle_id: bundle_id.to_string(),
            target,
            source,
        })
}

/// Fold a contents outcome into the view.
pub fn apply_contents_outcome(
    content: &mut ContentSummary,
    errors: &mut ErrorLog,
    outcome: ContentsOutcome,
    policy: SummaryErrorPolicy,
) {
    match outcome {
        ContentsOutcome::InfoFailed(err) => {
            tracing::warn!(error = %err, "contents info fetch failed");
            errors.push(ErrorRecord::from(&err));
            content.clear();
        }
        ContentsOutcome::NoTarget => {
            tracing::debug!("contents info carried no target; leaving contents unchanged");
        }
        ContentsOutcome::File(Ok(blob)) => {
            *content = ContentSummary {
                file_contents: Some(blob),
                stdout: None,
                stderr: None,
            };
        }
        ContentsOutcome::File(Err(err)) => {
            tracing::warn!(error = %err, "root summary fetch failed");
            if policy == SummaryErrorPolicy::Record {
                errors.push(ErrorRecord::from(&err));
                content.clear();
            }
        }
        ContentsOutcome::Directory { stdout, stderr } => {
            content.file_contents = None;
            apply_sub_fetch(content, errors, SummaryTarget::Stdout, stdout, policy);
            apply_sub_fetch(content, errors, SummaryTarget::Stderr, stderr, policy);
        }
        ContentsOutcome::Unsupported(kind) => {
            tracing::warn!(%kind, "no content action for bundle root type");
        }
    }
}

fn apply_sub_fetch(
    content: &mut ContentSummary,
    errors: &mut ErrorLog,
    target: SummaryTarget,
    result: SubFetch,
    policy: SummaryErrorPolicy,
) {
    let slot = content.slot(target);
    match result {
        SubFetch::Absent => *slot = None,
        SubFetch::Fetched(blob) => *slot = Some(blob),
        SubFetch::Failed(err) => {
            tracing::warn!(error = %err, %target, "summary fetch failed");
            if policy == SummaryErrorPolicy::Record {
                errors.push(ErrorRecord::from(&err));
                *slot = None;
            }
        }
    }
}
