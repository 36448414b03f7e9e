//! Lifecycle classification: may this bundle still change?

use bundlesync_protocol::BundleState;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StateClass {
    /// The record may still change; keep polling.
    Transient,
    /// No further change is expected.
    Terminal,
}

/// Classify a raw lifecycle state string.
///
/// Exact, case-sensitive match. Only `ready`, `failed` and `killed` are
/// terminal; everything else, including states added to the backend later,
/// keeps polling alive.
pub fn classify(state: &str) -> StateClass {
    classify_state(&BundleState::from(state))
}

pub fn classify_state(state: &BundleState) -> StateClass {
    match state {
        BundleState::Ready | BundleState::Failed | BundleState::Killed => StateClass::Terminal,
        BundleState::Uploading
        | BundleState::Created
        | BundleState::Staged
        | BundleState::Making
        | BundleState::Starting
        | BundleState::Preparing
        | BundleState::Running
        | BundleState::Finalizing
        | BundleState::WorkerOffline
        | BundleState::Other(_) => StateClass::Transient,
    }
}
