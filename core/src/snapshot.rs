use serde::Serialize;

use crate::BundleId;
use crate::Generation;
use crate::content::ContentSummary;
use crate::errors::ErrorLog;
use crate::normalize::BundleMetadataView;

/// Immutable view handed to the presentation layer after every fetch
/// completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BundleSnapshot {
    pub bundle_id: Option<BundleId>,
    pub generation: Generation,
    pub metadata: Option<BundleMetadataView>,
    pub content: ContentSummary,
    pub errors: ErrorLog,
    /// Whether any fetch is still scheduled or in flight. Goes false once the
    /// bundle is terminal and the last outstanding fetch has landed.
    pub polling: bool,
}

/// What the presentation layer should render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ViewState {
    /// No metadata yet: render a placeholder, not an error.
    Loading,
    /// Private bundle: render a restricted notice instead of content.
    Restricted,
    Ready,
}

impl BundleSnapshot {
    pub(crate) fn for_bundle(bundle_id: BundleId, generation: Generation) -> Self {
        Self {
            bundle_id: Some(bundle_id),
            generation,
            polling: true,
            ..Self::default()
        }
    }

    pub fn view(&self) -> ViewState {
        match &self.metadata {
            None => ViewState::Loading,
            Some(metadata) if metadata.is_private() => ViewState::Restricted,
            Some(_) => ViewState::Ready,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.view() == ViewState::Ready
    }

    pub fn is_restricted(&self) -> bool {
        self.view() == ViewState::Restricted
    }

    /// Nothing will change without a manual refresh.
    pub fn is_settled(&self) -> bool {
        !self.polling && self.metadata.is_some()
    }
}
