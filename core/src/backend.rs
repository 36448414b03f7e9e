use async_trait::async_trait;
use bundlesync_protocol::ContentsInfo;
use bundlesync_protocol::JsonApiDocument;

use crate::BundleId;
use crate::errors::BackendError;

/// Transport seam for the sync engine.
///
/// The HTTP implementation lives in `bundlesync-backend-client`; the engine
/// only depends on this trait so tests can script responses.
#[async_trait]
pub trait BundleBackend: Send + Sync {
    /// Bundle metadata with display metadata and the owner, group permission
    /// and host worksheet relationships included.
    async fn fetch_bundle(&self, bundle_id: &BundleId) -> Result<JsonApiDocument, BackendError>;

    /// Shallow (`depth=1`) target info for the bundle root. `Ok(None)` when the
    /// backend answered without a `data` member.
    async fn fetch_contents_info(
        &self,
        bundle_id: &BundleId,
    ) -> Result<Option<ContentsInfo>, BackendError>;

    /// Head/tail summary of the blob at `path` (`/`, `/stdout`, `/stderr`).
    async fn fetch_summary(&self, bundle_id: &BundleId, path: &str) -> Result<String, BackendError>;
}
