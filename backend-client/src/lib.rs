//! HTTP transport for the bundle sync engine.
//!
//! [`BackendClient`] talks to the bundle REST API rooted at
//! `{server_url}/rest` and implements [`BundleBackend`] so it can be handed
//! straight to a `SyncEngine`.

use async_trait::async_trait;
use bundlesync_core::BackendError;
use bundlesync_core::BundleBackend;
use bundlesync_core::BundleId;
use bundlesync_core::SyncConfig;
use bundlesync_protocol::ContentsInfo;
use bundlesync_protocol::ContentsInfoEnvelope;
use bundlesync_protocol::JsonApiDocument;
use bundlesync_protocol::endpoints;
use reqwest::RequestBuilder;
use reqwest::Response;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Marker inserted between the head and tail of a truncated summary.
pub const TRUNCATION_TEXT: &str = "\n... [truncated] ...\n\n";

const USER_AGENT: &str = concat!("bundlesync/", env!("CARGO_PKG_VERSION"));

/// JSON:API error document returned with non-success statuses.
#[derive(Debug, Deserialize)]
struct ErrorDocument {
    #[serde(default)]
    errors: Vec<ErrorObject>,
}

#[derive(Debug, Deserialize)]
struct ErrorObject {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    rest_root: String,
    auth_token: Option<String>,
    head_lines: u32,
    tail_lines: u32,
}

impl BackendClient {
    pub fn new(config: &SyncConfig) -> Result<Self, BackendError> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(BackendError::network)?;

        Ok(Self {
            http,
            rest_root: config.rest_root(),
            auth_token: config.auth_token.clone(),
            head_lines: config.summary_head_lines,
            tail_lines: config.summary_tail_lines,
        })
    }

    pub fn rest_root(&self) -> &str {
        &self.rest_root
    }

    fn get(&self, path: &str) -> RequestBuilder {
        let url = format!("{}/{path}", self.rest_root);
        let request = self.http.get(url);
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, BackendError> {
        let response = request.send().await.map_err(|err| {
            if err.is_builder() {
                BackendError::InvalidUrl(err.to_string())
            } else {
                BackendError::network(err)
            }
        })?;

        let status = response.status();
        tracing::debug!(url = %response.url(), %status, "backend response");
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(BackendError::Status {
            status: status.as_u16(),
            message: status_message(&body),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BackendError> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|err| BackendError::Decode(err.to_string()))
    }
}

#[async_trait]
impl BundleBackend for BackendClient {
    async fn fetch_bundle(&self, bundle_id: &BundleId) -> Result<JsonApiDocument, BackendError> {
        let request = self
            .get(&endpoints::bundle_path(bundle_id.as_str()))
            .query(&endpoints::metadata_query());
        self.get_json(request).await
    }

    async fn fetch_contents_info(
        &self,
        bundle_id: &BundleId,
    ) -> Result<Option<ContentsInfo>, BackendError> {
        let request = self
            .get(&endpoints::contents_info_path(bundle_id.as_str()))
            .query(&endpoints::contents_info_query());
        let envelope: ContentsInfoEnvelope = self.get_json(request).await?;
        Ok(envelope.data)
    }

    async fn fetch_summary(&self, bundle_id: &BundleId, path: &str) -> Result<String, BackendError> {
        let request = self
            .get(&endpoints::blob_path(bundle_id.as_str(), path))
            .header(ACCEPT, "text/plain")
            .query(&[
                ("head", self.head_lines.to_string()),
                ("tail", self.tail_lines.to_string()),
                ("truncation_text", TRUNCATION_TEXT.to_string()),
            ]);
        self.send(request)
            .await?
            .text()
            .await
            .map_err(|err| BackendError::Decode(err.to_string()))
    }
}

/// Best human-readable message for an error body.
fn status_message(body: &str) -> String {
    serde_json::from_str::<ErrorDocument>(body)
        .ok()
        .and_then(|doc| doc.errors.into_iter().next())
        .and_then(|error| error.detail.or(error.title))
        .unwrap_or_else(|| body.trim().to_string())
}
