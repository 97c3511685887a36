//! HTTP client for the preview-generation service.
//!
//! Wraps the `generate-style-preview` endpoint using [`reqwest`]. The
//! idempotency key travels both in the body and as an `Idempotency-Key`
//! header so the service can dedupe at either layer.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;
use crate::provider::{PreviewProvider, PreviewRequest, PreviewResult};

/// Path of the preview endpoint relative to the base URL.
const PREVIEW_PATH: &str = "generate-style-preview";

/// Header carrying the idempotency key.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// HTTP client for the preview service.
pub struct HttpPreviewProvider {
    client: reqwest::Client,
    base_url: String,
    /// Project-level key some hosted backends require on every call.
    api_key: Option<String>,
}

impl HttpPreviewProvider {
    /// Create a client for a preview service.
    ///
    /// * `base_url` - e.g. `https://project.example/functions/v1`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a client reusing an existing [`reqwest::Client`]
    /// (useful for sharing one connection pool across services).
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send the request and decode the response, without cancellation.
    async fn send(&self, request: &PreviewRequest) -> Result<PreviewResult, ProviderError> {
        let mut builder = self
            .client
            .post(format!("{}/{PREVIEW_PATH}", self.base_url))
            .json(request);

        if let Some(token) = &request.access_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(key) = &request.idempotency_key {
            builder = builder.header(IDEMPOTENCY_HEADER, key);
        }
        if let Some(api_key) = &self.api_key {
            builder = builder.header("apikey", api_key);
        }

        let response = builder.send().await?;
        parse_response(response).await
    }
}

#[async_trait]
impl PreviewProvider for HttpPreviewProvider {
    async fn fetch_preview(
        &self,
        request: PreviewRequest,
        cancel: CancellationToken,
    ) -> Result<PreviewResult, ProviderError> {
        if cancel.is_cancelled() {
            return Err(ProviderError::Aborted);
        }

        tracing::debug!(
            style_id = %request.style_id,
            orientation = %request.orientation,
            has_idempotency_key = request.idempotency_key.is_some(),
            "Requesting preview",
        );

        // Dropping the in-flight reqwest future closes the connection.
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(style_id = %request.style_id, "Preview request aborted");
                Err(ProviderError::Aborted)
            }
            result = self.send(&request) => result,
        }
    }
}

// ---- response helpers ----

/// Ensure the response has a success status code. Returns the response
/// unchanged on success, or a [`ProviderError::Api`] containing the status
/// and body text on failure.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(ProviderError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// Parse a successful JSON response body into the expected type.
pub(crate) async fn parse_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    let response = ensure_success(response).await?;
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ProviderError::Decode(e.to_string()))
}
