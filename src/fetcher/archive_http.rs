//! HTTP transport for the archive RPC endpoints
//!
//! Posts the ordinal-keyed payload as the `f.req` form field. Redirects are
//! never followed so block interstitials stay visible to the throttle
//! detector.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, LOCATION};
use reqwest::{redirect, Client};
use std::time::Duration;
use tracing::debug;

use super::retry_formatter::transport_message;
use super::{ArchiveTransport, FetcherError, FetcherResult, RawResponse, RpcRequest};

/// reqwest-backed [`ArchiveTransport`]
#[derive(Debug, Clone)]
pub struct ArchiveHttpClient {
    client: Client,
    base_url: String,
}

impl ArchiveHttpClient {
    /// Create a client for `base_url`
    ///
    /// # Arguments
    /// * `base_url` - Archive origin (e.g., "<https://adstransparency.google.com>")
    /// * `timeout` - Per-call timeout
    ///
    /// # Errors
    /// Returns [`FetcherError::Transport`] if the TLS backend cannot be set up
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> FetcherResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| FetcherError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Full URL of an RPC call
    pub fn url_for(&self, request: &RpcRequest) -> String {
        format!("{}{}?authuser=0", self.base_url, request.endpoint.path())
    }
}

#[async_trait]
impl ArchiveTransport for ArchiveHttpClient {
    async fn send(&self, request: &RpcRequest, headers: &HeaderMap) -> FetcherResult<RawResponse> {
        let url = self.url_for(request);
        let form = [("f.req", request.payload.to_string())];

        debug!("POST {} ({})", url, request.endpoint.label());

        let response = self
            .client
            .post(&url)
            .headers(headers.clone())
            .form(&form)
            .send()
            .await
            .map_err(|e| FetcherError::Transport(transport_message(&e)))?;

        let status = response.status().as_u16();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response
            .text()
            .await
            .map_err(|e| FetcherError::Transport(transport_message(&e)))?;

        Ok(RawResponse {
            status,
            location,
            body,
        })
    }
}
