//! Archive fetchers
//!
//! - [`archive_http`] - reqwest transport for the two RPC endpoints
//! - [`session`] - per-run request state machine (identity, throttle, backoff)
//! - [`throttle`] - block-signal detection over a rolling window
//! - [`pagination`] - batch search client
//! - [`lookup`] - per-creative fallback fetcher
//! - [`codec`] - ordinal-keyed encoding, decoding and creative normalization
//! - [`retry_formatter`] - retry log messages

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::Value;

pub mod archive_http;
pub mod codec;
pub mod lookup;
pub mod pagination;
pub mod retry_formatter;
pub mod session;
pub mod throttle;

pub use archive_http::ArchiveHttpClient;
pub use lookup::FallbackFetcher;
pub use pagination::{BatchSearchClient, PageResult, PaginationCursor};
pub use session::ArchiveSession;
pub use throttle::{ThrottleDetector, ThrottleSignal, ThrottleState};

/// Fetcher errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetcherError {
    /// Network failure or timeout
    #[error("transport error: {0}")]
    Transport(String),

    /// Response flagged as a rate-limit or block interstitial
    #[error("throttled: {0}")]
    Throttled(String),

    /// Retryable non-success HTTP status
    #[error("HTTP error: {0}")]
    Http(u16),

    /// Non-retryable rejection (bad request, not found)
    #[error("request rejected with status {0}")]
    Rejected(u16),

    /// Whole page body could not be parsed
    #[error("page decode error: {0}")]
    PageDecode(String),

    /// One item inside an otherwise good page could not be parsed
    #[error("item decode error: {0}")]
    ItemDecode(String),

    /// Request could not be built
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Shutdown requested
    #[error("cancelled")]
    Cancelled,
}

impl FetcherError {
    /// Whether the request state machine should back off and retry
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetcherError::Transport(_)
                | FetcherError::Throttled(_)
                | FetcherError::Http(_)
                | FetcherError::PageDecode(_)
        )
    }
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// The two archive RPC endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Paged creative search
    SearchCreatives,
    /// Single creative lookup
    GetCreativeById,
}

impl Endpoint {
    /// Request path relative to the archive origin
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::SearchCreatives => "/anji/_/rpc/SearchService/SearchCreatives",
            Endpoint::GetCreativeById => "/anji/_/rpc/LookupService/GetCreativeById",
        }
    }

    /// Short label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Endpoint::SearchCreatives => "search",
            Endpoint::GetCreativeById => "lookup",
        }
    }
}

/// One ordinal-keyed RPC call
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    /// Target endpoint
    pub endpoint: Endpoint,
    /// Ordinal-keyed JSON payload, sent as `f.req`
    pub payload: Value,
}

/// Raw response as seen by the throttle detector and decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP status code
    pub status: u16,
    /// `Location` header of redirects
    pub location: Option<String>,
    /// Response body text
    pub body: String,
}

impl RawResponse {
    /// 200 response with `body`
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            location: None,
            body: body.into(),
        }
    }

    /// Bodyless response with `status`
    pub fn status(status: u16) -> Self {
        Self {
            status,
            location: None,
            body: String::new(),
        }
    }

    /// Redirect to `location`
    pub fn redirect(status: u16, location: impl Into<String>) -> Self {
        Self {
            status,
            location: Some(location.into()),
            body: String::new(),
        }
    }

    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport for archive RPC calls
///
/// The HTTP implementation is [`ArchiveHttpClient`]; tests substitute scripted
/// transports. Implementations must not follow redirects and must report
/// timeouts as [`FetcherError::Transport`].
#[async_trait]
pub trait ArchiveTransport: Send + Sync {
    /// Send one request with the given headers
    async fn send(&self, request: &RpcRequest, headers: &HeaderMap) -> FetcherResult<RawResponse>;
}
