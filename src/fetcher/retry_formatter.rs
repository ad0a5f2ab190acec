//! Retry message formatting for the archive request state machine.
//!
//! Keeps retry, recovery and failure log lines consistent across the batch
//! search and per-creative lookup paths.

use reqwest::Error as ReqwestError;
use std::time::Duration;

use super::FetcherError;

/// Classification of retry errors for log messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryErrorType {
    /// Request exceeded the per-call timeout
    NetworkTimeout,
    /// Connection refused, DNS failure, or other offline scenarios
    NetworkOffline,
    /// Rate-limit status or block interstitial
    Throttled,
    /// HTTP 5xx server error
    ServerError(u16),
    /// Other unexpected non-success status
    UnexpectedStatus(u16),
    /// Body was not a decodable page
    MalformedBody,
    /// Request rejected outright (400/404)
    Rejected(u16),
    /// Generic fallback when no better classification fits
    NetworkGeneric,
}

impl RetryErrorType {
    /// Short description used inside retry log messages.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "network timeout",
            Self::NetworkOffline => "connection failed",
            Self::Throttled => "rate limited",
            Self::ServerError(code) => match code {
                500 => "internal server error",
                502 => "bad gateway",
                503 => "service unavailable",
                504 => "gateway timeout",
                _ => "server error",
            },
            Self::UnexpectedStatus(_) => "unexpected status",
            Self::MalformedBody => "malformed response body",
            Self::Rejected(code) => match code {
                404 => "creative not found",
                _ => "request rejected",
            },
            Self::NetworkGeneric => "network error",
        }
    }

    /// Suggested remediation shown with final failures.
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "Check your network connection and firewall settings",
            Self::NetworkOffline => "Verify internet connectivity and DNS resolution",
            Self::Throttled => "Lower --concurrency or wait before scraping this advertiser again",
            Self::ServerError(_) | Self::UnexpectedStatus(_) => {
                "The archive may be experiencing issues, try again later"
            }
            Self::MalformedBody => {
                "The response encoding may have changed; inspect it and supply --field-table"
            }
            Self::Rejected(_) => "Check the advertiser, creative and region ids",
            Self::NetworkGeneric => "Check network connectivity and try again",
        }
    }

    /// Classify a fetcher error.
    ///
    /// Transport messages built by [`transport_message`] start with the
    /// description of their kind, which is how timeouts are told apart.
    pub fn from_error(error: &FetcherError) -> Self {
        match error {
            FetcherError::Transport(message) => {
                if message.starts_with(Self::NetworkTimeout.description()) {
                    Self::NetworkTimeout
                } else if message.starts_with(Self::NetworkOffline.description()) {
                    Self::NetworkOffline
                } else {
                    Self::NetworkGeneric
                }
            }
            FetcherError::Throttled(_) => Self::Throttled,
            FetcherError::Http(code) if (500..600).contains(code) => Self::ServerError(*code),
            FetcherError::Http(code) => Self::UnexpectedStatus(*code),
            FetcherError::Rejected(code) => Self::Rejected(*code),
            FetcherError::PageDecode(_) | FetcherError::ItemDecode(_) => Self::MalformedBody,
            FetcherError::InvalidRequest(_) | FetcherError::Cancelled => Self::NetworkGeneric,
        }
    }
}

/// Context for formatting retry messages.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Current attempt number (1-based)
    pub attempt: usize,
    /// Maximum number of attempts configured
    pub max_attempts: usize,
    /// Type of error that triggered retry
    pub error_type: RetryErrorType,
    /// Backoff duration until next attempt
    pub backoff_duration: Duration,
    /// Advertiser being scraped
    pub advertiser_id: String,
    /// Creative being looked up, for fallback calls
    pub creative_id: Option<String>,
    /// Original error message for details
    pub error_message: String,
    /// Endpoint label
    pub endpoint: String,
}

impl RetryContext {
    /// Build a context for `error` on the given attempt.
    pub fn new(
        attempt: usize,
        max_attempts: usize,
        error: &FetcherError,
        backoff_duration: Duration,
        advertiser_id: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            attempt,
            max_attempts,
            error_type: RetryErrorType::from_error(error),
            backoff_duration,
            advertiser_id: advertiser_id.into(),
            creative_id: None,
            error_message: error.to_string(),
            endpoint: endpoint.into(),
        }
    }

    /// Build a context for an attempt that succeeded after earlier failures.
    pub fn recovered(
        attempt: usize,
        max_attempts: usize,
        advertiser_id: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            attempt,
            max_attempts,
            error_type: RetryErrorType::NetworkGeneric,
            backoff_duration: Duration::ZERO,
            advertiser_id: advertiser_id.into(),
            creative_id: None,
            error_message: String::new(),
            endpoint: endpoint.into(),
        }
    }

    /// Attach the creative being looked up.
    pub fn with_creative(mut self, creative_id: Option<&str>) -> Self {
        self.creative_id = creative_id.map(str::to_string);
        self
    }

    /// Format standardized retry message with attempt counters and context.
    pub fn format_retry(&self) -> String {
        let mut message = format!(
            "Retrying (attempt {}/{}) after {} - waiting {:.1} seconds...",
            self.attempt,
            self.max_attempts,
            self.error_type.description(),
            self.backoff_duration.as_secs_f64()
        );
        self.append_target(&mut message);
        message
    }

    /// Format retry success message when a previous attempt eventually works.
    pub fn format_success(&self) -> String {
        let mut message = format!(
            "Retry attempt {}/{} succeeded - resuming scrape",
            self.attempt, self.max_attempts
        );
        self.append_target(&mut message);
        message
    }

    /// Format final failure summary with actionable suggestions.
    pub fn format_failure(&self) -> String {
        let mut lines = vec![
            format!(
                "[FAILED] {} request failed after {} attempts",
                self.endpoint, self.attempt
            ),
            format!("  Last error: {}", self.error_message),
        ];

        let advertiser = if self.advertiser_id.is_empty() {
            "unknown"
        } else {
            &self.advertiser_id
        };
        lines.push(format!("  Advertiser: {advertiser}"));
        if let Some(creative_id) = &self.creative_id {
            lines.push(format!("  Creative: {creative_id}"));
        }
        lines.push("  Suggestions:".to_string());
        for suggestion in self.format_suggestions() {
            lines.push(format!("    - {suggestion}"));
        }

        lines.join("\n")
    }

    /// Derive suggestions tailored to the current retry context.
    pub fn format_suggestions(&self) -> Vec<String> {
        vec![
            self.error_type.suggestion().to_string(),
            format!("Try increasing --max-retries (current: {})", self.max_attempts.saturating_sub(1)),
        ]
    }

    fn append_target(&self, buffer: &mut String) {
        if self.advertiser_id.is_empty() {
            return;
        }
        buffer.push_str(" (");
        buffer.push_str(&self.advertiser_id);
        if let Some(creative_id) = &self.creative_id {
            buffer.push('/');
            buffer.push_str(creative_id);
        }
        buffer.push(')');
    }
}

/// Classify a reqwest send error.
pub fn extract_error_type(err: &ReqwestError) -> RetryErrorType {
    if err.is_timeout() {
        RetryErrorType::NetworkTimeout
    } else if err.is_connect() {
        RetryErrorType::NetworkOffline
    } else {
        RetryErrorType::NetworkGeneric
    }
}

/// Transport error message prefixed with its classification.
pub fn transport_message(err: &ReqwestError) -> String {
    format!("{}: {err}", extract_error_type(err).description())
}
