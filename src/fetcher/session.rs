//! Request state machine for one scrape run
//!
//! Every archive call of a run goes through [`ArchiveSession::execute`]:
//!
//! ```text
//! Idle -> Sent -> Success
//!              -> Throttled | TransportError -> Backoff(attempt + 1) -> Sent
//!                                            -> Failed   (attempt == max_retries)
//! ```
//!
//! The session owns the run's [`IdentityProvider`] and [`ThrottleDetector`];
//! nothing in it is shared with other runs.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::retry_formatter::RetryContext;
use super::throttle::{ThrottleDetector, ThrottleSignal};
use super::{ArchiveTransport, FetcherError, FetcherResult, RawResponse, RpcRequest};
use crate::identity::IdentityProvider;
use crate::metrics::{self, RequestMetrics};
use crate::scraper::config::{delay_for, ScrapeConfig};
use crate::shutdown::{SharedShutdown, ShutdownCoordinator};

/// Request counters for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Calls handed to the transport
    pub requests: u64,
    /// Backoff sleeps taken
    pub retries: u64,
    /// Responses flagged by the throttle detector
    pub throttle_incidents: u64,
    /// Identities discarded
    pub identity_resets: u32,
}

/// Per-run owner of identity, throttle state and the retry loop
pub struct ArchiveSession {
    transport: Arc<dyn ArchiveTransport>,
    identity: IdentityProvider,
    throttle: ThrottleDetector,
    shutdown: SharedShutdown,
    advertiser_id: String,
    max_retries: u32,
    request_timeout: Duration,
    reset_pending: bool,
    stats: SessionStats,
}

impl ArchiveSession {
    /// Create the session for one advertiser run
    pub fn new(
        transport: Arc<dyn ArchiveTransport>,
        config: &ScrapeConfig,
        advertiser_id: impl Into<String>,
        shutdown: SharedShutdown,
    ) -> Self {
        Self {
            transport,
            identity: IdentityProvider::new(Arc::clone(&config.identity_pool))
                .with_cooldown(config.reset_cooldown.clone()),
            throttle: ThrottleDetector::new(),
            shutdown,
            advertiser_id: advertiser_id.into(),
            max_retries: config.max_retries,
            request_timeout: config.request_timeout,
            reset_pending: false,
            stats: SessionStats::default(),
        }
    }

    /// Request counters so far
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// The run's identity provider
    pub fn identity(&self) -> &IdentityProvider {
        &self.identity
    }

    /// The run's throttle detector
    pub fn throttle(&self) -> &ThrottleDetector {
        &self.throttle
    }

    /// Whether the next call will first discard the identity
    pub fn reset_pending(&self) -> bool {
        self.reset_pending
    }

    /// Cancellation signal of the run
    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    /// Fixed pause between calls, outside the backoff path
    ///
    /// # Errors
    /// [`FetcherError::Cancelled`] if shutdown is requested before or during
    /// the pause
    pub async fn pause(&self, duration: Duration) -> FetcherResult<()> {
        if self.shutdown.sleep(duration).await {
            Ok(())
        } else {
            Err(FetcherError::Cancelled)
        }
    }

    /// Send `rpc` until it succeeds or the retry budget is spent
    ///
    /// `decode` turns a successful body into the caller's value; a retryable
    /// decode error (a malformed page) is backed off and retried like a
    /// transport error.
    ///
    /// # Arguments
    /// * `rpc` - Request to send
    /// * `creative_id` - Creative being looked up, for log context
    /// * `decode` - Body decoder
    ///
    /// # Errors
    /// The last error once `max_retries` retries are spent, a non-retryable
    /// error immediately, or [`FetcherError::Cancelled`]
    pub async fn execute<T, F>(
        &mut self,
        rpc: &RpcRequest,
        creative_id: Option<&str>,
        decode: F,
    ) -> FetcherResult<T>
    where
        F: Fn(&str) -> FetcherResult<T>,
    {
        let max_attempts = self.max_retries as usize + 1;
        let endpoint = rpc.endpoint.label();

        for attempt in 0..=self.max_retries {
            if self.shutdown.is_shutdown_requested() {
                return Err(FetcherError::Cancelled);
            }

            if self.reset_pending {
                self.reset_identity().await?;
            }

            let err = match self.send_once(rpc, attempt).await {
                Ok(response) => match self.classify(&response, endpoint) {
                    Ok(()) => match decode(&response.body) {
                        Ok(value) => {
                            if attempt > 0 {
                                let ctx = RetryContext::recovered(
                                    attempt as usize + 1,
                                    max_attempts,
                                    &self.advertiser_id,
                                    endpoint,
                                )
                                .with_creative(creative_id);
                                info!("{}", ctx.format_success());
                            }
                            return Ok(value);
                        }
                        Err(e) => e,
                    },
                    Err(e) => e,
                },
                Err(e) => e,
            };

            if !err.is_retryable() {
                return Err(err);
            }

            if attempt < self.max_retries {
                let backoff = delay_for(attempt);
                let ctx = RetryContext::new(
                    attempt as usize + 1,
                    max_attempts,
                    &err,
                    backoff,
                    &self.advertiser_id,
                    endpoint,
                )
                .with_creative(creative_id);
                warn!("{}", ctx.format_retry());

                metrics::record_retry_backoff(backoff, attempt + 1);
                self.stats.retries += 1;

                if !self.shutdown.sleep(backoff).await {
                    return Err(FetcherError::Cancelled);
                }
                continue;
            }

            let ctx = RetryContext::new(
                max_attempts,
                max_attempts,
                &err,
                Duration::ZERO,
                &self.advertiser_id,
                endpoint,
            )
            .with_creative(creative_id);
            error!("{}", ctx.format_failure());
            return Err(err);
        }

        Err(FetcherError::Transport("All retries exhausted".to_string()))
    }

    async fn send_once(&mut self, rpc: &RpcRequest, attempt: u32) -> FetcherResult<RawResponse> {
        let headers = self.identity.get_identity().headers()?;
        let request_metrics = RequestMetrics::start(rpc.endpoint.label(), attempt + 1).await;
        self.stats.requests += 1;

        let sent = tokio::time::timeout(self.request_timeout, self.transport.send(rpc, &headers));
        match sent.await {
            Ok(Ok(response)) => {
                request_metrics.record_complete(response.status);
                Ok(response)
            }
            Ok(Err(e)) => {
                request_metrics.record_network_error();
                Err(e)
            }
            Err(_) => {
                request_metrics.record_network_error();
                Err(FetcherError::Transport(format!(
                    "network timeout: no response within {:.1}s",
                    self.request_timeout.as_secs_f64()
                )))
            }
        }
    }

    fn classify(&mut self, response: &RawResponse, endpoint: &'static str) -> FetcherResult<()> {
        if ThrottleDetector::inspect(response) {
            self.stats.throttle_incidents += 1;
            metrics::record_throttle_incident(endpoint);
            if self.throttle.record_incident() == ThrottleSignal::ResetRequired {
                self.reset_pending = true;
            }
            let detail = match &response.location {
                Some(location) => format!("status {} redirect to {location}", response.status),
                None => format!("status {}", response.status),
            };
            return Err(FetcherError::Throttled(detail));
        }

        match response.status {
            400 | 404 => Err(FetcherError::Rejected(response.status)),
            _ if response.is_success() => Ok(()),
            status => Err(FetcherError::Http(status)),
        }
    }

    async fn reset_identity(&mut self) -> FetcherResult<()> {
        self.reset_pending = false;
        self.stats.identity_resets += 1;
        metrics::record_identity_reset();
        warn!(
            advertiser_id = %self.advertiser_id,
            resets = self.stats.identity_resets,
            "Discarding session identity after repeated throttling"
        );
        self.identity.reset(&self.shutdown).await?;
        Ok(())
    }
}
