//! Operational metrics for archive scraping
//!
//! Counters for request outcomes, throttle incidents, identity resets and
//! decode failures. Decode failures are labelled with the field-table version
//! so that drift in the ordinal encoding shows up as an aggregate rate instead
//! of scattered per-item warnings.
//!
//! ## Architecture
//!
//! - Uses `metrics` crate for low-overhead metric collection
//! - Prometheus exporter for scraping endpoint (enabled with `--metrics-addr`)
//! - Without an installed recorder every call is a no-op

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<Arc<RwLock<bool>>> = Lazy::new(|| Arc::new(RwLock::new(false)));

/// Correlation ID generator for request tracing
static CORRELATION_COUNTER: Lazy<Arc<RwLock<u64>>> = Lazy::new(|| Arc::new(RwLock::new(0)));

/// Initialize metrics system with Prometheus exporter
///
/// Idempotent: later calls are ignored.
///
/// # Arguments
/// * `addr` - Socket address to bind Prometheus scrape endpoint (e.g., "0.0.0.0:9090")
///
/// # Errors
/// Fails if the exporter cannot be installed or the address cannot be bound
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "archive_requests_total",
        Unit::Count,
        "Total number of RPC calls made to the archive"
    );
    describe_histogram!(
        "archive_request_duration_seconds",
        Unit::Seconds,
        "RPC call duration in seconds"
    );
    describe_counter!(
        "archive_throttle_incidents_total",
        Unit::Count,
        "Responses flagged as rate limits or block interstitials"
    );
    describe_counter!(
        "archive_retries_total",
        Unit::Count,
        "Total number of retry attempts"
    );
    describe_histogram!(
        "archive_retry_backoff_seconds",
        Unit::Seconds,
        "Duration of retry backoff in seconds"
    );
    describe_counter!(
        "archive_identity_resets_total",
        Unit::Count,
        "Session identities discarded after repeated throttling"
    );
    describe_counter!(
        "archive_decode_failures_total",
        Unit::Count,
        "Pages and items that failed to decode, by field-table version"
    );
    describe_counter!(
        "archive_items_skipped_total",
        Unit::Count,
        "Items dropped from output, by reason"
    );
    describe_counter!(
        "archive_unresolved_ids_total",
        Unit::Count,
        "Creative ids the fallback lookup could not resolve"
    );
    describe_counter!(
        "scrapes_completed_total",
        Unit::Count,
        "Scrape runs that produced records"
    );
    describe_counter!(
        "scrapes_failed_total",
        Unit::Count,
        "Scrape runs that failed outright"
    );

    *initialized = true;
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Check if metrics system is initialized
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.read().await
}

/// Generate a new correlation ID for request tracing
pub async fn generate_correlation_id() -> String {
    let mut counter = CORRELATION_COUNTER.write().await;
    *counter += 1;
    format!("req-{:08x}", *counter)
}

/// Timing and outcome of one RPC call
pub struct RequestMetrics {
    endpoint: &'static str,
    start_time: Instant,
    correlation_id: String,
    attempt: u32,
}

impl RequestMetrics {
    /// Start recording a call
    pub async fn start(endpoint: &'static str, attempt: u32) -> Self {
        let correlation_id = generate_correlation_id().await;

        debug!(
            correlation_id = %correlation_id,
            endpoint = endpoint,
            attempt = attempt,
            "Sending archive request"
        );

        Self {
            endpoint,
            start_time: Instant::now(),
            correlation_id,
            attempt,
        }
    }

    /// Record a response with `status`
    pub fn record_complete(&self, status_code: u16) {
        let duration = self.start_time.elapsed();

        counter!(
            "archive_requests_total",
            "endpoint" => self.endpoint,
            "status" => status_code.to_string(),
        )
        .increment(1);

        histogram!(
            "archive_request_duration_seconds",
            "endpoint" => self.endpoint,
        )
        .record(duration.as_secs_f64());

        debug!(
            correlation_id = %self.correlation_id,
            endpoint = self.endpoint,
            status = status_code,
            attempt = self.attempt,
            duration_ms = duration.as_millis() as u64,
            "Archive request completed"
        );
    }

    /// Record a transport failure (no status code)
    pub fn record_network_error(&self) {
        let duration = self.start_time.elapsed();

        counter!(
            "archive_requests_total",
            "endpoint" => self.endpoint,
            "status" => "network_error",
        )
        .increment(1);

        histogram!(
            "archive_request_duration_seconds",
            "endpoint" => self.endpoint,
        )
        .record(duration.as_secs_f64());

        warn!(
            correlation_id = %self.correlation_id,
            endpoint = self.endpoint,
            attempt = self.attempt,
            duration_ms = duration.as_millis() as u64,
            "Network error recorded"
        );
    }

    /// Correlation ID for this call
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

/// Record a response flagged by the throttle detector
pub fn record_throttle_incident(endpoint: &'static str) {
    counter!("archive_throttle_incidents_total", "endpoint" => endpoint).increment(1);
}

/// Record retry backoff duration
pub fn record_retry_backoff(duration: Duration, attempt: u32) {
    counter!(
        "archive_retries_total",
        "attempt" => attempt.to_string(),
    )
    .increment(1);

    histogram!("archive_retry_backoff_seconds").record(duration.as_secs_f64());

    debug!(
        attempt = attempt,
        backoff_ms = duration.as_millis() as u64,
        "Retry backoff recorded"
    );
}

/// Record an identity reset
pub fn record_identity_reset() {
    counter!("archive_identity_resets_total").increment(1);
}

/// Record a decode failure
///
/// `scope` is `"page"` or `"item"`.
pub fn record_decode_failure(table_version: &str, scope: &'static str) {
    counter!(
        "archive_decode_failures_total",
        "table_version" => table_version.to_string(),
        "scope" => scope,
    )
    .increment(1);
}

/// Record an item dropped from output
pub fn record_item_skipped(reason: &'static str) {
    counter!("archive_items_skipped_total", "reason" => reason).increment(1);
}

/// Record a creative id the fallback could not resolve
pub fn record_unresolved_id() {
    counter!("archive_unresolved_ids_total").increment(1);
}

/// Lifetime metrics of one scrape run
pub struct ScrapeMetrics {
    advertiser_id: String,
    start_time: Instant,
}

impl ScrapeMetrics {
    /// Start tracking a run
    pub fn start(advertiser_id: impl Into<String>) -> Self {
        let advertiser_id = advertiser_id.into();
        info!(advertiser_id = %advertiser_id, "Scrape started");
        Self {
            advertiser_id,
            start_time: Instant::now(),
        }
    }

    /// Record a run that produced output
    pub fn record_success(&self, records: usize, exhausted: bool) {
        counter!(
            "scrapes_completed_total",
            "exhausted" => exhausted.to_string(),
        )
        .increment(1);

        info!(
            advertiser_id = %self.advertiser_id,
            records = records,
            exhausted = exhausted,
            duration_secs = self.start_time.elapsed().as_secs(),
            "Scrape completed"
        );
    }

    /// Record a failed run
    pub fn record_failure(&self, error: &str) {
        counter!("scrapes_failed_total").increment(1);

        error!(
            advertiser_id = %self.advertiser_id,
            error = %error,
            duration_secs = self.start_time.elapsed().as_secs(),
            "Scrape failed"
        );
    }
}
