//! Scrape configuration constants, backoff calculation and per-run settings

use rand::Rng;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use crate::fetcher::codec::FieldTable;
use crate::identity::IdentityPool;

/// Maximum number of retries after the first attempt of any request.
/// Shared by batch search and the per-creative fallback.
pub const MAX_RETRIES: u32 = 3;

/// Items requested per search call; also the upstream cap.
pub const PAGE_SIZE: usize = 40;

/// Fixed pause between successful search pages. Not a throttle incident and
/// not subject to backoff.
pub const BATCH_PACING: Duration = Duration::from_millis(300);

/// Pause between single-creative lookups, which are individually more
/// conspicuous than page calls.
pub const FALLBACK_PACING: Duration = Duration::from_millis(750);

/// Timeout applied to every network call.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Upper bound of the random jitter added to every backoff delay.
pub const MAX_JITTER_MS: u64 = 500;

/// Shortest identity reset cooldown.
pub const RESET_COOLDOWN_MIN: Duration = Duration::from_secs(3);

/// Longest identity reset cooldown.
pub const RESET_COOLDOWN_MAX: Duration = Duration::from_secs(5);

/// Rolling window over which throttle incidents are counted.
pub const THROTTLE_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Incidents inside [`THROTTLE_WINDOW`] that require an identity reset.
pub const THROTTLE_THRESHOLD: u32 = 3;

/// Archive origin.
pub const BASE_URL: &str = "https://adstransparency.google.com";

/// Backoff delay before retry `attempt` (0-indexed)
///
/// `2^attempt` seconds plus a uniformly drawn jitter in `[0, 500ms)`.
pub fn delay_for(attempt: u32) -> Duration {
    let jitter_ms = rand::thread_rng().gen_range(0..MAX_JITTER_MS);
    delay_with_jitter(attempt, jitter_ms)
}

/// Deterministic core of [`delay_for`]
///
/// `jitter_ms` is clamped below [`MAX_JITTER_MS`]; the exponent saturates so
/// large attempts never overflow.
pub fn delay_with_jitter(attempt: u32, jitter_ms: u64) -> Duration {
    let base_secs = 2u64.checked_pow(attempt).unwrap_or(u64::MAX / 1000);
    let jitter_ms = jitter_ms.min(MAX_JITTER_MS - 1);
    Duration::from_secs(base_secs) + Duration::from_millis(jitter_ms)
}

/// Settings for scrape runs
///
/// Defaults reproduce the module constants and a randomized identity pool.
/// The identity pool and field table are read-only and shared between runs.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    /// Base URL of the archive
    pub base_url: String,
    /// Items requested per search call (`1..=PAGE_SIZE`)
    pub page_size: usize,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Pause between successful pages
    pub batch_pacing: Duration,
    /// Pause between fallback lookups
    pub fallback_pacing: Duration,
    /// Per-call network timeout
    pub request_timeout: Duration,
    /// Identity reset cooldown range
    pub reset_cooldown: RangeInclusive<Duration>,
    /// Identity templates
    pub identity_pool: Arc<IdentityPool>,
    /// Ordinal key-path table
    pub field_table: Arc<FieldTable>,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            base_url: BASE_URL.to_string(),
            page_size: PAGE_SIZE,
            max_retries: MAX_RETRIES,
            batch_pacing: BATCH_PACING,
            fallback_pacing: FALLBACK_PACING,
            request_timeout: REQUEST_TIMEOUT,
            reset_cooldown: RESET_COOLDOWN_MIN..=RESET_COOLDOWN_MAX,
            identity_pool: Arc::new(IdentityPool::randomized()),
            field_table: Arc::new(FieldTable::default()),
        }
    }
}

impl ScrapeConfig {
    /// Set the base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the page size, clamped to `1..=PAGE_SIZE`
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, PAGE_SIZE);
        self
    }

    /// Set the retry budget
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the pause between successful pages
    pub fn with_batch_pacing(mut self, pacing: Duration) -> Self {
        self.batch_pacing = pacing;
        self
    }

    /// Set the pause between fallback lookups
    pub fn with_fallback_pacing(mut self, pacing: Duration) -> Self {
        self.fallback_pacing = pacing;
        self
    }

    /// Set the per-call timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the identity reset cooldown range
    pub fn with_reset_cooldown(mut self, cooldown: RangeInclusive<Duration>) -> Self {
        self.reset_cooldown = cooldown;
        self
    }

    /// Inject an identity pool
    pub fn with_identity_pool(mut self, pool: IdentityPool) -> Self {
        self.identity_pool = Arc::new(pool);
        self
    }

    /// Inject a field table
    pub fn with_field_table(mut self, table: FieldTable) -> Self {
        self.field_table = Arc::new(table);
        self
    }
}
