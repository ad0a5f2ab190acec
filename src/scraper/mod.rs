//! Scrape run orchestration
//!
//! One run fetches up to `max_records` records for one advertiser and region:
//!
//! 1. **Batch search**: pages through the search endpoint with
//!    [`crate::fetcher::BatchSearchClient`]
//! 2. **Fallback**: when batch search fails, resolves the caller's known
//!    creative ids one at a time with [`crate::fetcher::FallbackFetcher`]
//! 3. **Assembly**: deduplicates, filters by region and normalizes items into
//!    [`crate::AdRecord`]s
//!
//! Runs are sequential inside and isolated from each other: every run owns
//! its identity and throttle state.
//!
//! # Components
//!
//! - [`executor`] - Run driver
//! - [`collector`] - Record assembly
//! - [`summary`] - Per-run counts of skipped items and unresolved ids
//! - [`config`] - Constants, backoff calculation and [`ScrapeConfig`]

use std::sync::Arc;

pub mod collector;
pub mod config;
pub mod executor;
pub mod summary;

pub use config::{delay_for, ScrapeConfig};
pub use executor::ScrapeExecutor;
pub use summary::ScrapeSummary;

use crate::fetcher::{ArchiveHttpClient, FetcherError};
use crate::identifier::{AdvertiserId, CreativeId, RegionCode};
use crate::AdRecord;

/// Scrape errors
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    /// Request could not be run
    #[error("invalid scrape request: {0}")]
    InvalidRequest(String),

    /// Batch search failed and the fallback recovered nothing
    #[error("all strategies exhausted for {advertiser_id} ({unresolved} ids unresolved): {last_error}")]
    AllStrategiesExhausted {
        /// Advertiser of the run
        advertiser_id: String,
        /// Ids the fallback could not resolve
        unresolved: usize,
        /// Error that ended batch search
        last_error: FetcherError,
    },

    /// Cancelled before anything was collected
    #[error("scrape cancelled")]
    Cancelled,

    /// Fetcher could not be set up
    #[error("fetcher error: {0}")]
    Fetcher(#[from] FetcherError),
}

/// Parameters of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeRequest {
    /// Advertiser to scrape
    pub advertiser_id: AdvertiserId,
    /// Region the search is scoped to
    pub region: RegionCode,
    /// Maximum number of records
    pub max_records: usize,
    /// Known creative ids the fallback resolves if batch search fails
    pub creative_ids: Vec<CreativeId>,
}

impl ScrapeRequest {
    /// Request without fallback ids
    pub fn new(advertiser_id: AdvertiserId, region: RegionCode, max_records: usize) -> Self {
        Self {
            advertiser_id,
            region,
            max_records,
            creative_ids: Vec::new(),
        }
    }

    /// Supply creative ids for the fallback path
    pub fn with_creative_ids(mut self, creative_ids: Vec<CreativeId>) -> Self {
        self.creative_ids = creative_ids;
        self
    }
}

/// Result of one run
#[derive(Debug, Clone)]
pub struct ScrapeOutcome {
    /// Records in archive order
    pub records: Vec<AdRecord>,
    /// `true` when the archive ran out before `max_records` was reached
    pub exhausted: bool,
    /// Counts of what was skipped, retried and unresolved
    pub summary: ScrapeSummary,
}

/// Scrape one advertiser with the default configuration over HTTP
///
/// # Errors
/// See [`ScrapeExecutor::scrape`]
pub async fn scrape(
    advertiser_id: &AdvertiserId,
    region: &RegionCode,
    max_records: usize,
) -> Result<ScrapeOutcome, ScrapeError> {
    let config = ScrapeConfig::default();
    let transport = ArchiveHttpClient::new(config.base_url.clone(), config.request_timeout)?;
    ScrapeExecutor::new(Arc::new(transport), config)
        .scrape(ScrapeRequest::new(
            advertiser_id.clone(),
            region.clone(),
            max_records,
        ))
        .await
}
