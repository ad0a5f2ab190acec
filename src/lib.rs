//! # Ad Archive Scraper Library
//!
//! A client for the ad transparency archive's undocumented search RPC. The
//! endpoint has no published schema, answers with maps keyed by ordinal numbers,
//! paginates through an opaque continuation token and penalizes automated
//! traffic. This crate fetches up to N archived-ad records for an advertiser and
//! region, decodes them into [`AdRecord`]s, survives throttling and falls back
//! to a slower per-creative lookup when batch search is unavailable.
//!
//! ## Quick Start
//!
//! ```no_run
//! use ad_archive_scraper::identifier::{AdvertiserId, RegionCode};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let advertiser = AdvertiserId::parse("AR13676304484790173697")?;
//! let region = RegionCode::parse("QA")?;
//!
//! let outcome = ad_archive_scraper::scrape(&advertiser, &region, 100).await?;
//! println!(
//!     "{} records, archive exhausted: {}",
//!     outcome.records.len(),
//!     outcome.exhausted
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`identifier`] - Advertiser/creative/region id parsing and archive links
//! - [`identity`] - Spoofed client identity held for one run
//! - [`fetcher`] - Transport, request state machine, throttle detection, batch
//!   search, per-creative fallback and the ordinal-keyed [`fetcher::codec`]
//! - [`scraper`] - Run orchestration, configuration and backoff
//! - [`metrics`] - Aggregate counters for throttling and decode drift
//! - [`shutdown`] - Cancellation shared by every suspension point

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// CLI command implementations
pub mod cli;

/// Transport, pagination, throttling and decoding
pub mod fetcher;

/// Archive identifier parsing and validation
pub mod identifier;

/// Session identity management
pub mod identity;

/// Aggregate scrape metrics
pub mod metrics;

/// Scrape run orchestration
pub mod scraper;

/// Cancellation coordination shared across modules
pub mod shutdown;

pub use identifier::{AdvertiserId, CreativeId, RegionCode};
pub use scraper::{scrape, ScrapeConfig, ScrapeError, ScrapeExecutor, ScrapeOutcome, ScrapeRequest};

/// Placeholder presented instead of asset URLs that cannot be fetched on their
/// own; consumers should open the record's `source_link` instead.
pub const INTERACTIVE_SENTINEL: &str = "Check GATC link";

/// Creative format reported by the archive
///
/// The reported format is a hint only: video content is inferred from the
/// creative payload regardless of this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AdFormat {
    /// Text ad
    Text,
    /// Static image ad
    Image,
    /// Video ad
    Video,
    /// Interactive (rendered) ad
    Interactive,
    /// Format code missing or not recognised
    #[default]
    Unknown,
}

impl AdFormat {
    /// Map an ordinal format code to a format
    ///
    /// Total over all inputs: `1`, `2`, `3` map to text, image, video and
    /// everything else, including absence, maps to [`AdFormat::Unknown`].
    pub fn from_code(code: Option<i64>) -> Self {
        match code {
            Some(1) => AdFormat::Text,
            Some(2) => AdFormat::Image,
            Some(3) => AdFormat::Video,
            _ => AdFormat::Unknown,
        }
    }
}

impl fmt::Display for AdFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AdFormat::Text => "text",
            AdFormat::Image => "image",
            AdFormat::Video => "video",
            AdFormat::Interactive => "interactive",
            AdFormat::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

impl FromStr for AdFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(AdFormat::Text),
            "image" => Ok(AdFormat::Image),
            "video" => Ok(AdFormat::Video),
            "interactive" => Ok(AdFormat::Interactive),
            "unknown" => Ok(AdFormat::Unknown),
            _ => Err(format!("Invalid ad format: {s}")),
        }
    }
}

/// Asset references resolved from a creative payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedCreative {
    /// Direct image URL, or [`INTERACTIVE_SENTINEL`] for interactive creatives
    pub image_url: Option<String>,
    /// Canonical watch URL for video creatives
    pub video_url: Option<String>,
    /// Video identifier parsed from a thumbnail path
    pub youtube_id: Option<String>,
    /// Whether the creative is rendered by an interactive-ad host
    pub has_interactive_content: bool,
}

impl NormalizedCreative {
    /// True when no asset was resolved at all
    pub fn is_empty(&self) -> bool {
        self.image_url.is_none()
            && self.video_url.is_none()
            && self.youtube_id.is_none()
            && !self.has_interactive_content
    }
}

/// One archived creative and its provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdRecord {
    /// Advertiser that ran the creative
    pub advertiser_id: String,
    /// Creative identifier, unique per advertiser within a run
    pub creative_id: String,
    /// Advertiser display name, when the archive supplied one
    pub advertiser_name: Option<String>,
    /// Reported format (a hint, see [`AdFormat`])
    pub format: AdFormat,
    /// Resolved asset references
    pub creative: NormalizedCreative,
    /// First day the creative was shown
    pub first_seen: Option<NaiveDate>,
    /// Last day the creative was shown
    pub last_seen: Option<NaiveDate>,
    /// Regions the creative ran in, comma separated
    pub region: String,
    /// Region the search was scoped to
    pub search_region: String,
    /// Canonical archive page for the creative
    pub source_link: String,
}

impl AdRecord {
    /// Build the canonical archive link for a creative
    pub fn source_link_for(advertiser_id: &str, creative_id: &str, region: &str) -> String {
        format!(
            "https://adstransparency.google.com/advertiser/{advertiser_id}/creative/{creative_id}?region={}",
            region.to_lowercase()
        )
    }

    /// Validate record integrity
    pub fn validate(&self) -> Result<(), String> {
        if self.advertiser_id.is_empty() {
            return Err("Advertiser id cannot be empty".to_string());
        }

        if self.creative_id.is_empty() {
            return Err("Creative id cannot be empty".to_string());
        }

        if let (Some(first), Some(last)) = (self.first_seen, self.last_seen) {
            if first > last {
                return Err(format!(
                    "First seen ({first}) must not be after last seen ({last})"
                ));
            }
        }

        if self.creative.has_interactive_content {
            let leaks_asset = [&self.creative.image_url, &self.creative.video_url]
                .into_iter()
                .flatten()
                .any(|url| url != INTERACTIVE_SENTINEL);
            if leaks_asset {
                return Err("Interactive creative must not expose asset URLs".to_string());
            }
        }

        Ok(())
    }
}
