//! Record assembly
//!
//! Turns decoded items into [`AdRecord`]s for one run: drops duplicates and
//! items outside the requested region, normalizes the creative and converts
//! epoch timestamps to dates.

use chrono::{DateTime, NaiveDate};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use super::summary::ScrapeSummary;
use crate::fetcher::codec::{try_normalize, FieldTable, RawItem};
use crate::identifier::{AdvertiserId, RegionCode};
use crate::metrics;
use crate::{AdFormat, AdRecord};

/// Why an offered item was not collected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Quota already reached
    Full,
    /// Item carried no creative id
    MissingCreativeId,
    /// Creative id already collected
    Duplicate,
    /// Item ran only outside the requested region
    OutOfRegion,
    /// Creative payload was malformed
    Malformed,
}

/// Accumulates the records of one run up to its quota
#[derive(Debug)]
pub struct RecordCollector {
    advertiser_id: AdvertiserId,
    region: RegionCode,
    max_records: usize,
    table: Arc<FieldTable>,
    seen: HashSet<String>,
    records: Vec<AdRecord>,
}

impl RecordCollector {
    /// Collector for `max_records` records of one advertiser and region
    pub fn new(
        advertiser_id: AdvertiserId,
        region: RegionCode,
        max_records: usize,
        table: Arc<FieldTable>,
    ) -> Self {
        Self {
            advertiser_id,
            region,
            max_records,
            table,
            seen: HashSet::new(),
            records: Vec::new(),
        }
    }

    /// Whether the quota is reached
    pub fn is_full(&self) -> bool {
        self.records.len() >= self.max_records
    }

    /// Records still missing from the quota
    pub fn remaining(&self) -> usize {
        self.max_records.saturating_sub(self.records.len())
    }

    /// Whether a creative id was already seen in this run
    pub fn has_seen(&self, creative_id: &str) -> bool {
        self.seen.contains(creative_id)
    }

    /// Records collected so far
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing was collected
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Offer one decoded item
    ///
    /// Rejections are counted in `summary`.
    pub fn offer(&mut self, item: RawItem, summary: &mut ScrapeSummary) -> Result<(), Rejection> {
        if self.is_full() {
            return Err(Rejection::Full);
        }

        let Some(creative_id) = item.creative_id.clone() else {
            debug!("Dropping item without creative id");
            summary.items_skipped += 1;
            metrics::record_item_skipped("missing_creative_id");
            return Err(Rejection::MissingCreativeId);
        };

        if !self.seen.insert(creative_id.clone()) {
            summary.duplicates += 1;
            metrics::record_item_skipped("duplicate");
            return Err(Rejection::Duplicate);
        }

        let region = self.region.as_str();
        if !item.regions.is_empty() && !item.regions.iter().any(|r| r == region) {
            debug!(creative_id = %creative_id, regions = ?item.regions, "Dropping out-of-region item");
            summary.out_of_region += 1;
            metrics::record_item_skipped("out_of_region");
            return Err(Rejection::OutOfRegion);
        }

        let creative = match try_normalize(&item, &self.table) {
            Ok(creative) => creative,
            Err(_) => {
                summary.items_skipped += 1;
                metrics::record_item_skipped("malformed_creative");
                return Err(Rejection::Malformed);
            }
        };

        let mut format = AdFormat::from_code(item.format_code);
        if creative.has_interactive_content && format == AdFormat::Unknown {
            format = AdFormat::Interactive;
        }

        let mut first_seen = item.first_seen.and_then(epoch_to_date);
        let mut last_seen = item.last_seen.and_then(epoch_to_date);
        if let (Some(first), Some(last)) = (first_seen, last_seen) {
            if first > last {
                warn!(creative_id = %creative_id, %first, %last, "First/last seen reversed, swapping");
                std::mem::swap(&mut first_seen, &mut last_seen);
            }
        }

        let advertiser_id = item
            .advertiser_id
            .unwrap_or_else(|| self.advertiser_id.as_str().to_string());
        let regions = if item.regions.is_empty() {
            region.to_string()
        } else {
            item.regions.join(",")
        };

        self.records.push(AdRecord {
            source_link: AdRecord::source_link_for(&advertiser_id, &creative_id, region),
            advertiser_id,
            creative_id,
            advertiser_name: item.advertiser_name,
            format,
            creative,
            first_seen,
            last_seen,
            region: regions,
            search_region: region.to_string(),
        });
        Ok(())
    }

    /// Hand over the collected records
    pub fn into_records(self) -> Vec<AdRecord> {
        self.records
    }
}

/// UTC calendar date of an epoch-seconds timestamp
pub fn epoch_to_date(secs: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(secs, 0).map(|dt| dt.date_naive())
}
