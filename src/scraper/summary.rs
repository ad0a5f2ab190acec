//! Run summary

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::identifier::CreativeId;

/// What happened during one scrape run
///
/// Skipped items and unresolved ids are reported here rather than hidden.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeSummary {
    /// Search pages fetched successfully
    pub pages_fetched: u32,
    /// Items dropped because they failed to decode or normalize
    pub items_skipped: usize,
    /// Items dropped because their creative id was already collected
    pub duplicates: usize,
    /// Items dropped because they did not run in the requested region
    pub out_of_region: usize,
    /// Whether the batch path was abandoned for the fallback
    pub batch_abandoned: bool,
    /// Creatives resolved by the fallback lookup
    pub fallback_resolved: usize,
    /// Ids the fallback lookup could not resolve
    pub unresolved_ids: Vec<CreativeId>,
    /// Calls handed to the transport
    pub requests: u64,
    /// Backoff retries taken
    pub retries: u64,
    /// Responses flagged as throttling
    pub throttle_incidents: u64,
    /// Identities discarded after repeated throttling
    pub identity_resets: u32,
    /// Whether the run was cut short by cancellation
    pub cancelled: bool,
}

impl fmt::Display for ScrapeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pages={} requests={} retries={} throttled={} resets={} skipped={} duplicates={} out_of_region={}",
            self.pages_fetched,
            self.requests,
            self.retries,
            self.throttle_incidents,
            self.identity_resets,
            self.items_skipped,
            self.duplicates,
            self.out_of_region
        )?;
        if self.batch_abandoned {
            write!(
                f,
                " fallback_resolved={} unresolved={}",
                self.fallback_resolved,
                self.unresolved_ids.len()
            )?;
        }
        if self.cancelled {
            write!(f, " cancelled")?;
        }
        Ok(())
    }
}
