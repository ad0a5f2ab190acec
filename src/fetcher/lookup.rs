//! Fallback Fetcher
//!
//! Resolves creatives one id at a time through the lookup endpoint when batch
//! search cannot proceed. Each id gets its own retry budget; single-item calls
//! are paced more slowly than pages.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::codec::{decode_lookup, lookup_request, FieldTable, RawItem};
use super::session::ArchiveSession;
use super::{FetcherError, FetcherResult};
use crate::identifier::{AdvertiserId, CreativeId};

/// Per-creative lookup over one run's session
pub struct FallbackFetcher<'a> {
    session: &'a mut ArchiveSession,
    table: Arc<FieldTable>,
    pacing: Duration,
    calls: u32,
}

impl<'a> FallbackFetcher<'a> {
    /// Create a fetcher on `session`
    pub fn new(session: &'a mut ArchiveSession, table: Arc<FieldTable>, pacing: Duration) -> Self {
        Self {
            session,
            table,
            pacing,
            calls: 0,
        }
    }

    /// Lookups started so far
    pub fn calls(&self) -> u32 {
        self.calls
    }

    /// Fetch one creative
    ///
    /// Returns `Ok(None)` when the archive has no such creative.
    ///
    /// # Errors
    /// The request state machine's final error for this id once its retries
    /// are spent, or [`FetcherError::Cancelled`]
    pub async fn fetch_one(
        &mut self,
        advertiser_id: &AdvertiserId,
        creative_id: &CreativeId,
    ) -> FetcherResult<Option<RawItem>> {
        if self.calls > 0 {
            self.session.pause(self.pacing).await?;
        }
        self.calls += 1;

        let rpc = lookup_request(advertiser_id.as_str(), creative_id.as_str());
        let table = Arc::clone(&self.table);
        let result = self
            .session
            .execute(&rpc, Some(creative_id.as_str()), |body| {
                decode_lookup(body, &table)
            })
            .await;

        match result {
            Ok(Some(item)) => {
                debug!(creative_id = %creative_id, "Creative resolved by lookup");
                Ok(Some(item))
            }
            Ok(None) | Err(FetcherError::Rejected(404)) => {
                warn!(creative_id = %creative_id, "Creative not found by lookup");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
