//! Scrape executor: batch search with per-creative fallback

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::collector::{RecordCollector, Rejection};
use super::summary::ScrapeSummary;
use super::{ScrapeConfig, ScrapeError, ScrapeOutcome, ScrapeRequest};
use crate::fetcher::{
    ArchiveSession, ArchiveTransport, BatchSearchClient, FallbackFetcher, FetcherError,
    PaginationCursor,
};
use crate::metrics::{self, ScrapeMetrics};
use crate::shutdown::{self, SharedShutdown, ShutdownCoordinator};

/// How the batch path ended
enum BatchEnd {
    /// Quota reached
    Filled,
    /// Archive has no more pages
    Exhausted,
    /// Batch search failed; the fallback takes over
    Abandoned(FetcherError),
    /// Shutdown requested
    Cancelled,
}

/// Runs scrapes against one transport
///
/// Each call to [`ScrapeExecutor::scrape`] is an isolated run with its own
/// identity and throttle state; the executor itself only holds read-only
/// configuration, so concurrent runs may share it.
pub struct ScrapeExecutor {
    transport: Arc<dyn ArchiveTransport>,
    config: ScrapeConfig,
    shutdown: SharedShutdown,
}

impl ScrapeExecutor {
    /// Create an executor
    ///
    /// Uses the process-wide shutdown signal when one is installed.
    pub fn new(transport: Arc<dyn ArchiveTransport>, config: ScrapeConfig) -> Self {
        Self {
            transport,
            config,
            shutdown: shutdown::get_global_shutdown().unwrap_or_else(ShutdownCoordinator::shared),
        }
    }

    /// Use an explicit cancellation signal
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Configuration of this executor
    pub fn config(&self) -> &ScrapeConfig {
        &self.config
    }

    /// Run one scrape
    ///
    /// Pages through batch search until the quota is met or the archive is
    /// exhausted. If batch search fails, the remaining quota is served by
    /// looking up `request.creative_ids` one at a time.
    ///
    /// # Errors
    /// - [`ScrapeError::InvalidRequest`] for a zero page size
    /// - [`ScrapeError::AllStrategiesExhausted`] when batch search failed and
    ///   nothing was recovered
    /// - [`ScrapeError::Cancelled`] when cancelled before any record was
    ///   collected
    pub async fn scrape(&self, request: ScrapeRequest) -> Result<ScrapeOutcome, ScrapeError> {
        if self.config.page_size == 0 {
            return Err(ScrapeError::InvalidRequest("page size must be at least 1".to_string()));
        }

        let run_metrics = ScrapeMetrics::start(request.advertiser_id.as_str());
        let mut summary = ScrapeSummary::default();
        let mut session = ArchiveSession::new(
            Arc::clone(&self.transport),
            &self.config,
            request.advertiser_id.as_str(),
            Arc::clone(&self.shutdown),
        );
        let mut collector = RecordCollector::new(
            request.advertiser_id.clone(),
            request.region.clone(),
            request.max_records,
            Arc::clone(&self.config.field_table),
        );

        let batch_end = if collector.is_full() {
            BatchEnd::Filled
        } else {
            self.run_batch(&request, &mut session, &mut collector, &mut summary)
                .await
        };

        let batch_error = match batch_end {
            BatchEnd::Filled | BatchEnd::Exhausted => None,
            BatchEnd::Cancelled => {
                summary.cancelled = true;
                None
            }
            BatchEnd::Abandoned(e) => {
                summary.batch_abandoned = true;
                warn!(
                    advertiser_id = %request.advertiser_id,
                    collected = collector.len(),
                    remaining = collector.remaining(),
                    error = %e,
                    "Batch search abandoned, switching to per-creative lookup"
                );
                self.run_fallback(&request, &mut session, &mut collector, &mut summary)
                    .await;
                Some(e)
            }
        };

        let stats = session.stats();
        summary.requests = stats.requests;
        summary.retries = stats.retries;
        summary.throttle_incidents = stats.throttle_incidents;
        summary.identity_resets = stats.identity_resets;

        if collector.is_empty() {
            if summary.cancelled {
                run_metrics.record_failure("cancelled");
                return Err(ScrapeError::Cancelled);
            }
            if let Some(last_error) = batch_error {
                run_metrics.record_failure(&last_error.to_string());
                return Err(ScrapeError::AllStrategiesExhausted {
                    advertiser_id: request.advertiser_id.to_string(),
                    unresolved: summary.unresolved_ids.len(),
                    last_error,
                });
            }
        }

        let records = collector.into_records();
        let exhausted = records.len() < request.max_records;
        run_metrics.record_success(records.len(), exhausted);
        info!(
            advertiser_id = %request.advertiser_id,
            records = records.len(),
            exhausted,
            "{}",
            summary
        );

        Ok(ScrapeOutcome {
            records,
            exhausted,
            summary,
        })
    }

    async fn run_batch(
        &self,
        request: &ScrapeRequest,
        session: &mut ArchiveSession,
        collector: &mut RecordCollector,
        summary: &mut ScrapeSummary,
    ) -> BatchEnd {
        let mut client = BatchSearchClient::new(
            session,
            Arc::clone(&self.config.field_table),
            self.config.batch_pacing,
        );
        let mut cursor = PaginationCursor::first(self.config.page_size);

        loop {
            let page = match client
                .fetch_page(&request.advertiser_id, &request.region, cursor)
                .await
            {
                Ok(page) => page,
                Err(FetcherError::Cancelled) => return BatchEnd::Cancelled,
                Err(e) => return BatchEnd::Abandoned(e),
            };

            summary.pages_fetched += 1;
            summary.items_skipped += page.skipped;

            let offered = page.items.len();
            let mut repeated = 0;
            for item in page.items {
                if collector.is_full() {
                    break;
                }
                // Rejections are already counted in the summary
                if collector.offer(item, summary) == Err(Rejection::Duplicate) {
                    repeated += 1;
                }
            }

            if collector.is_full() {
                return BatchEnd::Filled;
            }

            if offered > 0 && repeated == offered {
                warn!(
                    advertiser_id = %request.advertiser_id,
                    page = summary.pages_fetched,
                    "Page brought no new creatives, ending pagination"
                );
                return BatchEnd::Exhausted;
            }

            match page.next_cursor {
                Some(next) => cursor = next,
                None => {
                    debug!(
                        advertiser_id = %request.advertiser_id,
                        pages = summary.pages_fetched,
                        "Archive exhausted"
                    );
                    return BatchEnd::Exhausted;
                }
            }
        }
    }

    async fn run_fallback(
        &self,
        request: &ScrapeRequest,
        session: &mut ArchiveSession,
        collector: &mut RecordCollector,
        summary: &mut ScrapeSummary,
    ) {
        let pending: Vec<_> = request
            .creative_ids
            .iter()
            .filter(|id| !collector.has_seen(id.as_str()))
            .cloned()
            .collect();

        if pending.is_empty() {
            warn!(
                advertiser_id = %request.advertiser_id,
                "No creative ids available for per-creative lookup"
            );
            return;
        }

        info!(
            advertiser_id = %request.advertiser_id,
            ids = pending.len(),
            "Resolving creatives one by one"
        );

        let mut fetcher = FallbackFetcher::new(
            session,
            Arc::clone(&self.config.field_table),
            self.config.fallback_pacing,
        );

        for creative_id in pending {
            if collector.is_full() {
                break;
            }

            match fetcher.fetch_one(&request.advertiser_id, &creative_id).await {
                Ok(Some(mut item)) => {
                    item.creative_id.get_or_insert_with(|| creative_id.to_string());
                    if collector.offer(item, summary).is_ok() {
                        summary.fallback_resolved += 1;
                    }
                }
                Ok(None) => {
                    metrics::record_unresolved_id();
                    summary.unresolved_ids.push(creative_id);
                }
                Err(FetcherError::Cancelled) => {
                    summary.cancelled = true;
                    break;
                }
                Err(e) => {
                    warn!(creative_id = %creative_id, error = %e, "Creative unresolved");
                    metrics::record_unresolved_id();
                    summary.unresolved_ids.push(creative_id);
                }
            }
        }
    }
}
