//! Batch Search Client
//!
//! Pages through the search endpoint with the server-issued continuation
//! token. One call per page; pacing between pages is a fixed pause that is
//! neither a throttle incident nor subject to backoff.
//!
//! Safety mechanisms:
//! - A cursor is consumed when it is exchanged for a page, so a token is never
//!   sent twice
//! - A page that echoes the token it was requested with ends pagination
//! - Maximum page limit to prevent endless loops

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::codec::{decode_page, search_request, FieldTable, RawItem};
use super::session::ArchiveSession;
use super::{FetcherError, FetcherResult};
use crate::identifier::{AdvertiserId, RegionCode};

/// Maximum number of pages fetched in one run
pub const MAX_PAGES: u32 = 10_000;

/// Position in a paged search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationCursor {
    token: Option<String>,
    page_size: usize,
    pages_fetched: u32,
}

impl PaginationCursor {
    /// Cursor for the first page
    pub fn first(page_size: usize) -> Self {
        Self {
            token: None,
            page_size: page_size.max(1),
            pages_fetched: 0,
        }
    }

    /// Continuation token sent with the next page, `None` on the first page
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Items requested per page
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Pages fetched before this cursor
    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    /// Whether this cursor points at the first page
    pub fn is_first(&self) -> bool {
        self.pages_fetched == 0
    }

    fn advance(self, token: String) -> Self {
        Self {
            token: Some(token),
            page_size: self.page_size,
            pages_fetched: self.pages_fetched + 1,
        }
    }
}

/// One fetched page
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult {
    /// Decoded items in page order
    pub items: Vec<RawItem>,
    /// Cursor for the following page, present when `has_more`
    pub next_cursor: Option<PaginationCursor>,
    /// Whether the archive has more pages
    pub has_more: bool,
    /// Items on the page that failed to decode
    pub skipped: usize,
    /// Items on the page, decoded or not
    pub raw_count: usize,
}

/// Paged search over one run's session
pub struct BatchSearchClient<'a> {
    session: &'a mut ArchiveSession,
    table: Arc<FieldTable>,
    pacing: Duration,
}

impl<'a> BatchSearchClient<'a> {
    /// Create a client on `session`
    pub fn new(session: &'a mut ArchiveSession, table: Arc<FieldTable>, pacing: Duration) -> Self {
        Self {
            session,
            table,
            pacing,
        }
    }

    /// Fetch the page `cursor` points at
    ///
    /// Every page after the first is preceded by the pacing pause. The end of
    /// results is signalled by a short page or a missing token.
    ///
    /// # Arguments
    /// * `advertiser_id` - Advertiser to search
    /// * `region` - Region the search is scoped to
    /// * `cursor` - Position to fetch; consumed
    ///
    /// # Errors
    /// The request state machine's final error once retries are spent, or
    /// [`FetcherError::Cancelled`]
    pub async fn fetch_page(
        &mut self,
        advertiser_id: &AdvertiserId,
        region: &RegionCode,
        cursor: PaginationCursor,
    ) -> FetcherResult<PageResult> {
        if cursor.pages_fetched() >= MAX_PAGES {
            return Err(FetcherError::InvalidRequest(format!(
                "Max pages ({MAX_PAGES}) exceeded for advertiser {advertiser_id} - possible pagination loop"
            )));
        }

        if !cursor.is_first() {
            self.session.pause(self.pacing).await?;
        }

        let rpc = search_request(
            advertiser_id.as_str(),
            region.as_str(),
            cursor.page_size(),
            cursor.token(),
        );
        let table = Arc::clone(&self.table);
        let page = self
            .session
            .execute(&rpc, None, |body| decode_page(body, &table))
            .await?;

        let token = match page.continuation_token {
            Some(next) if cursor.token() == Some(next.as_str()) => {
                warn!(
                    advertiser_id = %advertiser_id,
                    page = cursor.pages_fetched() + 1,
                    "Archive repeated the continuation token, ending pagination"
                );
                None
            }
            other => other,
        };

        let full_page = page.raw_count >= cursor.page_size();
        let has_more = full_page && token.is_some();

        debug!(
            advertiser_id = %advertiser_id,
            page = cursor.pages_fetched() + 1,
            items = page.items.len(),
            skipped = page.skipped,
            has_more,
            "Fetched search page"
        );

        let next_cursor = match token {
            Some(token) if has_more => Some(cursor.advance(token)),
            _ => None,
        };

        Ok(PageResult {
            items: page.items,
            next_cursor,
            has_more,
            skipped: page.skipped,
            raw_count: page.raw_count,
        })
    }
}
