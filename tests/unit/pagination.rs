//! Unit tests for the batch search client

use crate::integration::support::{search_page, test_config, ScriptedTransport, ADVERTISER};
use ad_archive_scraper::fetcher::{ArchiveSession, BatchSearchClient, PaginationCursor};
use ad_archive_scraper::identifier::{AdvertiserId, RegionCode};
use ad_archive_scraper::shutdown::ShutdownCoordinator;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn ids() -> (AdvertiserId, RegionCode) {
    (
        AdvertiserId::parse(ADVERTISER).unwrap(),
        RegionCode::parse("AE").unwrap(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_follow_up_pages_are_paced() {
    let transport = ScriptedTransport::new();
    transport.push_search(Ok(search_page(0, 40, Some("tok-2"))));
    transport.push_search(Ok(search_page(40, 40, Some("tok-3"))));

    let config = test_config();
    let mut session = ArchiveSession::new(transport.clone(), &config, ADVERTISER, ShutdownCoordinator::shared());
    let mut client = BatchSearchClient::new(&mut session, config.field_table.clone(), Duration::from_millis(300));
    let (advertiser, region) = ids();

    let started = Instant::now();
    let first = client
        .fetch_page(&advertiser, &region, PaginationCursor::first(40))
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_millis(300));
    assert!(first.has_more);

    let cursor = first.next_cursor.unwrap();
    assert_eq!(cursor.token(), Some("tok-2"));
    assert_eq!(cursor.pages_fetched(), 1);

    let second = client.fetch_page(&advertiser, &region, cursor).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(second.items.len(), 40);

    let calls = transport.calls();
    assert_eq!(calls[0].payload["3"]["13"]["4"]["1"][0], "AE");
    assert_eq!(calls[1].payload["4"], "tok-2");
}

#[tokio::test(start_paused = true)]
async fn test_repeated_token_ends_pagination() {
    let transport = ScriptedTransport::new();
    transport.push_search(Ok(search_page(0, 10, Some("same"))));
    transport.push_search(Ok(search_page(10, 10, Some("same"))));

    let config = test_config();
    let mut session = ArchiveSession::new(transport.clone(), &config, ADVERTISER, ShutdownCoordinator::shared());
    let mut client = BatchSearchClient::new(&mut session, config.field_table.clone(), Duration::ZERO);
    let (advertiser, region) = ids();

    let first = client
        .fetch_page(&advertiser, &region, PaginationCursor::first(10))
        .await
        .unwrap();
    let second = client
        .fetch_page(&advertiser, &region, first.next_cursor.unwrap())
        .await
        .unwrap();

    assert!(!second.has_more);
    assert!(second.next_cursor.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_short_page_is_last_even_with_token() {
    let transport = ScriptedTransport::new();
    transport.push_search(Ok(search_page(0, 7, Some("tok-2"))));

    let config = test_config();
    let mut session = ArchiveSession::new(transport, &config, ADVERTISER, ShutdownCoordinator::shared());
    let mut client = BatchSearchClient::new(&mut session, Arc::clone(&config.field_table), Duration::ZERO);
    let (advertiser, region) = ids();

    let page = client
        .fetch_page(&advertiser, &region, PaginationCursor::first(40))
        .await
        .unwrap();

    assert_eq!(page.raw_count, 7);
    assert!(!page.has_more);
    assert!(page.next_cursor.is_none());
}
