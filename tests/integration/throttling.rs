//! Throttle detection and identity reset during scrape runs

use super::support::{search_page, test_config, ScriptedTransport, ADVERTISER};
use ad_archive_scraper::fetcher::{Endpoint, RawResponse};
use ad_archive_scraper::identifier::{AdvertiserId, RegionCode};
use ad_archive_scraper::scraper::{ScrapeExecutor, ScrapeRequest};
use ad_archive_scraper::shutdown::ShutdownCoordinator;
use std::sync::Arc;

fn request(max_records: usize) -> ScrapeRequest {
    ScrapeRequest::new(
        AdvertiserId::parse(ADVERTISER).unwrap(),
        RegionCode::parse("QA").unwrap(),
        max_records,
    )
}

fn executor(transport: Arc<ScriptedTransport>) -> ScrapeExecutor {
    ScrapeExecutor::new(transport, test_config()).with_shutdown(ShutdownCoordinator::shared())
}

#[tokio::test(start_paused = true)]
async fn test_third_incident_resets_identity_before_next_call() {
    let transport = ScriptedTransport::new();
    for _ in 0..3 {
        transport.push_search(Ok(RawResponse::status(429)));
    }
    transport.push_search(Ok(search_page(0, 10, None)));

    let outcome = executor(transport.clone()).scrape(request(20)).await.unwrap();

    assert_eq!(outcome.records.len(), 10);
    assert_eq!(outcome.summary.throttle_incidents, 3);
    assert_eq!(outcome.summary.identity_resets, 1);

    let calls = transport.calls();
    assert_eq!(calls.len(), 4);
    assert_eq!(calls[0].user_agent, calls[1].user_agent);
    assert_eq!(calls[1].user_agent, calls[2].user_agent);
    assert_ne!(calls[2].user_agent, calls[3].user_agent);
}

#[tokio::test(start_paused = true)]
async fn test_incidents_accumulate_across_pages() {
    let transport = ScriptedTransport::new();
    transport.push_search(Ok(RawResponse::status(429)));
    transport.push_search(Ok(search_page(0, 40, Some("tok-2"))));
    transport.push_search(Ok(RawResponse::status(429)));
    transport.push_search(Ok(search_page(40, 40, Some("tok-3"))));
    transport.push_search(Ok(RawResponse::status(429)));
    transport.push_search(Ok(search_page(80, 5, None)));

    let outcome = executor(transport.clone()).scrape(request(200)).await.unwrap();

    assert_eq!(outcome.records.len(), 85);
    assert!(outcome.exhausted);
    assert_eq!(outcome.summary.identity_resets, 1);

    let calls = transport.calls();
    assert_eq!(calls.len(), 6);
    assert!(calls[..5].iter().all(|c| c.user_agent == calls[0].user_agent));
    assert_ne!(calls[5].user_agent, calls[0].user_agent);
}

#[tokio::test(start_paused = true)]
async fn test_block_redirect_counts_as_throttle() {
    let transport = ScriptedTransport::new();
    transport.push_search(Ok(RawResponse::redirect(
        302,
        "https://www.google.com/sorry/index?continue=https://adstransparency.google.com/",
    )));
    transport.push_search(Ok(search_page(0, 3, None)));

    let outcome = executor(transport.clone()).scrape(request(10)).await.unwrap();

    assert_eq!(outcome.records.len(), 3);
    assert_eq!(outcome.summary.throttle_incidents, 1);
    assert_eq!(outcome.summary.retries, 1);
}

#[tokio::test(start_paused = true)]
async fn test_plain_redirect_is_not_throttle() {
    let transport = ScriptedTransport::new();
    transport.push_search(Ok(RawResponse::redirect(301, "https://adstransparency.google.com/")));
    transport.push_search(Ok(search_page(0, 3, None)));

    let outcome = executor(transport.clone()).scrape(request(10)).await.unwrap();

    assert_eq!(outcome.summary.throttle_incidents, 0);
    assert_eq!(outcome.summary.retries, 1);
    assert_eq!(transport.count(Endpoint::SearchCreatives), 2);
}
