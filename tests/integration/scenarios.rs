//! End-to-end scrape runs against a scripted archive

use super::support::{image_item, lookup_body, search_page, test_config, ScriptedTransport, ADVERTISER};
use ad_archive_scraper::fetcher::{Endpoint, FetcherError, RawResponse};
use ad_archive_scraper::identifier::{AdvertiserId, CreativeId, RegionCode};
use ad_archive_scraper::scraper::{ScrapeError, ScrapeExecutor, ScrapeRequest};
use ad_archive_scraper::shutdown::ShutdownCoordinator;
use ad_archive_scraper::{AdFormat, INTERACTIVE_SENTINEL};
use serde_json::json;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;

fn request(max_records: usize) -> ScrapeRequest {
    ScrapeRequest::new(
        AdvertiserId::parse(ADVERTISER).unwrap(),
        RegionCode::parse("QA").unwrap(),
        max_records,
    )
}

fn executor(transport: std::sync::Arc<ScriptedTransport>) -> ScrapeExecutor {
    ScrapeExecutor::new(transport, test_config()).with_shutdown(ShutdownCoordinator::shared())
}

#[tokio::test(start_paused = true)]
async fn test_three_pages_fill_quota() {
    let transport = ScriptedTransport::new();
    transport.push_search(Ok(search_page(0, 40, Some("tok-2"))));
    transport.push_search(Ok(search_page(40, 40, Some("tok-3"))));
    transport.push_search(Ok(search_page(80, 20, None)));

    let outcome = executor(transport.clone()).scrape(request(100)).await.unwrap();

    assert_eq!(outcome.records.len(), 100);
    assert!(!outcome.exhausted);
    assert_eq!(transport.count(Endpoint::SearchCreatives), 3);
    assert_eq!(outcome.summary.pages_fetched, 3);
    assert_eq!(outcome.summary.retries, 0);

    let ids: HashSet<_> = outcome.records.iter().map(|r| r.creative_id.clone()).collect();
    assert_eq!(ids.len(), 100);

    // Each follow-up page carries the token issued by the previous one
    let calls = transport.calls();
    assert!(calls[0].payload.get("4").is_none());
    assert_eq!(calls[1].payload["4"], "tok-2");
    assert_eq!(calls[2].payload["4"], "tok-3");

    let first = &outcome.records[0];
    assert_eq!(first.advertiser_id, ADVERTISER);
    assert_eq!(first.format, AdFormat::Image);
    assert_eq!(first.advertiser_name.as_deref(), Some("Example Advertiser"));
    assert_eq!(first.region, "QA");
    assert_eq!(first.search_region, "QA");
    assert!(first.source_link.ends_with("?region=qa"));
    assert!(first.validate().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_short_archive_reports_exhausted() {
    let transport = ScriptedTransport::new();
    transport.push_search(Ok(search_page(0, 12, Some("tok-2"))));

    let outcome = executor(transport.clone()).scrape(request(100)).await.unwrap();

    assert_eq!(outcome.records.len(), 12);
    assert!(outcome.exhausted);
    assert_eq!(transport.count(Endpoint::SearchCreatives), 1);
}

#[tokio::test(start_paused = true)]
async fn test_quota_smaller_than_page_truncates() {
    let transport = ScriptedTransport::new();
    transport.push_search(Ok(search_page(0, 40, Some("tok-2"))));

    let outcome = executor(transport.clone()).scrape(request(25)).await.unwrap();

    assert_eq!(outcome.records.len(), 25);
    assert!(!outcome.exhausted);
    assert_eq!(transport.count(Endpoint::SearchCreatives), 1);
}

#[tokio::test(start_paused = true)]
async fn test_zero_quota_makes_no_calls() {
    let transport = ScriptedTransport::new();

    let outcome = executor(transport.clone()).scrape(request(0)).await.unwrap();

    assert!(outcome.records.is_empty());
    assert!(!outcome.exhausted);
    assert!(transport.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_single_rate_limit_retried_once() {
    let transport = ScriptedTransport::new();
    transport.push_search(Ok(RawResponse::status(429)));
    transport.push_search(Ok(search_page(0, 5, None)));

    let started = Instant::now();
    let outcome = executor(transport.clone()).scrape(request(10)).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(outcome.records.len(), 5);
    assert_eq!(outcome.summary.retries, 1);
    assert_eq!(outcome.summary.throttle_incidents, 1);
    assert_eq!(outcome.summary.identity_resets, 0);
    assert_eq!(transport.count(Endpoint::SearchCreatives), 2);
    assert!(elapsed >= Duration::from_secs(1), "backoff too short: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1500), "backoff too long: {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_garbage_batch_falls_back_to_lookup() {
    let transport = ScriptedTransport::new();
    for _ in 0..4 {
        transport.push_search(Ok(RawResponse::ok("<html>not json</html>")));
    }
    // First lookup fails twice before succeeding; second resolves at once
    transport.push_lookup(Ok(RawResponse::status(503)));
    transport.push_lookup(Ok(RawResponse::status(503)));
    transport.push_lookup(Ok(lookup_body(image_item("CR100", "QA"))));
    transport.push_lookup(Ok(lookup_body(image_item("CR200", "QA"))));

    let ids = vec![
        CreativeId::parse("CR100").unwrap(),
        CreativeId::parse("CR200").unwrap(),
        CreativeId::parse("CR300").unwrap(),
    ];
    let outcome = executor(transport.clone())
        .scrape(request(10).with_creative_ids(ids))
        .await
        .unwrap();

    assert!(outcome.summary.batch_abandoned);
    assert_eq!(transport.count(Endpoint::SearchCreatives), 4);
    // 3 attempts for CR100, 1 each for CR200 and CR300
    assert_eq!(transport.count(Endpoint::GetCreativeById), 5);

    let resolved: Vec<_> = outcome.records.iter().map(|r| r.creative_id.as_str()).collect();
    assert_eq!(resolved, vec!["CR100", "CR200"]);
    assert_eq!(outcome.summary.fallback_resolved, 2);
    assert_eq!(
        outcome.summary.unresolved_ids,
        vec![CreativeId::parse("CR300").unwrap()]
    );
    assert!(outcome.exhausted);

    let lookups: Vec<_> = transport
        .calls()
        .into_iter()
        .filter(|c| c.endpoint == Endpoint::GetCreativeById)
        .map(|c| c.payload["2"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(lookups, vec!["CR100", "CR100", "CR100", "CR200", "CR300"]);
}

#[tokio::test(start_paused = true)]
async fn test_batch_failure_without_ids_is_exhausted_error() {
    let transport = ScriptedTransport::new();
    for _ in 0..4 {
        transport.push_search(Ok(RawResponse::status(500)));
    }

    let err = executor(transport.clone()).scrape(request(10)).await.unwrap_err();

    match err {
        ScrapeError::AllStrategiesExhausted {
            advertiser_id,
            unresolved,
            last_error,
        } => {
            assert_eq!(advertiser_id, ADVERTISER);
            assert_eq!(unresolved, 0);
            assert_eq!(last_error, FetcherError::Http(500));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(transport.count(Endpoint::GetCreativeById), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failure_after_first_page_keeps_records() {
    let transport = ScriptedTransport::new();
    transport.push_search(Ok(search_page(0, 40, Some("tok-2"))));
    for _ in 0..4 {
        transport.push_search(Ok(RawResponse::status(502)));
    }

    let outcome = executor(transport.clone()).scrape(request(100)).await.unwrap();

    assert_eq!(outcome.records.len(), 40);
    assert!(outcome.exhausted);
    assert!(outcome.summary.batch_abandoned);
    assert_eq!(outcome.summary.pages_fetched, 1);
}

#[tokio::test(start_paused = true)]
async fn test_interactive_creative_masked() {
    let mut item = image_item("CR777", "QA");
    item["3"] = json!({
        "1": {"4": "https://tpc.googlesyndication.com/archive/simgad/777"},
        "3": {"2": "<script src=\"https://displayads-formats.googleusercontent.com/ads/preview/content.js?client=wta\"></script>"}
    });
    item["5"] = json!(0);
    let transport = ScriptedTransport::new();
    transport.push_search(Ok(RawResponse::ok(json!({ "1": [item] }).to_string())));

    let outcome = executor(transport).scrape(request(5)).await.unwrap();

    let record = &outcome.records[0];
    assert!(record.creative.has_interactive_content);
    assert_eq!(record.creative.image_url.as_deref(), Some(INTERACTIVE_SENTINEL));
    assert_eq!(record.creative.video_url.as_deref(), Some(INTERACTIVE_SENTINEL));
    assert_eq!(record.format, AdFormat::Interactive);
    assert!(record.validate().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_duplicates_and_foreign_regions_filtered() {
    let items = vec![
        image_item("CR1", "QA"),
        image_item("CR1", "QA"),
        image_item("CR2", "AE"),
        image_item("CR3", "qa"),
    ];
    let transport = ScriptedTransport::new();
    transport.push_search(Ok(RawResponse::ok(json!({ "1": items }).to_string())));

    let outcome = executor(transport).scrape(request(10)).await.unwrap();

    let ids: Vec<_> = outcome.records.iter().map(|r| r.creative_id.as_str()).collect();
    assert_eq!(ids, vec!["CR1", "CR3"]);
    assert_eq!(outcome.summary.duplicates, 1);
    assert_eq!(outcome.summary.out_of_region, 1);
}

#[tokio::test(start_paused = true)]
async fn test_undecodable_item_skipped_page_kept() {
    let items = vec![image_item("CR1", "QA"), json!("not an item"), image_item("CR2", "QA")];
    let transport = ScriptedTransport::new();
    transport.push_search(Ok(RawResponse::ok(json!({ "1": items }).to_string())));

    let outcome = executor(transport).scrape(request(10)).await.unwrap();

    assert_eq!(outcome.records.len(), 2);
    assert_eq!(outcome.summary.items_skipped, 1);
    assert_eq!(outcome.summary.retries, 0);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_page_under_fresh_token_ends_pagination() {
    let transport = ScriptedTransport::new();
    transport.push_search(Ok(search_page(0, 40, Some("tok-2"))));
    for n in 3..=6 {
        transport.push_search(Ok(search_page(0, 40, Some(format!("tok-{n}").as_str()))));
    }

    let outcome = executor(transport.clone()).scrape(request(100)).await.unwrap();

    assert_eq!(outcome.records.len(), 40);
    assert!(outcome.exhausted);
    assert!(!outcome.summary.batch_abandoned);
    assert_eq!(transport.count(Endpoint::SearchCreatives), 2);
    assert_eq!(outcome.summary.pages_fetched, 2);
    assert_eq!(outcome.summary.duplicates, 40);
}

#[tokio::test(start_paused = true)]
async fn test_fallback_keeps_trying_ids_until_quota_filled() {
    let transport = ScriptedTransport::new();
    for _ in 0..4 {
        transport.push_search(Ok(RawResponse::status(500)));
    }
    transport.push_lookup(Ok(RawResponse::status(404)));
    transport.push_lookup(Ok(lookup_body(image_item("CR2", "QA"))));
    transport.push_lookup(Ok(lookup_body(image_item("CR3", "QA"))));

    let ids = vec![
        CreativeId::parse("CR1").unwrap(),
        CreativeId::parse("CR2").unwrap(),
        CreativeId::parse("CR3").unwrap(),
    ];
    let outcome = executor(transport.clone())
        .scrape(request(2).with_creative_ids(ids))
        .await
        .unwrap();

    let lookups: Vec<_> = transport
        .calls()
        .into_iter()
        .filter(|c| c.endpoint == Endpoint::GetCreativeById)
        .map(|c| c.payload["2"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(lookups, vec!["CR1", "CR2", "CR3"]);

    let resolved: Vec<_> = outcome.records.iter().map(|r| r.creative_id.as_str()).collect();
    assert_eq!(resolved, vec!["CR2", "CR3"]);
    assert!(!outcome.exhausted);
    assert_eq!(outcome.summary.fallback_resolved, 2);
    assert_eq!(
        outcome.summary.unresolved_ids,
        vec![CreativeId::parse("CR1").unwrap()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_undecodable_later_page_falls_back_for_remaining_ids() {
    let transport = ScriptedTransport::new();
    transport.push_search(Ok(search_page(0, 40, Some("tok-2"))));
    for _ in 0..4 {
        transport.push_search(Ok(RawResponse::ok("<html>not json</html>")));
    }
    transport.push_lookup(Ok(RawResponse::status(503)));
    transport.push_lookup(Ok(RawResponse::status(503)));
    transport.push_lookup(Ok(lookup_body(image_item("CR500", "QA"))));
    transport.push_lookup(Ok(lookup_body(image_item("CR600", "QA"))));

    let collected = format!("CR{:020}", 0);
    let ids = vec![
        CreativeId::parse(&collected).unwrap(),
        CreativeId::parse("CR500").unwrap(),
        CreativeId::parse("CR600").unwrap(),
    ];
    let outcome = executor(transport.clone())
        .scrape(request(100).with_creative_ids(ids))
        .await
        .unwrap();

    assert!(outcome.summary.batch_abandoned);
    assert_eq!(outcome.summary.pages_fetched, 1);
    assert_eq!(transport.count(Endpoint::SearchCreatives), 5);

    // The id already collected by the first page is never looked up
    let lookups: Vec<_> = transport
        .calls()
        .into_iter()
        .filter(|c| c.endpoint == Endpoint::GetCreativeById)
        .map(|c| c.payload["2"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(lookups, vec!["CR500", "CR500", "CR500", "CR600"]);

    assert_eq!(outcome.records.len(), 42);
    assert_eq!(outcome.summary.fallback_resolved, 2);
    assert!(outcome.summary.unresolved_ids.is_empty());
    assert!(outcome.exhausted);
}
