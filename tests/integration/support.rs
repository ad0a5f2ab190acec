//! Scripted archive transport and response builders shared by integration tests

use ad_archive_scraper::fetcher::{ArchiveTransport, Endpoint, FetcherResult, RawResponse, RpcRequest};
use ad_archive_scraper::identity::{IdentityPool, IdentityTemplate};
use ad_archive_scraper::scraper::ScrapeConfig;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, USER_AGENT};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const ADVERTISER: &str = "AR13676304484790173697";

/// One call seen by the scripted transport
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub endpoint: Endpoint,
    pub payload: Value,
    pub user_agent: String,
}

/// Transport replaying queued responses per endpoint
///
/// An empty search queue answers `{}` (end of results), an empty lookup
/// queue answers 404.
#[derive(Default)]
pub struct ScriptedTransport {
    search: Mutex<VecDeque<FetcherResult<RawResponse>>>,
    lookup: Mutex<VecDeque<FetcherResult<RawResponse>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_search(&self, response: FetcherResult<RawResponse>) {
        self.search.lock().unwrap().push_back(response);
    }

    pub fn push_lookup(&self, response: FetcherResult<RawResponse>) {
        self.lookup.lock().unwrap().push_back(response);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, endpoint: Endpoint) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.endpoint == endpoint)
            .count()
    }
}

#[async_trait]
impl ArchiveTransport for ScriptedTransport {
    async fn send(&self, request: &RpcRequest, headers: &HeaderMap) -> FetcherResult<RawResponse> {
        let user_agent = headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        self.calls.lock().unwrap().push(RecordedCall {
            endpoint: request.endpoint,
            payload: request.payload.clone(),
            user_agent,
        });

        match request.endpoint {
            Endpoint::SearchCreatives => self
                .search
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(RawResponse::ok("{}"))),
            Endpoint::GetCreativeById => self
                .lookup
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(RawResponse::status(404))),
        }
    }
}

/// Configuration with a fixed two-entry identity pool and a short reset cooldown
pub fn test_config() -> ScrapeConfig {
    ScrapeConfig::default()
        .with_identity_pool(IdentityPool::deterministic(vec![
            IdentityTemplate::new(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/136.0.0.0 Safari/537.36",
                "en-US,en;q=0.9",
            ),
            IdentityTemplate::new(
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.5; rv:128.0) Gecko/20100101 Firefox/128.0",
                "en-GB,en;q=0.8",
            ),
        ]))
        .with_reset_cooldown(Duration::from_secs(3)..=Duration::from_secs(3))
}

/// Image item in the built-in ordinal layout
pub fn image_item(creative_id: &str, region: &str) -> Value {
    json!({
        "1": ADVERTISER,
        "2": creative_id,
        "3": {"1": {"4": format!("https://tpc.googlesyndication.com/archive/simgad/{creative_id}")}},
        "4": {"1": 1_704_067_200},
        "5": 2,
        "6": {"1": 1_706_745_600},
        "7": [{"2": region}],
        "12": {"1": "Example Advertiser"}
    })
}

/// Search page holding `count` items numbered from `start`
pub fn search_page(start: usize, count: usize, token: Option<&str>) -> RawResponse {
    let items: Vec<Value> = (start..start + count)
        .map(|n| image_item(&format!("CR{n:020}"), "QA"))
        .collect();
    let mut body = json!({ "1": items });
    if let Some(token) = token {
        body["2"] = json!(token);
    }
    RawResponse::ok(body.to_string())
}

/// Lookup response wrapping one item
pub fn lookup_body(item: Value) -> RawResponse {
    RawResponse::ok(json!({ "1": item }).to_string())
}
