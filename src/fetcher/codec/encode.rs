//! Ordinal-keyed request payloads
//!
//! The request side of the wire format is fixed by the endpoints and is not
//! part of the overridable field table.

use serde_json::{json, Value};

use crate::fetcher::{Endpoint, RpcRequest};

/// Client context block the archive front-end sends with every call
fn client_context() -> Value {
    json!({"1": 1, "2": 29, "3": 2840})
}

/// Build a paged search request
///
/// # Arguments
/// * `advertiser_id` - Advertiser to search
/// * `region` - Region code the search is scoped to
/// * `page_size` - Items requested per page
/// * `token` - Continuation token from the previous page, if any
pub fn search_request(
    advertiser_id: &str,
    region: &str,
    page_size: usize,
    token: Option<&str>,
) -> RpcRequest {
    let mut payload = json!({
        "2": page_size,
        "3": {
            "12": {"1": "", "2": true},
            "13": {
                "1": [advertiser_id],
                "4": {"1": [region]}
            }
        },
        "7": client_context()
    });

    if let (Some(token), Some(map)) = (token, payload.as_object_mut()) {
        map.insert("4".to_string(), Value::String(token.to_string()));
    }

    RpcRequest {
        endpoint: Endpoint::SearchCreatives,
        payload,
    }
}

/// Build a single-creative lookup request
pub fn lookup_request(advertiser_id: &str, creative_id: &str) -> RpcRequest {
    RpcRequest {
        endpoint: Endpoint::GetCreativeById,
        payload: json!({
            "1": advertiser_id,
            "2": creative_id,
            "5": client_context()
        }),
    }
}
