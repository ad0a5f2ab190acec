//! Ordinal-keyed response decoding
//!
//! Turns one raw response body into loosely-typed [`RawItem`]s. Every expected
//! key is optional: a missing key decodes to `None`, never an error. Unknown
//! keys are ignored. Only a body that is not JSON at all, or whose item list
//! has the wrong shape, fails the page.

use serde_json::Value;
use tracing::{debug, warn};

use super::field_table::FieldTable;
use crate::fetcher::{FetcherError, FetcherResult};
use crate::metrics;

/// Anti-XSSI guard some responses are prefixed with
const XSSI_PREFIX: &str = ")]}'";

/// One decoded item before normalization
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawItem {
    /// Advertiser id
    pub advertiser_id: Option<String>,
    /// Creative id
    pub creative_id: Option<String>,
    /// Format code
    pub format_code: Option<i64>,
    /// Creative payload, left undecoded for the normalizer
    pub creative: Option<Value>,
    /// Advertiser display name
    pub advertiser_name: Option<String>,
    /// First-shown epoch seconds
    pub first_seen: Option<i64>,
    /// Last-shown epoch seconds
    pub last_seen: Option<i64>,
    /// Region codes the creative ran in
    pub regions: Vec<String>,
}

/// Result of decoding one search page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedPage {
    /// Successfully decoded items, in page order
    pub items: Vec<RawItem>,
    /// Items present on the wire, including skipped ones
    pub raw_count: usize,
    /// Items that failed to decode
    pub skipped: usize,
    /// Token for the next page, if the server issued one
    pub continuation_token: Option<String>,
}

/// Parse a body into JSON, tolerating the anti-XSSI prefix
pub fn parse_body(body: &str) -> FetcherResult<Value> {
    let trimmed = body.trim_start();
    let json = trimmed.strip_prefix(XSSI_PREFIX).unwrap_or(trimmed);

    let value: Value = serde_json::from_str(json)
        .map_err(|e| FetcherError::PageDecode(format!("body is not JSON: {e}")))?;

    match value {
        Value::Object(_) | Value::Array(_) => Ok(value),
        other => Err(FetcherError::PageDecode(format!(
            "expected object or array at top level, got {}",
            json_kind(&other)
        ))),
    }
}

/// Decode one search page body
///
/// A top-level array is taken as the item list itself. A missing item list is
/// an empty page (end of results).
pub fn decode_page(body: &str, table: &FieldTable) -> FetcherResult<DecodedPage> {
    let root = parse_body(body).inspect_err(|_| {
        metrics::record_decode_failure(&table.version, "page");
    })?;

    let raw_items: &[Value] = match &root {
        Value::Array(items) => items,
        Value::Object(_) => match table.items.resolve(&root) {
            None => &[],
            Some(Value::Array(items)) => items,
            Some(other) => {
                metrics::record_decode_failure(&table.version, "page");
                return Err(FetcherError::PageDecode(format!(
                    "item list at '{}' is {}, expected array",
                    table.items,
                    json_kind(other)
                )));
            }
        },
        _ => &[],
    };

    let continuation_token = match &root {
        Value::Object(_) => table.continuation_token.string(&root),
        _ => None,
    };

    let mut page = DecodedPage {
        items: Vec::with_capacity(raw_items.len()),
        raw_count: raw_items.len(),
        skipped: 0,
        continuation_token,
    };

    for (index, raw) in raw_items.iter().enumerate() {
        match decode_item(raw, table) {
            Ok(item) => page.items.push(item),
            Err(e) => {
                warn!(index, error = %e, "Skipping undecodable item");
                metrics::record_decode_failure(&table.version, "item");
                page.skipped += 1;
            }
        }
    }

    debug!(
        decoded = page.items.len(),
        skipped = page.skipped,
        has_token = page.continuation_token.is_some(),
        "Decoded search page"
    );

    Ok(page)
}

/// Decode a single-creative lookup body
///
/// Returns `Ok(None)` when the response carries no item.
pub fn decode_lookup(body: &str, table: &FieldTable) -> FetcherResult<Option<RawItem>> {
    let root = parse_body(body).inspect_err(|_| {
        metrics::record_decode_failure(&table.version, "page");
    })?;

    match table.lookup_item.resolve(&root) {
        None => Ok(None),
        Some(item) => decode_item(item, table).map(Some).inspect_err(|_| {
            metrics::record_decode_failure(&table.version, "item");
        }),
    }
}

/// Decode one item object
pub fn decode_item(value: &Value, table: &FieldTable) -> FetcherResult<RawItem> {
    if !value.is_object() {
        return Err(FetcherError::ItemDecode(format!(
            "item is {}, expected object",
            json_kind(value)
        )));
    }

    let regions = match table.regions.resolve(value) {
        Some(Value::Array(entries)) => entries
            .iter()
            .filter_map(|entry| table.region_code.string(entry))
            .map(|code| code.to_uppercase())
            .collect(),
        _ => Vec::new(),
    };

    Ok(RawItem {
        advertiser_id: table.advertiser_id.string(value),
        creative_id: table.creative_id.string(value),
        format_code: table.format_code.integer(value),
        creative: table.creative_payload.resolve(value).cloned(),
        advertiser_name: table.advertiser_name_of(value),
        first_seen: table.first_seen.integer(value),
        last_seen: table.last_seen.integer(value),
        regions,
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
