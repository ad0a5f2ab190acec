//! Creative Normalizer
//!
//! Resolves the asset references of one raw item. The reported format code is
//! only a hint: a video thumbnail is recognised by its URL whatever the format
//! says, and interactive creatives never expose their rendering URLs.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

use super::decode::RawItem;
use super::field_table::FieldTable;
use crate::fetcher::{FetcherError, FetcherResult};
use crate::{NormalizedCreative, INTERACTIVE_SENTINEL};

static MARKUP_IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)src\s*=\s*["']([^"']+)["']"#).expect("markup image pattern")
});

static VIDEO_THUMBNAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^https?://(?:i\d?|img)\.ytimg\.com/vi(?:_webp)?/([A-Za-z0-9_-]{11})/")
        .expect("video thumbnail pattern")
});

static INTERACTIVE_HOST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)displayads-formats\.googleusercontent\.com|/sadbundle/|fletch-render")
        .expect("interactive host pattern")
});

/// Canonical watch URL for a video id
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

/// Video id embedded in a thumbnail URL
pub fn video_id_from_thumbnail(url: &str) -> Option<String> {
    VIDEO_THUMBNAIL
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// First image reference inside raw markup
pub fn first_image_in_markup(markup: &str) -> Option<String> {
    MARKUP_IMAGE
        .captures(markup)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().replace("&amp;", "&"))
        .filter(|url| !url.trim().is_empty())
}

/// Whether `text` references an interactive-ad rendering host
pub fn references_interactive_host(text: &str) -> bool {
    INTERACTIVE_HOST.is_match(text)
}

/// Normalize a creative, degrading to an empty creative on malformed input
///
/// A malformed payload is logged and yields [`NormalizedCreative::default`].
/// Use [`try_normalize`] to learn whether that happened.
pub fn normalize(item: &RawItem, table: &FieldTable) -> NormalizedCreative {
    try_normalize(item, table).unwrap_or_default()
}

/// Normalize a creative
///
/// An absent payload is not an error and yields an empty creative.
///
/// # Errors
/// Returns [`FetcherError::ItemDecode`] when the payload is present but is not
/// an object, or when its markup field is not text.
pub fn try_normalize(item: &RawItem, table: &FieldTable) -> FetcherResult<NormalizedCreative> {
    let Some(payload) = item.creative.as_ref() else {
        return Ok(NormalizedCreative::default());
    };

    if !payload.is_object() {
        let err = FetcherError::ItemDecode("creative payload is not an object".to_string());
        warn!(creative_id = ?item.creative_id, error = %err, "Malformed creative payload");
        return Err(err);
    }

    let markup = match table.markup.resolve(payload) {
        None => None,
        Some(Value::String(text)) => Some(text.as_str()),
        Some(_) => {
            let err = FetcherError::ItemDecode(format!("markup at '{}' is not text", table.markup));
            warn!(creative_id = ?item.creative_id, error = %err, "Malformed creative payload");
            return Err(err);
        }
    };

    let image_url = table
        .image_url
        .string(payload)
        .or_else(|| markup.and_then(first_image_in_markup));

    if references_interactive_host(&payload.to_string()) {
        return Ok(NormalizedCreative {
            image_url: Some(INTERACTIVE_SENTINEL.to_string()),
            video_url: Some(INTERACTIVE_SENTINEL.to_string()),
            youtube_id: image_url.as_deref().and_then(video_id_from_thumbnail),
            has_interactive_content: true,
        });
    }

    let youtube_id = image_url.as_deref().and_then(video_id_from_thumbnail);
    Ok(NormalizedCreative {
        video_url: youtube_id.as_deref().map(watch_url),
        youtube_id,
        image_url,
        has_interactive_content: false,
    })
}
