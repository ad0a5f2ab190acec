//! Archive identifier parsing and validation
//!
//! Advertisers are addressed as `AR<digits>`, creatives as `CR<digits>`, and
//! regions as two-letter codes. Archive links look like
//! `https://adstransparency.google.com/advertiser/AR…/creative/CR…?region=qa`.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Region used when an archive link carries no `region` query parameter.
pub const DEFAULT_REGION: &str = "QA";

/// Advertiser identifier (`AR` followed by digits)
///
/// # Examples
///
/// ```
/// use ad_archive_scraper::identifier::AdvertiserId;
///
/// let id = AdvertiserId::parse("ar13676304484790173697").unwrap();
/// assert_eq!(id.as_str(), "AR13676304484790173697");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdvertiserId(String);

impl AdvertiserId {
    /// Parse an advertiser id. Input is trimmed and upper-cased.
    pub fn parse(s: &str) -> Result<Self, IdentifierError> {
        parse_prefixed(s, "AR", "advertiser").map(Self)
    }

    /// Borrow the normalized id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AdvertiserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Creative identifier (`CR` followed by digits)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CreativeId(String);

impl CreativeId {
    /// Parse a creative id. Input is trimmed and upper-cased.
    pub fn parse(s: &str) -> Result<Self, IdentifierError> {
        parse_prefixed(s, "CR", "creative").map(Self)
    }

    /// Borrow the normalized id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CreativeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Two-letter region code, normalized to uppercase
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionCode(String);

impl RegionCode {
    /// Parse a region code such as `qa` or `AE`
    pub fn parse(s: &str) -> Result<Self, IdentifierError> {
        let code = s.trim().to_uppercase();
        if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(IdentifierError::InvalidFormat(format!(
                "region code must be two letters, got '{}'",
                s.trim()
            )));
        }
        Ok(Self(code))
    }

    /// Borrow the normalized code
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RegionCode {
    fn default() -> Self {
        Self(DEFAULT_REGION.to_string())
    }
}

impl fmt::Display for RegionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Components extracted from an archive link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveLink {
    /// Advertiser the link points at
    pub advertiser_id: AdvertiserId,
    /// Creative, when the link targets a single ad
    pub creative_id: Option<CreativeId>,
    /// Region from the query string, or [`DEFAULT_REGION`]
    pub region: RegionCode,
}

/// Parse an archive advertiser or creative link
///
/// # Examples
///
/// ```
/// use ad_archive_scraper::identifier::parse_advertiser_url;
///
/// let link = parse_advertiser_url(
///     "https://adstransparency.google.com/advertiser/AR14306592000630063105?region=ae",
/// )
/// .unwrap();
/// assert_eq!(link.advertiser_id.as_str(), "AR14306592000630063105");
/// assert_eq!(link.region.as_str(), "AE");
/// assert!(link.creative_id.is_none());
/// ```
pub fn parse_advertiser_url(link: &str) -> Result<ArchiveLink, IdentifierError> {
    let input = link.trim();
    let parsed = match Url::parse(input) {
        Ok(parsed) => parsed,
        // Links pasted without a scheme
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(&format!("https://{input}"))
            .map_err(|e| IdentifierError::InvalidFormat(format!("invalid link '{input}': {e}")))?,
        Err(e) => {
            return Err(IdentifierError::InvalidFormat(format!(
                "invalid link '{input}': {e}"
            )))
        }
    };

    let segments: Vec<String> = parsed
        .path_segments()
        .map(|segments| {
            segments
                .filter(|s| !s.is_empty())
                .map(percent_decode)
                .collect()
        })
        .unwrap_or_default();

    let advertiser_id = segment_after(&segments, "advertiser")
        .ok_or_else(|| {
            IdentifierError::InvalidFormat(format!("no /advertiser/ segment in '{input}'"))
        })
        .and_then(AdvertiserId::parse)?;

    let creative_id = segment_after(&segments, "creative")
        .map(CreativeId::parse)
        .transpose()?;

    let region = parsed
        .query_pairs()
        .find(|(key, _)| key == "region")
        .map(|(_, value)| RegionCode::parse(&value))
        .transpose()?
        .unwrap_or_default();

    Ok(ArchiveLink {
        advertiser_id,
        creative_id,
        region,
    })
}

/// Percent-decode one path segment
fn percent_decode(segment: &str) -> String {
    url::form_urlencoded::parse(format!("s={}", segment.replace('+', "%2B")).as_bytes())
        .next()
        .map(|(_, value)| value.into_owned())
        .unwrap_or_else(|| segment.to_string())
}

fn segment_after<'a>(segments: &'a [String], marker: &str) -> Option<&'a str> {
    segments
        .iter()
        .position(|s| s == marker)
        .and_then(|i| segments.get(i + 1))
        .map(String::as_str)
}

fn parse_prefixed(s: &str, prefix: &str, kind: &str) -> Result<String, IdentifierError> {
    let id = s.trim().to_uppercase();
    let digits = id.strip_prefix(prefix).ok_or_else(|| {
        IdentifierError::InvalidFormat(format!("{kind} id must start with {prefix}, got '{}'", s.trim()))
    })?;

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(IdentifierError::InvalidFormat(format!(
            "{kind} id must be {prefix} followed by digits, got '{}'",
            s.trim()
        )));
    }

    Ok(id)
}

/// Errors that can occur during identifier parsing
#[derive(Debug, thiserror::Error)]
pub enum IdentifierError {
    /// Invalid identifier format
    #[error("identifier error: {0}")]
    InvalidFormat(String),
}
