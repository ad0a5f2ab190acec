//! Versioned key-path table for the ordinal-keyed wire format
//!
//! The archive answers with JSON objects keyed by numeric strings (`"1"`,
//! `"2"`, …) in place of field names. The mapping below was reverse-engineered
//! from observed traffic and may drift; it is data, not code, so a changed
//! encoding is fixed by shipping a new table (see [`FieldTable::from_json_file`]).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;

/// Version of the built-in table
pub const BUILTIN_TABLE_VERSION: &str = "2025-10-observed";

/// Dotted path of ordinal keys, e.g. `"3.3.2"`
///
/// Each segment is looked up as an object key; on arrays a numeric segment
/// is used as an index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyPath(Vec<String>);

impl KeyPath {
    /// Parse a dotted path
    pub fn parse(path: &str) -> Result<Self, FieldTableError> {
        let segments: Vec<String> = path.split('.').map(|s| s.trim().to_string()).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(FieldTableError::InvalidPath(path.to_string()));
        }
        Ok(Self(segments))
    }

    /// Follow the path from `root`. JSON `null` counts as absent.
    pub fn resolve<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        let mut current = root;
        for segment in &self.0 {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        (!current.is_null()).then_some(current)
    }

    /// Resolve to a non-empty string; numbers are rendered as strings
    pub fn string(&self, root: &Value) -> Option<String> {
        match self.resolve(root)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Resolve to an integer; numeric strings are accepted, fractions are not
    pub fn integer(&self, root: &Value) -> Option<i64> {
        match self.resolve(root)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl TryFrom<String> for KeyPath {
    type Error = FieldTableError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        KeyPath::parse(&value)
    }
}

impl From<KeyPath> for String {
    fn from(path: KeyPath) -> Self {
        path.0.join(".")
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

fn path(p: &str) -> KeyPath {
    KeyPath(p.split('.').map(str::to_string).collect())
}

/// Key paths for every semantic field the decoder extracts
///
/// Item-level paths are relative to one item; `image_url` and `markup` are
/// relative to the creative payload; `region_code` is relative to one entry of
/// the region list. Missing fields in an override document keep their
/// built-in value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldTable {
    /// Table version, reported with decode-failure metrics
    pub version: String,
    /// Item list in a search page
    pub items: KeyPath,
    /// Continuation token in a search page
    pub continuation_token: KeyPath,
    /// Single item in a lookup response
    pub lookup_item: KeyPath,
    /// Advertiser id
    pub advertiser_id: KeyPath,
    /// Creative id
    pub creative_id: KeyPath,
    /// Format code (1 text, 2 image, 3 video)
    pub format_code: KeyPath,
    /// Nested creative payload
    pub creative_payload: KeyPath,
    /// Direct asset URL inside the payload
    pub image_url: KeyPath,
    /// Raw markup inside the payload
    pub markup: KeyPath,
    /// Advertiser display name, first non-empty path wins
    pub advertiser_name: Vec<KeyPath>,
    /// First-shown epoch seconds
    pub first_seen: KeyPath,
    /// Last-shown epoch seconds
    pub last_seen: KeyPath,
    /// Region list
    pub regions: KeyPath,
    /// Region code inside one region entry
    pub region_code: KeyPath,
}

impl Default for FieldTable {
    fn default() -> Self {
        Self {
            version: BUILTIN_TABLE_VERSION.to_string(),
            items: path("1"),
            continuation_token: path("2"),
            lookup_item: path("1"),
            advertiser_id: path("1"),
            creative_id: path("2"),
            format_code: path("5"),
            creative_payload: path("3"),
            image_url: path("1.4"),
            markup: path("3.2"),
            advertiser_name: vec![path("12.1"), path("12.2.0.1"), path("12.3.0.1")],
            first_seen: path("4.1"),
            last_seen: path("6.1"),
            regions: path("7"),
            region_code: path("2"),
        }
    }
}

impl FieldTable {
    /// Parse an override document
    pub fn from_json_str(json: &str) -> Result<Self, FieldTableError> {
        let table: FieldTable =
            serde_json::from_str(json).map_err(|e| FieldTableError::Parse(e.to_string()))?;
        table.validate()?;
        Ok(table)
    }

    /// Load an override document from disk
    pub fn from_json_file(path: &Path) -> Result<Self, FieldTableError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| FieldTableError::Io(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    /// Render the table as pretty JSON
    pub fn to_json_pretty(&self) -> Result<String, FieldTableError> {
        serde_json::to_string_pretty(self).map_err(|e| FieldTableError::Parse(e.to_string()))
    }

    /// Check table consistency
    pub fn validate(&self) -> Result<(), FieldTableError> {
        if self.version.trim().is_empty() {
            return Err(FieldTableError::Invalid("version cannot be empty".to_string()));
        }
        if self.advertiser_name.is_empty() {
            return Err(FieldTableError::Invalid(
                "advertiser_name needs at least one path".to_string(),
            ));
        }
        Ok(())
    }

    /// First non-empty advertiser name
    pub fn advertiser_name_of(&self, item: &Value) -> Option<String> {
        self.advertiser_name.iter().find_map(|p| p.string(item))
    }
}

/// Field table errors
#[derive(Debug, thiserror::Error)]
pub enum FieldTableError {
    /// Empty segment in a dotted path
    #[error("invalid key path: '{0}'")]
    InvalidPath(String),

    /// Document is not a valid table
    #[error("field table parse error: {0}")]
    Parse(String),

    /// Table failed validation
    #[error("invalid field table: {0}")]
    Invalid(String),

    /// File could not be read
    #[error("field table IO error: {0}")]
    Io(String),
}
