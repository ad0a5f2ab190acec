//! Ordinal-keyed wire format
//!
//! All knowledge of numeric keys lives in this module: [`field_table`] maps
//! key paths to semantic fields, [`decode`] reads response bodies through it,
//! [`encode`] builds request payloads and [`creative`] resolves asset
//! references from the creative payload.

pub mod creative;
pub mod decode;
pub mod encode;
pub mod field_table;

pub use creative::{normalize, try_normalize};
pub use decode::{decode_item, decode_lookup, decode_page, DecodedPage, RawItem};
pub use encode::{lookup_request, search_request};
pub use field_table::{FieldTable, FieldTableError, KeyPath, BUILTIN_TABLE_VERSION};
