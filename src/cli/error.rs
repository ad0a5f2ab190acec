//! CLI error types and conversions

use crate::fetcher::codec::FieldTableError;
use crate::fetcher::FetcherError;
use crate::identifier::IdentifierError;
use crate::scraper::ScrapeError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Identifier error
    #[error("identifier error: {0}")]
    IdentifierError(#[from] IdentifierError),

    /// Field table error
    #[error("field table error: {0}")]
    FieldTableError(#[from] FieldTableError),

    /// Scrape error
    #[error("scrape error: {0}")]
    ScrapeError(#[from] ScrapeError),

    /// Fetcher error
    #[error("fetcher error: {0}")]
    FetcherError(#[from] FetcherError),

    /// Output error
    #[error("output error: {0}")]
    OutputError(String),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Some runs of a multi-advertiser scrape failed
    #[error("{failed} of {total} scrape runs failed")]
    PartialFailure {
        /// Failed runs
        failed: usize,
        /// All runs
        total: usize,
    },
}
