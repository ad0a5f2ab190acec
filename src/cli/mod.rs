//! CLI command implementations

pub mod error;
pub mod fields;
pub mod scrape;
pub mod validate;

pub use error::CliError;
pub use fields::FieldsCommand;
pub use scrape::{Cli, Commands, ScrapeArgs};
pub use validate::ValidateCommand;
