//! Validation subcommand

use clap::Parser;
use std::path::{Path, PathBuf};

use super::CliError;
use crate::fetcher::codec::FieldTable;
use crate::identifier::{parse_advertiser_url, AdvertiserId, CreativeId, RegionCode};

/// Validate command for checking identifiers, links and field tables
#[derive(Parser, Debug)]
pub struct ValidateCommand {
    /// What to validate
    #[command(subcommand)]
    pub target: ValidateTarget,
}

/// Target type for validation
#[derive(clap::Subcommand, Debug)]
pub enum ValidateTarget {
    /// Validate an advertiser id (e.g., AR13676304484790173697)
    Advertiser {
        /// Advertiser id to validate
        id: String,
    },
    /// Validate a creative id (e.g., CR10449877755155283969)
    Creative {
        /// Creative id to validate
        id: String,
    },
    /// Validate a two-letter region code
    Region {
        /// Region code to validate
        code: String,
    },
    /// Validate an archive advertiser or creative link
    Url {
        /// Archive link to validate
        url: String,
    },
    /// Validate a field-table override file
    FieldTable {
        /// Path to the JSON document
        path: PathBuf,
    },
}

impl ValidateCommand {
    /// Execute the validation command
    pub async fn execute(&self) -> Result<(), CliError> {
        match &self.target {
            ValidateTarget::Advertiser { id } => {
                let id = AdvertiserId::parse(id).inspect_err(report_invalid)?;
                println!("Valid advertiser id: {id}");
            }
            ValidateTarget::Creative { id } => {
                let id = CreativeId::parse(id).inspect_err(report_invalid)?;
                println!("Valid creative id: {id}");
            }
            ValidateTarget::Region { code } => {
                let code = RegionCode::parse(code).inspect_err(report_invalid)?;
                println!("Valid region code: {code}");
            }
            ValidateTarget::Url { url } => {
                let link = parse_advertiser_url(url).inspect_err(report_invalid)?;
                println!("Valid archive link");
                println!("  Advertiser: {}", link.advertiser_id);
                if let Some(creative_id) = &link.creative_id {
                    println!("  Creative: {creative_id}");
                }
                println!("  Region: {}", link.region);
            }
            ValidateTarget::FieldTable { path } => self.validate_field_table(path)?,
        }
        Ok(())
    }

    fn validate_field_table(&self, path: &Path) -> Result<(), CliError> {
        match FieldTable::from_json_file(path) {
            Ok(table) => {
                let builtin = FieldTable::default();
                println!("Valid field table: {}", path.display());
                println!("  Version: {}", table.version);
                if table == builtin {
                    println!("  Identical to the built-in table");
                } else if table.version == builtin.version {
                    println!("  Warning: paths differ from the built-in table but the version does not");
                }
                Ok(())
            }
            Err(e) => {
                eprintln!("Invalid field table: {e}");
                Err(e.into())
            }
        }
    }
}

fn report_invalid(e: &crate::identifier::IdentifierError) {
    eprintln!("Invalid input: {e}");
}
