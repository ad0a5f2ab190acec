//! Fields subcommand

use clap::Parser;

use super::{Cli, CliError};

/// Print the field table used to decode archive responses
///
/// Prints the `--field-table` override when one is given, otherwise the
/// built-in table. The output is a valid override document to start from.
#[derive(Parser, Debug)]
pub struct FieldsCommand {}

impl FieldsCommand {
    /// Execute the fields command
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let table = cli.load_field_table()?;
        println!("{}", table.to_json_pretty()?);
        Ok(())
    }
}
