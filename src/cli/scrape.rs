//! Scrape command implementation

use clap::{Parser, Subcommand};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use super::CliError;
use crate::fetcher::codec::FieldTable;
use crate::fetcher::ArchiveHttpClient;
use crate::identifier::{parse_advertiser_url, AdvertiserId, CreativeId, RegionCode};
use crate::scraper::config::{BASE_URL, MAX_RETRIES, PAGE_SIZE};
use crate::scraper::{ScrapeConfig, ScrapeExecutor, ScrapeOutcome, ScrapeRequest};
use crate::shutdown::SharedShutdown;
use crate::AdRecord;

/// Maximum allowed concurrency; every run is an independent client and more
/// parallel runs mean more conspicuous traffic
const MAX_CONCURRENCY: usize = 8;

/// Parse and validate concurrency value
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    if value > MAX_CONCURRENCY {
        return Err(format!(
            "concurrency {value} exceeds maximum of {MAX_CONCURRENCY}"
        ));
    }
    Ok(value)
}

/// Output formats for run reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

/// Ad archive scraper CLI
#[derive(Parser, Debug)]
#[command(name = "ad-archive-scraper")]
#[command(about = "Scrape archived ad creatives from the ad transparency archive", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Report format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Number of advertisers scraped concurrently (default: 1, max: 8)
    ///
    /// Each advertiser is scraped as an isolated run with its own identity and
    /// throttle state; requests within one run are always sequential.
    #[arg(long, global = true, default_value = "1", value_parser = parse_concurrency)]
    pub concurrency: usize,

    /// Maximum number of retries for failed requests (default: 3, range: 0-10)
    #[arg(long, global = true, default_value_t = MAX_RETRIES, value_parser = clap::value_parser!(u32).range(0..=10))]
    pub max_retries: u32,

    /// Items requested per search page (default: 40, range: 1-40)
    #[arg(long, global = true, default_value_t = PAGE_SIZE as u32, value_parser = clap::value_parser!(u32).range(1..=PAGE_SIZE as i64))]
    pub page_size: u32,

    /// JSON field-table override for the ordinal-keyed response encoding
    #[arg(long, global = true)]
    pub field_table: Option<PathBuf>,

    /// Serve Prometheus metrics on this address (e.g., 127.0.0.1:9090)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,

    /// Archive origin
    #[arg(long, global = true, env = "AD_ARCHIVE_BASE_URL", default_value = BASE_URL, hide = true)]
    pub base_url: String,
}

impl Cli {
    /// Load the field table, the built-in one unless overridden
    pub fn load_field_table(&self) -> Result<FieldTable, CliError> {
        match &self.field_table {
            Some(path) => {
                let table = FieldTable::from_json_file(path)?;
                info!(version = %table.version, path = %path.display(), "Loaded field table override");
                Ok(table)
            }
            None => Ok(FieldTable::default()),
        }
    }

    /// Build the scrape configuration from global flags
    pub fn scrape_config(&self) -> Result<ScrapeConfig, CliError> {
        Ok(ScrapeConfig::default()
            .with_base_url(self.base_url.clone())
            .with_max_retries(self.max_retries)
            .with_page_size(self.page_size as usize)
            .with_field_table(self.load_field_table()?))
    }
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scrape archived ads for one or more advertisers
    Scrape(ScrapeArgs),

    /// Validate identifiers, archive links or field tables
    Validate(super::ValidateCommand),

    /// Print the field table used to decode responses
    Fields(super::FieldsCommand),
}

/// Scrape command arguments
#[derive(Parser, Debug)]
pub struct ScrapeArgs {
    /// Advertiser ids (AR…) or archive links
    #[arg(required = true)]
    pub targets: Vec<String>,

    /// Region code; overrides the region of archive links (default: QA)
    #[arg(long)]
    pub region: Option<String>,

    /// Maximum records per advertiser
    #[arg(long, default_value = "100")]
    pub max_records: usize,

    /// Known creative ids resolved one by one if batch search fails
    #[arg(long, value_delimiter = ',')]
    pub creative_ids: Vec<String>,

    /// Write records as JSON lines to this file instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

/// One resolved scrape target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeTarget {
    /// Advertiser to scrape
    pub advertiser_id: AdvertiserId,
    /// Region to scope the search to
    pub region: RegionCode,
    /// Creative named by an archive link, if any
    pub creative_id: Option<CreativeId>,
}

impl ScrapeTarget {
    /// Resolve a target from an advertiser id or archive link
    ///
    /// `region` overrides the link's region; bare ids without an override use
    /// the default region.
    pub fn parse(input: &str, region: Option<&RegionCode>) -> Result<Self, CliError> {
        if input.contains("/advertiser/") {
            let link = parse_advertiser_url(input)?;
            return Ok(Self {
                advertiser_id: link.advertiser_id,
                region: region.cloned().unwrap_or(link.region),
                creative_id: link.creative_id,
            });
        }

        Ok(Self {
            advertiser_id: AdvertiserId::parse(input)?,
            region: region.cloned().unwrap_or_default(),
            creative_id: None,
        })
    }
}

/// Per-run report line
#[derive(Debug, Serialize)]
struct RunReport<'a> {
    advertiser_id: &'a str,
    region: &'a str,
    status: &'static str,
    records: usize,
    exhausted: bool,
    error: Option<String>,
    summary: Option<&'a crate::scraper::ScrapeSummary>,
}

impl ScrapeArgs {
    /// Resolve targets and fallback ids
    pub fn build_requests(&self) -> Result<Vec<ScrapeRequest>, CliError> {
        let region = self.region.as_deref().map(RegionCode::parse).transpose()?;
        let creative_ids = self
            .creative_ids
            .iter()
            .filter(|s| !s.trim().is_empty())
            .map(|s| CreativeId::parse(s))
            .collect::<Result<Vec<_>, _>>()?;

        self.targets
            .iter()
            .map(|input| {
                let target = ScrapeTarget::parse(input, region.as_ref())?;
                let mut ids = creative_ids.clone();
                if let Some(id) = target.creative_id {
                    if !ids.contains(&id) {
                        ids.insert(0, id);
                    }
                }
                Ok(ScrapeRequest::new(target.advertiser_id, target.region, self.max_records)
                    .with_creative_ids(ids))
            })
            .collect()
    }

    /// Execute the scrape command
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let requests = self.build_requests()?;
        let config = cli.scrape_config()?;
        let transport = ArchiveHttpClient::new(config.base_url.clone(), config.request_timeout)?;
        let executor = Arc::new(ScrapeExecutor::new(Arc::new(transport), config).with_shutdown(shutdown));

        let progress = create_progress_bar(requests.len());
        let total = requests.len();

        let results: Vec<(ScrapeRequest, Result<ScrapeOutcome, crate::ScrapeError>)> =
            stream::iter(requests)
                .map(|request| {
                    let executor = Arc::clone(&executor);
                    let progress = progress.clone();
                    async move {
                        progress.set_message(format!("Scraping {}", request.advertiser_id));
                        let result = executor.scrape(request.clone()).await;
                        progress.inc(1);
                        (request, result)
                    }
                })
                .buffer_unordered(cli.concurrency)
                .collect()
                .await;

        progress.finish_and_clear();

        let mut sink = open_sink(self.output.as_deref())?;
        let mut failed = 0;

        for (request, result) in &results {
            match result {
                Ok(outcome) => {
                    write_records(&mut sink, &outcome.records)?;
                    report(cli.output_format, request, Ok(outcome));
                }
                Err(e) => {
                    failed += 1;
                    error!(advertiser_id = %request.advertiser_id, "Scrape failed: {}", e);
                    report(cli.output_format, request, Err(&e.to_string()));
                }
            }
        }

        sink.flush()
            .map_err(|e| CliError::OutputError(format!("Failed to flush output: {e}")))?;

        if failed > 0 {
            return Err(CliError::PartialFailure { failed, total });
        }
        Ok(())
    }
}

fn open_sink(path: Option<&Path>) -> Result<Box<dyn Write>, CliError> {
    match path {
        Some(path) => {
            let file = File::create(path).map_err(|e| {
                CliError::OutputError(format!("Failed to create {}: {e}", path.display()))
            })?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(BufWriter::new(io::stdout()))),
    }
}

/// Write records as JSON lines
pub fn write_records<W: Write>(sink: &mut W, records: &[AdRecord]) -> Result<(), CliError> {
    for record in records {
        serde_json::to_writer(&mut *sink, record)
            .map_err(|e| CliError::OutputError(format!("Failed to serialize record: {e}")))?;
        sink.write_all(b"\n")
            .map_err(|e| CliError::OutputError(format!("Failed to write record: {e}")))?;
    }
    Ok(())
}

fn report(format: OutputFormat, request: &ScrapeRequest, result: Result<&ScrapeOutcome, &str>) {
    let advertiser_id = request.advertiser_id.as_str();
    let region = request.region.as_str();

    match format {
        OutputFormat::Json => {
            let line = match result {
                Ok(outcome) => RunReport {
                    advertiser_id,
                    region,
                    status: if outcome.summary.cancelled { "cancelled" } else { "completed" },
                    records: outcome.records.len(),
                    exhausted: outcome.exhausted,
                    error: None,
                    summary: Some(&outcome.summary),
                },
                Err(error) => RunReport {
                    advertiser_id,
                    region,
                    status: "failed",
                    records: 0,
                    exhausted: false,
                    error: Some(error.to_string()),
                    summary: None,
                },
            };
            if let Ok(json) = serde_json::to_string(&line) {
                eprintln!("{json}");
            }
        }
        OutputFormat::Human => match result {
            Ok(outcome) => {
                let state = if outcome.exhausted { "archive exhausted" } else { "quota met" };
                eprintln!(
                    "{advertiser_id} ({region}): {} records, {state}",
                    outcome.records.len()
                );
                eprintln!("  {}", outcome.summary);
                if !outcome.summary.unresolved_ids.is_empty() {
                    let ids: Vec<&str> = outcome
                        .summary
                        .unresolved_ids
                        .iter()
                        .map(|id| id.as_str())
                        .collect();
                    eprintln!("  Unresolved: {}", ids.join(", "));
                }
            }
            Err(error) => eprintln!("{advertiser_id} ({region}): FAILED - {error}"),
        },
    }
}

fn create_progress_bar(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}
