//! Intelbridge Ingest - indicator import tool

use anyhow::{Context, Result};
use clap::Parser;
use intelbridge_common::logging::{init_logging, LogConfig, LogLevel};
use intelbridge_ingest::misp::{MispClient, RetryingDestination};
use intelbridge_ingest::source::JsonLinesSource;
use intelbridge_ingest::tags::FeedTagger;
use intelbridge_ingest::transport::RetryingTransport;
use intelbridge_ingest::{ImportSettings, IngestPipeline};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "intelbridge-ingest")]
#[command(author, version, about = "Import intel feed indicators into MISP")]
struct Cli {
    /// Settings file (TOML). Environment variables are used when omitted.
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Indicator feed, one JSON record per line
    #[arg(long)]
    source: PathBuf,

    /// Ignore the saved checkpoint
    #[arg(long)]
    force: bool,

    /// Plain log line instead of the banner
    #[arg(long)]
    no_banners: bool,

    /// Drop indicators the feed marks as deleted
    #[arg(long)]
    delete_outdated: bool,

    /// Record duplicates as sightings
    #[arg(long)]
    sightings: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("intelbridge-ingest")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    let mut settings = match &cli.settings {
        Some(path) => ImportSettings::load(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => ImportSettings::from_env(),
    };
    settings.force |= cli.force;
    settings.no_banners |= cli.no_banners;
    settings.delete_outdated_indicators |= cli.delete_outdated;
    settings.log_duplicates_as_sightings |= cli.sightings;
    settings.validate()?;

    let client = MispClient::new(&settings.misp_url, &settings.misp_auth_key, settings.misp_enable_ssl)
        .context("Failed to create MISP client")?;
    let destination = RetryingDestination::new(Arc::new(client), RetryingTransport::default());
    let source = JsonLinesSource::open(&cli.source)
        .with_context(|| format!("Failed to read indicators from {}", cli.source.display()))?;
    info!(source = %source.path().display(), "Using indicator feed");
    let tagger = FeedTagger::new(&settings.galaxy_map);

    let summary = IngestPipeline::new(settings, destination, Arc::new(source), Arc::new(tagger))
        .run()
        .await
        .context("Indicator import failed")?;

    info!(
        indicators = summary.indicators,
        created = summary.attributes_created,
        "Import complete"
    );
    Ok(())
}
