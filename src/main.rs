use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use image_harvester::harvest::{Harvester, ShutdownSignal};
use image_harvester::{ApiConfig, HarvestConfig, QuerySpace, SearchClient};

/// Checkpointed, resumable image metadata harvester.
#[derive(Parser, Debug)]
#[command(name = "image-harvester", version, about)]
struct Cli {
    /// Provider API key
    #[arg(long, env = "PIXABAY_API_KEY")]
    api_key: String,

    /// Search API endpoint
    #[arg(long, default_value = "https://pixabay.com/api/")]
    api_url: String,

    /// Search term (repeatable); expanded with the default filter modifiers
    #[arg(long = "term", required_unless_present = "query_file")]
    terms: Vec<String>,

    /// JSON file describing the full query space (overrides --term)
    #[arg(long)]
    query_file: Option<PathBuf>,

    /// Checkpoint file path
    #[arg(long, default_value = "harvest_checkpoint.json")]
    checkpoint: PathBuf,

    /// Append-only metadata log path
    #[arg(long, default_value = "harvest_results.jsonl")]
    metadata_log: PathBuf,

    /// Directory for downloaded image assets
    #[arg(long, default_value = "images")]
    asset_dir: PathBuf,

    /// Also download each new result's image file
    #[arg(long)]
    download: bool,

    /// Results requested per page
    #[arg(long, default_value_t = 200, value_parser = clap::value_parser!(u32).range(1..))]
    per_page: u32,

    /// Persist the checkpoint after every N pages
    #[arg(long, default_value_t = 1)]
    checkpoint_every: u32,
}

impl Cli {
    fn query_space(&self) -> anyhow::Result<QuerySpace> {
        if let Some(path) = &self.query_file {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading query file '{}'", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("parsing query file '{}'", path.display()))
        } else {
            Ok(QuerySpace::with_terms(self.terms.clone()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let queries = cli.query_space()?;

    let api_config = ApiConfig {
        api_url: cli.api_url.clone(),
        api_key: cli.api_key.clone(),
        ..ApiConfig::default()
    };
    let harvest_config = HarvestConfig {
        per_page: cli.per_page,
        checkpoint_every_pages: cli.checkpoint_every,
        download_assets: cli.download,
        checkpoint_path: cli.checkpoint.clone(),
        metadata_log_path: cli.metadata_log.clone(),
        asset_dir: cli.asset_dir.clone(),
        queries,
        ..HarvestConfig::default()
    };

    let client = SearchClient::new(api_config)?;
    let shutdown = ShutdownSignal::new();

    let ctrl_c_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; finishing the current page and saving the checkpoint");
            ctrl_c_signal.trigger();
        }
    });

    let harvester =
        Harvester::new(client.clone(), client, harvest_config).with_shutdown(shutdown);
    let report = harvester.run().await?;

    info!(
        unique = report.unique_collected,
        new_records = report.new_records,
        interrupted = report.interrupted,
        "done"
    );
    println!(
        "collected {} unique records ({} new this run){}",
        report.unique_collected,
        report.new_records,
        if report.interrupted {
            " (interrupted, progress checkpointed)"
        } else {
            ""
        }
    );
    Ok(())
}
