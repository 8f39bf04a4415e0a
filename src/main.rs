use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use pim_sync::config::SyncConfig;
use pim_sync::media::pipeline::MediaPipeline;
use pim_sync::product::ProductRecord;
use pim_sync::sink::NdjsonSink;
use pim_sync::tracing::init_tracing;
use pim_sync::util::env as env_util;
use pim_sync::{sync_products, SyncOptions};

#[derive(Parser, Debug)]
#[command(name = "pim-sync", version, about = "PIM to storefront media sync")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Run the media pipeline over an NDJSON product export
    Sync {
        /// Path to the NDJSON file of product records
        #[arg(long)]
        input: PathBuf,
        /// Output NDJSON path for persisted media records (default: stdout)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Per-product image concurrency (default: env/3)
        #[arg(long)]
        concurrency: Option<usize>,
        /// Concurrent products (default: env/2)
        #[arg(long)]
        product_concurrency: Option<usize>,
        /// Base URL for resolving relative attribute paths
        #[arg(long)]
        base_url: Option<String>,
        /// Reprocess images the sink already holds
        #[arg(long, default_value_t = false)]
        force_reprocess: bool,
    },
    /// Validate configuration and probe enabled backends
    CheckConfig,
}

fn read_products(path: &PathBuf) -> Result<Vec<ProductRecord>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut products = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ProductRecord>(&line) {
            Ok(product) => products.push(product),
            Err(err) => warn!(line = line_no + 1, error = %err, "skipping unparseable product line"),
        }
    }
    Ok(products)
}

async fn run_sync(
    config: SyncConfig,
    input: PathBuf,
    output: Option<PathBuf>,
    options: SyncOptions,
) -> Result<()> {
    let pipeline = MediaPipeline::from_config(config).context("media pipeline startup")?;
    let products = read_products(&input)?;
    info!(products = products.len(), input = %input.display(), "product export loaded");

    let report = match output {
        Some(path) => {
            let file = tokio::fs::File::create(&path)
                .await
                .with_context(|| format!("create {}", path.display()))?;
            let sink = NdjsonSink::new(tokio::io::BufWriter::new(file));
            let report = sync_products(&pipeline, &sink, &products, &options).await?;
            sink.flush().await?;
            report
        }
        None => {
            let sink = NdjsonSink::new(tokio::io::stdout());
            let report = sync_products(&pipeline, &sink, &products, &options).await?;
            sink.flush().await?;
            report
        }
    };

    report.log_summary();
    for err in &report.errors {
        warn!(sku = %err.identifier, message = %err.message, "degraded item");
    }
    Ok(())
}

async fn run_check_config(config: SyncConfig) -> Result<()> {
    env_util::preflight_check(
        "pim-sync",
        &[],
        &[
            "MEDIA_CDN_ENABLED",
            "MEDIA_CDN_ACCOUNT_ID",
            "MEDIA_CDN_API_TOKEN",
            "MEDIA_STORAGE_ENABLED",
            "MEDIA_STORAGE_ENDPOINT",
            "MEDIA_STORAGE_BUCKET",
            "MEDIA_STORAGE_API_KEY",
            "MEDIA_CONCURRENCY",
            "SYNC_BASE_URL",
        ],
    )?;
    let pipeline = MediaPipeline::from_config(config).context("media pipeline startup")?;
    let checks = pipeline.check_backends().await;
    if checks.is_empty() {
        warn!("no upload backends enabled; pipeline would emit fallback images only");
        return Ok(());
    }
    let mut failed = false;
    for (service, outcome) in checks {
        match outcome {
            Ok(()) => info!(service, "backend reachable"),
            Err(err) => {
                failed = true;
                warn!(service, error = %err, "backend check failed");
            }
        }
    }
    if failed {
        anyhow::bail!("one or more backend checks failed");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_util::init_env();
    init_tracing("info")?;

    let cli = Cli::parse();
    let config = SyncConfig::from_env();

    match cli.command {
        Commands::Sync {
            input,
            output,
            concurrency,
            product_concurrency,
            base_url,
            force_reprocess,
        } => {
            let options = SyncOptions {
                concurrency,
                product_concurrency,
                base_url,
                force_reprocess,
            };
            run_sync(config, input, output, options).await
        }
        Commands::CheckConfig => run_check_config(config).await,
    }
}
