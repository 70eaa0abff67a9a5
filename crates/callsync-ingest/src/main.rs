//! Callsync - CRM call sync entry point

use anyhow::{Context, Result};
use callsync_common::logging::{init_logging, LogConfig, LogLevel};
use callsync_ingest::config::PipelineConfig;
use callsync_ingest::crm::CrmClient;
use callsync_ingest::fetcher::CallFetcher;
use callsync_ingest::pipeline::{extract, since_date};
use callsync_ingest::staging::write_local;
use callsync_ingest::Pipeline;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "callsync")]
#[command(author, version, about = "Sync CRM call statistics into the warehouse")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Fetch, clean, stage and merge recent calls
    Run {
        /// Days of history to fetch (defaults to SYNC_LOOKBACK_DAYS)
        #[arg(short, long)]
        days: Option<u32>,

        /// Fetch and clean only; nothing is staged or merged
        #[arg(long)]
        dry_run: bool,

        /// With --dry-run, write the cleaned records here as NDJSON
        #[arg(short, long, requires = "dry_run")]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("callsync")
        .build()
        .merge_env()?;

    init_logging(&log_config)?;

    // Every step is awaited in order; one thread is all a run needs
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;

    runtime.block_on(execute(cli.command))
}

async fn execute(command: Command) -> Result<()> {
    let config = PipelineConfig::from_env()?;

    match command {
        Command::Run {
            days,
            dry_run: true,
            output,
        } => {
            let since = since_date(days.unwrap_or(config.lookback_days));
            let fetcher = CallFetcher::new(CrmClient::new(config.crm.clone())?, config.retry.clone());
            let extracted = extract(&fetcher, &config.cleaning, since).await;

            info!(
                since = %since,
                fetched = extracted.raw.len(),
                cleaned = extracted.batch.len(),
                columns = extracted.batch.columns.len(),
                "Dry run complete"
            );

            if let Some(path) = output {
                let bytes = write_local(&path, &extracted.batch.records)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!(path = %path.display(), bytes, "Wrote cleaned records");
            }
        },
        Command::Run { days, .. } => {
            let pipeline = Pipeline::from_config(&config)?;
            let summary = pipeline.run(days.unwrap_or(config.lookback_days)).await?;
            info!(
                since = %summary.since,
                fetched = summary.fetched,
                cleaned = summary.cleaned,
                merged = summary.merged,
                "Sync finished"
            );
        },
    }

    Ok(())
}
