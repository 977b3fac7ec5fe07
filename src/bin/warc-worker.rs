//! warc-worker CLI - runs the claim/download/upload loop or prints item names.

use clap::{Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use warc_worker::codec::{RangeNames, decode};
use warc_worker::{Config, Orchestrator, StopReason, run_with_shutdown};

#[derive(Parser)]
#[command(name = "warc-worker", version, about = "Distributed web-archiving worker")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Claim items from the tracker and process them until stopped
    Run(RunArgs),
    /// Print item names covering an identifier range
    ItemNames {
        /// First identifier (base-36)
        #[arg(long)]
        start: String,
        /// Last identifier, inclusive (base-36)
        #[arg(long)]
        end: String,
        /// Identifiers per item
        #[arg(long, default_value_t = 1000)]
        per_item: u64,
        /// Item type prefix
        #[arg(long, default_value = "image")]
        item_type: String,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Nickname reported to the tracker
    #[arg(long)]
    downloader: Option<String>,
    /// Directory for workspaces and finished artifacts
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Items processed in parallel
    #[arg(long)]
    concurrent_items: Option<usize>,
    /// Simultaneous uploads (1-4)
    #[arg(long)]
    upload_concurrency: Option<usize>,
    /// Local address the fetch process binds to
    #[arg(long)]
    bind_address: Option<IpAddr>,
    /// Stop after this many items
    #[arg(long)]
    max_items: Option<u64>,
    /// Stop after this many seconds
    #[arg(long)]
    run_timeout_secs: Option<u64>,
}

impl RunArgs {
    fn into_config(self) -> warc_worker::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_toml_file(path)?,
            None => Config::default(),
        };

        if let Some(downloader) = self.downloader {
            config.worker.downloader = downloader;
        }
        if let Some(data_dir) = self.data_dir {
            config.worker.data_dir = data_dir;
        }
        if let Some(n) = self.concurrent_items {
            config.worker.concurrent_items = n;
        }
        if let Some(n) = self.upload_concurrency {
            config.upload.max_concurrent = n;
        }
        if let Some(addr) = self.bind_address {
            config.fetch.bind_address = Some(addr);
        }
        if let Some(n) = self.max_items {
            config.worker.max_items = Some(n);
        }
        if let Some(secs) = self.run_timeout_secs {
            config.worker.run_timeout = Some(Duration::from_secs(secs));
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run(args) => cmd_run(args).await,
        Command::ItemNames {
            start,
            end,
            per_item,
            item_type,
        } => cmd_item_names(&start, &end, per_item, &item_type),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, code = e.error_code(), "worker stopped");
            eprintln!("error [{}]: {e}", e.error_code());
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

async fn cmd_run(args: RunArgs) -> warc_worker::Result<()> {
    let config = args.into_config()?;
    let orchestrator = Orchestrator::new(config).await?;

    let summary = run_with_shutdown(orchestrator).await?;
    tracing::info!(
        claimed = summary.claimed,
        completed = summary.completed,
        failed = summary.failed,
        stop_reason = ?summary.stop_reason,
        "run finished"
    );
    if summary.stop_reason == StopReason::Cancelled {
        println!("Stopped: {} completed, {} failed", summary.completed, summary.failed);
    } else {
        println!("Done: {} completed, {} failed", summary.completed, summary.failed);
    }
    Ok(())
}

fn cmd_item_names(
    start: &str,
    end: &str,
    per_item: u64,
    item_type: &str,
) -> warc_worker::Result<()> {
    let start = decode(start)?;
    let end = decode(end)?;
    for name in RangeNames::new(item_type, start, end, per_item) {
        println!("{name}");
    }
    Ok(())
}
