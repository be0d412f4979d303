use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use wikisync_core::checkpoint::CheckpointUpdate;
use wikisync_core::config::{ConfigOverrides, DEFAULT_CONFIG_FILENAME, load_config};
use wikisync_core::sync::{PageResult, SyncOptions, SyncReport, run_sync};

#[derive(Debug, Parser)]
#[command(
    name = "wikisync",
    version,
    about = "Sync recent MediaWiki changes into per-page diff and full-text snapshots"
)]
struct Cli {
    #[arg(long, help = "Perform the sync (without it only this help is printed)")]
    run: bool,
    #[arg(
        long,
        value_name = "TIMESTAMP",
        help = "Start from this time instead of the stored checkpoint, e.g. 2025-11-28T00:00:00Z"
    )]
    since: Option<String>,
    #[arg(long, value_name = "TITLE", help = "Only sync this page")]
    title: Option<String>,
    #[arg(
        long,
        help = "In single-page mode, still advance the stored checkpoint afterwards"
    )]
    update_timestamp: bool,
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_FILENAME)]
    config: PathBuf,
    #[arg(long, value_name = "PATH", help = "Root directory for run output")]
    output_dir: Option<PathBuf>,
    #[arg(long, value_name = "PATH", help = "Checkpoint file location")]
    checkpoint_file: Option<PathBuf>,
    #[arg(long, help = "Print the sync report as JSON")]
    json: bool,
    #[arg(
        long,
        value_name = "FILTER",
        default_value = "info",
        help = "Log filter used when RUST_LOG is unset"
    )]
    log_level: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if !cli.run {
        let mut command = Cli::command();
        command.print_help()?;
        println!();
        return Ok(());
    }

    init_tracing(&cli.log_level);
    dotenvy::dotenv().ok();

    let config = load_config(&cli.config)?;
    info!(config = %normalize_path(&cli.config), "configuration loaded");
    let overrides = ConfigOverrides {
        output_dir: cli.output_dir.clone(),
        checkpoint_file: cli.checkpoint_file.clone(),
    };
    let options = SyncOptions {
        since: cli.since.clone(),
        title: cli.title.clone(),
        update_checkpoint: cli.update_timestamp,
    };

    let report = run_sync(&config, &overrides, &options)?;
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("failed to serialize sync report")?
        );
    } else {
        print_report(&report);
    }
    Ok(())
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_report(report: &SyncReport) {
    println!("wikisync");
    println!("success: {}", report.success);
    println!("mode: {}", report.mode.as_str());
    println!("since: {}", report.since);
    println!("pages_listed: {}", report.pages_listed);
    println!("listing_complete: {}", report.listing_complete);
    println!("synced: {}", report.synced);
    println!("created: {}", report.created);
    println!("updated: {}", report.updated);
    println!("missing: {}", report.missing);
    println!("failed: {}", report.failed);
    for page in &report.pages {
        print_page(page);
    }
    match &report.checkpoint {
        Some(CheckpointUpdate::Advanced(timestamp)) => println!("checkpoint: {timestamp} (advanced)"),
        Some(CheckpointUpdate::Unchanged(timestamp)) => {
            println!("checkpoint: {timestamp} (unchanged)")
        }
        None => println!("checkpoint: <not updated>"),
    }
    println!(
        "run_dir: {}",
        report
            .run_dir
            .as_deref()
            .map(normalize_path)
            .unwrap_or_else(|| "<none>".to_string())
    );
    println!("request_count: {}", report.request_count);
}

fn print_page(page: &PageResult) {
    let action = page.action.as_str();
    match &page.detail {
        Some(detail) => println!("page: {} [{action}] {detail}", page.title),
        None => println!("page: {} [{action}]", page.title),
    }
    if let Some(path) = &page.diff_path {
        println!("  diff: {}", normalize_path(path));
    }
    if let Some(path) = &page.full_path {
        println!("  full: {}", normalize_path(path));
    }
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
