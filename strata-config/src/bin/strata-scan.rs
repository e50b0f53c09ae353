use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use futures::StreamExt;
use strata_config::{CatalogConfig, ScanOptions, run_scan};
use strata_core::engine::{Progress, ValidationOutcome, ValidationRequest};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "strata-scan",
    about = "Reconcile a media directory and refresh its catalog entries"
)]
struct Cli {
    /// Directory to scan.
    root: PathBuf,
    /// Descend into every child folder, changed or not.
    #[arg(long, conflicts_with = "no_recursive")]
    recursive: bool,
    /// Ask not to descend into child folders.
    #[arg(long)]
    no_recursive: bool,
    /// Force metadata providers to refresh even unchanged entries.
    #[arg(long)]
    force_refresh: bool,
    /// Configuration file (TOML or JSON). Falls back to STRATA_CONFIG_PATH,
    /// STRATA_CONFIG_JSON, then strata.toml in the working directory.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Cancel the scan after this long, e.g. `30s` or `5m`.
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,
    /// Override the refresh fan-out cap.
    #[arg(long)]
    cap: Option<usize>,
}

impl Cli {
    fn recursive(&self) -> Option<bool> {
        match (self.recursive, self.no_recursive) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let (mut config, source) = match &cli.config {
        Some(path) => CatalogConfig::load_explicit(path)?,
        None => CatalogConfig::load_from_env()?,
    };
    if let Some(cap) = cli.cap {
        config.refresh = config.refresh.with_cap(cap);
    }
    tracing::debug!(?source, "configuration loaded");

    let cancel = CancellationToken::new();
    if let Some(timeout) = cli.timeout {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            tracing::warn!(?timeout, "scan timed out, cancelling");
            cancel.cancel();
        });
    }

    let (progress, mut updates) = Progress::channel();
    let printer = tokio::spawn(async move {
        let mut stderr = std::io::stderr();
        while let Some(percent) = updates.next().await {
            let _ = write!(stderr, "\rscanning {percent:>5.1}%");
            let _ = stderr.flush();
        }
        let _ = writeln!(stderr);
    });

    let options = ScanOptions {
        root: cli.root.clone(),
        request: ValidationRequest {
            recursive: cli.recursive(),
            force_refresh_metadata: cli.force_refresh,
        },
    };
    let result = run_scan(&config, &options, &progress, &cancel).await;
    drop(progress);
    let _ = printer.await;

    let report = result?;
    match &report.outcome {
        ValidationOutcome::Completed(summary) => {
            println!(
                "{}: {} folders, {} items ({} offline); added {}, removed {}, refresh failures {}",
                report.root.display(),
                report.folders,
                report.items,
                report.offline,
                summary.added,
                summary.removed,
                summary.refresh_failures,
            );
        }
        ValidationOutcome::Superseded => {
            println!("{}: scan superseded", report.root.display());
        }
    }
    Ok(())
}
