//! Backup Warden - Main entry point
//!
//! Standalone backup daemon over a local data directory. The select loop
//! below is the owning context: it fires scheduled triggers and drains
//! on-context jobs (the `Finishing` phase hand-offs) between ticks.

use anyhow::Result;
use backup_warden::coordinator::{BackupCoordinator, Trigger};
use backup_warden::host::local::{LocalHost, TickScheduler};
use backup_warden::{utils, Config};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run a single backup immediately and exit
    #[arg(long)]
    once: bool,

    /// Label for a one-shot backup (stored under custom/<label>)
    #[arg(long, requires = "once")]
    label: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(label) = &args.label {
        if !backup_warden::naming::is_safe_label(label) {
            anyhow::bail!(
                "label must be a single path component (no separators or '..'), got {label:?}"
            );
        }
    }

    // Load configuration
    let mut config = if let Some(config_path) = args.config {
        Config::from_file(&config_path)?
    } else {
        Config::default()
    };
    config.validate()?;

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::info!(
        "Starting backup-warden v{} (root: {})",
        env!("CARGO_PKG_VERSION"),
        config.backup.root.display()
    );

    // The on-context queue: jobs sent here run on this loop, between ticks.
    let (tx, mut rx) = mpsc::unbounded_channel();
    let scheduler = Arc::new(TickScheduler::new(tx));
    let host = Arc::new(LocalHost::new(config.backup.data_dir.clone()));
    let interval_secs = config.backup.interval_secs;
    let coordinator = BackupCoordinator::new(config, host, scheduler);

    if args.once {
        coordinator.trigger(Trigger::manual(args.label));
        while !coordinator.is_idle() {
            match rx.recv().await {
                Some(job) => job(),
                None => break,
            }
        }
        return Ok(());
    }

    let period = Duration::from_secs(interval_secs);
    let mut ticks = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    tracing::info!(interval_secs, "Scheduled backups enabled");

    loop {
        tokio::select! {
            _ = ticks.tick() => {
                coordinator.trigger(Trigger::scheduled());
            }
            Some(job) = rx.recv() => {
                job();
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}
