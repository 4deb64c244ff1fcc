//! Log Backup Agent - Main entry point
//!
//! The process always exits with status 0: it runs under a supervisor that
//! should only ever learn about failures from the log stream.

use anyhow::{Context, Result};
use clap::Parser;
use log_backup_agent::{
    config::{self, Config},
    daemon::shutdown::ShutdownCoordinator,
    executor::BackupExecutor,
    utils,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log file to watch (overrides SOURCE_FILE / LOG_FILE)
    #[arg(short, long, value_name = "FILE")]
    source: Option<PathBuf>,

    /// Backup directory (overrides BACKUP_DIR)
    #[arg(short, long, value_name = "DIR")]
    backup_dir: Option<PathBuf>,

    /// Poll interval in seconds (overrides BACKUP_INTERVAL)
    #[arg(short, long, value_name = "SECS")]
    interval: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // --help, --version and usage errors alike end with status 0.
            let _ = e.print();
            return;
        }
    };

    if let Err(e) = run(args).await {
        tracing::error!("Fatal unexpected error: {:#}", e);
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            init_logging(args.log_level.as_deref().unwrap_or("info"));
            return Err(e.into());
        }
    };

    if let Some(source) = args.source {
        config.watch.source_file = source;
    }
    if let Some(dir) = args.backup_dir {
        config.watch.backup_dir = dir;
    }
    if let Some(raw) = args.interval.as_deref() {
        config.watch.interval_secs = config::parse_interval(raw);
    }
    if let Some(level) = args.log_level {
        config.log.level = level;
    }

    init_logging(&config.log.level);

    tracing::info!("Starting log-backup-agent v{}", env!("CARGO_PKG_VERSION"));

    let shutdown = ShutdownCoordinator::new();
    let listener = shutdown.listen();
    let cancel = shutdown.token();

    let watch = config.watch.clone();
    let agent = tokio::spawn(async move {
        let mut executor = BackupExecutor::new(&watch);
        executor.run(cancel).await;
        executor
    });

    let executor = agent.await.context("backup task aborted")?;
    tracing::info!(
        "Backup agent {:?}, last backup: {}",
        executor.phase(),
        executor.state().record().map_or_else(
            || "none".to_string(),
            |r| format!("{} at {}", r.last_backup_file.display(), r.last_backup_utc)
        )
    );

    shutdown.trigger();
    let _ = listener.await;

    Ok(())
}

fn init_logging(level: &str) {
    if let Err(e) = utils::logger::init(level) {
        eprintln!("Failed to initialize logging: {}", e);
    }
}
