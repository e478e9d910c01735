//! PoolWatch - balance change notifications over Telegram
//!
//! CLI entry point for running the bot.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use poolstore::PoolStore;
use poolwatch::cli::{Cli, Command};
use poolwatch::config::Config;
use poolwatch::{App, HttpBalanceClient, SqlStore, TelegramClient};

fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("poolwatch")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Write to the log file, not stdout/stderr
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(log_dir.join("poolwatch.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(
        "PoolWatch loaded config: api={}, db={}",
        config.api.base_url,
        config.storage.db_path.display()
    );

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => cmd_run(&config).await,
        Command::Targets => cmd_targets(&config),
    }
}

/// Run the bot until Ctrl-C
async fn cmd_run(config: &Config) -> Result<()> {
    config.validate()?;

    let store = PoolStore::open(&config.storage.db_path)
        .context(format!("Failed to open database at {}", config.storage.db_path.display()))?;
    let store = Arc::new(SqlStore::new(store));
    let lookup = Arc::new(HttpBalanceClient::from_config(&config.api).context("Failed to create balance client")?);
    let telegram = Arc::new(TelegramClient::from_config(&config.telegram).context("Failed to create Telegram client")?);

    let root = CancellationToken::new();
    let app = App::new(store, lookup, telegram.clone(), &config.notify, root.clone());

    let recovered = app
        .recover_notifications()
        .await
        .context("Failed to recover notifications")?;
    println!("PoolWatch running ({} notification routines recovered), press Ctrl-C to stop", recovered);

    tokio::spawn({
        let root = root.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl-C, shutting down"),
                Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C, shutting down"),
            }
            root.cancel();
        }
    });

    app.serve(telegram.as_ref(), config.telegram.poll_timeout_secs, &root)
        .await;

    let timeout = config.notify.shutdown_timeout();
    match tokio::time::timeout(timeout, app.shutdown()).await {
        Ok(()) => info!("All notification routines stopped"),
        Err(_) => warn!(?timeout, "Timed out waiting for notification routines to stop"),
    }
    println!("PoolWatch stopped");
    Ok(())
}

/// Print persisted notification targets
fn cmd_targets(config: &Config) -> Result<()> {
    let store = PoolStore::open(&config.storage.db_path)
        .context(format!("Failed to open database at {}", config.storage.db_path.display()))?;
    let targets = store.all_notifications().context("Failed to read notification targets")?;

    if targets.is_empty() {
        println!("No notification targets");
        return Ok(());
    }

    println!("{:<16} CHAT", "USER");
    for target in targets {
        println!("{:<16} {}", target.user_id, target.chat_id);
    }
    Ok(())
}
