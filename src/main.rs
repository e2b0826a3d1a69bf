//! ao3sync: keep a local EPUB library in step with your AO3 subscriptions.
//!
//! Logs in, lists subscribed works, refreshes their metadata in small batches
//! and downloads only the works whose local copy is missing, corrupt, or
//! carries a word count that no longer matches AO3.

#![warn(clippy::all)]

mod archive;
mod cli;
mod config;
mod markup;
mod remote;
pub mod retry;
mod shutdown;
mod sync;
mod types;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use remote::Ao3Session;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Before parsing, so clap's env fallbacks see the .env values.
    let dotenv = dotenvy::dotenv();

    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .init();

    match dotenv {
        Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!("Ignoring unreadable .env file: {}", e),
    }

    let config = config::Config::from_cli(cli)?;
    tracing::debug!(?config, "Configuration loaded");
    tracing::info!(
        batch_size = config.batch_size,
        "Starting ao3sync into {}",
        config.output_directory.display()
    );

    let session = Ao3Session::authenticate(
        &config.base_url,
        &config.credentials(),
        config.request_timeout,
    )
    .await?;

    let shutdown_token = shutdown::install_signal_handler()?;

    let report = sync::run_sync(&session, &config.sync_config(), &shutdown_token).await?;
    report.log_summary();

    if shutdown_token.is_cancelled() {
        tracing::info!("Stopped early on shutdown request; rerun to pick up the rest");
    }
    let failed = report.failures().count();
    if failed > 0 {
        tracing::warn!("{} works could not be synced, they will be retried on the next run", failed);
    }

    Ok(())
}
