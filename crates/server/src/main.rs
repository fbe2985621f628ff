//! bomrepo daemon binary.

use anyhow::{Context, Result};
use bomrepo_server::bootstrap::{build_services, load_config, start_scheduler};
use bomrepo_server::scheduler::StopOutcome;
use clap::Parser;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// bomrepo - A versioned BOM repository
#[derive(Parser, Debug)]
#[command(name = "bomrepod")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "BOMREPO_CONFIG",
        default_value = "config/bomrepo.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("bomrepo v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(Path::new(&args.config))?;

    let startup = CancellationToken::new();
    let services = build_services(&config, &startup).await?;

    let scheduler = start_scheduler(&config, &services);
    tracing::info!(loops = scheduler.loops().len(), "Background scheduler started");

    shutdown_signal().await.context("failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    let grace = config.shutdown.grace_period();
    for (job, outcome) in scheduler.shutdown(grace).await {
        match outcome {
            StopOutcome::Graceful => tracing::info!(job, "Background loop stopped"),
            StopOutcome::Forced => tracing::warn!(
                job,
                grace_secs = grace.as_secs(),
                "Background loop cancelled after grace period"
            ),
        }
    }

    Ok(())
}

/// Resolve on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() -> std::io::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let mut terminate =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    #[cfg(unix)]
    let terminate = terminate.recv();

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Option<()>>();

    tokio::select! {
        result = ctrl_c => {
            result?;
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
    Ok(())
}
