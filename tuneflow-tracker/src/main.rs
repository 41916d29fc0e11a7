//! TuneFlow Tracker (tuneflow-tracker) - Main entry point
//!
//! Polls each configured user's "currently playing" state and publishes a
//! playback event whenever the track changes.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tuneflow_common::config::{self, LoggingConfig, SinkConfig, SinksConfig, CONFIG_ENV_VAR};
use tuneflow_common::events::EventBus;
use tuneflow_tracker::router::EventRouter;
use tuneflow_tracker::supervisor::Supervisor;

/// Command-line arguments for tuneflow-tracker
#[derive(Parser, Debug)]
#[command(name = "tuneflow-tracker")]
#[command(about = "Listening-session tracker for TuneFlow")]
#[command(version)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// Override the poll interval (seconds)
    #[arg(long)]
    poll_interval_secs: Option<u64>,

    /// Log events instead of delivering them
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is loaded before tracing so [logging] can shape the subscriber;
    // the config source is reported once tracing is up
    let (mut config, config_path) =
        config::load_config(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(secs) = args.poll_interval_secs {
        config.poll_interval_secs = secs;
    }
    if args.dry_run {
        config.sinks = SinksConfig {
            hot: SinkConfig::Log,
            cold: Some(SinkConfig::Log),
        };
    }

    init_tracing(&config.logging)?;

    info!(
        "Starting TuneFlow tracker v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match &config_path {
        Some(path) => info!("Configuration: {}", path.display()),
        None => warn!("No config file found; using compiled defaults"),
    }
    if args.dry_run {
        info!("Dry run: events will be logged, not delivered");
    }

    config.validate().context("Invalid configuration")?;

    let router = EventRouter::from_config(&config.sinks).context("Failed to build event sinks")?;
    info!("Event router: {:?}", router);

    // No subscriber here; pollers log every notification they broadcast
    let mut supervisor = Supervisor::new(&config, router, EventBus::default());
    let started = supervisor.spawn_all(&config).await;
    if started == 0 {
        bail!("No configured user could be tracked");
    }
    info!(
        "Tracking {} user(s), polling every {}s",
        started, config.poll_interval_secs
    );

    shutdown_signal().await;

    supervisor.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}

/// Initialize tracing: `RUST_LOG` wins over the configured level
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .with_context(|| format!("Invalid log level '{}'", logging.level))?;

    let (file_layer, stderr_layer) = match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file));
            (Some(layer), None)
        }
        None => (None, Some(tracing_subscriber::fmt::layer())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
