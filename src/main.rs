use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use forza_telemetry::{AppConfig, Server, StorageConfig, TelemetryError, storage};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// UDP address to listen on, e.g. 0.0.0.0:8000.
    #[arg(short, long)]
    listen: Option<String>,

    /// Persist races and samples under this directory instead of in memory.
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    #[arg(long)]
    checkpoint_interval_ms: Option<u64>,
}

impl Args {
    /// Layer file, environment and command line, in that order.
    fn load_config(&self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::from_yaml_file(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None => AppConfig::default(),
        };
        config.apply_env();

        if let Some(listen) = &self.listen {
            config.telemetry.listen_addr = listen.clone();
        }
        if let Some(data_dir) = &self.data_dir {
            config.storage = StorageConfig::Jsonl { data_dir: data_dir.clone() };
        }
        if let Some(ms) = self.checkpoint_interval_ms {
            config.telemetry.checkpoint_interval = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_logging(level: &str) {
    // RUST_LOG wins over the configured level.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "Cannot listen for SIGTERM");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.load_config()?;
    init_logging(&config.log_level);

    let store = storage::open(&config.storage).await.context("opening storage")?;
    let server = Arc::new(Server::new(config.telemetry.clone(), store));

    let listener = server.clone();
    let mut listening = tokio::spawn(async move { listener.listen_and_process().await });

    tokio::select! {
        result = &mut listening => {
            // The receive loop only ends on its own when something went wrong.
            match result {
                Ok(Err(TelemetryError::ServerClosed)) => warn!("Telemetry listener stopped"),
                Ok(Err(e)) => return Err(e).context("telemetry listener failed"),
                Ok(Ok(())) => {}
                Err(e) => return Err(e).context("telemetry listener task panicked"),
            }
        }
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        _ = terminate() => info!("Terminated"),
    }

    info!(timeout = ?config.shutdown_timeout, "Shutting down");
    if let Err(e) = server.shutdown(config.shutdown_timeout).await {
        error!(error = %e, "Unclean shutdown");
        return Err(e.into());
    }

    info!("Shutdown complete");
    Ok(())
}
