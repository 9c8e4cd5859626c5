//! kraned: the Krane daemon.
//!
//! Single binary that assembles the Krane subsystems:
//! - Object store (redb)
//! - Release controller (phase machine, task orchestration, traffic shifting)
//! - REST API for operators and the cluster agent
//!
//! # Usage
//!
//! ```text
//! kraned run --config /etc/krane/krane.toml --port 8480
//! kraned config --prometheus http://prometheus:9090
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand, ValueEnum};
use krane_core::KraneConfig;
use krane_rollout::{Controller, ControllerSettings};
use krane_state::StateStore;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,kraned=debug,krane=debug";

#[derive(Parser)]
#[command(name = "kraned", about = "Krane canary release daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the release controller and the API server.
    Run {
        #[command(flatten)]
        config: ConfigArgs,

        /// Log output format.
        #[arg(long, value_enum, default_value = "text")]
        log_format: LogFormat,
    },
    /// Print the effective configuration as TOML.
    Config {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Configuration file plus the flags that override it.
#[derive(Args, Debug, Default)]
struct ConfigArgs {
    /// Path to krane.toml.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data directory for persistent state.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Port to listen on.
    #[arg(long)]
    port: Option<u16>,

    /// Seconds before a pending release is reconciled again.
    #[arg(long)]
    requeue_secs: Option<u64>,

    /// Metrics backend address handed to judge tasks.
    #[arg(long)]
    prometheus: Option<String>,
}

impl ConfigArgs {
    fn resolve(&self) -> anyhow::Result<KraneConfig> {
        let mut config = match &self.config {
            Some(path) => KraneConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => KraneConfig::default(),
        };
        if let Some(dir) = &self.data_dir {
            config.store.data_dir = dir.clone();
        }
        if let Some(port) = self.port {
            config.api.port = port;
        }
        if let Some(secs) = self.requeue_secs {
            config.controller.requeue_secs = secs;
        }
        if let Some(prometheus) = &self.prometheus {
            config.judge.prometheus = prometheus.clone();
        }
        Ok(config)
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run { config, log_format } => {
            init_tracing(log_format);
            run(config.resolve()?).await
        }
        Command::Config { config } => {
            print!("{}", config.resolve()?.to_toml_string()?);
            Ok(())
        }
    }
}

async fn run(config: KraneConfig) -> anyhow::Result<()> {
    info!("Krane daemon starting");

    // Ensure data directory exists.
    let data_dir = &config.store.data_dir;
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating {}", data_dir.display()))?;
    let db_path = data_dir.join("krane.redb");

    // ── Initialize subsystems ──────────────────────────────────

    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let settings = ControllerSettings::from_config(&config);
    let controller = Controller::new(store.clone(), settings);
    let trigger = controller.trigger();
    info!(
        requeue_secs = config.controller.requeue_secs,
        prometheus = %config.judge.prometheus,
        "release controller initialized"
    );

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let controller_handle = tokio::spawn(controller.run(shutdown_rx));

    // ── Start API server ───────────────────────────────────────

    let router = krane_api::build_router(store, trigger);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.api.port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    // Wait for in-flight reconciles.
    if let Err(e) = controller_handle.await {
        error!(error = %e, "release controller task failed");
    }

    info!("Krane daemon stopped");
    Ok(())
}
