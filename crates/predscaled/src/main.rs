//! predscaled — the predictive scaling planner daemon.
//!
//! Single binary that assembles the planner for one workload:
//! - State store (redb)
//! - Forecast and utilization feeds
//! - Planning loop with its HTTP control-plane adapter
//! - Metrics collector
//! - REST API + Prometheus endpoint
//!
//! # Usage
//!
//! ```text
//! predscaled run --config /etc/predscale/planner.toml --port 9464
//! predscaled check --config /etc/predscale/planner.toml
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use predscale_api::ApiState;
use predscale_controller::PlannerLoop;
use predscale_core::{PlannerConfig, epoch_secs};
use predscale_executor::HttpControlPlane;
use predscale_ingest::{ForecastFeed, UtilizationFeed};
use predscale_metrics::PlannerMetrics;
use predscale_state::StateStore;

#[derive(Parser)]
#[command(name = "predscaled", about = "Predictive scaling planner daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the planning loop and the API server.
    Run {
        /// Path to planner.toml.
        #[arg(long, env = "PREDSCALE_CONFIG")]
        config: PathBuf,

        /// Port to listen on.
        #[arg(long, default_value = "9464")]
        port: u16,

        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/predscale")]
        data_dir: PathBuf,

        /// Log output format.
        #[arg(long, value_enum, default_value_t = LogFormat::Text)]
        log_format: LogFormat,
    },
    /// Validate a configuration file and exit.
    Check {
        /// Path to planner.toml.
        #[arg(long, env = "PREDSCALE_CONFIG")]
        config: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            port,
            data_dir,
            log_format,
        } => {
            init_tracing(log_format);
            run(&config, port, data_dir).await
        }
        Command::Check { config } => {
            init_tracing(LogFormat::Text);
            check(&config)
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,predscaled=debug,predscale=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn check(path: &Path) -> anyhow::Result<()> {
    let config = PlannerConfig::from_file(path)
        .with_context(|| format!("invalid configuration {}", path.display()))?;
    info!(
        workload = %config.workload.name,
        min = config.slo.min_replicas,
        max = config.slo.max_replicas,
        endpoint = %config.executor.endpoint,
        "configuration is valid"
    );
    Ok(())
}

async fn run(config_path: &Path, port: u16, data_dir: PathBuf) -> anyhow::Result<()> {
    let config = PlannerConfig::from_file(config_path)
        .with_context(|| format!("invalid configuration {}", config_path.display()))?;
    let workload = config.workload.name.clone();
    info!(%workload, "predscale daemon starting");

    // ── Initialize subsystems ──────────────────────────────────

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create {}", data_dir.display()))?;
    let db_path = data_dir.join("planner.redb");
    let store = StateStore::open(&db_path).context("failed to open state store")?;
    info!(path = ?db_path, "state store opened");

    let forecasts = ForecastFeed::new(&config.workload.metric);
    let utilization = UtilizationFeed::new();
    let metrics = Arc::new(PlannerMetrics::default());

    let transport = HttpControlPlane::new(&config.executor.endpoint)?;
    info!(endpoint = %config.executor.endpoint, "control plane configured");

    let mut planner = PlannerLoop::new(
        config,
        store.clone(),
        forecasts.clone(),
        utilization.clone(),
        metrics.clone(),
        transport,
        epoch_secs(),
    )?;

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start planning loop ────────────────────────────────────

    let planner_handle = tokio::spawn(async move {
        planner.run(shutdown_rx).await;
    });

    // ── Start API server ───────────────────────────────────────

    let router = predscale_api::build_router(ApiState {
        workload,
        store,
        metrics,
        forecasts,
        utilization,
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    // Let an in-flight tick finish and persist.
    let _ = planner_handle.await;

    info!("predscale daemon stopped");
    Ok(())
}
