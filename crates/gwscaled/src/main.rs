//! gwscaled — the gwscale daemon.
//!
//! Assembles the controller, its state store, and the status API:
//! - State store (redb)
//! - Controller run loop (cadence, eviction, scaling)
//! - Simulated gateway + scale set for development
//! - Status API + Prometheus exposition
//!
//! # Usage
//!
//! ```text
//! gwscaled --config gwscale.toml run --port 8480 --data-dir /var/lib/gwscale
//! gwscaled tick --count 6 --fake-load
//! gwscaled reset --data-dir /var/lib/gwscale
//! gwscaled config
//! ```

mod simulation;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::{error, info, warn};

use gwscale_core::{MetricsSourceKind, ScalerConfig};
use gwscale_state::StateStore;

const DEFAULT_FILTER: &str = "info,gwscale=debug,gwscaled=debug";

#[derive(Parser)]
#[command(name = "gwscaled", about = "Gateway-backed scale set controller")]
struct Cli {
    /// TOML configuration file. `GWSCALE_*` variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Drive the controller on the configured tick interval and serve
    /// the status API.
    Run {
        /// Port for the status API.
        #[arg(long, default_value = "8480")]
        port: u16,

        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/gwscale")]
        data_dir: PathBuf,

        /// Instances in the simulated pool at start.
        #[arg(long, default_value = "6")]
        nodes: u32,

        /// Replay the scripted load profile instead of live metrics.
        #[arg(long)]
        fake_load: bool,
    },

    /// Run a fixed number of ticks against a fresh simulated pool and
    /// print each report as JSON.
    Tick {
        #[arg(long, default_value = "1")]
        count: u32,

        #[arg(long, default_value = "6")]
        nodes: u32,

        #[arg(long)]
        fake_load: bool,
    },

    /// Forget the stored votes, eviction stamps and counters of a pool.
    Reset {
        #[arg(long, default_value = "/var/lib/gwscale")]
        data_dir: PathBuf,

        /// Pool key; defaults to the configured target.
        #[arg(long)]
        pool: Option<String>,
    },

    /// Print the effective configuration.
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let mut config = ScalerConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Run {
            port,
            data_dir,
            nodes,
            fake_load,
        } => {
            if fake_load {
                config.metrics.source = MetricsSourceKind::FakeLoad;
            }
            run(config, port, data_dir, nodes).await
        }
        Command::Tick {
            count,
            nodes,
            fake_load,
        } => {
            if fake_load {
                config.metrics.source = MetricsSourceKind::FakeLoad;
            }
            tick(config, count, nodes).await
        }
        Command::Reset { data_dir, pool } => {
            let pool = pool.unwrap_or_else(|| config.target.key());
            reset(&data_dir, &pool)?;
            Ok(())
        }
        Command::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(config: ScalerConfig, port: u16, data_dir: PathBuf, nodes: u32) -> anyhow::Result<()> {
    info!("gwscale daemon starting");

    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("gwscale.redb");
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    if config.metrics.source == MetricsSourceKind::Live {
        warn!("simulated pool has no live metrics; every tick will report a telemetry gap");
    }

    let interval = config.tick_interval()?;
    let pool = config.target.key();
    let cloud = simulation::simulated_pool(nodes);
    let controller = simulation::build_controller(config, &cloud, store.clone())?;
    info!(%pool, nodes, interval_ms = interval.as_millis() as u64, "simulated pool ready");

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let controller_shutdown = shutdown_rx.clone();
    let settle_shutdown = shutdown_rx.clone();

    // ── Background tasks ───────────────────────────────────────

    let controller_handle = tokio::spawn(async move {
        controller.run(interval, controller_shutdown).await;
    });

    let settle_handle = tokio::spawn(simulation::settle_loop(
        cloud,
        interval,
        settle_shutdown,
    ));

    // ── Status API ─────────────────────────────────────────────

    let router = gwscale_api::build_router(store, pool);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "status API starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "cannot listen for ctrl-c, shutting down");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    let _ = controller_handle.await;
    let _ = settle_handle.await;

    info!("gwscale daemon stopped");
    Ok(())
}

async fn tick(config: ScalerConfig, count: u32, nodes: u32) -> anyhow::Result<()> {
    let store = StateStore::open_in_memory()?;
    let cloud = simulation::simulated_pool(nodes);
    let controller = simulation::build_controller(config, &cloud, store)?;

    for _ in 0..count {
        match controller.tick().await {
            Ok(report) => println!("{}", serde_json::to_string(&report)?),
            Err(e) => error!(error = %e, "tick failed"),
        }
        cloud.settle();
    }
    Ok(())
}

fn reset(data_dir: &Path, pool: &str) -> anyhow::Result<bool> {
    let store = StateStore::open(&data_dir.join("gwscale.redb"))?;
    let existed = store.reset_engine_state(pool)?;
    if existed {
        info!(%pool, "engine state reset");
    } else {
        warn!(%pool, "no engine state stored for pool");
    }
    Ok(existed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gwscale_state::EngineState;

    #[test]
    fn reset_forgets_stored_state() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = StateStore::open(&dir.path().join("gwscale.redb")).unwrap();
            let mut state = EngineState::default();
            state.votes.record(3);
            store.save_engine_state("rg/web", &state).unwrap();
        }

        assert!(reset(dir.path(), "rg/web").unwrap());
        assert!(!reset(dir.path(), "rg/web").unwrap());

        let store = StateStore::open(&dir.path().join("gwscale.redb")).unwrap();
        assert!(store.load_engine_state("rg/web").unwrap().votes.is_empty());
    }
}
