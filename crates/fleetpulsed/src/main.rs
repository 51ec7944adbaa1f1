//! fleetpulsed — the FleetPulse daemon.
//!
//! Single binary that assembles all FleetPulse subsystems:
//! - Durable store (redb)
//! - DB health monitor + write spool
//! - One prober per host group
//! - Live state store with the update feed
//! - REST API + SSE stream
//!
//! # Usage
//!
//! ```text
//! fleetpulsed run --config fleetpulse.toml --port 8080 --data-dir /var/lib/fleetpulse
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use fleetpulse_api::ApiState;
use fleetpulse_core::config::FleetConfig;
use fleetpulse_engine::{DebouncePolicy, MinuteWindow};
use fleetpulse_live::LiveStateStore;
use fleetpulse_probe::{FpingPinger, LogNotifier, Prober, ProberSettings};
use fleetpulse_store::{DbHealthMonitor, DurableStore, RedbStore, WriteSpool};

/// Delay between a spooled write arriving and the flush that carries
/// it, so one flush batches a burst of confirmations.
const SPOOL_FLUSH_DELAY: Duration = Duration::from_millis(200);

#[derive(Parser)]
#[command(name = "fleetpulsed", about = "FleetPulse daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon (probers, health monitor, API server).
    Run {
        /// Path to fleetpulse.toml; defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on.
        #[arg(long, default_value = "8080")]
        port: u16,

        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/fleetpulse")]
        data_dir: PathBuf,
    },

    /// Write a scaffold configuration file and exit.
    Init {
        /// Group name for the scaffold.
        #[arg(long, default_value = "default")]
        group: String,

        /// Where to write the file.
        #[arg(long, default_value = "fleetpulse.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,fleetpulsed=debug,fleetpulse=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            port,
            data_dir,
        } => run(config, port, data_dir).await,
        Command::Init { group, output } => {
            let config = FleetConfig::scaffold(&group);
            std::fs::write(&output, config.to_toml_string()?)?;
            info!(path = ?output, "scaffold configuration written");
            Ok(())
        }
    }
}

async fn run(config_path: Option<PathBuf>, port: u16, data_dir: PathBuf) -> anyhow::Result<()> {
    info!("FleetPulse daemon starting");

    // Invalid configuration is fatal before anything is spawned.
    let config = match &config_path {
        Some(path) => FleetConfig::from_file(path)?,
        None => {
            let config = FleetConfig::default();
            config.validate()?;
            config
        }
    };

    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("fleetpulse.redb");

    // ── Initialize subsystems ──────────────────────────────────

    let store: Arc<dyn DurableStore> = Arc::new(RedbStore::open(&db_path)?);
    info!(path = ?db_path, "durable store opened");

    let live = Arc::new(LiveStateStore::new(config.events.buffer_capacity));

    let (monitor, health_rx) = DbHealthMonitor::new(store.clone(), &config.db_health);
    info!(
        initial_retry_ms = config.db_health.initial_retry_ms,
        max_retry_ms = config.db_health.max_retry_ms,
        "db health monitor initialized"
    );

    let spool = WriteSpool::new(
        store.clone(),
        health_rx.clone(),
        config.persistence.backfill_on_recovery,
        SPOOL_FLUSH_DELAY,
    );

    let pinger = Arc::new(FpingPinger::new(
        &config.probe.fping_path,
        config.probe.timeout_ms,
    ));
    let notifier = Arc::new(LogNotifier);

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let monitor_handle = tokio::spawn(monitor.run(shutdown_rx.clone()));

    // Bridge DB connectivity flips into the live store's degraded flag
    // so snapshots and the stream carry the status.
    let bridge_handle = tokio::spawn(bridge_degraded(
        health_rx.clone(),
        live.clone(),
        shutdown_rx.clone(),
    ));

    let mut prober_handles = Vec::new();
    for group in &config.groups {
        let settings = ProberSettings {
            group: group.name.clone(),
            interval: Duration::from_millis(config.probe_interval_ms(&group.name)),
            window: MinuteWindow {
                consecutive_minutes_required: config.debounce.consecutive_minutes_required,
                sequence_window_minutes: config.debounce.sequence_window_minutes,
            },
        };
        let prober = Prober::new(
            settings,
            store.clone(),
            live.clone(),
            pinger.clone(),
            spool.clone(),
            health_rx.clone(),
            notifier.clone(),
        );
        prober_handles.push(tokio::spawn(prober.run(shutdown_rx.clone())));
    }
    info!(groups = config.groups.len(), "probers started");

    // ── Start API server ───────────────────────────────────────

    let api_state = ApiState {
        store,
        live,
        policy: DebouncePolicy {
            fail_threshold: config.debounce.fail_threshold,
            recovery_threshold: config.debounce.recovery_threshold,
        },
        min_incident_samples: config.debounce.min_incident_samples,
    };
    let router = fleetpulse_api::build_router(api_state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    // Wait for background tasks.
    let _ = monitor_handle.await;
    let _ = bridge_handle.await;
    for handle in prober_handles {
        let _ = handle.await;
    }

    info!("FleetPulse daemon stopped");
    Ok(())
}

/// Mirror DB connectivity into the live store's degraded flag.
async fn bridge_degraded(
    mut health_rx: watch::Receiver<bool>,
    live: Arc<LiveStateStore>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = health_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let connected = *health_rx.borrow();
                live.set_degraded(!connected, "durable store unreachable").await;
            }
            _ = shutdown.changed() => break,
        }
    }
}
