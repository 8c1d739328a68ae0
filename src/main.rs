//! Health-probe anomaly detector.
//!
//! Keeps a rolling history of probe outcomes for declared endpoints, mirrors
//! it into each declaration's status, and serves windowed health scores.
//!
//! # Architecture Overview
//!
//! ```text
//!   manifest.toml ──▶ ManifestWatcher ──▶ MemoryStore ◀──────────────────────┐
//!                                           │ watch                          │
//!                                           ▼                                │ status
//!                                      ┌──────────┐   ┌───────────┐          │
//!                                      │ informer │──▶│ workqueue │          │
//!                                      └──────────┘   └─────┬─────┘          │
//!                                                           ▼                │
//!                                                     ┌────────────┐         │
//!                                                     │ reconciler │─────────┤
//!                                                     └──┬──────┬──┘         │
//!                                          ensure/remove │      │ associate  │
//!                                                        ▼      ▼            │
//!                                           ┌───────────────┐ ┌──────────┐   │
//!                                           │ ring registry │◀│  poller  │───┘
//!                                           │    (actor)    │ │ (probes) │
//!                                           └───────────────┘ └──────────┘
//!
//!   GET /compute_health ──▶ QueryServer ──▶ MemoryStore (persisted buffer)
//! ```

use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use anomaly_detector::buffer::RingRegistry;
use anomaly_detector::config::{load_config, validate_config, ConfigError, ManifestWatcher};
use anomaly_detector::controller::{Controller, Reconciler, RequeueLimiter};
use anomaly_detector::lifecycle::{wait_for_signal, Shutdown};
use anomaly_detector::observability::{logging, metrics};
use anomaly_detector::poller::{EndpointPoller, HttpProber};
use anomaly_detector::query::QueryServer;
use anomaly_detector::store::{MemoryStore, ObjectStore};

const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "anomaly-detector", version, about = "Health-probe anomaly detector", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of reconcile workers (overrides the config file).
    #[arg(short, long)]
    workers: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    if let Some(workers) = args.workers {
        config.controller.workers = workers;
        validate_config(&config).map_err(ConfigError::Validation)?;
    }

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "anomaly-detector starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        namespace = ?config.controller.namespace,
        workers = config.controller.workers,
        manifest = ?config.controller.manifest_path,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    // Credentials are fatal before anything starts.
    let prober = HttpProber::from_config(&config.probe)?;

    let mut shutdown = Shutdown::new();
    let token = shutdown.token();

    let store = MemoryStore::new();
    let _manifest_watcher = match &config.controller.manifest_path {
        Some(path) => {
            let watcher = ManifestWatcher::new(Path::new(path), store.clone());
            if !watcher.sync_once().await {
                return Err(format!("failed to load manifest {path}").into());
            }
            let (handle, task) = watcher.run(token.child_token())?;
            shutdown.track("manifest-watcher", task);
            Some(handle)
        }
        None => {
            tracing::warn!("No manifest configured; the store starts empty");
            None
        }
    };
    let store: Arc<dyn ObjectStore> = Arc::new(store);

    let (rings, ring_task) = RingRegistry::spawn(token.child_token());

    let status_retry = config.status_retry.backoff();
    let poller = Arc::new(EndpointPoller::new(
        Arc::clone(&store),
        rings.clone(),
        Arc::new(prober),
        status_retry,
        token.child_token(),
    ));
    let reconciler = Reconciler::new(Arc::clone(&store), rings, poller, status_retry);
    let controller = Controller::new(
        Arc::clone(&store),
        reconciler,
        RequeueLimiter::new(&config.queue),
        config.controller.namespace.clone(),
        config.controller.workers,
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = QueryServer::new(Arc::clone(&store), &config);

    let server_token = token.child_token();
    let failed = token.clone();
    shutdown.track(
        "query-server",
        tokio::spawn(async move {
            if let Err(e) = server.run(listener, server_token).await {
                tracing::error!(error = %e, "Query server failed");
                failed.cancel();
            }
        }),
    );

    let controller_token = token.child_token();
    let failed = token.clone();
    shutdown.track(
        "controller",
        tokio::spawn(async move {
            if let Err(e) = controller.run(controller_token).await {
                tracing::error!(error = %e, "Controller failed");
                failed.cancel();
            }
        }),
    );
    shutdown.track("ring-registry", ring_task);

    tokio::select! {
        _ = wait_for_signal() => {}
        _ = token.cancelled() => tracing::warn!("A subsystem failed, shutting down"),
    }

    let stragglers = shutdown.drain(SHUTDOWN_DEADLINE).await;
    if !stragglers.is_empty() {
        tracing::warn!(tasks = ?stragglers, "Forced shutdown");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
