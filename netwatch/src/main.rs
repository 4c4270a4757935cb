//! Binary entry point (C11): wires C1-C10 together, matching
//! `zensight-exporter-prometheus::main` almost structurally verbatim — clap
//! `Args`, a `watch::channel` shutdown signal, one `tokio::spawn` per
//! subsystem, `tokio::select!` on ctrl_c + SIGTERM, a final stats log.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use netwatch_api::{ApiServer, AppState};
use netwatch_batch::BatchWriter;
use netwatch_cache::CacheStore;
use netwatch_common::LoggingConfig;
use netwatch_config::ConfigStore;
use netwatch_flapping::FlappingDetector;
use netwatch_history::HistoryStore;
use netwatch_ingest::Ingestor;
use netwatch_prober::IcmpProber;
use netwatch_scheduler::Scheduler;
use tokio::sync::watch;
use tracing::{error, info};

const AGGREGATE_INTERVAL: Duration = Duration::from_secs(600);
const EXPIRE_INTERVAL: Duration = Duration::from_secs(3_600);

/// Network reachability monitoring engine.
#[derive(Parser, Debug)]
#[command(name = "netwatch")]
#[command(about = "Network reachability monitoring engine")]
#[command(version)]
struct Args {
    /// Directory holding `config.json` and `history.db` (spec.md §6).
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// HTTP listen address (overrides $BACKEND_PORT).
    #[arg(long)]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    netwatch_common::init_tracing(&LoggingConfig {
        level: args.log_level.clone(),
        format: Default::default(),
    })
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    info!("Starting netwatch");

    tokio::fs::create_dir_all(&args.data_dir)
        .await
        .map_err(|e| anyhow::anyhow!("failed to create data dir {}: {e}", args.data_dir.display()))?;

    let listen_addr: SocketAddr = match args.listen {
        Some(listen) => listen.parse().map_err(|e| anyhow::anyhow!("invalid --listen: {e}"))?,
        None => {
            let port: u16 = std::env::var("BACKEND_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5000);
            SocketAddr::from(([0, 0, 0, 0], port))
        }
    };

    let config = Arc::new(ConfigStore::open(args.data_dir.join("config.json")).await?);
    let cache = Arc::new(CacheStore::new());
    let history = Arc::new(HistoryStore::open(args.data_dir.join("history.db")).await?);
    let batch = Arc::new(BatchWriter::new(history.clone()));
    let prober: Arc<dyn netwatch_prober::Prober> = Arc::new(IcmpProber::new());
    let scheduler = Arc::new(Scheduler::new(config.clone(), cache.clone(), batch.clone(), prober));
    let flapping = Arc::new(FlappingDetector::new(history.clone(), cache.clone()));
    let ingestor = Arc::new(
        Ingestor::new(config.clone(), cache.clone(), batch.clone())
            .with_flapping_sink(flapping.clone()),
    );

    scheduler.reload().await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler_task = {
        let scheduler = scheduler.clone();
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            scheduler.run(shutdown_rx).await;
        })
    };

    let batch_task = {
        let batch = batch.clone();
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            batch.run(shutdown_rx).await;
        })
    };

    let maintenance_task = {
        let cache = cache.clone();
        let history = history.clone();
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut sweep_ticker =
                tokio::time::interval(Duration::from_millis(CacheStore::sweep_interval_ms()));
            let mut aggregate_ticker = tokio::time::interval(AGGREGATE_INTERVAL);
            let mut expire_ticker = tokio::time::interval(EXPIRE_INTERVAL);
            loop {
                tokio::select! {
                    _ = sweep_ticker.tick() => {
                        cache.sweep(netwatch_common::current_timestamp_millis());
                    }
                    _ = aggregate_ticker.tick() => {
                        if let Err(e) = history.upsert_aggregates(netwatch_common::current_timestamp_millis()).await {
                            error!(error = %e, "aggregate upsert failed");
                        }
                    }
                    _ = expire_ticker.tick() => {
                        if let Err(e) = history.expire(netwatch_common::current_timestamp_millis()).await {
                            error!(error = %e, "history expiry failed");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    };

    let http_task = {
        let state = AppState::new(
            config.clone(),
            cache.clone(),
            history.clone(),
            batch.clone(),
            scheduler.clone(),
            ingestor,
            flapping,
            args.data_dir.clone(),
        );
        let server = ApiServer::new(state, listen_addr);
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = server.run(shutdown_rx).await {
                error!("HTTP server error: {e}");
            }
        })
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut sigterm = tokio::signal::unix::signal(
                    tokio::signal::unix::SignalKind::terminate()
                ).unwrap();
                sigterm.recv().await;
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    shutdown_tx.send(true)?;

    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        let _ = scheduler_task.await;
        let _ = batch_task.await;
        let _ = maintenance_task.await;
        let _ = http_task.await;
    })
    .await;

    batch.flush().await;

    let stats = scheduler.stats();
    info!(
        tracked_devices = stats.tracked_devices,
        dispatched_total = stats.dispatched_total,
        "Final statistics"
    );

    info!("netwatch stopped");
    Ok(())
}
