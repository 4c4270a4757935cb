//! HTTP + WebSocket edge (C10): the full surface of spec.md §6 over C1-C9.
//!
//! Grounded on `zensight-exporter-prometheus/src/http.rs` for the overall
//! shape — an `AppState` struct injected via `axum::extract::State`, a
//! `create_router` free function, `CorsLayer`, and a `run(shutdown)` method
//! racing `axum::serve`'s graceful shutdown against a
//! `tokio::sync::watch::Receiver<bool>` — generalized from that crate's
//! three-route metrics server to the full dashboard/ingestion/export
//! surface this engine needs. The WebSocket handler and its
//! `#[serde(tag = ..., content = ...)]`-flavored envelope follow
//! `other_examples/manifests/H1ghBre4k3r-server-monitoring` (axum `ws`
//! pairing) and `other_examples/24232936_moonheart-NodeNexus`'s tagged
//! `WsMessage` enum.

mod export;
mod handlers;
mod state;

use std::net::SocketAddr;

use axum::routing::{get, post};
use axum::Router;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use state::AppState;

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/status", get(handlers::status))
        .route("/api/history/:device_id", get(handlers::history))
        .route(
            "/api/config",
            get(handlers::config_get).post(handlers::config_post),
        )
        .route("/api/dashboard", get(handlers::dashboard))
        .route("/api/system/stats", get(handlers::system_stats))
        .route("/api/metrics/ping", post(handlers::metrics_ping))
        .route("/api/metrics/snmp", post(handlers::metrics_snmp))
        .route(
            "/api/snmp/interfaces/:device_id",
            get(handlers::snmp_interfaces),
        )
        .route(
            "/api/snmp/flapping-report",
            get(handlers::flapping_report),
        )
        .route("/api/export", get(export::export))
        .route("/api/import", post(export::import))
        .route("/ws", get(handlers::ws_upgrade))
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Owns the listen address and builds the router on `run`, mirroring the
/// teacher's `HttpServer`.
pub struct ApiServer {
    state: AppState,
    listen_addr: SocketAddr,
}

impl ApiServer {
    pub fn new(state: AppState, listen_addr: SocketAddr) -> Self {
        Self { state, listen_addr }
    }

    /// Serve until `shutdown` fires (spec.md §5 "Cancellation").
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let router = create_router(self.state);

        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("failed to bind to {}: {e}", self.listen_addr))?;

        info!(addr = %self.listen_addr, "HTTP server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {e}"))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests;
