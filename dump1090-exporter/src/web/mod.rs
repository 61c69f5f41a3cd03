//! Web server: axum endpoint exposing the metric surface.
//!
//! Shared state is the engine (read-only from here), the Prometheus registry
//! wrapping its surface, and the pass bookkeeping the scheduler writes.

use std::sync::Arc;

use axum::Router;
use prometheus::Registry;
use tracing::info;

use dump1090_core::Engine;

use crate::scheduler::PassStatus;

pub mod routes;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct AppState {
    pub engine: Arc<Engine>,
    pub status: Arc<PassStatus>,
    /// Holds the engine's surface; gathered on every scrape.
    pub registry: Registry,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/metrics", axum::routing::get(routes::metrics))
        .route("/health", axum::routing::get(routes::health))
        .with_state(state)
}

/// Start the web server and run until ctrl-c.
pub async fn serve(state: Arc<AppState>, host: &str, port: u16) -> std::io::Result<()> {
    let app = build_router(state);
    let addr = format!("{host}:{port}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("metrics listening on http://{addr}/metrics");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}
