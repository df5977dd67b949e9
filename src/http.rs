//! Prometheus scrape endpoint.
//!
//! Serves `GET /metrics` from its own task so a slow scraper never touches
//! the WebSocket gateway.

use axum::{Router, routing::get};
use std::net::SocketAddr;
use tracing::{error, info};

async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

fn router() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

/// Serve metrics on `0.0.0.0:port` until the process exits.
///
/// Bind and serve failures are logged; the game server keeps running
/// without metrics.
pub async fn run_http_server(port: u16) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, error = %e, "Failed to bind metrics listener");
            return;
        }
    };
    info!(%addr, "Metrics endpoint listening");

    if let Err(e) = axum::serve(listener, router()).await {
        error!(error = %e, "Metrics server stopped");
    }
}
