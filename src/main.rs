//! rhythmd - session and multiplayer room server for a real-time rhythm game.
//!
//! Tracks connected users and multiplayer rooms in memory and mirrors their
//! state into an external cache that other services read.

mod cache;
mod config;
mod db;
mod error;
mod handlers;
mod http;
mod metrics;
mod network;
mod state;
mod telemetry;

use crate::cache::{CacheStore, CacheSync, MemoryStore, RedisStore};
use crate::config::{CacheBackend, Config};
use crate::db::Database;
use crate::network::Gateway;
use crate::state::{Hub, run_online_count_publisher};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    info!(
        server = %config.server.name,
        listen = %config.listen.websocket,
        "Starting rhythmd"
    );

    let db = Database::new(&config.database.path).await?;

    let store: Arc<dyn CacheStore> = match config.cache.backend {
        CacheBackend::Redis => Arc::new(RedisStore::connect(&config.cache.url).await?),
        CacheBackend::Memory => {
            warn!("Using in-process cache; other services will not see session state");
            Arc::new(MemoryStore::new())
        }
    };
    let cache = CacheSync::new(store);

    // Records left by a previous run describe sessions and rooms that no
    // longer exist.
    cache.clear_sessions().await;
    cache.clear_rooms().await;

    let hub = Arc::new(Hub::new(
        db,
        cache,
        config.timeouts.clone(),
        config.flood.clone(),
    ));

    // Prometheus metrics are optional.
    // Convention: metrics_port = 0 disables the HTTP endpoint (used by tests).
    let metrics_port = config.server.metrics_port;
    if metrics_port == 0 {
        info!("Prometheus metrics disabled (metrics_port = 0)");
    } else {
        metrics::init();
        tokio::spawn(http::run_http_server(metrics_port));
    }

    tokio::spawn(run_online_count_publisher(Arc::clone(&hub)));
    info!("Online count publisher started");

    let gateway = Gateway::bind(config.listen, Arc::clone(&hub)).await?;

    tokio::select! {
        result = gateway.run() => result?,
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown requested");
        }
    }

    handlers::shutdown(&hub).await;
    info!("rhythmd stopped");
    Ok(())
}
