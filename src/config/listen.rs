//! Network listener configuration.

use serde::Deserialize;
use std::net::SocketAddr;

/// WebSocket listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Address to bind the WebSocket listener to (e.g., "0.0.0.0:8080").
    #[serde(default = "default_websocket_address")]
    pub websocket: SocketAddr,
    /// Allowed origins for the upgrade request (e.g., `["https://example.com"]`).
    /// Empty list allows all origins.
    #[serde(default)]
    pub allow_origins: Vec<String>,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            websocket: default_websocket_address(),
            allow_origins: Vec::new(),
        }
    }
}

impl ListenConfig {
    /// Whether an upgrade request carrying `origin` may connect.
    pub fn origin_allowed(&self, origin: Option<&str>) -> bool {
        if self.allow_origins.is_empty() {
            return true;
        }
        origin.is_some_and(|o| self.allow_origins.iter().any(|allowed| allowed == o))
    }
}

fn default_websocket_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}
