//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Core config struct definitions (Config, ServerConfig, TimeoutsConfig, FloodConfig)
//! - [`listen`]: WebSocket listener configuration (ListenConfig)
//! - [`cache`]: External cache backend selection (CacheConfig)

mod cache;
mod listen;
mod types;

pub use cache::CacheBackend;
pub use listen::ListenConfig;
pub use types::{Config, FloodConfig, TimeoutsConfig};
