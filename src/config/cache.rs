//! External cache configuration.

use serde::Deserialize;

/// Which [`crate::cache::CacheStore`] implementation to run against.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Redis server at [`CacheConfig::url`].
    #[default]
    Redis,
    /// Process-local map. Other services cannot see it; useful for
    /// development and single-node setups.
    Memory,
}

/// External cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,
    /// Connection URL for the redis backend.
    #[serde(default = "default_cache_url")]
    pub url: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            url: default_cache_url(),
        }
    }
}

fn default_cache_url() -> String {
    "redis://127.0.0.1:6379/".to_string()
}
