//! Core configuration types and loading.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use super::cache::CacheConfig;
use super::listen::ListenConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server information.
    pub server: ServerConfig,
    /// WebSocket listen configuration.
    #[serde(default)]
    pub listen: ListenConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// External cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Keepalive and I/O timeouts.
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    /// Inbound packet flood limits.
    #[serde(default)]
    pub flood: FloodConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.timeouts;
        if t.ping_interval == 0 || t.write_ms == 0 || t.login == 0 || t.online_count_interval == 0 {
            return Err(ConfigError::Invalid(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        if t.pong_timeout <= t.ping_interval {
            return Err(ConfigError::Invalid(
                "timeouts.pong_timeout must exceed timeouts.ping_interval".to_string(),
            ));
        }
        let f = &self.flood;
        if f.rate == 0 || f.burst == 0 {
            return Err(ConfigError::Invalid(
                "flood.rate and flood.burst must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server name, used in logs.
    pub name: String,
    /// Prometheus metrics HTTP port (0 disables the endpoint).
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file (":memory:" for a throwaway database).
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// Keepalive and I/O timeouts.
///
/// The server pings every `ping_interval` seconds and drops clients whose
/// last pong is older than `pong_timeout` seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutsConfig {
    /// Seconds between server pings (default: 30).
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,

    /// Seconds without a pong before disconnect (default: 90).
    #[serde(default = "default_pong_timeout")]
    pub pong_timeout: u64,

    /// Milliseconds allowed for a single frame write (default: 5000).
    #[serde(default = "default_write_ms")]
    pub write_ms: u64,

    /// Seconds allowed between upgrade and the login packet (default: 10).
    #[serde(default = "default_login_timeout")]
    pub login: u64,

    /// Seconds between online-count checks (default: 5).
    #[serde(default = "default_online_count_interval")]
    pub online_count_interval: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            ping_interval: default_ping_interval(),
            pong_timeout: default_pong_timeout(),
            write_ms: default_write_ms(),
            login: default_login_timeout(),
            online_count_interval: default_online_count_interval(),
        }
    }
}

impl TimeoutsConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval)
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout)
    }

    pub fn write(&self) -> Duration {
        Duration::from_millis(self.write_ms)
    }

    pub fn login(&self) -> Duration {
        Duration::from_secs(self.login)
    }

    pub fn online_count_interval(&self) -> Duration {
        Duration::from_secs(self.online_count_interval)
    }
}

/// Per-connection packet flood limits.
///
/// Each client may send `rate` packets per second with bursts up to `burst`.
/// A client that keeps exceeding the limit is disconnected after
/// `max_violations` refused packets in a row.
#[derive(Debug, Clone, Deserialize)]
pub struct FloodConfig {
    #[serde(default = "default_flood_rate")]
    pub rate: u32,
    #[serde(default = "default_flood_burst")]
    pub burst: u32,
    #[serde(default = "default_max_violations")]
    pub max_violations: u8,
}

impl Default for FloodConfig {
    fn default() -> Self {
        Self {
            rate: default_flood_rate(),
            burst: default_flood_burst(),
            max_violations: default_max_violations(),
        }
    }
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_database_path() -> String {
    "rhythmd.db".to_string()
}

fn default_ping_interval() -> u64 {
    30
}

fn default_pong_timeout() -> u64 {
    90
}

fn default_write_ms() -> u64 {
    5000
}

fn default_login_timeout() -> u64 {
    10
}

fn default_online_count_interval() -> u64 {
    5
}

fn default_flood_rate() -> u32 {
    20
}

fn default_flood_burst() -> u32 {
    40
}

fn default_max_violations() -> u8 {
    3
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheBackend;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn timeouts_default_values() {
        let config = TimeoutsConfig::default();
        assert_eq!(config.ping_interval, 30);
        assert_eq!(config.pong_timeout, 90);
        assert_eq!(config.write(), Duration::from_secs(5));
        assert_eq!(config.login, 10);
        assert_eq!(config.online_count_interval, 5);
    }

    #[test]
    fn flood_default_values() {
        let config = FloodConfig::default();
        assert_eq!(config.rate, 20);
        assert_eq!(config.burst, 40);
        assert_eq!(config.max_violations, 3);
    }

    #[test]
    fn zero_flood_rate_is_rejected() {
        let file = write_config(
            r#"
            [server]
            name = "rhythm.test"

            [flood]
            rate = 0
            "#,
        );
        assert!(matches!(
            Config::load(file.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn minimal_config_fills_defaults() {
        let file = write_config(
            r#"
            [server]
            name = "rhythm.test"
            "#,
        );

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.name, "rhythm.test");
        assert_eq!(config.server.metrics_port, 9090);
        assert_eq!(config.database.path, "rhythmd.db");
        assert_eq!(config.cache.backend, CacheBackend::Redis);
        assert_eq!(config.listen.websocket.port(), 8080);
    }

    #[test]
    fn full_config_parses() {
        let file = write_config(
            r#"
            [server]
            name = "rhythm.test"
            metrics_port = 0

            [listen]
            websocket = "127.0.0.1:7000"
            allow_origins = ["https://play.example"]

            [database]
            path = ":memory:"

            [cache]
            backend = "memory"

            [timeouts]
            ping_interval = 10
            pong_timeout = 25
            write_ms = 250
            online_count_interval = 1
            "#,
        );

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.metrics_port, 0);
        assert_eq!(config.listen.websocket.port(), 7000);
        assert_eq!(config.database.path, ":memory:");
        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert_eq!(config.timeouts.pong_timeout(), Duration::from_secs(25));
        assert_eq!(config.timeouts.write(), Duration::from_millis(250));
    }

    #[test]
    fn pong_timeout_must_exceed_ping_interval() {
        let file = write_config(
            r#"
            [server]
            name = "rhythm.test"

            [timeouts]
            ping_interval = 30
            pong_timeout = 30
            "#,
        );

        assert!(matches!(
            Config::load(file.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = Config::load("/nonexistent/rhythmd.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn missing_server_section_is_parse_error() {
        let file = write_config("[database]\npath = \"x.db\"\n");
        assert!(matches!(Config::load(file.path()), Err(ConfigError::Parse(_))));
    }
}
