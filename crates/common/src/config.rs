//! Application configuration.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Redis configuration.
    pub redis: RedisConfig,
    /// Realtime layer configuration.
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL.
    pub url: String,
    /// Key prefix for all Redis keys.
    #[serde(default = "default_redis_prefix")]
    pub prefix: String,
}

/// Realtime coordination layer configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// Number of chat messages retained in each channel's cache ring.
    #[serde(default = "default_message_cache_len")]
    pub message_cache_len: usize,
    /// Seconds between chat/address flushes to the durable store.
    #[serde(default = "default_chat_flush_secs")]
    pub chat_flush_secs: u64,
    /// Seconds between scans of the vote close schedule.
    #[serde(default = "default_vote_close_secs")]
    pub vote_close_secs: u64,
    /// Seconds a chat dedup token is retained after first sight.
    #[serde(default = "default_dedup_retention_secs")]
    pub dedup_retention_secs: u64,
    /// Whether publishes are bridged across processes via Redis pub/sub.
    #[serde(default = "default_true")]
    pub bridge_enabled: bool,
}

impl RealtimeConfig {
    /// Chat flush interval as a [`Duration`].
    #[must_use]
    pub const fn chat_flush_interval(&self) -> Duration {
        Duration::from_secs(self.chat_flush_secs)
    }

    /// Vote close scan interval as a [`Duration`].
    #[must_use]
    pub const fn vote_close_interval(&self) -> Duration {
        Duration::from_secs(self.vote_close_secs)
    }

    /// Dedup token retention window as a [`Duration`].
    #[must_use]
    pub const fn dedup_retention(&self) -> Duration {
        Duration::from_secs(self.dedup_retention_secs)
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            message_cache_len: default_message_cache_len(),
            chat_flush_secs: default_chat_flush_secs(),
            vote_close_secs: default_vote_close_secs(),
            dedup_retention_secs: default_dedup_retention_secs(),
            bridge_enabled: true,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_max_connections() -> u32 {
    100
}

const fn default_min_connections() -> u32 {
    5
}

fn default_redis_prefix() -> String {
    "quillstream".to_string()
}

const fn default_message_cache_len() -> usize {
    60
}

const fn default_chat_flush_secs() -> u64 {
    60
}

const fn default_vote_close_secs() -> u64 {
    1
}

const fn default_dedup_retention_secs() -> u64 {
    3600
}

const fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `QUILLSTREAM_ENV`)
    /// 3. Environment variables with `QUILLSTREAM` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let env = std::env::var("QUILLSTREAM_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("QUILLSTREAM")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("QUILLSTREAM")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
