//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - config.toml (default configuration)
//! - config.local.toml (git-ignored local overrides)
//! - Environment variables (`QUIDDITCH_*` prefix)
//!
//! ## Example
//!
//! ```toml
//! # config.toml
//! [http]
//! bind_address = "0.0.0.0:9200"
//!
//! [cache]
//! logical_capacity = 10000
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! QUIDDITCH_HTTP__BIND_ADDRESS=0.0.0.0:9300
//! QUIDDITCH_EXECUTION__REQUEST_TIMEOUT_SECS=10
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Top-level configuration assembled by [`Config::load`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub http: HttpConfig,
    pub cache: CacheConfig,
    pub execution: ExecutionConfig,
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP surface configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub bind_address: String,
    /// Maximum accepted request body size, in bytes (mainly relevant
    /// for `_bulk`).
    pub max_body_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            bind_address: "0.0.0.0:9200".to_string(),
            max_body_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Plan cache sizing (§C8). Logical and physical caches are sized and
/// expired independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub logical_capacity: usize,
    pub physical_capacity: usize,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            logical_capacity: 10_000,
            physical_capacity: 10_000,
            ttl_secs: 300,
        }
    }
}

/// Query execution tunables: the request deadline and the write-path
/// concurrency cap for `_bulk`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub request_timeout_secs: u64,
    pub bulk_concurrency: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            request_timeout_secs: 30,
            bulk_concurrency: 10,
        }
    }
}

/// `ClusterDirectory` client configuration (§C11).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    pub endpoint: String,
    pub retry_count: u32,
    pub retry_backoff_millis: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        DirectoryConfig {
            endpoint: "http://localhost:9201".to_string(),
            retry_count: 3,
            retry_backoff_millis: 100,
        }
    }
}

/// Logging configuration consumed by `tracing-subscriber` at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            http: HttpConfig::default(),
            cache: CacheConfig::default(),
            execution: ExecutionConfig::default(),
            directory: DirectoryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration by layering, lowest precedence first:
    /// built-in defaults, `config.toml`, `config.local.toml` (for
    /// untracked local overrides), then `QUIDDITCH_`-prefixed
    /// environment variables using `__` as the nesting separator.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::from(figment::providers::Serialized::defaults(Config::default()))
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed("QUIDDITCH_").split("__"))
            .extract()
    }

    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, figment::Error> {
        Figment::from(figment::providers::Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("QUIDDITCH_").split("__"))
            .extract()
    }
}
