//! Configuration management for the AI quota service.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{QuotaError, Result};
use crate::ratelimit::QuotaRules;

/// Main configuration for the AI quota service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Window store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Quota limits and policies
    #[serde(default)]
    pub quota: QuotaRules,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which window store backs the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Shared Redis instance, correct across processes
    #[default]
    Redis,
    /// In-process store, correct within a single process only
    Memory,
}

/// Window store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store backend
    #[serde(default)]
    pub backend: StoreBackend,

    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            url: default_redis_url(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a file path.
    ///
    /// Runs before any tracing subscriber is installed, so it does not log.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: AppConfig = serde_yaml::from_str(yaml)
            .map_err(|e| QuotaError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that could never admit an event.
    pub fn validate(&self) -> Result<()> {
        self.quota.validate()?;
        if self.store.backend == StoreBackend::Redis && self.store.url.is_empty() {
            return Err(QuotaError::Config("store.url must be set for the redis backend".to_string()));
        }
        Ok(())
    }
}
