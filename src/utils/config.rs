// src/utils/config.rs
//! Engine configuration
//!
//! Layered configuration: built-in defaults, an optional `reqguard.toml`
//! file, then `REQGUARD_`-prefixed environment variables.

use crate::utils::errors::{EngineError, Result};
use serde::Deserialize;

/// Top-level engine configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Cache manager settings
    pub cache: CacheSettings,

    /// Interception pipeline settings
    pub interception: InterceptionSettings,

    /// Context bootstrap settings
    pub bootstrap: BootstrapSettings,
}

/// Cache manager settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Maximum number of in-memory entries per origin
    pub max_entries: usize,

    /// Hard ceiling for the serialized snapshot (bytes)
    pub max_store_bytes: u64,

    /// Debounced flush quiet period (milliseconds)
    pub flush_delay_ms: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_entries: 300,
            max_store_bytes: 4 * 1024 * 1024, // 4 MiB per origin
            flush_delay_ms: 1200,
        }
    }
}

/// Interception pipeline settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InterceptionSettings {
    /// Maximum body size recorded into observation events (bytes)
    pub max_observed_body_bytes: usize,

    /// Capacity of the observation queue
    pub observation_queue_size: usize,
}

impl Default for InterceptionSettings {
    fn default() -> Self {
        Self {
            max_observed_body_bytes: 256 * 1024,
            observation_queue_size: 4096,
        }
    }
}

/// Context bootstrap settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BootstrapSettings {
    /// Interval between configuration polls (milliseconds)
    pub config_poll_interval_ms: u64,

    /// Maximum number of configuration polls before giving up
    pub config_poll_attempts: u32,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            config_poll_interval_ms: 10,
            config_poll_attempts: 500,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache: CacheSettings::default(),
            interception: InterceptionSettings::default(),
            bootstrap: BootstrapSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from `reqguard.toml` (if present) and environment
    pub fn load() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("reqguard").required(false))
            .add_source(config::Environment::with_prefix("REQGUARD").separator("__"))
            .build()
            .map_err(|e| EngineError::ConfigError(format!("Failed to build config: {}", e)))?;

        settings
            .try_deserialize()
            .map_err(|e| EngineError::ConfigError(format!("Failed to deserialize config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.cache.max_entries, 300);
        assert_eq!(config.cache.flush_delay_ms, 1200);
        assert_eq!(config.cache.max_store_bytes, 4 * 1024 * 1024);
    }

    #[test]
    fn test_bootstrap_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.bootstrap.config_poll_interval_ms, 10);
        assert!(config.bootstrap.config_poll_attempts > 0);
    }
}
