//! core::config
//!
//! Configuration for the coordination core.
//!
//! # Format
//!
//! TOML, loaded by the embedding application and handed to the services
//! that need it. All keys are optional and defaulted:
//!
//! ```toml
//! [retry]
//! max_attempts = 3
//! base_delay_ms = 50
//! ```
//!
//! # Validation
//!
//! Values are validated after parsing; a config that parses but carries
//! nonsense (zero attempts, multi-minute backoff) is rejected up front
//! rather than surfacing as odd runtime behavior.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// A value is out of its allowed range.
    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    /// Retry policy for idempotent store writes.
    pub retry: RetryConfig,
}

impl CoreConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file cannot be read,
    /// `ConfigError::Parse` on malformed TOML, and
    /// `ConfigError::InvalidValue` if validation fails.
    pub fn load_from_path(path: &std::path::Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retry.validate()
    }
}

/// Retry policy for operations that are safe to repeat.
///
/// Applies to the idempotent writes (score upsert, post claim); never to
/// `invite`, which is not idempotent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts, including the first. Minimum 1.
    pub max_attempts: u32,
    /// Backoff grows linearly from this base.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 50,
        }
    }
}

impl RetryConfig {
    /// A policy that never retries. Useful in tests.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts < 1 {
            return Err(ConfigError::InvalidValue(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.base_delay_ms > 60_000 {
            return Err(ConfigError::InvalidValue(format!(
                "retry.base_delay_ms must be at most 60000, got {}",
                self.base_delay_ms
            )));
        }
        Ok(())
    }
}
