//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use thiserror::Error;

use crate::config::{AppConfig, BackendKind};

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `default_ttl_ms` is negative
    /// - `max_items` or `max_size_bytes` is 0
    /// - `cleanup_interval_ms` is below 1 second
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    ///
    /// Returns `ConfigError::Missing` if the remote backend is selected
    /// without its base URL and shared secret.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_ttl_ms < 0 {
            return Err(ConfigError::Invalid {
                field: "default_ttl_ms".into(),
                reason: "must not be negative (0 disables expiry)".into(),
            });
        }

        if self.max_items == 0 {
            return Err(ConfigError::Invalid { field: "max_items".into(), reason: "must be greater than 0".into() });
        }
        if self.max_size_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "max_size_bytes".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.cleanup_interval_ms < 1_000 {
            return Err(ConfigError::Invalid {
                field: "cleanup_interval_ms".into(),
                reason: "must be at least 1000ms".into(),
            });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.backend == BackendKind::Remote {
            self.require_remote()?;
        }

        Ok(())
    }
}
