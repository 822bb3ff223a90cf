//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (WEBSTASH_*)
//! 2. TOML config file (if WEBSTASH_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Which storage backend the factory constructs. Exactly one backend is
/// active per process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    Filesystem,
    Durable,
    Remote,
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (WEBSTASH_*)
/// 2. TOML config file (if WEBSTASH_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Active storage backend.
    ///
    /// Set via WEBSTASH_BACKEND environment variable.
    #[serde(default = "default_backend")]
    pub backend: BackendKind,

    /// TTL in milliseconds applied when a write does not specify one.
    /// Zero means records never expire by default.
    ///
    /// Set via WEBSTASH_DEFAULT_TTL_MS environment variable.
    #[serde(default = "default_ttl_ms")]
    pub default_ttl_ms: i64,

    /// Memory backend eviction threshold: maximum record count.
    ///
    /// Set via WEBSTASH_MAX_ITEMS environment variable.
    #[serde(default = "default_max_items")]
    pub max_items: u64,

    /// Memory backend eviction threshold: maximum total content bytes.
    ///
    /// Set via WEBSTASH_MAX_SIZE_BYTES environment variable.
    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: u64,

    /// Expiry sweep cadence in milliseconds.
    ///
    /// Set via WEBSTASH_CLEANUP_INTERVAL_MS environment variable.
    #[serde(default = "default_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,

    /// Path to the SQLite database for the durable backend.
    ///
    /// Set via WEBSTASH_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Directory for the filesystem backend's record files.
    ///
    /// Set via WEBSTASH_STORAGE_DIR environment variable.
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Base URL of the remote content-index service.
    ///
    /// Set via WEBSTASH_REMOTE_BASE_URL environment variable.
    /// Required only when the remote backend is selected.
    #[serde(default)]
    pub remote_base_url: Option<String>,

    /// Shared secret for the remote content-index service.
    ///
    /// Set via WEBSTASH_REMOTE_API_KEY environment variable.
    /// Required only when the remote backend is selected.
    #[serde(default)]
    pub remote_api_key: Option<String>,

    /// HTTP request timeout in milliseconds (remote backend).
    ///
    /// Set via WEBSTASH_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_backend() -> BackendKind {
    BackendKind::Memory
}

fn default_ttl_ms() -> i64 {
    3_600_000 // 1 hour
}

fn default_max_items() -> u64 {
    1_000
}

fn default_max_size_bytes() -> u64 {
    52_428_800 // 50MB
}

fn default_cleanup_interval_ms() -> u64 {
    60_000
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./webstash-cache.sqlite")
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("./webstash-cache")
}

fn default_timeout_ms() -> u64 {
    20_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            default_ttl_ms: default_ttl_ms(),
            max_items: default_max_items(),
            max_size_bytes: default_max_size_bytes(),
            cleanup_interval_ms: default_cleanup_interval_ms(),
            db_path: default_db_path(),
            storage_dir: default_storage_dir(),
            remote_base_url: None,
            remote_api_key: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl AppConfig {
    /// Sweep cadence as a Duration.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }

    /// HTTP timeout as a Duration for use with reqwest.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `WEBSTASH_`
    /// 2. TOML file from `WEBSTASH_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("WEBSTASH_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("WEBSTASH_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Remote backend connection settings, validated.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the base URL or shared secret is
    /// not set. Selecting the remote backend without them is a startup
    /// failure, never a silent fallback.
    pub fn require_remote(&self) -> Result<(&str, &str), ConfigError> {
        let base_url = self.remote_base_url.as_deref().ok_or_else(|| ConfigError::Missing {
            field: "remote_base_url".into(),
            hint: "Set WEBSTASH_REMOTE_BASE_URL environment variable".into(),
        })?;
        let api_key = self.remote_api_key.as_deref().ok_or_else(|| ConfigError::Missing {
            field: "remote_api_key".into(),
            hint: "Set WEBSTASH_REMOTE_API_KEY environment variable".into(),
        })?;
        Ok((base_url, api_key))
    }
}
