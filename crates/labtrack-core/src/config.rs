//! Configuration for labtrack
//!
//! Service and client settings. Both load from TOML or JSON and fall back to
//! defaults for anything left out.
//!
//! ```toml
//! addr = "0.0.0.0:8080"
//!
//! [storage]
//! kind = "file"
//! path = "/var/lib/labtrack/data.json"
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default polling interval of the client sync layer
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3_000;

/// Where the record store keeps its data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory only
    #[default]
    Memory,
    /// A single JSON document on disk
    File { path: PathBuf },
}

/// Record store service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind
    pub addr: String,
    pub storage: StorageConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".to_string(),
            storage: StorageConfig::Memory,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML string
    #[cfg(feature = "toml-config")]
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Serialize configuration to TOML
    #[cfg(feature = "toml-config")]
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Load configuration from a JSON string
    pub fn from_json(json_str: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json_str)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "addr is not a socket address: {}",
                self.addr
            )));
        }
        if let StorageConfig::File { path } = &self.storage {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::MissingField("storage.path".to_string()));
            }
        }
        Ok(())
    }
}

/// Client sync layer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL of the record store service, e.g. `http://127.0.0.1:8080`
    pub base_url: String,
    /// Refresh interval while anything is subscribed
    pub poll_interval_ms: u64,
    /// Per-request timeout
    pub request_timeout_secs: u64,
    /// Refresh a collection right after a successful write to it
    pub refresh_on_write: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            request_timeout_secs: 30,
            refresh_on_write: false,
        }
    }
}

impl SyncConfig {
    /// Load configuration from a TOML string
    #[cfg(feature = "toml-config")]
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Load configuration from a JSON string
    pub fn from_json(json_str: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json_str)
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::OutOfRange(
                "poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::OutOfRange(
                "request_timeout_secs must be positive".to_string(),
            ));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "base_url must be an http(s) URL: {}",
                self.base_url
            )));
        }
        Ok(())
    }
}

/// Configuration validation error
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Value is malformed
    #[error("Invalid value: {0}")]
    Invalid(String),
    /// Value is out of valid range
    #[error("Value out of range: {0}")]
    OutOfRange(String),
    /// Required field is missing
    #[error("Missing field: {0}")]
    MissingField(String),
}
