//! Configuration loading for sync-host.
//!
//! Configuration is loaded from a TOML file passed by the embedding
//! application. Every table and field is optional.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use sync_core::Backoff;

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostConfig {
    /// Limits applied while hosting.
    #[serde(default)]
    pub host: HostLimits,
    /// Reconnect timing of public viewers.
    #[serde(default)]
    pub viewer: ViewerConfig,
}

/// Limits applied while hosting.
#[derive(Debug, Clone, Deserialize)]
pub struct HostLimits {
    /// Maximum director connections (default: 32).
    /// Further directors are closed on accept.
    #[serde(default = "default_max_directors")]
    pub max_directors: usize,
    /// Maximum public-viewer connections (default: 256).
    #[serde(default = "default_max_viewers")]
    pub max_viewers: usize,
    /// Largest inbound frame in bytes (default: 1MB).
    /// Larger frames are dropped like malformed ones.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

/// Public-viewer reconnect timing.
#[derive(Debug, Clone, Deserialize)]
pub struct ViewerConfig {
    /// Delay of the first retry in milliseconds (default: 1000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound of any retry delay in milliseconds (default: 30000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

// Default value functions
fn default_max_directors() -> usize {
    32
}

fn default_max_viewers() -> usize {
    256
}

fn default_max_message_bytes() -> usize {
    1024 * 1024 // 1MB
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for HostLimits {
    fn default() -> Self {
        Self {
            max_directors: default_max_directors(),
            max_viewers: default_max_viewers(),
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl ViewerConfig {
    /// Backoff parameters for [`sync_client::PublicViewer`].
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

impl HostConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
