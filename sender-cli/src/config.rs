//! Configuration loading for sender-cli.
//!
//! Configuration is loaded from a TOML file (`--config`, usually
//! `sender.toml`). Every key is optional.

use sender_client::{
    LinkConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_LOCAL_NAME, DEFAULT_READ_CHUNK_SIZE,
};
use sender_types::{MAX_FRAME_LEN, SERVICE_UUID};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// Root configuration for sender-cli.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Link configuration.
    #[serde(default)]
    pub link: LinkSection,
}

/// The `[link]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkSection {
    /// Service record UUID (default: the SenderSDK service).
    #[serde(default = "default_service_id")]
    pub service_id: String,
    /// Connect timeout in milliseconds (default: 10000).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Bytes per socket read (default: 1024).
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,
    /// Largest accepted frame in bytes (default: 64KB).
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
    /// Local device name when the radio has none (default: "Device").
    #[serde(default = "default_local_name")]
    pub local_name_fallback: String,
}

// Default value functions
fn default_service_id() -> String {
    SERVICE_UUID.to_string()
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT.as_millis() as u64
}

fn default_read_chunk_size() -> usize {
    DEFAULT_READ_CHUNK_SIZE
}

fn default_max_frame_len() -> usize {
    MAX_FRAME_LEN
}

fn default_local_name() -> String {
    DEFAULT_LOCAL_NAME.to_string()
}

impl Default for LinkSection {
    fn default() -> Self {
        Self {
            service_id: default_service_id(),
            connect_timeout_ms: default_connect_timeout_ms(),
            read_chunk_size: default_read_chunk_size(),
            max_frame_len: default_max_frame_len(),
            local_name_fallback: default_local_name(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load from `path` if given, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Validate and convert into the client's link configuration.
    pub fn link_config(&self) -> Result<LinkConfig, ConfigError> {
        let link = &self.link;
        let service_id = Uuid::parse_str(&link.service_id).map_err(|e| ConfigError::Invalid {
            field: "link.service_id",
            reason: e.to_string(),
        })?;
        if link.read_chunk_size == 0 {
            return Err(ConfigError::Invalid {
                field: "link.read_chunk_size",
                reason: "must be greater than zero".into(),
            });
        }
        if link.max_frame_len == 0 {
            return Err(ConfigError::Invalid {
                field: "link.max_frame_len",
                reason: "must be greater than zero".into(),
            });
        }

        Ok(LinkConfig::new()
            .with_service_id(service_id)
            .with_connect_timeout(Duration::from_millis(link.connect_timeout_ms))
            .with_read_chunk_size(link.read_chunk_size)
            .with_max_frame_len(link.max_frame_len)
            .with_local_name_fallback(&link.local_name_fallback))
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
    /// A value is out of range.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Dotted key of the offending value.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}
