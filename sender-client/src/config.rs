//! Link configuration.

use sender_types::{MAX_FRAME_LEN, SERVICE_UUID};
use std::time::Duration;
use uuid::Uuid;

/// Default bound on the radio's connect call.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default size of a single socket read.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 1024;

/// Default name reported for this device when the radio has none.
pub const DEFAULT_LOCAL_NAME: &str = "Device";

/// Configuration for the connection manager and session service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// Service record to connect to on the peer.
    pub service_id: Uuid,
    /// Upper bound on a single connect attempt.
    pub connect_timeout: Duration,
    /// Bytes requested per socket read.
    pub read_chunk_size: usize,
    /// Largest frame accepted before the stream is treated as malformed.
    pub max_frame_len: usize,
    /// Name used for this device when the radio reports none.
    pub local_name_fallback: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            service_id: SERVICE_UUID,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            max_frame_len: MAX_FRAME_LEN,
            local_name_fallback: DEFAULT_LOCAL_NAME.to_string(),
        }
    }
}

impl LinkConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the service record identifier.
    pub fn with_service_id(mut self, service_id: Uuid) -> Self {
        self.service_id = service_id;
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the read chunk size. Zero is raised to one byte.
    pub fn with_read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size.max(1);
        self
    }

    /// Set the maximum frame length.
    pub fn with_max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }

    /// Set the fallback local device name.
    pub fn with_local_name_fallback(mut self, name: &str) -> Self {
        self.local_name_fallback = name.to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = LinkConfig::default();
        assert_eq!(config.service_id, SERVICE_UUID);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.read_chunk_size, 1024);
        assert_eq!(config.max_frame_len, MAX_FRAME_LEN);
        assert_eq!(config.local_name_fallback, "Device");
    }

    #[test]
    fn builders_override() {
        let config = LinkConfig::new()
            .with_connect_timeout(Duration::from_millis(250))
            .with_read_chunk_size(0)
            .with_max_frame_len(128)
            .with_local_name_fallback("Sender");

        assert_eq!(config.connect_timeout, Duration::from_millis(250));
        assert_eq!(config.read_chunk_size, 1);
        assert_eq!(config.max_frame_len, 128);
        assert_eq!(config.local_name_fallback, "Sender");
    }
}
