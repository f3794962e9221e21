//! Radio stack abstraction for the SenderSDK link.
//!
//! This module provides a pluggable boundary to the platform radio stack
//! (Bluetooth RFCOMM on Android, a mock for testing).
//!
//! # Design
//!
//! The radio is an event source plus a socket factory:
//! - `subscribe()` yields "device found" and "link state changed" events
//! - `start_scan()` / `stop_scan()` control discovery
//! - `bonded_devices()` / `local_device()` query the adapter
//! - `open_socket()` connects to a peer's service record
//!
//! A [`RadioSocket`] is a connected byte stream. Reads and writes take
//! `&self` so that one task can block on `read` while another writes.
//!
//! # Example
//!
//! ```ignore
//! let radio = MockRadio::new();
//! let socket = radio.open_socket(&peer, SERVICE_UUID).await?;
//! ```

mod mock;

pub use mock::{MockRadio, MockSocket};

use async_trait::async_trait;
use sender_types::{LinkError, Peer};
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Radio stack errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RadioError {
    /// The caller lacks the scan/connect authorization.
    #[error("permission denied")]
    PermissionDenied,

    /// No adapter is present or it is switched off.
    #[error("radio unavailable")]
    Unavailable,

    /// The connect call failed.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// Read failed.
    #[error("read failed: {0}")]
    ReadFailed(String),

    /// Write failed.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// The socket was already closed.
    #[error("socket closed")]
    Closed,
}

impl RadioError {
    /// Classify into the link failure taxonomy.
    pub fn classify(&self) -> LinkError {
        match self {
            Self::PermissionDenied => LinkError::PermissionDenied,
            Self::Unavailable | Self::ConnectFailed(_) => LinkError::SocketUnavailable,
            Self::ReadFailed(e) | Self::WriteFailed(e) => LinkError::Io(e.clone()),
            Self::Closed => LinkError::Io(self.to_string()),
        }
    }
}

/// Events pushed by the radio stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    /// Discovery reported a device.
    DeviceFound(Peer),
    /// The low-level link to a device went up or down.
    LinkStateChanged {
        /// New link state.
        connected: bool,
        /// Device the event is about.
        peer: Peer,
    },
}

/// A connected byte stream to a peer.
#[async_trait]
pub trait RadioSocket: Send + Sync {
    /// Read into `buf`, returning the number of bytes read.
    ///
    /// Blocks until data is available. `Ok(0)` means the peer closed the
    /// stream.
    async fn read(&self, buf: &mut [u8]) -> Result<usize, RadioError>;

    /// Write all of `data`.
    async fn write(&self, data: &[u8]) -> Result<(), RadioError>;

    /// Close the socket.
    async fn close(&self) -> Result<(), RadioError>;
}

/// Capability interface to the platform radio stack.
#[async_trait]
pub trait Radio: Send + Sync + 'static {
    /// Start device discovery.
    async fn start_scan(&self) -> Result<(), RadioError>;

    /// Stop device discovery.
    async fn stop_scan(&self) -> Result<(), RadioError>;

    /// Devices bonded at the radio level.
    async fn bonded_devices(&self) -> Result<Vec<Peer>, RadioError>;

    /// This device's own identity.
    async fn local_device(&self) -> Result<Peer, RadioError>;

    /// Connect to `service_id` on `peer`.
    ///
    /// `Ok(None)` means the stack could not create a socket for the peer.
    async fn open_socket(
        &self,
        peer: &Peer,
        service_id: Uuid,
    ) -> Result<Option<Box<dyn RadioSocket>>, RadioError>;

    /// Register for radio events.
    ///
    /// Dropping the receiver unregisters.
    fn subscribe(&self) -> broadcast::Receiver<RadioEvent>;
}
