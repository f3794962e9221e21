//! Error types for the SenderSDK link.

use thiserror::Error;

/// User-facing reason attached to every failed or broken connection.
pub const CONNECTION_INTERRUPTED: &str = "connection interrupted";

/// User-facing reason attached to a link-state event that cannot be trusted.
pub const UNTRUSTED_LINK: &str = "could not connect to the device";

/// Errors decoding a frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The frame did not split into exactly the expected number of fields.
    #[error("wrong field count: expected {expected}, found {found}")]
    WrongFieldCount {
        /// Number of fields the protocol requires.
        expected: usize,
        /// Number of fields actually present.
        found: usize,
    },

    /// The frame bytes are not valid UTF-8.
    #[error("frame is not valid UTF-8")]
    InvalidUtf8,

    /// A pending frame grew past the size limit without completing.
    #[error("frame too large: {size} bytes (limit: {limit} bytes)")]
    TooLarge {
        /// Bytes buffered so far.
        size: usize,
        /// Maximum allowed frame length.
        limit: usize,
    },

    /// The stream closed in the middle of a frame.
    #[error("stream closed with {buffered} bytes of an incomplete frame")]
    Truncated {
        /// Bytes left in the buffer.
        buffered: usize,
    },
}

/// Failure taxonomy for the link as a whole.
///
/// Every layer's error can be classified into one of these kinds. At the
/// user-facing layer `SocketUnavailable`, `Io` and `Frame` all collapse to
/// [`CONNECTION_INTERRUPTED`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// The radio capability is not available (missing authorization).
    #[error("permission denied")]
    PermissionDenied,

    /// The radio stack returned no socket for the peer.
    #[error("socket unavailable")]
    SocketUnavailable,

    /// Read or write failure mid-session.
    #[error("I/O failure: {0}")]
    Io(String),

    /// Malformed or undecodable frame.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Link-state event for a peer outside the bonded set.
    #[error("untrusted link event for {address}")]
    UntrustedLinkEvent {
        /// Address reported by the event.
        address: String,
    },
}

impl LinkError {
    /// The message shown to the user for this failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::UntrustedLinkEvent { .. } => UNTRUSTED_LINK,
            _ => CONNECTION_INTERRUPTED,
        }
    }
}
