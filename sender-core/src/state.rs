//! Connection state machine for the SenderSDK link.
//!
//! This module provides a pure, side-effect-free state machine for managing
//! the lifecycle of the single active connection. The state machine takes
//! events as input and produces a new state plus a list of actions to execute.
//!
//! ```text
//! Idle → Connecting → Connected → Closing → Idle
//!            └──────── (connect failed) ───────┘
//! ```
//!
//! Every connection attempt is tagged with a [`SessionId`]. Events carry the
//! id of the attempt that produced them, and events from any attempt other
//! than the current one are ignored. This is what keeps a late socket or a
//! late frame from a cancelled attempt out of the next one.
//!
//! The actual I/O (opening sockets, reading frames) is performed by
//! sender-client, not by this module.

use sender_types::{ConnectionResult, LinkError, Message, Peer};

/// Identifier of one connection attempt.
pub type SessionId = u64;

/// Connection state machine - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection and no attempt in progress.
    #[default]
    Idle,
    /// Waiting for the radio stack to hand over a connected socket.
    Connecting {
        /// Attempt this state belongs to.
        session: SessionId,
        /// Target device.
        peer: Peer,
    },
    /// Socket connected; frames are flowing.
    Connected {
        /// Attempt this state belongs to.
        session: SessionId,
        /// Connected device.
        peer: Peer,
    },
    /// Teardown in progress.
    Closing {
        /// Attempt being torn down.
        session: SessionId,
    },
}

impl ConnectionState {
    /// Create a new state machine in the Idle state.
    pub fn new() -> Self {
        Self::Idle
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function. Invalid or stale events leave the state
    /// unchanged and produce no actions.
    pub fn on_event(self, event: Event) -> (Self, Vec<Action>) {
        match (self, event) {
            // From Idle
            (Self::Idle, Event::ConnectRequested { session, peer }) => (
                Self::Connecting {
                    session,
                    peer: peer.clone(),
                },
                vec![Action::OpenSocket { session, peer }],
            ),

            // From Connecting
            (Self::Connecting { session, peer }, Event::SocketOpened { session: s })
                if s == session =>
            {
                (
                    Self::Connected { session, peer },
                    vec![
                        Action::Emit(ConnectionResult::Established),
                        Action::StartTransfer { session },
                    ],
                )
            }
            // Without radio authorization the attempt ends silently.
            (
                Self::Connecting { session, .. },
                Event::ConnectFailed {
                    session: s,
                    error: LinkError::PermissionDenied,
                },
            ) if s == session => (Self::Idle, Vec::new()),
            (Self::Connecting { session, .. }, Event::ConnectFailed { session: s, error })
                if s == session =>
            {
                (
                    Self::Idle,
                    vec![Action::Emit(ConnectionResult::Error(
                        error.user_message().to_string(),
                    ))],
                )
            }

            // From Connected
            (
                Self::Connected { session, peer },
                Event::MessageReceived { session: s, message },
            ) if s == session => (
                Self::Connected { session, peer },
                vec![Action::Emit(ConnectionResult::TransferSucceeded(message))],
            ),
            (Self::Connected { session, .. }, Event::StreamEnded { session: s })
                if s == session =>
            {
                (
                    Self::Closing { session },
                    vec![
                        Action::Emit(ConnectionResult::Finished),
                        Action::CloseSocket { session },
                    ],
                )
            }
            (Self::Connected { session, .. }, Event::TransferFailed { session: s, error })
                if s == session =>
            {
                (
                    Self::Closing { session },
                    vec![
                        Action::Emit(ConnectionResult::Error(
                            error.user_message().to_string(),
                        )),
                        Action::CloseSocket { session },
                    ],
                )
            }

            // Close from anywhere an attempt exists
            (Self::Connecting { session, .. }, Event::CloseRequested)
            | (Self::Connected { session, .. }, Event::CloseRequested) => (
                Self::Closing { session },
                vec![Action::CloseSocket { session }],
            ),
            (Self::Closing { session }, Event::CloseCompleted { session: s }) if s == session => {
                (Self::Idle, vec![])
            }

            // A socket that arrives for an attempt that is no longer current
            // must not be leaked.
            (state, Event::SocketOpened { session }) => {
                (state, vec![Action::DiscardSocket { session }])
            }

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Check if currently connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Check if an attempt is waiting for its socket.
    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting { .. })
    }

    /// Check if a new attempt may start.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// The attempt this state belongs to, if any.
    pub fn session(&self) -> Option<SessionId> {
        match self {
            Self::Idle => None,
            Self::Connecting { session, .. }
            | Self::Connected { session, .. }
            | Self::Closing { session } => Some(*session),
        }
    }

    /// The device being connected to or connected with.
    pub fn peer(&self) -> Option<&Peer> {
        match self {
            Self::Connecting { peer, .. } | Self::Connected { peer, .. } => Some(peer),
            _ => None,
        }
    }
}

/// Events that can occur in the connection lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Caller asked to connect.
    ConnectRequested {
        /// Id allocated for the new attempt.
        session: SessionId,
        /// Target device.
        peer: Peer,
    },
    /// The radio stack returned a connected socket.
    SocketOpened {
        /// Attempt that opened it.
        session: SessionId,
    },
    /// The radio stack returned no socket, failed, or timed out.
    ConnectFailed {
        /// Attempt that failed.
        session: SessionId,
        /// Classified failure.
        error: LinkError,
    },
    /// A frame was decoded from the socket.
    MessageReceived {
        /// Attempt that received it.
        session: SessionId,
        /// The decoded record.
        message: Message,
    },
    /// The peer closed the stream cleanly.
    StreamEnded {
        /// Attempt whose stream ended.
        session: SessionId,
    },
    /// Read, write or decode failure while connected.
    TransferFailed {
        /// Attempt that failed.
        session: SessionId,
        /// Classified failure.
        error: LinkError,
    },
    /// Caller asked to close the current attempt.
    CloseRequested,
    /// Socket and channel have been released.
    CloseCompleted {
        /// Attempt that finished closing.
        session: SessionId,
    },
}

/// Actions to be executed by sender-client.
///
/// These are instructions, not side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Ask the radio stack for a socket to `peer`.
    OpenSocket {
        /// Attempt the socket is for.
        session: SessionId,
        /// Target device.
        peer: Peer,
    },
    /// Build the transfer channel and start the receive loop.
    StartTransfer {
        /// Attempt to start.
        session: SessionId,
    },
    /// Release the channel and socket of an attempt.
    CloseSocket {
        /// Attempt to release.
        session: SessionId,
    },
    /// Close a socket that belongs to an attempt that is no longer current.
    DiscardSocket {
        /// Attempt the socket was opened for.
        session: SessionId,
    },
    /// Publish a lifecycle result to the session's consumer.
    Emit(ConnectionResult),
}
