//! # sender-core
//!
//! Pure logic for the SenderSDK link (no I/O, instant tests).
//!
//! This crate implements the connection state machine, the discovered-device
//! registry and the session snapshot reducer without any radio or socket
//! I/O, enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects:
//! - [`ConnectionState::on_event`] returns the next state plus a list of
//!   [`Action`]s for the caller to execute
//! - [`DeviceRegistry`] only accumulates what it is told about
//! - [`SessionState`] folds lifecycle events into one snapshot
//!
//! The actual I/O (opening sockets, reading frames, publishing snapshots) is
//! performed by `sender-client`, which interprets the actions produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod registry;
pub mod session;
pub mod state;

pub use registry::DeviceRegistry;
pub use session::SessionState;
pub use state::{Action, ConnectionState, Event, SessionId};
