//! # sender-types
//!
//! Wire format types for the SenderSDK point-to-point link protocol.
//!
//! This crate provides the foundational types used across all SenderSDK crates:
//! - [`Peer`] - A remote device identified by its radio address
//! - [`Message`] - The fixed 8-field status/sync record
//! - [`ConnectionResult`] - Lifecycle events produced by a connection attempt
//! - [`encode`] / [`decode`] / [`split_frame`] - The `#`-delimited frame codec
//! - [`LinkError`], [`FrameError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod messages;
mod peer;
pub mod wire;

pub use error::{FrameError, LinkError, CONNECTION_INTERRUPTED, UNTRUSTED_LINK};
pub use messages::{ConnectionResult, Message};
pub use peer::{Peer, SERVICE_UUID};
pub use wire::{decode, encode, split_frame, FIELD_COUNT, FIELD_SEPARATOR, MAX_FRAME_LEN};
