//! # sender-client
//!
//! Client library for the SenderSDK point-to-point link.
//!
//! This is the main library that applications use to discover devices,
//! connect to one and exchange messages with it.
//!
//! ## Features
//!
//! - **Radio Abstraction**: Pluggable radio stack (platform RFCOMM, mock)
//! - **Framed Transfer**: `#`-delimited records over a byte stream
//! - **Pure State Machine**: Uses sender-core for side-effect-free logic
//! - **Observable State**: One `watch` channel carries the whole session
//!
//! ## Example
//!
//! ```ignore
//! use sendersdk_client::{LinkConfig, MockRadio, SessionService};
//!
//! let service = SessionService::new(MockRadio::new(), LinkConfig::default());
//! service.start();
//! service.start_discovery().await?;
//!
//! service.connect(peer).await?;
//! service.send("PING", "1").await?;
//!
//! let snapshot = service.snapshot();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod config;
pub mod manager;
pub mod radio;
pub mod service;

pub use channel::{ChannelError, Incoming, TransferChannel};
pub use config::{
    LinkConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_LOCAL_NAME, DEFAULT_READ_CHUNK_SIZE,
};
pub use manager::{ConnectionManager, ManagerError, ResultReceiver};
pub use radio::{MockRadio, MockSocket, Radio, RadioError, RadioEvent, RadioSocket};
pub use service::{ClientError, SessionService};
