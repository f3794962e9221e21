//! Transfer channel over one connected socket.
//!
//! A [`TransferChannel`] turns the socket's continuous inbound byte stream
//! into a lazy sequence of decoded [`Message`]s and writes outbound frames.
//!
//! The inbound side is handed out once via [`TransferChannel::receive`]. Its
//! [`Incoming::next_message`] reads in fixed-size chunks, buffers until a
//! complete frame is present and decodes it. Any failure ends the sequence:
//! after an error or a clean end of stream it only returns `Ok(None)`.

use crate::config::LinkConfig;
use crate::radio::{RadioError, RadioSocket};
use sender_types::{decode, encode, split_frame, FrameError, LinkError, Message};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error};

/// Transfer channel errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// Socket read failed.
    #[error("read failed: {0}")]
    Read(RadioError),

    /// Socket write failed.
    #[error("write failed: {0}")]
    Write(RadioError),

    /// Inbound bytes did not form a valid frame.
    #[error("malformed frame: {0}")]
    Frame(#[from] FrameError),

    /// The channel was closed.
    #[error("channel closed")]
    Closed,

    /// The inbound sequence was already handed out.
    #[error("receive already started")]
    AlreadyReceiving,
}

impl ChannelError {
    /// Classify into the link failure taxonomy.
    pub fn classify(&self) -> LinkError {
        match self {
            Self::Read(e) | Self::Write(e) => e.classify(),
            Self::Frame(e) => LinkError::Frame(e.clone()),
            Self::Closed | Self::AlreadyReceiving => LinkError::Io(self.to_string()),
        }
    }
}

/// Framed message channel over a connected socket.
pub struct TransferChannel {
    socket: Arc<dyn RadioSocket>,
    read_chunk_size: usize,
    max_frame_len: usize,
    send_lock: Mutex<()>,
    receiving: AtomicBool,
    closed: AtomicBool,
}

impl TransferChannel {
    /// Wrap a connected socket.
    pub fn new(socket: Box<dyn RadioSocket>, config: &LinkConfig) -> Self {
        Self {
            socket: Arc::from(socket),
            read_chunk_size: config.read_chunk_size.max(1),
            max_frame_len: config.max_frame_len,
            send_lock: Mutex::new(()),
            receiving: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Take the inbound message sequence.
    ///
    /// Succeeds once per channel.
    pub fn receive(&self) -> Result<Incoming, ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        if self.receiving.swap(true, Ordering::SeqCst) {
            return Err(ChannelError::AlreadyReceiving);
        }
        Ok(Incoming {
            socket: Arc::clone(&self.socket),
            chunk: vec![0u8; self.read_chunk_size],
            buffer: Vec::new(),
            max_frame_len: self.max_frame_len,
            done: false,
        })
    }

    /// Encode and write one frame.
    ///
    /// Concurrent calls wait for each other, so frames never interleave. A
    /// write failure is returned and leaves the channel open.
    pub async fn send(&self, message: &Message) -> Result<(), ChannelError> {
        let _guard = self.send_lock.lock().await;
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }

        let frame = encode(message);
        self.socket
            .write(&frame)
            .await
            .map_err(ChannelError::Write)?;

        debug!(id = %message.id, action = %message.action, len = frame.len(), "frame sent");
        Ok(())
    }

    /// Close the socket. Only the first call has an effect.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.socket.close().await {
            error!(error = %e, "failed to close socket");
        }
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Lazy sequence of inbound messages.
pub struct Incoming {
    socket: Arc<dyn RadioSocket>,
    chunk: Vec<u8>,
    buffer: Vec<u8>,
    max_frame_len: usize,
    done: bool,
}

impl Incoming {
    /// Wait for the next message.
    ///
    /// `Ok(None)` means the sequence is over: the peer closed the stream, or
    /// an earlier call returned an error.
    pub async fn next_message(&mut self) -> Result<Option<Message>, ChannelError> {
        if self.done {
            return Ok(None);
        }
        let result = self.read_frame().await;
        if !matches!(result, Ok(Some(_))) {
            self.done = true;
        }
        result
    }

    async fn read_frame(&mut self) -> Result<Option<Message>, ChannelError> {
        loop {
            if let Some(len) = split_frame(&self.buffer) {
                if len > self.max_frame_len {
                    return Err(FrameError::TooLarge {
                        size: len,
                        limit: self.max_frame_len,
                    }
                    .into());
                }
                let frame: Vec<u8> = self.buffer.drain(..len).collect();
                let message = decode(&frame)?;
                debug!(id = %message.id, action = %message.action, len, "frame received");
                return Ok(Some(message));
            }

            if self.buffer.len() > self.max_frame_len {
                return Err(FrameError::TooLarge {
                    size: self.buffer.len(),
                    limit: self.max_frame_len,
                }
                .into());
            }

            let n = self
                .socket
                .read(&mut self.chunk)
                .await
                .map_err(ChannelError::Read)?;
            if n == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(FrameError::Truncated {
                    buffered: self.buffer.len(),
                }
                .into());
            }
            self.buffer.extend_from_slice(&self.chunk[..n]);
        }
    }
}
