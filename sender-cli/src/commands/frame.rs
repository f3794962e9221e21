//! Encode and decode wire frames.

use anyhow::{Context, Result};
use sender_types::{decode, encode, Message};

/// Render `message` as its wire frame.
pub fn encode_frame(message: &Message) -> String {
    // Fields are `String`s, so the frame is valid UTF-8.
    String::from_utf8_lossy(&encode(message)).into_owned()
}

/// Decode `frame` and render the record as pretty JSON.
pub fn decode_frame(frame: &str) -> Result<String> {
    let message = decode(frame.as_bytes()).context("Invalid frame")?;
    serde_json::to_string_pretty(&message).context("Failed to serialize record")
}

/// Run the encode command.
pub fn run_encode(message: &Message) {
    println!("{}", encode_frame(message));
}

/// Run the decode command.
pub fn run_decode(frame: &str) -> Result<()> {
    println!("{}", decode_frame(frame)?);
    Ok(())
}
