//! Frame codec.
//!
//! A frame is the eight [`Message`] fields joined by [`FIELD_SEPARATOR`]
//! with one trailing separator:
//!
//! ```text
//! id#action#userId#isStarted#isFinished#messages#batteryPercentage#freeStorageGB#
//! ```
//!
//! There is no length prefix and no escaping. A `#` inside a field shifts
//! every following field and is not recoverable.
//!
//! Decoding strips one trailing separator, if present, before splitting. The
//! remaining text must split into exactly [`FIELD_COUNT`] tokens. Both the
//! terminated and the unterminated form of a record therefore decode to the
//! same value, except that a record whose last field is empty only decodes
//! from its terminated form.

use crate::{FrameError, Message};

/// Field separator byte.
pub const FIELD_SEPARATOR: u8 = b'#';

/// Number of fields in every frame.
pub const FIELD_COUNT: usize = 8;

/// Default upper bound for a single buffered frame.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Encode a message into one frame.
pub fn encode(msg: &Message) -> Vec<u8> {
    let fields = msg.fields();
    let len = fields.iter().map(|f| f.len() + 1).sum();
    let mut out = Vec::with_capacity(len);
    for field in fields {
        out.extend_from_slice(field.as_bytes());
        out.push(FIELD_SEPARATOR);
    }
    out
}

/// Decode one frame into a message.
pub fn decode(bytes: &[u8]) -> Result<Message, FrameError> {
    let text = std::str::from_utf8(bytes).map_err(|_| FrameError::InvalidUtf8)?;
    let body = text
        .strip_suffix(FIELD_SEPARATOR as char)
        .unwrap_or(text);

    let tokens: Vec<&str> = body.split(FIELD_SEPARATOR as char).collect();
    let fields: [String; FIELD_COUNT] = tokens
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .try_into()
        .map_err(|_| FrameError::WrongFieldCount {
            expected: FIELD_COUNT,
            found: tokens.len(),
        })?;

    Ok(Message::from_fields(fields))
}

/// Length of the first complete frame at the front of `buf`.
///
/// A frame is complete once [`FIELD_COUNT`] separators have been seen.
/// Returns `None` when more bytes are needed.
pub fn split_frame(buf: &[u8]) -> Option<usize> {
    buf.iter()
        .enumerate()
        .filter(|(_, b)| **b == FIELD_SEPARATOR)
        .nth(FIELD_COUNT - 1)
        .map(|(i, _)| i + 1)
}
