//! Wire codec: length-prefixed JSON frames.
//!
//! ```text
//! [u32 BE: len][UTF-8 JSON bytes of len]
//! ```
//!
//! The JSON object carries `call`, `args` and `msg_id` (all required) plus the
//! optional `resp` and routing fields. [`decode`] works on any blocking reader;
//! [`FrameDecoder`] buffers partial reads for the transport's reader thread,
//! where a socket timeout can land in the middle of a frame.

use crate::config::TransportConfig;
use crate::error::CodecError;
use crate::message::Message;
use bytes::{Buf, BufMut, BytesMut};
use std::io::{ErrorKind, Read};

const PREFIX_LEN: usize = 4;

/// Serialize a message into one complete frame.
pub fn encode(msg: &Message) -> Result<Vec<u8>, CodecError> {
    let mut buf = BytesMut::new();
    encode_into(msg, &mut buf)?;
    Ok(buf.to_vec())
}

/// Append one complete frame for `msg` to `buf`.
pub fn encode_into(msg: &Message, buf: &mut BytesMut) -> Result<(), CodecError> {
    let payload = serde_json::to_vec(msg)
        .map_err(|e| CodecError::malformed(format!("failed to serialize {}: {}", msg, e)))?;

    if payload.len() > TransportConfig::MAX_FRAME_SIZE {
        return Err(CodecError::TooLarge {
            size: payload.len(),
            max: TransportConfig::MAX_FRAME_SIZE,
        });
    }

    buf.reserve(PREFIX_LEN + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.put_slice(&payload);
    Ok(())
}

/// Read exactly one frame from a blocking reader.
///
/// Returns `Ok(None)` on a clean end-of-stream before the first prefix byte.
/// Any short read after that is [`CodecError::Truncated`].
pub fn decode<R: Read>(reader: &mut R) -> Result<Option<Message>, CodecError> {
    let mut len_buf = [0u8; PREFIX_LEN];
    let got = read_full(reader, &mut len_buf)?;
    if got == 0 {
        return Ok(None);
    }
    if got < PREFIX_LEN {
        return Err(CodecError::Truncated {
            expected: PREFIX_LEN,
            received: got,
        });
    }

    let len = checked_len(u32::from_be_bytes(len_buf))?;

    let mut payload = vec![0u8; len];
    let got = read_full(reader, &mut payload)?;
    if got < len {
        return Err(CodecError::Truncated {
            expected: len,
            received: got,
        });
    }

    parse_payload(&payload).map(Some)
}

/// Parse a frame payload into a message.
///
/// Missing `call`, `args` or `msg_id`, wrong field types, invalid UTF-8 or
/// invalid JSON all produce [`CodecError::Malformed`].
pub fn parse_payload(payload: &[u8]) -> Result<Message, CodecError> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| CodecError::malformed(format!("payload is not UTF-8: {}", e)))?;
    serde_json::from_str(text).map_err(|e| CodecError::malformed(e.to_string()))
}

fn checked_len(len: u32) -> Result<usize, CodecError> {
    let len = len as usize;
    if len > TransportConfig::MAX_FRAME_SIZE {
        return Err(CodecError::TooLarge {
            size: len,
            max: TransportConfig::MAX_FRAME_SIZE,
        });
    }
    Ok(len)
}

/// Fill `buf` as far as the reader allows, returning the byte count.
///
/// Stops early only at end-of-stream.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, CodecError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(CodecError::Io(e)),
        }
    }
    Ok(filled)
}

/// Incremental frame decoder over a growable buffer.
///
/// Bytes are appended as they arrive with [`FrameDecoder::extend`]; complete
/// frames are taken out with [`FrameDecoder::next_message`].
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of buffered bytes not yet consumed by a complete frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Take the next complete frame out of the buffer, if there is one.
    pub fn next_message(&mut self) -> Result<Option<Message>, CodecError> {
        if self.buf.len() < PREFIX_LEN {
            return Ok(None);
        }

        let mut prefix = [0u8; PREFIX_LEN];
        prefix.copy_from_slice(&self.buf[..PREFIX_LEN]);
        let len = checked_len(u32::from_be_bytes(prefix))?;

        if self.buf.len() < PREFIX_LEN + len {
            self.buf.reserve(PREFIX_LEN + len - self.buf.len());
            return Ok(None);
        }

        self.buf.advance(PREFIX_LEN);
        let payload = self.buf.split_to(len);
        parse_payload(&payload).map(Some)
    }

    /// Validate the buffer at end-of-stream.
    ///
    /// Leftover bytes mean the peer closed the connection mid-frame.
    pub fn finish(&self) -> Result<(), CodecError> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let expected = if self.buf.len() < PREFIX_LEN {
            PREFIX_LEN
        } else {
            let mut prefix = [0u8; PREFIX_LEN];
            prefix.copy_from_slice(&self.buf[..PREFIX_LEN]);
            PREFIX_LEN + u32::from_be_bytes(prefix) as usize
        };
        Err(CodecError::Truncated {
            expected,
            received: self.buf.len(),
        })
    }
}
