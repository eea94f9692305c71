use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::escape::{self, Unescape, DELIMITER};
use crate::frame::{self, Frame};

/// Largest body (type + payload) the 16-bit length field can describe.
pub const MAX_BODY_SIZE: usize = u16::MAX as usize;

/// Default maximum accepted body size.
pub const DEFAULT_MAX_BODY: usize = MAX_BODY_SIZE;

/// Checksum of an unescaped body: `0xFF` minus the low byte of its sum.
pub fn checksum(body: &[u8]) -> u8 {
    let sum = body.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    0xFF - sum
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌───────────┬──────────────┬──────────┬───────────────┬──────────┐
/// │ Delimiter │ Length       │ Type     │ Payload       │ Checksum │
/// │ 0x7E      │ (2B BE)      │ (1B)     │ (Length - 1)  │ (1B)     │
/// └───────────┴──────────────┴──────────┴───────────────┴──────────┘
/// ```
///
/// Everything after the delimiter is escape-coded. On error nothing is
/// appended to `dst`.
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    let mut body = Vec::new();
    frame.write_body(&mut body)?;

    if body.len() > MAX_BODY_SIZE {
        return Err(FrameError::PayloadTooLarge {
            size: body.len(),
            max: MAX_BODY_SIZE,
        });
    }

    let length = body.len() as u16;
    dst.reserve(body.len() + 6);
    dst.put_u8(DELIMITER);
    escape::escape_into(&length.to_be_bytes(), dst);
    escape::escape_into(&body, dst);
    escape::escape_into(&[checksum(&body)], dst);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet;
/// the partial frame stays in the buffer. Bytes before the first delimiter
/// are discarded.
///
/// On error the offending bytes are consumed so the next call resumes at
/// the following delimiter: a corrupted frame is consumed through its
/// checksum byte, a frame cut short by a raw delimiter up to that
/// delimiter.
pub fn decode_frame(src: &mut BytesMut, max_body: usize) -> Result<Option<Frame>> {
    let Some(start) = src.iter().position(|b| *b == DELIMITER) else {
        if !src.is_empty() {
            tracing::debug!(skipped = src.len(), "discarding bytes outside a frame");
            src.clear();
        }
        return Ok(None);
    };
    if start > 0 {
        tracing::debug!(skipped = start, "resynchronized on frame delimiter");
        src.advance(start);
    }

    let mut header = Vec::with_capacity(2);
    let header_len = match escape::unescape_exact(&src[1..], 2, &mut header) {
        Unescape::Complete { consumed } => consumed,
        Unescape::Incomplete => return Ok(None),
        Unescape::Delimiter { at } => {
            src.advance(1 + at);
            return Err(FrameError::UnexpectedDelimiter);
        }
    };
    let length = u16::from_be_bytes([header[0], header[1]]) as usize;

    if length == 0 {
        src.advance(1 + header_len);
        return Err(FrameError::EmptyFrame);
    }
    if length > max_body {
        src.advance(1 + header_len);
        return Err(FrameError::PayloadTooLarge {
            size: length,
            max: max_body,
        });
    }

    // Body plus the trailing checksum byte.
    let mut body = Vec::with_capacity(length + 1);
    let body_start = 1 + header_len;
    let total = match escape::unescape_exact(&src[body_start..], length + 1, &mut body) {
        Unescape::Complete { consumed } => body_start + consumed,
        Unescape::Incomplete => return Ok(None),
        Unescape::Delimiter { at } => {
            src.advance(body_start + at);
            return Err(FrameError::UnexpectedDelimiter);
        }
    };
    src.advance(total);

    let received = body[length];
    let expected = checksum(&body[..length]);
    if received != expected {
        return Err(FrameError::Checksum {
            frame_type: body[0],
            received,
            expected,
        });
    }

    let frame_type = body[0];
    let body = Bytes::from(body);
    frame::decode_body(frame_type, body.slice(1..length)).map(Some)
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum accepted body size in bytes. Default: 65535.
    pub max_body_size: usize,
    /// Read timeout applied to the stream by [`crate::FrameReader::with_config_stream`].
    pub read_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_body_size: DEFAULT_MAX_BODY,
            read_timeout: None,
        }
    }
}
