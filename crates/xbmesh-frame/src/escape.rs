//! Byte stuffing for everything that follows the frame delimiter.
//!
//! The delimiter, the escape byte itself and the two software flow-control
//! bytes never appear literally inside a frame. Each of them is sent as
//! `ESCAPE, byte ^ ESCAPE_MASK`.

use bytes::{BufMut, BytesMut};

/// Start-of-frame delimiter. Never escaped when it starts a frame.
pub const DELIMITER: u8 = 0x7E;
/// Escape marker.
pub const ESCAPE: u8 = 0x7D;
/// Value XOR-ed into an escaped byte.
pub const ESCAPE_MASK: u8 = 0x20;
/// Software flow control: resume.
pub const XON: u8 = 0x11;
/// Software flow control: pause.
pub const XOFF: u8 = 0x13;

/// Every byte value that must be escaped inside a frame.
pub const ESCAPABLE: [u8; 4] = [XON, XOFF, ESCAPE, DELIMITER];

/// Returns true if `byte` must be escaped inside a frame.
#[inline]
pub fn needs_escape(byte: u8) -> bool {
    matches!(byte, XON | XOFF | ESCAPE | DELIMITER)
}

/// Append `src` to `dst`, escaping reserved bytes.
pub fn escape_into(src: &[u8], dst: &mut BytesMut) {
    dst.reserve(src.len());
    for &byte in src {
        if needs_escape(byte) {
            dst.put_u8(ESCAPE);
            dst.put_u8(byte ^ ESCAPE_MASK);
        } else {
            dst.put_u8(byte);
        }
    }
}

/// Outcome of [`unescape_exact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unescape {
    /// All requested logical bytes were decoded from `consumed` raw bytes.
    Complete { consumed: usize },
    /// The raw input ran out first (possibly on a dangling escape byte).
    Incomplete,
    /// A raw delimiter sits at raw offset `at`; the frame was cut short.
    Delimiter { at: usize },
}

/// Decode exactly `len` logical bytes from the front of `raw`, appending
/// them to `out`.
///
/// On anything but [`Unescape::Complete`], `out` is left as it was.
pub fn unescape_exact(raw: &[u8], len: usize, out: &mut Vec<u8>) -> Unescape {
    let start = out.len();
    let mut pos = 0usize;

    while out.len() - start < len {
        let Some(&byte) = raw.get(pos) else {
            out.truncate(start);
            return Unescape::Incomplete;
        };

        match byte {
            DELIMITER => {
                out.truncate(start);
                return Unescape::Delimiter { at: pos };
            }
            ESCAPE => {
                let Some(&next) = raw.get(pos + 1) else {
                    out.truncate(start);
                    return Unescape::Incomplete;
                };
                if next == DELIMITER {
                    out.truncate(start);
                    return Unescape::Delimiter { at: pos + 1 };
                }
                out.push(next ^ ESCAPE_MASK);
                pos += 2;
            }
            _ => {
                out.push(byte);
                pos += 1;
            }
        }
    }

    Unescape::Complete { consumed: pos }
}
