/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame checksum does not match its contents.
    #[error(
        "checksum mismatch on frame type 0x{frame_type:02X} \
         (received 0x{received:02X}, expected 0x{expected:02X})"
    )]
    Checksum {
        frame_type: u8,
        received: u8,
        expected: u8,
    },

    /// A frame of a known type carries a malformed or truncated payload.
    #[error("malformed frame type 0x{frame_type:02X}: {reason}")]
    Decode {
        frame_type: u8,
        reason: &'static str,
    },

    /// The length field announced a frame with no type byte.
    #[error("empty frame (length field is zero)")]
    EmptyFrame,

    /// A raw delimiter appeared before the current frame was complete.
    #[error("frame cut short by an unexpected delimiter")]
    UnexpectedDelimiter,

    /// The frame body exceeds the configured maximum size.
    #[error("frame body too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The frame cannot be encoded as given.
    #[error("invalid frame: {0}")]
    InvalidFrame(&'static str),

    /// A command mnemonic is not exactly two printable ASCII characters.
    #[error("invalid command mnemonic {0:?}")]
    InvalidCommand(String),

    /// A 64-bit address could not be parsed.
    #[error("invalid 64-bit address {0:?}")]
    InvalidAddress(String),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

impl FrameError {
    /// Whether the stream is still usable after this error.
    ///
    /// Corrupted frames are dropped and the reader resynchronizes on the
    /// next delimiter; I/O failures and end-of-stream are terminal.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FrameError::Checksum { .. }
                | FrameError::Decode { .. }
                | FrameError::EmptyFrame
                | FrameError::UnexpectedDelimiter
                | FrameError::PayloadTooLarge { .. }
        )
    }

    /// Whether this is an elapsed read timeout rather than a failure.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            FrameError::Io(err)
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                )
        )
    }
}

impl From<xbmesh_transport::TransportError> for FrameError {
    fn from(err: xbmesh_transport::TransportError) -> Self {
        match err {
            xbmesh_transport::TransportError::Io(io)
            | xbmesh_transport::TransportError::Open { source: io, .. }
            | xbmesh_transport::TransportError::Configure { source: io, .. } => FrameError::Io(io),
            other => FrameError::Io(std::io::Error::other(other.to_string())),
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
