use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use xbmesh_transport::LinkStream;

use crate::codec::{decode_frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::frame::Frame;

const INITIAL_BUFFER_CAPACITY: usize = 1024;
const READ_CHUNK_SIZE: usize = 512;

/// Reads complete frames from any `Read` stream.
///
/// Bytes of a partially received frame stay buffered across calls, so an
/// elapsed read timeout (surfaced as `FrameError::Io` of kind `WouldBlock`
/// or `TimedOut`) loses nothing. Corrupted frames are reported once and
/// skipped; the next call resumes at the following delimiter.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = decode_frame(&mut self.buf, self.config.max_body_size)? {
                tracing::trace!(
                    frame_type = frame.frame_type(),
                    kind = frame.type_name(),
                    "frame received"
                );
                return Ok(frame);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Number of bytes buffered but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl<S: LinkStream> FrameReader<S> {
    /// Create a frame reader for a link stream and apply the read timeout
    /// from config.
    pub fn with_config_stream(inner: S, config: FrameConfig) -> Result<Self> {
        inner.set_read_timeout(config.read_timeout)?;
        Ok(Self::with_config(inner, config))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::Duration;

    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::codec::encode_frame;
    use crate::frame::{CommandFrame, CommandResponseFrame, GenericFrame};
    use crate::types::{Command, CommandStatus};

    fn wire_of(frames: &[Frame]) -> Vec<u8> {
        let mut wire = BytesMut::new();
        for frame in frames {
            encode_frame(frame, &mut wire).unwrap();
        }
        wire.to_vec()
    }

    fn ni_query(id: u8) -> Frame {
        CommandFrame::new(id, Command::NODE_IDENTIFIER).into()
    }

    #[test]
    fn read_multiple_frames() {
        let frames = vec![
            ni_query(1),
            CommandResponseFrame::new(1, Command::NODE_IDENTIFIER, CommandStatus::Ok)
                .with_parameter("COORD")
                .into(),
            GenericFrame::new(0x8A, vec![0x06]).into(),
        ];
        let mut reader = FrameReader::new(Cursor::new(wire_of(&frames)));

        for expected in &frames {
            assert_eq!(&reader.read_frame().unwrap(), expected);
        }
        assert!(matches!(
            reader.read_frame(),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn partial_read_handling() {
        let byte_reader = ByteByByteReader {
            bytes: wire_of(&[ni_query(9)]),
            pos: 0,
        };
        let mut reader = FrameReader::new(byte_reader);

        assert_eq!(reader.read_frame().unwrap(), ni_query(9));
    }

    #[test]
    fn connection_closed_mid_frame() {
        let wire = wire_of(&[ni_query(3)]);
        let mut reader = FrameReader::new(Cursor::new(wire[..wire.len() - 2].to_vec()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
        assert!(reader.buffered() > 0);
    }

    #[test]
    fn corrupted_frame_is_reported_then_skipped() {
        let mut wire = wire_of(&[ni_query(1)]);
        let last = wire.len() - 1;
        wire[last] = wire[last].wrapping_add(1);
        wire.extend_from_slice(&wire_of(&[ni_query(2)]));

        let mut reader = FrameReader::new(Cursor::new(wire));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::Checksum { .. }));
        assert!(err.is_recoverable());
        assert_eq!(reader.read_frame().unwrap(), ni_query(2));
    }

    #[test]
    fn timeout_mid_frame_keeps_partial_bytes() {
        let wire = wire_of(&[ni_query(4)]);
        let reader = StallingReader {
            chunks: vec![wire[..3].to_vec(), wire[3..].to_vec()],
            stalled: false,
        };
        let mut framed = FrameReader::new(reader);

        let err = framed.read_frame().unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(framed.buffered(), 3);
        assert_eq!(framed.read_frame().unwrap(), ni_query(4));
    }

    #[test]
    fn interrupted_read_retries() {
        let reader = InterruptedThenData {
            state: 0,
            bytes: wire_of(&[ni_query(8)]),
            pos: 0,
        };
        let mut framed = FrameReader::new(reader);
        assert_eq!(framed.read_frame().unwrap(), ni_query(8));
    }

    #[test]
    fn oversized_frame_in_stream() {
        let mut wire = BytesMut::new();
        wire.put_u8(0x7E);
        wire.put_u16(1024);

        let cfg = FrameConfig {
            max_body_size: 16,
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config(Cursor::new(wire.to_vec()), cfg);
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 1024, max: 16 }));
    }

    #[test]
    fn roundtrip_over_socket_pair() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = crate::writer::FrameWriter::new(left);
        let mut reader = FrameReader::new(right);

        writer.write_frame(&ni_query(0x7E)).unwrap();
        assert_eq!(reader.read_frame().unwrap(), ni_query(0x7E));
    }

    #[test]
    fn applies_read_timeout_for_link_stream() {
        let (_left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let cfg = FrameConfig {
            read_timeout: Some(Duration::from_millis(10)),
            ..FrameConfig::default()
        };

        let mut reader = FrameReader::with_config_stream(right, cfg).unwrap();
        let err = reader.read_frame().unwrap_err();
        assert!(err.is_timeout(), "{err:?}");
    }

    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }

            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    /// Delivers the first chunk, times out once, then delivers the rest.
    struct StallingReader {
        chunks: Vec<Vec<u8>>,
        stalled: bool,
    }

    impl Read for StallingReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.chunks.len() == 1 && !self.stalled {
                self.stalled = true;
                return Err(std::io::Error::from(ErrorKind::TimedOut));
            }
            if self.chunks.is_empty() {
                return Ok(0);
            }
            let chunk = self.chunks.remove(0);
            buf[..chunk.len()].copy_from_slice(&chunk);
            Ok(chunk.len())
        }
    }

    struct InterruptedThenData {
        state: u8,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.state == 0 {
                self.state = 1;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            if self.pos >= self.bytes.len() {
                return Ok(0);
            }
            let n = (self.bytes.len() - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }
}
