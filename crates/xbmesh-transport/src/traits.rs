use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

/// A connected byte stream to the local radio.
///
/// Reads block until data arrives or the read timeout elapses; an elapsed
/// timeout surfaces as an `io::Error` of kind `WouldBlock` or `TimedOut`.
/// The stream must be cloneable so the read side can be handed to a
/// dedicated reader thread while callers keep writing on the original.
pub trait LinkStream: Read + Write + Send + Sized + 'static {
    /// Create a second handle to the same underlying stream.
    fn try_clone(&self) -> Result<Self>;

    /// Set the read timeout. `None` blocks indefinitely.
    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()>;

    /// Transport name for diagnostics.
    fn transport_name(&self) -> &'static str;
}

#[cfg(unix)]
impl LinkStream for std::os::unix::net::UnixStream {
    fn try_clone(&self) -> Result<Self> {
        std::os::unix::net::UnixStream::try_clone(self).map_err(Into::into)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        std::os::unix::net::UnixStream::set_read_timeout(self, timeout).map_err(Into::into)
    }

    fn transport_name(&self) -> &'static str {
        "unix-stream"
    }
}

impl LinkStream for std::net::TcpStream {
    fn try_clone(&self) -> Result<Self> {
        std::net::TcpStream::try_clone(self).map_err(Into::into)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        std::net::TcpStream::set_read_timeout(self, timeout).map_err(Into::into)
    }

    fn transport_name(&self) -> &'static str {
        "tcp-stream"
    }
}
