//! Byte-stream transports for xbmesh radio links.
//!
//! The link layer only needs a blocking, cloneable byte stream with an
//! optional read timeout. This crate defines that contract ([`LinkStream`])
//! and provides:
//! - [`SerialPort`]: a tty opened in raw 8N1 mode (Linux/macOS)
//! - `LinkStream` impls for Unix and TCP sockets, for serial bridges and tests
//!
//! This is the lowest layer of xbmesh. Everything else builds on top of it.

pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod serial;

pub use error::{Result, TransportError};
pub use traits::LinkStream;

#[cfg(unix)]
pub use serial::{BaudRate, SerialConfig, SerialPort};
