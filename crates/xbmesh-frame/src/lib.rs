//! Escape-coded, checksummed API frames for xbmesh radio links.
//!
//! Every frame on the wire is:
//! - a raw `0x7E` start delimiter
//! - a 2-byte big-endian length of the body
//! - the body: a frame type byte followed by its payload
//! - a checksum byte making the body sum to `0xFF`
//!
//! Everything after the delimiter is byte-stuffed (see [`escape`]). The
//! reader resynchronizes on the next delimiter after a corrupted frame.

pub mod codec;
pub mod error;
pub mod escape;
pub mod frame;
pub mod frame_type;
pub mod iosample;
pub mod reader;
pub mod types;
pub mod writer;

pub use codec::{checksum, decode_frame, encode_frame, FrameConfig, DEFAULT_MAX_BODY, MAX_BODY_SIZE};
pub use error::{FrameError, Result};
pub use frame::{
    CommandFrame, CommandResponseFrame, Frame, GenericFrame, RemoteCommandFrame,
    RemoteCommandResponseFrame,
};
pub use iosample::{AnalogPin, DigitalPin, IoSampleFrame};
pub use reader::FrameReader;
pub use types::{
    Address16, Address64, Command, CommandStatus, Module, Parameter, RemoteOptions,
};
pub use writer::FrameWriter;
