//! The tagged frame model.
//!
//! A frame body is `type | payload`. The four command variants start their
//! payload with a one-byte correlation id; telemetry and unknown frames do
//! not carry one.

use bytes::{BufMut, Bytes};

use crate::error::{FrameError, Result};
use crate::frame_type;
use crate::iosample::IoSampleFrame;
use crate::types::{Address16, Address64, Command, CommandStatus, Module, Parameter, RemoteOptions};

/// A decoded or to-be-encoded API frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Any frame type without a typed layout.
    Generic(GenericFrame),
    Command(CommandFrame),
    CommandResponse(CommandResponseFrame),
    RemoteCommand(RemoteCommandFrame),
    RemoteCommandResponse(RemoteCommandResponseFrame),
    IoSample(IoSampleFrame),
}

impl Frame {
    /// The type byte this frame is sent with.
    pub fn frame_type(&self) -> u8 {
        match self {
            Frame::Generic(f) => f.frame_type,
            Frame::Command(_) => frame_type::COMMAND,
            Frame::CommandResponse(_) => frame_type::COMMAND_RESPONSE,
            Frame::RemoteCommand(_) => frame_type::REMOTE_COMMAND,
            Frame::RemoteCommandResponse(_) => frame_type::REMOTE_COMMAND_RESPONSE,
            Frame::IoSample(_) => frame_type::IO_SAMPLE,
        }
    }

    /// The correlation id, for variants that carry one.
    pub fn id(&self) -> Option<u8> {
        match self {
            Frame::Command(f) => Some(f.id),
            Frame::CommandResponse(f) => Some(f.id),
            Frame::RemoteCommand(f) => Some(f.id),
            Frame::RemoteCommandResponse(f) => Some(f.id),
            Frame::Generic(_) | Frame::IoSample(_) => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        frame_type::type_name(self.frame_type())
    }

    /// Append the unescaped body (type byte followed by payload) to `dst`.
    pub(crate) fn write_body(&self, dst: &mut Vec<u8>) -> Result<()> {
        dst.put_u8(self.frame_type());
        match self {
            Frame::Generic(f) => dst.put_slice(&f.payload),
            Frame::Command(f) => {
                dst.put_u8(f.id);
                dst.put_slice(f.command.as_bytes());
                dst.put_slice(f.parameter.as_bytes());
            }
            Frame::CommandResponse(f) => {
                dst.put_u8(f.id);
                dst.put_slice(f.command.as_bytes());
                dst.put_u8(f.status.as_u8());
                dst.put_slice(f.parameter.as_bytes());
            }
            Frame::RemoteCommand(f) => {
                dst.put_u8(f.id);
                dst.put_slice(f.address64.as_bytes());
                dst.put_slice(&f.address16.0);
                dst.put_u8(f.options.bits());
                dst.put_slice(f.command.as_bytes());
                dst.put_slice(f.parameter.as_bytes());
            }
            Frame::RemoteCommandResponse(f) => {
                dst.put_u8(f.id);
                dst.put_slice(f.address64.as_bytes());
                dst.put_slice(&f.address16.0);
                dst.put_slice(f.command.as_bytes());
                dst.put_u8(f.status.as_u8());
                dst.put_slice(f.parameter.as_bytes());
            }
            Frame::IoSample(f) => f.write_payload(dst)?,
        }
        Ok(())
    }
}

type PayloadDecoder = fn(Bytes) -> Result<Frame>;

/// Typed payload decoders, keyed by frame type.
const DECODERS: &[(u8, PayloadDecoder)] = &[
    (frame_type::COMMAND, decode_command),
    (frame_type::COMMAND_RESPONSE, decode_command_response),
    (frame_type::REMOTE_COMMAND, decode_remote_command),
    (frame_type::REMOTE_COMMAND_RESPONSE, decode_remote_command_response),
    (frame_type::IO_SAMPLE, decode_io_sample),
];

/// Decode a checksum-verified body. Unknown types become [`Frame::Generic`].
pub(crate) fn decode_body(frame_type: u8, payload: Bytes) -> Result<Frame> {
    match DECODERS.iter().find(|(t, _)| *t == frame_type) {
        Some((_, decode)) => decode(payload),
        None => Ok(Frame::Generic(GenericFrame {
            frame_type,
            payload,
        })),
    }
}

fn truncated(frame_type: u8) -> FrameError {
    FrameError::Decode {
        frame_type,
        reason: "payload shorter than the fixed header",
    }
}

fn address64_at(payload: &[u8], at: usize) -> Address64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&payload[at..at + 8]);
    Address64(bytes)
}

fn address16_at(payload: &[u8], at: usize) -> Address16 {
    Address16([payload[at], payload[at + 1]])
}

fn command_at(payload: &[u8], at: usize) -> Command {
    Command::from_wire([payload[at], payload[at + 1]])
}

fn decode_command(payload: Bytes) -> Result<Frame> {
    if payload.len() < 3 {
        return Err(truncated(frame_type::COMMAND));
    }
    Ok(Frame::Command(CommandFrame {
        id: payload[0],
        command: command_at(&payload, 1),
        parameter: Parameter::new(payload.slice(3..)),
    }))
}

fn decode_command_response(payload: Bytes) -> Result<Frame> {
    if payload.len() < 4 {
        return Err(truncated(frame_type::COMMAND_RESPONSE));
    }
    Ok(Frame::CommandResponse(CommandResponseFrame {
        id: payload[0],
        command: command_at(&payload, 1),
        status: CommandStatus::from_u8(payload[3]),
        parameter: Parameter::new(payload.slice(4..)),
    }))
}

fn decode_remote_command(payload: Bytes) -> Result<Frame> {
    if payload.len() < 14 {
        return Err(truncated(frame_type::REMOTE_COMMAND));
    }
    Ok(Frame::RemoteCommand(RemoteCommandFrame {
        id: payload[0],
        address64: address64_at(&payload, 1),
        address16: address16_at(&payload, 9),
        options: RemoteOptions(payload[11]),
        command: command_at(&payload, 12),
        parameter: Parameter::new(payload.slice(14..)),
    }))
}

fn decode_remote_command_response(payload: Bytes) -> Result<Frame> {
    if payload.len() < 15 {
        return Err(truncated(frame_type::REMOTE_COMMAND_RESPONSE));
    }
    Ok(Frame::RemoteCommandResponse(RemoteCommandResponseFrame {
        id: payload[0],
        address64: address64_at(&payload, 1),
        address16: address16_at(&payload, 9),
        command: command_at(&payload, 11),
        status: CommandStatus::from_u8(payload[13]),
        parameter: Parameter::new(payload.slice(15..)),
    }))
}

fn decode_io_sample(payload: Bytes) -> Result<Frame> {
    IoSampleFrame::decode(&payload).map(Frame::IoSample)
}

/// A frame of a type with no typed layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericFrame {
    pub frame_type: u8,
    pub payload: Bytes,
}

impl GenericFrame {
    pub fn new(frame_type: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            frame_type,
            payload: payload.into(),
        }
    }
}

/// Local AT command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    pub id: u8,
    pub command: Command,
    pub parameter: Parameter,
}

impl CommandFrame {
    /// A query: the command without a parameter.
    pub fn new(id: u8, command: Command) -> Self {
        Self {
            id,
            command,
            parameter: Parameter::empty(),
        }
    }

    pub fn with_parameter(mut self, parameter: impl Into<Parameter>) -> Self {
        self.parameter = parameter.into();
        self
    }
}

/// Response from the local radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponseFrame {
    pub id: u8,
    pub command: Command,
    pub status: CommandStatus,
    pub parameter: Parameter,
}

impl CommandResponseFrame {
    pub fn new(id: u8, command: Command, status: CommandStatus) -> Self {
        Self {
            id,
            command,
            status,
            parameter: Parameter::empty(),
        }
    }

    pub fn with_parameter(mut self, parameter: impl Into<Parameter>) -> Self {
        self.parameter = parameter.into();
        self
    }

    /// Detach the parameter, leaving an empty one behind.
    pub fn take_parameter(&mut self) -> Parameter {
        std::mem::take(&mut self.parameter)
    }
}

/// AT command relayed to a remote module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommandFrame {
    pub id: u8,
    pub address64: Address64,
    pub address16: Address16,
    pub options: RemoteOptions,
    pub command: Command,
    pub parameter: Parameter,
}

impl RemoteCommandFrame {
    pub fn new(id: u8, address64: Address64, address16: Address16, command: Command) -> Self {
        Self {
            id,
            address64,
            address16,
            options: RemoteOptions::NONE,
            command,
            parameter: Parameter::empty(),
        }
    }

    pub fn to_coordinator(id: u8, command: Command) -> Self {
        Self::new(id, Address64::COORDINATOR, Address16::UNKNOWN, command)
    }

    pub fn to_broadcast(id: u8, command: Command) -> Self {
        Self::new(id, Address64::BROADCAST, Address16::UNKNOWN, command)
    }

    pub fn to_module(id: u8, module: &Module, command: Command) -> Self {
        Self::new(id, module.address64, module.address16, command)
    }

    pub fn with_options(mut self, options: RemoteOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_parameter(mut self, parameter: impl Into<Parameter>) -> Self {
        self.parameter = parameter.into();
        self
    }
}

/// Response relayed back from a remote module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommandResponseFrame {
    pub id: u8,
    pub address64: Address64,
    pub address16: Address16,
    pub command: Command,
    pub status: CommandStatus,
    pub parameter: Parameter,
}

impl RemoteCommandResponseFrame {
    pub fn new(
        id: u8,
        address64: Address64,
        address16: Address16,
        command: Command,
        status: CommandStatus,
    ) -> Self {
        Self {
            id,
            address64,
            address16,
            command,
            status,
            parameter: Parameter::empty(),
        }
    }

    pub fn with_parameter(mut self, parameter: impl Into<Parameter>) -> Self {
        self.parameter = parameter.into();
        self
    }

    /// Detach the parameter, leaving an empty one behind.
    pub fn take_parameter(&mut self) -> Parameter {
        std::mem::take(&mut self.parameter)
    }
}

impl From<GenericFrame> for Frame {
    fn from(f: GenericFrame) -> Self {
        Frame::Generic(f)
    }
}

impl From<CommandFrame> for Frame {
    fn from(f: CommandFrame) -> Self {
        Frame::Command(f)
    }
}

impl From<CommandResponseFrame> for Frame {
    fn from(f: CommandResponseFrame) -> Self {
        Frame::CommandResponse(f)
    }
}

impl From<RemoteCommandFrame> for Frame {
    fn from(f: RemoteCommandFrame) -> Self {
        Frame::RemoteCommand(f)
    }
}

impl From<RemoteCommandResponseFrame> for Frame {
    fn from(f: RemoteCommandResponseFrame) -> Self {
        Frame::RemoteCommandResponse(f)
    }
}

impl From<IoSampleFrame> for Frame {
    fn from(f: IoSampleFrame) -> Self {
        Frame::IoSample(f)
    }
}
