//! Addresses, command mnemonics, parameters and status codes.

use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

use bytes::Bytes;

use crate::error::FrameError;

/// 64-bit globally unique module address (big-endian on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address64(pub [u8; 8]);

impl Address64 {
    /// The local coordinator radio.
    pub const COORDINATOR: Address64 = Address64([0x00; 8]);
    /// Every module on the network.
    pub const BROADCAST: Address64 = Address64([0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xFF, 0xFF]);

    pub const fn new(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    pub const fn from_u64(value: u64) -> Self {
        Self(value.to_be_bytes())
    }

    pub const fn to_u64(self) -> u64 {
        u64::from_be_bytes(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    pub fn is_coordinator(&self) -> bool {
        *self == Self::COORDINATOR
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl fmt::Display for Address64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, byte) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(":")?;
            }
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

impl FromStr for Address64 {
    type Err = FrameError;

    /// Accepts `00:13:A2:00:41:46:B5:A9`, `0013A2004146B5A9` or `0x0013A2004146B5A9`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FrameError::InvalidAddress(s.to_string());
        let trimmed = s.trim();
        let digits: String = if trimmed.contains(':') {
            let parts: Vec<&str> = trimmed.split(':').collect();
            if parts.len() != 8 || parts.iter().any(|p| p.len() != 2) {
                return Err(invalid());
            }
            parts.concat()
        } else {
            trimmed
                .strip_prefix("0x")
                .or_else(|| trimmed.strip_prefix("0X"))
                .unwrap_or(trimmed)
                .to_string()
        };

        if digits.len() != 16 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let value = u64::from_str_radix(&digits, 16).map_err(|_| invalid())?;
        Ok(Self::from_u64(value))
    }
}

/// 16-bit network-assigned short address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address16(pub [u8; 2]);

impl Address16 {
    /// Short address not known or not yet assigned.
    pub const UNKNOWN: Address16 = Address16([0xFF, 0xFE]);

    pub const fn new(bytes: [u8; 2]) -> Self {
        Self(bytes)
    }

    pub const fn from_u16(value: u16) -> Self {
        Self(value.to_be_bytes())
    }

    pub const fn to_u16(self) -> u16 {
        u16::from_be_bytes(self.0)
    }

    pub fn is_unknown(&self) -> bool {
        *self == Self::UNKNOWN
    }
}

impl fmt::Display for Address16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.to_u16())
    }
}

/// Two-character register/operation mnemonic such as `NI` or `NT`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Command([u8; 2]);

impl Command {
    /// Node identifier string.
    pub const NODE_IDENTIFIER: Command = Command(*b"NI");
    /// Node discovery timeout.
    pub const DISCOVERY_TIMEOUT: Command = Command(*b"NT");
    /// Apply queued parameter changes.
    pub const APPLY_CHANGES: Command = Command(*b"AC");
    /// Write parameters to non-volatile memory.
    pub const WRITE: Command = Command(*b"WR");
    /// Time before sleep.
    pub const SLEEP_TIME_BEFORE: Command = Command(*b"ST");
    /// IO sample rate.
    pub const SAMPLE_RATE: Command = Command(*b"IR");
    /// Cyclic sleep period.
    pub const SLEEP_PERIOD: Command = Command(*b"SP");
    /// Number of cyclic sleep periods.
    pub const SLEEP_COUNT: Command = Command(*b"SN");
    /// Supply voltage high threshold.
    pub const SUPPLY_THRESHOLD: Command = Command(*b"V+");

    /// Build a command from raw bytes. Both bytes must be printable ASCII.
    pub fn new(bytes: [u8; 2]) -> Result<Self, FrameError> {
        if bytes.iter().all(|b| b.is_ascii_graphic()) {
            Ok(Self(bytes))
        } else {
            Err(FrameError::InvalidCommand(
                String::from_utf8_lossy(&bytes).into_owned(),
            ))
        }
    }

    /// Build a command from wire bytes without validation.
    pub(crate) const fn from_wire(bytes: [u8; 2]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 2] {
        &self.0
    }
}

impl FromStr for Command {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.as_bytes() {
            [a, b] => Command::new([*a, *b]),
            _ => Err(FrameError::InvalidCommand(s.to_string())),
        }
    }
}

impl TryFrom<&str> for Command {
    type Error = FrameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.0[0] as char, self.0[1] as char)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Command({self})")
    }
}

/// Variable-length command argument or register value.
///
/// The bytes may be a string, a big-endian unsigned integer or opaque data;
/// the accessors interpret them on demand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Parameter(Bytes);

impl Parameter {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(data.into())
    }

    pub fn empty() -> Self {
        Self(Bytes::new())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The bytes as UTF-8 text, if they are valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    /// The bytes as a big-endian unsigned integer of up to 8 bytes.
    pub fn to_uint(&self) -> Option<u64> {
        if self.0.is_empty() || self.0.len() > 8 {
            return None;
        }
        Some(self.0.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
    }

    /// The bytes as a big-endian `u16`, if the value fits.
    pub fn to_u16(&self) -> Option<u16> {
        self.to_uint().and_then(|v| u16::try_from(v).ok())
    }
}

impl From<u8> for Parameter {
    fn from(value: u8) -> Self {
        Self(Bytes::copy_from_slice(&[value]))
    }
}

impl From<u16> for Parameter {
    fn from(value: u16) -> Self {
        Self(Bytes::copy_from_slice(&value.to_be_bytes()))
    }
}

impl From<u32> for Parameter {
    fn from(value: u32) -> Self {
        Self(Bytes::copy_from_slice(&value.to_be_bytes()))
    }
}

impl From<&str> for Parameter {
    fn from(value: &str) -> Self {
        Self(Bytes::copy_from_slice(value.as_bytes()))
    }
}

impl From<String> for Parameter {
    fn from(value: String) -> Self {
        Self(Bytes::from(value))
    }
}

impl From<&[u8]> for Parameter {
    fn from(value: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(value))
    }
}

impl From<Vec<u8>> for Parameter {
    fn from(value: Vec<u8>) -> Self {
        Self(Bytes::from(value))
    }
}

impl From<Bytes> for Parameter {
    fn from(value: Bytes) -> Self {
        Self(value)
    }
}

/// Per-response status byte reported by the addressed device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandStatus {
    Ok,
    Error,
    InvalidCommand,
    InvalidParameter,
    TxFailure,
    Unknown(u8),
}

impl CommandStatus {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => CommandStatus::Ok,
            1 => CommandStatus::Error,
            2 => CommandStatus::InvalidCommand,
            3 => CommandStatus::InvalidParameter,
            4 => CommandStatus::TxFailure,
            other => CommandStatus::Unknown(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            CommandStatus::Ok => 0,
            CommandStatus::Error => 1,
            CommandStatus::InvalidCommand => 2,
            CommandStatus::InvalidParameter => 3,
            CommandStatus::TxFailure => 4,
            CommandStatus::Unknown(other) => other,
        }
    }

    pub fn is_ok(self) -> bool {
        self == CommandStatus::Ok
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandStatus::Ok => f.write_str("ok"),
            CommandStatus::Error => f.write_str("error"),
            CommandStatus::InvalidCommand => f.write_str("invalid command"),
            CommandStatus::InvalidParameter => f.write_str("invalid parameter"),
            CommandStatus::TxFailure => f.write_str("transmission failure"),
            CommandStatus::Unknown(code) => write!(f, "unknown status 0x{code:02X}"),
        }
    }
}

/// Option bits carried by a remote command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RemoteOptions(pub u8);

impl RemoteOptions {
    pub const NONE: RemoteOptions = RemoteOptions(0x00);
    /// Do not request a MAC-level acknowledgement.
    pub const DISABLE_ACK: RemoteOptions = RemoteOptions(0x01);
    /// Apply the change immediately instead of queueing it until `AC`.
    pub const APPLY_CHANGES: RemoteOptions = RemoteOptions(0x02);
    /// Use the extended transmission timeout.
    pub const EXTENDED_TX_TIMEOUT: RemoteOptions = RemoteOptions(0x04);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: RemoteOptions) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for RemoteOptions {
    type Output = RemoteOptions;

    fn bitor(self, rhs: Self) -> Self::Output {
        RemoteOptions(self.0 | rhs.0)
    }
}

/// A network participant as known to discovery/configuration workflows.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Module {
    pub address64: Address64,
    pub address16: Address16,
    pub identifier: String,
}

impl Module {
    pub fn new(address64: Address64, address16: Address16, identifier: impl Into<String>) -> Self {
        Self {
            address64,
            address16,
            identifier: identifier.into(),
        }
    }

    /// A module known only by its 64-bit address.
    pub fn with_address(address64: Address64) -> Self {
        Self::new(address64, Address16::UNKNOWN, String::new())
    }

    pub fn coordinator() -> Self {
        Self::with_address(Address64::COORDINATOR)
    }

    pub fn broadcast() -> Self {
        Self::with_address(Address64::BROADCAST)
    }
}
