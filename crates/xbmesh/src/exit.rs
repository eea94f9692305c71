use std::fmt;
use std::io;

use xbmesh_frame::{CommandStatus, FrameError};
use xbmesh_link::LinkError;
use xbmesh_transport::TransportError;

// Exit code constants aligned with rsfulmen/DDR-0002 semantics.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound | io::ErrorKind::BrokenPipe => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Open { ref source, .. }
            if source.kind() == io::ErrorKind::PermissionDenied =>
        {
            CliError::new(PERMISSION_DENIED, format!("{context}: {err}"))
        }
        TransportError::UnsupportedBaud(_) => CliError::new(USAGE, format!("{context}: {err}")),
        TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::PayloadTooLarge { .. } | FrameError::InvalidFrame(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::InvalidCommand(_) | FrameError::InvalidAddress(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn link_error(context: &str, err: LinkError) -> CliError {
    match err {
        LinkError::Transport(err) => transport_error(context, err),
        LinkError::Frame(err) => frame_error(context, err),
        LinkError::NoResponse { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
        LinkError::DeviceStatus {
            status: CommandStatus::InvalidCommand | CommandStatus::InvalidParameter,
            ..
        }
        | LinkError::UnexpectedResponse(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        LinkError::DeviceStatus { .. } | LinkError::LinkDown | LinkError::Closed => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use xbmesh_frame::Command;

    use super::*;

    #[test]
    fn link_errors_map_to_exit_codes() {
        let timeout = LinkError::NoResponse {
            id: 1,
            timeout: Duration::from_millis(100),
        };
        assert_eq!(link_error("get", timeout).code, TIMEOUT);

        let rejected = LinkError::DeviceStatus {
            command: Command::NODE_IDENTIFIER,
            status: CommandStatus::InvalidParameter,
        };
        assert_eq!(link_error("set", rejected).code, DATA_INVALID);

        let failed = LinkError::DeviceStatus {
            command: Command::WRITE,
            status: CommandStatus::TxFailure,
        };
        assert_eq!(link_error("set", failed).code, FAILURE);
        assert_eq!(link_error("get", LinkError::LinkDown).code, FAILURE);
    }

    #[test]
    fn open_errors_are_transport_errors() {
        let missing = TransportError::Open {
            path: "/dev/ttyMISSING".into(),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        let err = transport_error("open failed", missing);
        assert_eq!(err.code, TRANSPORT_ERROR);
        assert!(err.message.contains("/dev/ttyMISSING"));

        let denied = TransportError::Open {
            path: "/dev/ttyS0".into(),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert_eq!(transport_error("open failed", denied).code, PERMISSION_DENIED);
        assert_eq!(
            transport_error("open failed", TransportError::UnsupportedBaud(1234)).code,
            USAGE
        );
    }
}
