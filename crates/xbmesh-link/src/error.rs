use std::time::Duration;

use xbmesh_frame::{Command, CommandStatus};

/// Errors that can occur in link operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] xbmesh_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] xbmesh_frame::FrameError),

    /// No response arrived for the request before the deadline.
    #[error("no response to request {id} within {timeout:?}")]
    NoResponse { id: u8, timeout: Duration },

    /// The device answered with a non-zero status.
    #[error("device rejected {command}: {status}")]
    DeviceStatus {
        command: Command,
        status: CommandStatus,
    },

    /// The response does not belong to the request that was sent.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// The link monitor has stopped; no further responses can arrive.
    #[error("link is down")]
    LinkDown,

    /// The component was closed.
    #[error("closed")]
    Closed,

    /// A background thread could not be started.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },
}

impl LinkError {
    /// Whether the request timed out waiting for its response.
    pub fn is_timeout(&self) -> bool {
        matches!(self, LinkError::NoResponse { .. })
    }
}

pub type Result<T> = std::result::Result<T, LinkError>;
