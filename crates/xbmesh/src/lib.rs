//! Serial API framing, request correlation and telemetry for XBee-style
//! radio links.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte-stream transports (serial tty, socket bridges)
//! - [`frame`]: escaped API framing, frame variants and IO samples
//! - [`link`]: request/response correlation, telemetry fan-out and the
//!   command API

/// Re-export transport types.
pub mod transport {
    pub use xbmesh_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use xbmesh_frame::*;
}

/// Re-export link types.
pub mod link {
    pub use xbmesh_link::*;
}
