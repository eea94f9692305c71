//! Request/response correlation and telemetry fan-out over one radio link.
//!
//! A [`Connection`] owns the link: callers send commands and block on the
//! matching response, while a single monitor thread reads every inbound
//! frame and routes it to the waiting caller or to telemetry subscribers.
//!
//! ```no_run
//! use xbmesh_frame::Command;
//! use xbmesh_link::{Connection, LinkConfig};
//! use xbmesh_transport::SerialPort;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let port = SerialPort::open("/dev/ttyUSB0")?;
//! let link = Connection::open(port, LinkConfig::default())?;
//! let name = link.get_parameter(Command::NODE_IDENTIFIER)?;
//! println!("{}", name.as_str().unwrap_or("<binary>"));
//! link.close();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod correlator;
pub mod error;
pub mod fanout;
pub mod id;
pub mod monitor;

pub use config::LinkConfig;
pub use connection::Connection;
pub use correlator::Correlator;
pub use error::{LinkError, Result};
pub use fanout::{BoxError, DeliveryError, ErrorSink, FanoutQueue, OverflowPolicy, SubscriptionId};
pub use id::IdAllocator;
pub use monitor::{LinkMonitor, LinkState};
