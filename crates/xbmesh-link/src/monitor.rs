//! The single reader of a link.
//!
//! The monitor thread decodes every inbound frame and routes it: command
//! responses to the correlator, IO samples to the telemetry queue. When the
//! link dies (or shutdown is requested) it closes both, so blocked callers
//! fail fast and the dispatcher drains and exits.

use std::fmt;
use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use xbmesh_frame::{Frame, FrameError, FrameReader, IoSampleFrame};

use crate::correlator::Correlator;
use crate::error::{LinkError, Result};
use crate::fanout::FanoutQueue;

const MONITOR_THREAD_NAME: &str = "xbmesh-monitor";

/// Lifecycle of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    /// The monitor is reading frames.
    Running,
    /// Shutdown was requested and the monitor exited.
    Stopped,
    /// The transport reached end of stream.
    Closed,
    /// The transport failed.
    Failed,
}

impl LinkState {
    fn as_u8(self) -> u8 {
        match self {
            LinkState::Running => 0,
            LinkState::Stopped => 1,
            LinkState::Closed => 2,
            LinkState::Failed => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => LinkState::Running,
            1 => LinkState::Stopped,
            2 => LinkState::Closed,
            _ => LinkState::Failed,
        }
    }

    pub fn is_running(self) -> bool {
        self == LinkState::Running
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Running => f.write_str("running"),
            LinkState::Stopped => f.write_str("stopped"),
            LinkState::Closed => f.write_str("closed"),
            LinkState::Failed => f.write_str("failed"),
        }
    }
}

struct Routes {
    correlator: Arc<Correlator<Frame>>,
    telemetry: Arc<FanoutQueue<IoSampleFrame>>,
    shutdown: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
}

/// Handle to the monitor thread of one link.
pub struct LinkMonitor {
    shutdown: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl LinkMonitor {
    /// Start the monitor thread.
    ///
    /// The reader should have a read timeout: shutdown is only noticed
    /// between reads.
    pub fn spawn<R>(
        reader: FrameReader<R>,
        correlator: Arc<Correlator<Frame>>,
        telemetry: Arc<FanoutQueue<IoSampleFrame>>,
    ) -> Result<Self>
    where
        R: Read + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let state = Arc::new(AtomicU8::new(LinkState::Running.as_u8()));
        let routes = Routes {
            correlator,
            telemetry,
            shutdown: Arc::clone(&shutdown),
            state: Arc::clone(&state),
        };

        let handle = thread::Builder::new()
            .name(MONITOR_THREAD_NAME.to_string())
            .spawn(move || run(reader, routes))
            .map_err(|source| LinkError::Spawn {
                name: MONITOR_THREAD_NAME,
                source,
            })?;

        Ok(Self {
            shutdown,
            state,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn state(&self) -> LinkState {
        LinkState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Ask the monitor to stop at its next read timeout.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Wait for the monitor thread to exit.
    pub fn join(&self) {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("link monitor thread panicked");
            }
        }
    }
}

fn run<R: Read>(mut reader: FrameReader<R>, routes: Routes) {
    tracing::info!("link monitor started");

    let final_state = loop {
        if routes.shutdown.load(Ordering::Acquire) {
            break LinkState::Stopped;
        }

        match reader.read_frame() {
            Ok(frame) => route(frame, &routes),
            Err(err) if err.is_timeout() => continue,
            Err(err) if err.is_recoverable() => {
                tracing::warn!(error = %err, "discarding corrupted frame");
            }
            Err(FrameError::ConnectionClosed) => {
                tracing::info!(buffered = reader.buffered(), "link closed by peer");
                break LinkState::Closed;
            }
            Err(err) => {
                tracing::error!(error = %err, "link read failed");
                break LinkState::Failed;
            }
        }
    };

    routes.state.store(final_state.as_u8(), Ordering::Release);
    routes.correlator.close();
    routes.telemetry.close();
    tracing::info!(state = %final_state, "link monitor stopped");
}

fn route(frame: Frame, routes: &Routes) {
    match frame {
        Frame::CommandResponse(_) | Frame::RemoteCommandResponse(_) => {
            let id = frame.id().unwrap_or(0);
            if id == 0 {
                tracing::debug!(kind = frame.type_name(), "discarding response with id 0");
                return;
            }
            tracing::trace!(id, kind = frame.type_name(), "posting response");
            routes.correlator.post(id, frame);
        }
        Frame::IoSample(sample) => {
            if let Err(err) = routes.telemetry.publish(sample) {
                tracing::debug!(error = %err, "telemetry queue closed, dropping IO sample");
            }
        }
        Frame::Command(_) | Frame::RemoteCommand(_) | Frame::Generic(_) => {
            tracing::debug!(
                frame_type = frame.frame_type(),
                kind = frame.type_name(),
                "ignoring unsolicited frame"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::BytesMut;
    use xbmesh_frame::{
        encode_frame, Address16, Address64, Command, CommandResponseFrame, CommandStatus,
        GenericFrame,
    };

    use super::*;
    use crate::fanout::OverflowPolicy;

    fn sample() -> IoSampleFrame {
        IoSampleFrame {
            address64: Address64::from_u64(1),
            address16: Address16::UNKNOWN,
            receive_options: 0x01,
            sample_count: 1,
            digital_mask: 0,
            analog_mask: 0,
            digital_sample: None,
            analog_samples: Vec::new(),
        }
    }

    #[test]
    fn routes_frames_then_closes_on_eof() {
        use std::io::Write;

        let mut wire = BytesMut::new();
        let response: Frame =
            CommandResponseFrame::new(5, Command::NODE_IDENTIFIER, CommandStatus::Ok).into();
        let orphan: Frame =
            CommandResponseFrame::new(0, Command::NODE_IDENTIFIER, CommandStatus::Ok).into();
        for frame in [
            orphan,
            GenericFrame::new(0x8A, vec![0x00]).into(),
            sample().into(),
            response.clone(),
        ] {
            encode_frame(&frame, &mut wire).unwrap();
        }
        // Corrupted checksum: reported and skipped.
        wire.extend_from_slice(&[0x7E, 0x00, 0x01, 0x8A, 0x00]);

        let (mut device, host) = std::os::unix::net::UnixStream::pair().unwrap();
        host.set_read_timeout(Some(Duration::from_millis(20))).unwrap();

        let correlator = Arc::new(Correlator::new(Duration::from_secs(30)));
        let telemetry = Arc::new(FanoutQueue::new(4, OverflowPolicy::Block).unwrap());
        let (tx, rx) = std::sync::mpsc::channel();
        telemetry.subscribe(move |sample: &IoSampleFrame| {
            tx.send(sample.clone()).unwrap();
            Ok(())
        });

        let monitor = LinkMonitor::spawn(
            FrameReader::new(host),
            Arc::clone(&correlator),
            Arc::clone(&telemetry),
        )
        .unwrap();
        device.write_all(&wire).unwrap();

        assert_eq!(
            correlator
                .await_response(5, Some(Duration::from_secs(2)))
                .unwrap(),
            response
        );
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), sample());
        assert_eq!(monitor.state(), LinkState::Running);

        drop(device);
        monitor.join();

        assert_eq!(monitor.state(), LinkState::Closed);
        assert!(telemetry.is_closed());
        assert!(correlator.is_closed());
    }

    #[test]
    fn shutdown_is_noticed_at_read_timeout() {
        let (_device, host) = std::os::unix::net::UnixStream::pair().unwrap();
        host.set_read_timeout(Some(Duration::from_millis(20))).unwrap();

        let correlator = Arc::new(Correlator::new(Duration::from_secs(30)));
        let telemetry = Arc::new(FanoutQueue::new(4, OverflowPolicy::Block).unwrap());
        let monitor = LinkMonitor::spawn(
            FrameReader::new(host),
            Arc::clone(&correlator),
            Arc::clone(&telemetry),
        )
        .unwrap();
        assert_eq!(monitor.state(), LinkState::Running);

        monitor.shutdown();
        monitor.join();

        assert_eq!(monitor.state(), LinkState::Stopped);
        assert!(matches!(
            correlator.await_response(1, None),
            Err(LinkError::LinkDown)
        ));
    }
}
