//! Caller-facing command API over one radio link.

use std::io::{Read, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use xbmesh_frame::{
    Command, CommandFrame, CommandStatus, Frame, FrameConfig, FrameError, FrameReader,
    FrameWriter, IoSampleFrame, Module, Parameter, RemoteCommandFrame, RemoteOptions,
};
use xbmesh_transport::LinkStream;

use crate::config::LinkConfig;
use crate::correlator::Correlator;
use crate::error::{LinkError, Result};
use crate::fanout::{BoxError, FanoutQueue, SubscriptionId};
use crate::id::IdAllocator;
use crate::monitor::{LinkMonitor, LinkState};

type BoxWriter = Box<dyn Write + Send>;

/// An open link to the local radio.
///
/// Owns two background threads: the link monitor, which reads every
/// inbound frame, and the telemetry dispatcher. Any number of threads may
/// issue requests concurrently through a shared reference.
pub struct Connection {
    writer: Mutex<FrameWriter<BoxWriter>>,
    ids: IdAllocator,
    correlator: Arc<Correlator<Frame>>,
    telemetry: Arc<FanoutQueue<IoSampleFrame>>,
    monitor: LinkMonitor,
    config: LinkConfig,
}

impl Connection {
    /// Start a connection over a link stream.
    ///
    /// A clone of the stream becomes the monitor's read side, with its read
    /// timeout set to `config.poll_interval`.
    pub fn open<S: LinkStream>(stream: S, config: LinkConfig) -> Result<Self> {
        let reader = stream.try_clone()?;
        reader.set_read_timeout(Some(config.poll_interval))?;
        tracing::info!(
            transport = stream.transport_name(),
            "opening link connection"
        );
        Self::from_parts(reader, stream, config)
    }

    /// Start a connection over separate read and write halves.
    ///
    /// Reads on `reader` should time out periodically; the monitor only
    /// notices shutdown between reads.
    pub fn from_parts<R, W>(reader: R, writer: W, config: LinkConfig) -> Result<Self>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let frame_config = FrameConfig {
            max_body_size: config.max_body_size,
            read_timeout: Some(config.poll_interval),
        };
        let correlator = Arc::new(Correlator::new(config.stale_response_ttl));
        let telemetry = Arc::new(FanoutQueue::new(
            config.telemetry_capacity,
            config.overflow_policy,
        )?);
        let monitor = LinkMonitor::spawn(
            FrameReader::with_config(reader, frame_config),
            Arc::clone(&correlator),
            Arc::clone(&telemetry),
        )?;

        Ok(Self {
            writer: Mutex::new(FrameWriter::new(Box::new(writer) as BoxWriter)),
            ids: IdAllocator::new(),
            correlator,
            telemetry,
            monitor,
            config,
        })
    }

    /// Encode and write a frame. No response is awaited.
    pub fn send(&self, frame: impl Into<Frame>) -> Result<()> {
        if !self.state().is_running() {
            return Err(LinkError::LinkDown);
        }
        let frame = frame.into();
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_frame(&frame)?;
        Ok(())
    }

    /// Send a request built around a fresh id and wait for its response
    /// for the configured response timeout.
    pub fn send_for_response<F>(&self, build: F) -> Result<Frame>
    where
        F: FnOnce(u8) -> Frame,
    {
        self.send_for_response_within(build, self.config.response_timeout)
    }

    /// Like [`send_for_response`](Self::send_for_response) with an explicit
    /// timeout. The timeout is local: the request is not cancelled on the
    /// wire, and a late response is swept later.
    pub fn send_for_response_within<F>(&self, build: F, timeout: Duration) -> Result<Frame>
    where
        F: FnOnce(u8) -> Frame,
    {
        let id = self.ids.next_id();
        let frame = build(id);
        if frame.id() != Some(id) {
            return Err(
                FrameError::InvalidFrame("request frame must carry the allocated id").into(),
            );
        }

        self.correlator.discard(id);
        self.send(frame)?;
        self.correlator.await_response(id, Some(timeout))
    }

    /// Read a register of the local radio.
    pub fn get_parameter(&self, command: Command) -> Result<Parameter> {
        self.execute_local(command, Parameter::empty())
    }

    /// Write a register of the local radio.
    pub fn set_parameter(&self, command: Command, parameter: impl Into<Parameter>) -> Result<()> {
        self.execute_local(command, parameter.into()).map(drop)
    }

    /// Apply queued parameter changes on the local radio.
    pub fn apply_changes(&self) -> Result<()> {
        self.execute_local(Command::APPLY_CHANGES, Parameter::empty())
            .map(drop)
    }

    /// Read a register of a remote module.
    pub fn get_remote_parameter(&self, module: &Module, command: Command) -> Result<Parameter> {
        self.execute_remote(module, command, Parameter::empty(), RemoteOptions::NONE)
    }

    /// Write a register of a remote module and apply it immediately.
    pub fn set_remote_parameter(
        &self,
        module: &Module,
        command: Command,
        parameter: impl Into<Parameter>,
    ) -> Result<()> {
        self.set_remote_parameter_with_options(
            module,
            command,
            parameter,
            RemoteOptions::APPLY_CHANGES,
        )
    }

    /// Write a register of a remote module with explicit options.
    pub fn set_remote_parameter_with_options(
        &self,
        module: &Module,
        command: Command,
        parameter: impl Into<Parameter>,
        options: RemoteOptions,
    ) -> Result<()> {
        self.execute_remote(module, command, parameter.into(), options)
            .map(drop)
    }

    /// Run a parameterless command on a remote module, e.g. `AC` or `WR`.
    pub fn send_remote_command(
        &self,
        module: &Module,
        command: Command,
        options: RemoteOptions,
    ) -> Result<()> {
        self.execute_remote(module, command, Parameter::empty(), options)
            .map(drop)
    }

    /// Receive every IO sample from the next dispatch on.
    pub fn subscribe<F>(&self, subscriber: F) -> SubscriptionId
    where
        F: Fn(&IoSampleFrame) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.telemetry.subscribe(subscriber)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.telemetry.unsubscribe(id)
    }

    pub fn state(&self) -> LinkState {
        self.monitor.state()
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Ask the background threads to stop without waiting for them.
    pub fn shutdown(&self) {
        self.monitor.shutdown();
    }

    /// Stop the background threads and wait for them to exit.
    ///
    /// May be called from a telemetry subscriber; the dispatcher is then
    /// left to exit on its own once the subscriber returns.
    pub fn close(&self) {
        self.monitor.shutdown();
        self.telemetry.close();
        self.monitor.join();
        self.telemetry.join();
        tracing::debug!(state = %self.state(), "link connection closed");
    }

    fn execute_local(&self, command: Command, parameter: Parameter) -> Result<Parameter> {
        let response = self.send_for_response(|id| {
            CommandFrame::new(id, command)
                .with_parameter(parameter)
                .into()
        })?;

        match response {
            Frame::CommandResponse(mut reply) => {
                check_reply(command, reply.command, reply.status)?;
                Ok(reply.take_parameter())
            }
            other => Err(unexpected("COMMAND_RESPONSE", &other)),
        }
    }

    fn execute_remote(
        &self,
        module: &Module,
        command: Command,
        parameter: Parameter,
        options: RemoteOptions,
    ) -> Result<Parameter> {
        let response = self.send_for_response(|id| {
            RemoteCommandFrame::to_module(id, module, command)
                .with_options(options)
                .with_parameter(parameter)
                .into()
        })?;

        match response {
            Frame::RemoteCommandResponse(mut reply) => {
                if reply.address64 != module.address64 && !module.address64.is_broadcast() {
                    tracing::debug!(
                        expected = %module.address64,
                        actual = %reply.address64,
                        "remote response from a different module"
                    );
                }
                check_reply(command, reply.command, reply.status)?;
                Ok(reply.take_parameter())
            }
            other => Err(unexpected("REMOTE_COMMAND_RESPONSE", &other)),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.monitor.shutdown();
    }
}

fn check_reply(sent: Command, answered: Command, status: CommandStatus) -> Result<()> {
    if answered != sent {
        return Err(LinkError::UnexpectedResponse(format!(
            "sent {sent}, response is for {answered}"
        )));
    }
    if !status.is_ok() {
        return Err(LinkError::DeviceStatus {
            command: sent,
            status,
        });
    }
    Ok(())
}

fn unexpected(expected: &str, actual: &Frame) -> LinkError {
    LinkError::UnexpectedResponse(format!("expected {expected}, got {}", actual.type_name()))
}
