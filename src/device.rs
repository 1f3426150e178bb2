// MIT License - Copyright (c) 2026 Peter Wright
// Per-device task owning the transport, listener and command queue

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{DeviceConfig, PtrType};
use crate::dispatch::{self, CommandType, PolledValue};
use crate::error::{PanelError, Result};
use crate::event::{EventSender, PanelEvent};
use crate::framing::FrameAssembler;
use crate::parser::EventParser;
use crate::protocol::Command;
use crate::transport::command::CommandSession;
use crate::transport::{create_transport, Transport};

const REQUEST_QUEUE: usize = 32;

/// Whether the device's line is currently open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Requests handled by the device task between listener polls.
#[derive(Debug)]
enum Request {
    Query {
        command: Command,
        timeout: Option<Duration>,
        reply: oneshot::Sender<Result<String>>,
    },
    Poll {
        command_type: CommandType,
        reply: oneshot::Sender<Result<PolledValue>>,
    },
}

/// Cloneable request side of a device task.
///
/// All commands go through the task, so callers never touch the transport
/// directly and command bytes cannot interleave with listener reads.
#[derive(Debug, Clone)]
pub struct DeviceClient {
    id: String,
    tx: mpsc::Sender<Request>,
}

impl DeviceClient {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Send a command and return the cleaned reply payload.
    pub async fn query(&self, command: Command, timeout: Option<Duration>) -> Result<String> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Request::Query {
                command,
                timeout,
                reply: reply_tx,
            })
            .await
            .map_err(|_| PanelError::Disconnected)?;
        reply_rx.await.map_err(|_| PanelError::ChannelClosed)?
    }

    /// Send a command whose reply carries no value.
    pub async fn send_command(&self, command: Command) -> Result<()> {
        self.query(command, None).await.map(|_| ())
    }

    /// Run the query behind a binding's command type.
    pub async fn poll(&self, command_type: CommandType) -> Result<PolledValue> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Request::Poll {
                command_type,
                reply: reply_tx,
            })
            .await
            .map_err(|_| PanelError::Disconnected)?;
        reply_rx.await.map_err(|_| PanelError::ChannelClosed)?
    }
}

/// Owner of a running device task.
pub struct DeviceHandle {
    config: DeviceConfig,
    client: DeviceClient,
    state: Arc<RwLock<ConnectionState>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl DeviceHandle {
    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn ptr_type(&self) -> PtrType {
        self.config.ptr_type
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// A request handle that outlives borrows of this one.
    pub fn client(&self) -> DeviceClient {
        self.client.clone()
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }

    /// Whether the task has stopped (cancelled or after a fatal line error).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn query(&self, command: Command, timeout: Option<Duration>) -> Result<String> {
        self.client.query(command, timeout).await
    }

    pub async fn send_command(&self, command: Command) -> Result<()> {
        self.client.send_command(command).await
    }

    pub async fn poll(&self, command_type: CommandType) -> Result<PolledValue> {
        self.client.poll(command_type).await
    }

    /// Stop the task and wait for it to release the transport.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!("Device {} task ended abnormally: {}", self.config.id, e);
        }
    }
}

/// Spawn a device task with the transport its config selects.
pub fn spawn_device(config: DeviceConfig, event_tx: EventSender) -> DeviceHandle {
    let transport = create_transport(&config);
    spawn_device_with(config, transport, event_tx)
}

/// Spawn a device task around an existing transport.
pub fn spawn_device_with(
    config: DeviceConfig,
    transport: Box<dyn Transport>,
    event_tx: EventSender,
) -> DeviceHandle {
    let (tx, rx) = mpsc::channel(REQUEST_QUEUE);
    let state = Arc::new(RwLock::new(ConnectionState::Disconnected));
    let cancel = CancellationToken::new();

    let worker = DeviceWorker {
        id: config.id.clone(),
        command_timeout: config.command_timeout(),
        transport,
        state: state.clone(),
        event_tx,
        assembler: FrameAssembler::new(),
        parser: EventParser::new(),
    };
    let task = tokio::spawn(worker.run(rx, cancel.clone()));

    let client = DeviceClient {
        id: config.id.clone(),
        tx,
    };
    DeviceHandle {
        config,
        client,
        state,
        cancel,
        task,
    }
}

struct DeviceWorker {
    id: String,
    command_timeout: Duration,
    transport: Box<dyn Transport>,
    state: Arc<RwLock<ConnectionState>>,
    event_tx: EventSender,
    assembler: FrameAssembler,
    parser: EventParser,
}

impl DeviceWorker {
    /// Main loop: cancellation first, then queued requests, then one
    /// listener step.
    async fn run(mut self, mut rx: mpsc::Receiver<Request>, cancel: CancellationToken) {
        info!("Device {} ({}) started", self.id, self.transport.ptr_type());

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("Device {} cancelled", self.id);
                    break;
                }

                req = rx.recv() => match req {
                    Some(req) => self.handle_request(req).await,
                    None => {
                        debug!("Device {} request channel closed", self.id);
                        break;
                    }
                },

                step = self.listen_step() => {
                    if let Err(e) = step {
                        error!("Device {} listener stopped: {}", self.id, e);
                        break;
                    }
                }
            }
        }

        self.close().await;
        info!("Device {} stopped", self.id);
    }

    async fn ensure_connected(&mut self) -> Result<()> {
        if self.transport.is_connected() {
            return Ok(());
        }
        self.transport.connect().await?;
        *self.state.write().await = ConnectionState::Connected;
        let _ = self.event_tx.send(PanelEvent::Connected {
            device: self.id.clone(),
        });
        Ok(())
    }

    async fn close(&mut self) {
        if let Err(e) = self.transport.disconnect().await {
            warn!("Device {} disconnect failed: {}", self.id, e);
        }
        let was_connected = {
            let mut state = self.state.write().await;
            std::mem::replace(&mut *state, ConnectionState::Disconnected)
                == ConnectionState::Connected
        };
        if was_connected {
            let _ = self.event_tx.send(PanelEvent::Disconnected {
                device: self.id.clone(),
            });
        }
    }

    /// One listener poll. Only connection-level failures are returned; the
    /// rest are logged here and the line is dropped.
    async fn listen_step(&mut self) -> Result<()> {
        self.ensure_connected().await?;

        match self.assembler.poll_step(self.transport.as_mut()).await {
            Ok(Some(line)) => self.handle_line(line),
            Ok(None) => {}
            Err(e) if e.is_connection_level() => return Err(e),
            Err(e) => warn!("Device {} read error: {}", self.id, e),
        }
        Ok(())
    }

    /// Move unread input into the assembler and emit the complete lines, so
    /// the command's input purge only drops bytes nobody was waiting for.
    async fn drain_events(&mut self) -> Result<()> {
        let mut pending = Vec::new();
        while self.transport.read_available(&mut pending).await? > 0 {}
        if !pending.is_empty() {
            self.assembler.push(&pending);
        }
        while let Some(line) = self.assembler.take_frame() {
            self.handle_line(line);
        }
        Ok(())
    }

    fn handle_line(&mut self, line: String) {
        debug!("Device {} line: {}", self.id, line.trim_end());
        let _ = self.event_tx.send(PanelEvent::Frame {
            device: self.id.clone(),
            line: line.clone(),
        });

        match self.parser.parse(&line) {
            Ok(Some(event)) => {
                let _ = self.event_tx.send(PanelEvent::Parsed {
                    device: self.id.clone(),
                    event,
                });
            }
            Ok(None) => debug!("Device {} ignoring unrecognised line", self.id),
            Err(e @ PanelError::UnknownAction { .. }) => {
                warn!("Device {} dropping line: {}", self.id, e)
            }
            Err(e) => warn!("Device {} cannot parse line: {}", self.id, e),
        }
    }

    async fn handle_request(&mut self, req: Request) {
        match req {
            Request::Query {
                command,
                timeout,
                reply,
            } => {
                let result = self.query(&command, timeout).await;
                let _ = reply.send(result);
            }
            Request::Poll {
                command_type,
                reply,
            } => {
                let result = self.poll(command_type).await;
                let _ = reply.send(result);
            }
        }
    }

    async fn query(&mut self, command: &Command, timeout: Option<Duration>) -> Result<String> {
        self.ensure_connected().await?;
        let drained = self.drain_events().await;
        self.after_command(drained).await?;
        let mut session = CommandSession::new(self.transport.as_mut(), self.command_timeout);
        let result = session.query(command, timeout).await;
        self.after_command(result).await
    }

    async fn poll(&mut self, command_type: CommandType) -> Result<PolledValue> {
        self.ensure_connected().await?;
        let drained = self.drain_events().await;
        self.after_command(drained).await?;
        let mut session = CommandSession::new(self.transport.as_mut(), self.command_timeout);
        let result = dispatch::poll(&mut session, command_type).await;
        self.after_command(result).await
    }

    /// Close the line after a connection-level command failure so the next
    /// use reopens it.
    async fn after_command<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result
            && e.is_connection_level()
        {
            warn!("Device {} command failed, closing line: {}", self.id, e);
            self.close().await;
        }
        result
    }
}
