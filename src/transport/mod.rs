// MIT License - Copyright (c) 2026 Peter Wright
// Byte-level transports for the printer-port interfaces

pub mod command;
pub mod serial;
pub mod simulator;

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use crate::config::{DeviceConfig, PtrType};
use crate::constants::{POLL_INTERVAL, REPLY_TERMINATOR};
use crate::protocol::Reply;
use crate::error::Result;

pub use serial::{InteractiveSerial, PassiveSerial};
pub use simulator::Simulator;

/// Connection to one printer-port interface.
///
/// A transport is owned by exactly one device task, so every method takes
/// `&mut self` and no internal locking is needed. Reads never block: they
/// hand back whatever is currently buffered by the line, and callers layer
/// their own waiting on top.
#[async_trait]
pub trait Transport: Send {
    /// Interface variant this transport speaks.
    fn ptr_type(&self) -> PtrType;

    /// Whether `connect` succeeded and `disconnect` has not been called since.
    fn is_connected(&self) -> bool;

    /// Wait between polls when no input is available.
    fn poll_interval(&self) -> Duration {
        POLL_INTERVAL
    }

    /// Open the line (9600 8N1, no flow control).
    async fn connect(&mut self) -> Result<()>;

    /// Release all handles. Calling it on a closed transport is a no-op.
    async fn disconnect(&mut self) -> Result<()>;

    /// Write raw bytes to the line.
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Append whatever bytes are currently available to `buf`.
    ///
    /// Returns the number of bytes appended; 0 means the line is idle.
    async fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize>;

    /// Drop any input left over from earlier traffic.
    async fn discard_input(&mut self) -> Result<()> {
        let mut scratch = Vec::new();
        while self.read_available(&mut scratch).await? > 0 {
            scratch.clear();
        }
        Ok(())
    }

    /// Send a command and collect the reply up to the `:` terminator.
    ///
    /// Leftover input is drained first so the reply cannot pick up stale
    /// bytes. Returns `Reply::Timeout` when the deadline passes without a
    /// terminator; the connection stays usable.
    async fn send(&mut self, data: &str, timeout: Duration) -> Result<Reply> {
        self.discard_input().await?;

        debug!("Sending: {}", data);
        self.write(data.as_bytes()).await?;

        let deadline = Instant::now() + timeout;
        let terminator = REPLY_TERMINATOR.as_bytes();
        let mut reply = Vec::new();

        loop {
            let read = self.read_available(&mut reply).await?;
            if read > 0 && reply.windows(terminator.len()).any(|w| w == terminator) {
                let raw = String::from_utf8_lossy(&reply);
                debug!("Received: {:?}", raw);
                return Ok(Reply::classify(&raw));
            }

            let now = Instant::now();
            if now >= deadline {
                debug!("No terminator for {} within {:?}", data, timeout);
                return Ok(Reply::Timeout);
            }
            if read == 0 {
                tokio::time::sleep(self.poll_interval().min(deadline - now)).await;
            }
        }
    }
}

/// Build the transport for a device's interface variant.
pub fn create_transport(config: &DeviceConfig) -> Box<dyn Transport> {
    match config.ptr_type {
        PtrType::Ptr1 => Box::new(PassiveSerial::new(&config.serial_port, config.poll_interval())),
        PtrType::Ptr3 => Box::new(InteractiveSerial::new(
            &config.serial_port,
            config.poll_interval(),
        )),
        PtrType::Simulate => Box::new(Simulator::new(config.simulator_delay())),
    }
}
