// MIT License - Copyright (c) 2026 Peter Wright
// Synchronous command/response exchanges over a transport

use std::time::Duration;

use tracing::{debug, warn};

use crate::constants::error_message;
use crate::devices::{AreaStatus, ZoneStatus};
use crate::error::{PanelError, Result};
use crate::protocol::{decode_int, Command};
use crate::transport::Transport;

/// Runs commands against a transport and decodes the replies.
///
/// The session borrows the transport mutably for its lifetime, so nothing
/// else (in particular the line listener) can touch the line while a
/// command is in flight.
pub struct CommandSession<'a> {
    transport: &'a mut dyn Transport,
    default_timeout: Duration,
}

impl<'a> CommandSession<'a> {
    pub fn new(transport: &'a mut dyn Transport, default_timeout: Duration) -> Self {
        Self {
            transport,
            default_timeout,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    async fn ensure_connected(&mut self) -> Result<()> {
        if !self.transport.is_connected() {
            self.transport.connect().await?;
        }
        Ok(())
    }

    /// Send a command and return the cleaned reply payload.
    pub async fn query(&mut self, command: &Command, timeout: Option<Duration>) -> Result<String> {
        self.ensure_connected().await?;

        let wire = command.to_wire_string();
        let timeout = timeout.unwrap_or(self.default_timeout);
        let reply = self.transport.send(&wire, timeout).await?;
        debug!("{} -> {:?}", wire, reply);

        reply.into_payload(&wire).inspect_err(|e| {
            if matches!(e, PanelError::Timeout { .. }) {
                warn!("Command {} timed out after {:?}", wire, timeout);
            }
        })
    }

    /// Send a command whose reply carries no value.
    pub async fn send_command(&mut self, command: &Command) -> Result<()> {
        self.query(command, None).await.map(|_| ())
    }

    /// Query a command answering `NAME=<value>` and parse the value in `radix`.
    pub async fn query_int(
        &mut self,
        command: &Command,
        timeout: Option<Duration>,
        radix: u32,
    ) -> Result<i64> {
        let payload = self.query(command, timeout).await?;
        decode_int(&payload, radix)
    }

    pub async fn query_hex_int(&mut self, command: &Command, timeout: Option<Duration>) -> Result<i64> {
        self.query_int(command, timeout, 16).await
    }

    pub async fn query_zone_status(&mut self, zone: u32) -> Result<ZoneStatus> {
        let code = self
            .query_hex_int(&Command::RequestZoneStatus { zone }, None)
            .await?;
        ZoneStatus::from_code(wire_code(code, "ZoneStatus")?)
    }

    pub async fn query_area_status(&mut self, area: u32) -> Result<AreaStatus> {
        let code = self
            .query_hex_int(&Command::RequestAreaStatus { area }, None)
            .await?;
        AreaStatus::from_code(wire_code(code, "AreaStatus")?)
    }

    pub async fn power_state(&mut self) -> Result<i64> {
        self.query_int(&Command::PowerQuery, None, 10).await
    }

    pub async fn set_power_state(&mut self, state: i64) -> Result<()> {
        self.send_command(&Command::SetPowerState { state }).await
    }

    /// Module error code, read as hex.
    pub async fn error_code(&mut self) -> Result<i64> {
        self.query_hex_int(&Command::ErrorQuery, None).await
    }

    /// Module error code, read as decimal and mapped to a message.
    pub async fn error_string(&mut self) -> Result<String> {
        let code = self.query_int(&Command::ErrorQuery, None, 10).await?;
        Ok(error_message(code))
    }

    pub async fn reset_all(&mut self) -> Result<()> {
        self.send_command(&Command::ResetAll).await
    }

    /// Open or close a virtual input.
    pub async fn virtual_input(&mut self, input: u32, open: bool) -> Result<()> {
        let command = if open {
            Command::VirtualInputOpen { input }
        } else {
            Command::VirtualInputClosed { input }
        };
        self.send_command(&command).await
    }
}

fn wire_code(value: i64, kind: &'static str) -> Result<u32> {
    u32::try_from(value).map_err(|_| PanelError::MalformedResponse {
        details: format!("{} code {} out of range", kind, value),
    })
}
