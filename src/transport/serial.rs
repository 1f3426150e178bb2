// MIT License - Copyright (c) 2026 Peter Wright
// Serial-line transports for PTR1 (listen only) and PTR3 (interactive)

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialStream, StopBits};
use tracing::{debug, info, warn};

use crate::config::PtrType;
use crate::constants::BAUD_RATE;
use crate::error::{PanelError, Result};
use crate::protocol::Reply;
use crate::transport::Transport;

/// An open (or openable) serial port shared by both serial variants.
struct SerialLine {
    port_name: String,
    port: Option<SerialStream>,
}

impl SerialLine {
    fn new(port_name: &str) -> Self {
        Self {
            port_name: port_name.to_string(),
            port: None,
        }
    }

    fn connection_error(&self, reason: impl ToString) -> PanelError {
        PanelError::Connection {
            port: self.port_name.clone(),
            reason: reason.to_string(),
        }
    }

    fn open(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Ok(());
        }

        let builder = tokio_serial::new(&self.port_name, BAUD_RATE)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None);

        let port = SerialStream::open(&builder).map_err(|e| self.connection_error(e))?;
        info!("Opened serial port {} at {} baud", self.port_name, BAUD_RATE);
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            info!("Closed serial port {}", self.port_name);
        }
    }

    fn port_mut(&mut self) -> Result<&mut SerialStream> {
        self.port.as_mut().ok_or(PanelError::Disconnected)
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let port_name = self.port_name.clone();
        let port = self.port_mut()?;
        port.write_all(data).await.map_err(|e| PanelError::Connection {
            port: port_name.clone(),
            reason: format!("write failed: {}", e),
        })?;
        port.flush().await.map_err(|e| PanelError::Connection {
            port: port_name,
            reason: format!("flush failed: {}", e),
        })
    }

    async fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        let port_name = self.port_name.clone();
        let port = self.port_mut()?;
        let available = port.bytes_to_read().map_err(|e| PanelError::Connection {
            port: port_name.clone(),
            reason: e.to_string(),
        })? as usize;
        if available == 0 {
            return Ok(0);
        }

        let mut chunk = vec![0u8; available];
        let read = port.read(&mut chunk).await.map_err(|e| PanelError::Connection {
            port: port_name,
            reason: format!("read failed: {}", e),
        })?;
        buf.extend_from_slice(&chunk[..read]);
        Ok(read)
    }

    fn discard_input(&mut self) -> Result<()> {
        let port_name = self.port_name.clone();
        let port = self.port_mut()?;
        port.clear(ClearBuffer::Input).map_err(|e| PanelError::Connection {
            port: port_name,
            reason: e.to_string(),
        })
    }
}

/// PTR3 transport: unsolicited event lines plus synchronous commands.
pub struct InteractiveSerial {
    line: SerialLine,
    poll_interval: Duration,
}

impl InteractiveSerial {
    pub fn new(port_name: &str, poll_interval: Duration) -> Self {
        Self {
            line: SerialLine::new(port_name),
            poll_interval,
        }
    }
}

#[async_trait]
impl Transport for InteractiveSerial {
    fn ptr_type(&self) -> PtrType {
        PtrType::Ptr3
    }

    fn is_connected(&self) -> bool {
        self.line.port.is_some()
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    async fn connect(&mut self) -> Result<()> {
        self.line.open()
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.line.close();
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.line.write(data).await
    }

    async fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        self.line.read_available(buf).await
    }

    async fn discard_input(&mut self) -> Result<()> {
        let mut scratch = Vec::new();
        let dropped = self.line.read_available(&mut scratch).await?;
        if dropped > 0 {
            debug!("Discarded {} stale bytes before command", dropped);
        }
        self.line.discard_input()
    }
}

/// PTR1 transport: the module only prints event lines, it accepts no input.
pub struct PassiveSerial {
    line: SerialLine,
    poll_interval: Duration,
}

impl PassiveSerial {
    pub fn new(port_name: &str, poll_interval: Duration) -> Self {
        Self {
            line: SerialLine::new(port_name),
            poll_interval,
        }
    }
}

#[async_trait]
impl Transport for PassiveSerial {
    fn ptr_type(&self) -> PtrType {
        PtrType::Ptr1
    }

    fn is_connected(&self) -> bool {
        self.line.port.is_some()
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    async fn connect(&mut self) -> Result<()> {
        self.line.open()
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.line.close();
        Ok(())
    }

    async fn write(&mut self, _data: &[u8]) -> Result<()> {
        Err(PanelError::NotImplemented {
            operation: "write",
            transport: "PTR1",
        })
    }

    async fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        self.line.read_available(buf).await
    }

    async fn send(&mut self, data: &str, _timeout: Duration) -> Result<Reply> {
        warn!("PTR1 interface cannot send '{}'", data);
        Err(PanelError::NotImplemented {
            operation: "send",
            transport: "PTR1",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unopened_port_reports_disconnected() {
        let mut transport = InteractiveSerial::new("/dev/does-not-exist", Duration::from_millis(10));
        assert!(!transport.is_connected());
        let mut buf = Vec::new();
        assert!(matches!(
            transport.read_available(&mut buf).await,
            Err(PanelError::Disconnected)
        ));
        // disconnect is idempotent
        transport.disconnect().await.unwrap();
        transport.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_port_fails_with_connection_error() {
        let mut transport = PassiveSerial::new("/dev/does-not-exist", Duration::from_millis(10));
        match transport.connect().await {
            Err(PanelError::Connection { port, .. }) => assert_eq!(port, "/dev/does-not-exist"),
            other => panic!("expected connection error, got {:?}", other.map(|_| ())),
        }
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_passive_send_not_implemented() {
        let mut transport = PassiveSerial::new("/dev/ttyS0", Duration::from_millis(10));
        let result = transport.send("RZ001", Duration::from_secs(1)).await;
        assert!(matches!(
            result,
            Err(PanelError::NotImplemented { operation: "send", transport: "PTR1" })
        ));
    }
}
