// MIT License - Copyright (c) 2026 Peter Wright
// Canned PTR1 event stream for running without hardware

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::PtrType;
use crate::constants::{FRAME_TERMINATOR, SIMULATOR_LINES};
use crate::error::{PanelError, Result};
use crate::protocol::Reply;
use crate::transport::Transport;

/// Replays a fixed list of event lines, one per `delay`, wrapping around.
pub struct Simulator {
    delay: Duration,
    index: usize,
    next_due: Option<Instant>,
}

impl Simulator {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            index: 0,
            next_due: None,
        }
    }

    /// The next canned line, advancing the cursor.
    pub fn next_line(&mut self) -> &'static str {
        let line = SIMULATOR_LINES[self.index];
        self.index = (self.index + 1) % SIMULATOR_LINES.len();
        line
    }
}

#[async_trait]
impl Transport for Simulator {
    fn ptr_type(&self) -> PtrType {
        PtrType::Simulate
    }

    fn is_connected(&self) -> bool {
        self.next_due.is_some()
    }

    async fn connect(&mut self) -> Result<()> {
        if self.next_due.is_none() {
            info!("Simulator started, one line every {:?}", self.delay);
            self.next_due = Some(Instant::now() + self.delay);
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.next_due = None;
        Ok(())
    }

    async fn write(&mut self, _data: &[u8]) -> Result<()> {
        Err(PanelError::NotImplemented {
            operation: "write",
            transport: "SIMULATE",
        })
    }

    async fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        let due = self.next_due.ok_or(PanelError::Disconnected)?;
        if Instant::now() < due {
            return Ok(0);
        }

        let line = self.next_line();
        debug!("Simulator emitting: {}", line.trim_end());
        let before = buf.len();
        buf.extend_from_slice(line.as_bytes());
        buf.extend_from_slice(FRAME_TERMINATOR);
        self.next_due = Some(Instant::now() + self.delay);
        Ok(buf.len() - before)
    }

    async fn discard_input(&mut self) -> Result<()> {
        Ok(())
    }

    async fn send(&mut self, _data: &str, _timeout: Duration) -> Result<Reply> {
        Err(PanelError::NotImplemented {
            operation: "send",
            transport: "SIMULATE",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_line_wraps() {
        let mut sim = Simulator::new(Duration::from_secs(5));
        let lines: Vec<&str> = (0..12).map(|_| sim.next_line()).collect();
        assert_eq!(&lines[..10], &SIMULATOR_LINES[..]);
        assert_eq!(lines[10], SIMULATOR_LINES[0]);
        assert_eq!(lines[11], SIMULATOR_LINES[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_available_respects_delay() {
        let mut sim = Simulator::new(Duration::from_secs(5));
        let mut buf = Vec::new();
        assert!(matches!(
            sim.read_available(&mut buf).await,
            Err(PanelError::Disconnected)
        ));

        sim.connect().await.unwrap();
        assert_eq!(sim.read_available(&mut buf).await.unwrap(), 0);

        tokio::time::advance(Duration::from_secs(5)).await;
        let read = sim.read_available(&mut buf).await.unwrap();
        assert_eq!(read, SIMULATOR_LINES[0].len() + 2);
        assert!(buf.ends_with(b"\r\n"));
        assert_eq!(sim.read_available(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_send_not_implemented() {
        let mut sim = Simulator::new(Duration::from_secs(5));
        sim.connect().await.unwrap();
        assert!(matches!(
            sim.send("PWR?", Duration::from_secs(1)).await,
            Err(PanelError::NotImplemented { operation: "send", .. })
        ));
    }
}
