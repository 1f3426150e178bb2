// MIT License - Copyright (c) 2026 Peter Wright
// Reassembles CR+LF terminated event lines from a polled byte stream

use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::constants::{FRAME_TERMINATOR, MAX_FRAME_BUFFER};
use crate::error::Result;
use crate::transport::Transport;

/// Accumulates reads of any size and yields one line per terminator.
///
/// Bytes after the first terminator stay buffered for the next call, so
/// two lines arriving in a single read come out as two frames.
#[derive(Debug)]
pub struct FrameAssembler {
    buffer: Vec<u8>,
    max_len: usize,
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::with_capacity(MAX_FRAME_BUFFER)
    }

    /// Assembler that resets once `max_len` bytes pile up without a terminator.
    pub fn with_capacity(max_len: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(1024),
            max_len,
        }
    }

    /// Bytes received but not yet returned as a frame.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Append raw bytes, discarding the buffer if it overflows.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
        self.check_overflow();
    }

    fn check_overflow(&mut self) {
        if self.buffer.len() > self.max_len && find_terminator(&self.buffer).is_none() {
            warn!(
                len = self.buffer.len(),
                "frame buffer overflow without terminator, resetting"
            );
            self.buffer.clear();
        }
    }

    /// Split off the first complete frame, without its terminator.
    pub fn take_frame(&mut self) -> Option<String> {
        let pos = find_terminator(&self.buffer)?;
        let frame = String::from_utf8_lossy(&self.buffer[..pos]).into_owned();
        self.buffer.drain(..pos + FRAME_TERMINATOR.len());
        Some(frame)
    }

    /// Read once from the transport and return a frame if one is complete.
    ///
    /// When the line is idle this waits one poll interval before returning
    /// `None`, so callers can loop on it without spinning.
    pub async fn poll_step(&mut self, transport: &mut dyn Transport) -> Result<Option<String>> {
        if let Some(frame) = self.take_frame() {
            return Ok(Some(frame));
        }

        let mut chunk = Vec::new();
        let read = transport.read_available(&mut chunk).await?;
        if read == 0 {
            tokio::time::sleep(transport.poll_interval()).await;
            return Ok(None);
        }

        trace!("Read {} bytes", read);
        self.push(&chunk);
        Ok(self.take_frame())
    }

    /// Block until a full frame arrives or `cancel` fires.
    ///
    /// Cancellation is a clean stop and yields `Ok(None)`.
    pub async fn next_frame(
        &mut self,
        transport: &mut dyn Transport,
        cancel: &CancellationToken,
    ) -> Result<Option<String>> {
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => return Ok(None),

                frame = self.poll_step(transport) => {
                    if let Some(frame) = frame? {
                        return Ok(Some(frame));
                    }
                }
            }
        }
    }
}

fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(FRAME_TERMINATOR.len())
        .position(|w| w == FRAME_TERMINATOR)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::config::PtrType;
    use crate::constants::SIMULATOR_LINES;

    /// Hands out one queued chunk per read.
    struct Chunked {
        chunks: VecDeque<Vec<u8>>,
    }

    #[async_trait]
    impl Transport for Chunked {
        fn ptr_type(&self) -> PtrType {
            PtrType::Ptr1
        }

        fn is_connected(&self) -> bool {
            true
        }

        fn poll_interval(&self) -> Duration {
            Duration::from_millis(10)
        }

        async fn connect(&mut self) -> Result<()> {
            Ok(())
        }

        async fn disconnect(&mut self) -> Result<()> {
            Ok(())
        }

        async fn write(&mut self, _data: &[u8]) -> Result<()> {
            Ok(())
        }

        async fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
            match self.chunks.pop_front() {
                Some(chunk) => {
                    buf.extend_from_slice(&chunk);
                    Ok(chunk.len())
                }
                None => Ok(0),
            }
        }
    }

    #[test]
    fn test_split_at_first_terminator() {
        let mut assembler = FrameAssembler::new();
        assembler.push(b"first\r\nsecond\r\nthi");
        assert_eq!(assembler.take_frame().as_deref(), Some("first"));
        assert_eq!(assembler.take_frame().as_deref(), Some("second"));
        assert_eq!(assembler.take_frame(), None);
        assert_eq!(assembler.pending(), b"thi");
        assembler.push(b"rd\r\n");
        assert_eq!(assembler.take_frame().as_deref(), Some("third"));
    }

    #[test]
    fn test_lone_cr_is_not_a_terminator() {
        let mut assembler = FrameAssembler::new();
        assembler.push(b"a\rb\r");
        assert_eq!(assembler.take_frame(), None);
        assembler.push(b"\n");
        assert_eq!(assembler.take_frame().as_deref(), Some("a\rb"));
    }

    #[test]
    fn test_overflow_resets_buffer() {
        let mut assembler = FrameAssembler::with_capacity(16);
        assembler.push(&[b'x'; 17]);
        assert!(assembler.pending().is_empty());
        assembler.push(b"ok\r\n");
        assert_eq!(assembler.take_frame().as_deref(), Some("ok"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunked_line_yields_one_frame() {
        let line = SIMULATOR_LINES[0];
        let wire = format!("{}\r\n", line).into_bytes();
        let chunks = wire.chunks(7).map(|c| c.to_vec()).collect();
        let mut transport = Chunked { chunks };
        let mut assembler = FrameAssembler::new();
        let cancel = CancellationToken::new();

        let frame = assembler.next_frame(&mut transport, &cancel).await.unwrap();
        assert_eq!(frame.as_deref(), Some(line));
        assert!(assembler.pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_returns_none() {
        let mut transport = Chunked {
            chunks: VecDeque::new(),
        };
        let mut assembler = FrameAssembler::new();
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            canceller.cancel();
        });

        let frame = assembler.next_frame(&mut transport, &cancel).await.unwrap();
        assert_eq!(frame, None);
    }
}
