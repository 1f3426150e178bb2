// MIT License - Copyright (c) 2026 Peter Wright
// Events broadcast by device tasks

use crate::parser::ParsedEvent;

/// All events emitted by the device tasks.
///
/// Consumers subscribe via `DeviceRegistry::subscribe()` (or the sender
/// they handed to `spawn_device`) to receive a
/// `tokio::sync::broadcast::Receiver<PanelEvent>`.
#[derive(Debug, Clone)]
pub enum PanelEvent {
    /// Serial line opened
    Connected { device: String },
    /// Serial line closed, either on shutdown or after an I/O failure
    Disconnected { device: String },
    /// Raw event line as received, terminator stripped
    Frame { device: String, line: String },
    /// Event line classified by the parser
    Parsed { device: String, event: ParsedEvent },
}

impl PanelEvent {
    pub fn device(&self) -> &str {
        match self {
            PanelEvent::Connected { device }
            | PanelEvent::Disconnected { device }
            | PanelEvent::Frame { device, .. }
            | PanelEvent::Parsed { device, .. } => device,
        }
    }
}

/// Type alias for the broadcast sender.
pub type EventSender = tokio::sync::broadcast::Sender<PanelEvent>;

/// Type alias for the broadcast receiver.
pub type EventReceiver = tokio::sync::broadcast::Receiver<PanelEvent>;

/// Create a new event channel with the given capacity.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    tokio::sync::broadcast::channel(capacity)
}
