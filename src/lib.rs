// MIT License - Copyright (c) 2026 Peter Wright
// Paradox PTR1/PTR3 printer-port driver
//
//! # paradox-ptr
//!
//! Serial-line driver for Paradox alarm panels fitted with a PTR1
//! (event printing only) or PTR3 (event printing plus commands)
//! printer-port module.
//!
//! Each configured device runs in its own task that owns the serial line.
//! The task reassembles the panel's CR+LF terminated event lines, parses
//! them into [`ParsedEvent`]s and broadcasts them, and in between runs any
//! queued commands so command replies never mix with event lines.
//!
//! ## Quick Start
//!
//! ```no_run
//! use paradox_ptr::{Command, DeviceConfig, DeviceRegistry, PanelEvent, PtrType};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = DeviceConfig::builder()
//!         .id("alarm")
//!         .ptr_type(PtrType::Ptr3)
//!         .serial_port("/dev/ttyUSB0")
//!         .build();
//!
//!     let mut registry = DeviceRegistry::new();
//!     let mut events = registry.subscribe();
//!     registry.add(config).await;
//!
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             if let PanelEvent::Parsed { device, event } = event {
//!                 println!("{}: {:?}", device, event.values());
//!             }
//!         }
//!     });
//!
//!     let status = registry
//!         .get("alarm")?
//!         .query(Command::RequestZoneStatus { zone: 3 }, None)
//!         .await?;
//!     println!("Zone 3: {}", status);
//!
//!     tokio::signal::ctrl_c().await?;
//!     registry.shutdown_all().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod constants;
pub mod device;
pub mod devices;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod framing;
pub mod parser;
pub mod protocol;
pub mod registry;
pub mod transport;

// Re-exports for convenience
pub use config::{DeviceConfig, DeviceConfigBuilder, PtrType};
pub use device::{spawn_device, spawn_device_with, ConnectionState, DeviceClient, DeviceHandle};
pub use devices::{AreaStatus, ZoneStatus};
pub use dispatch::{
    Binding, CommandType, Dispatcher, EvalexprEvaluator, ExpressionEvaluator, PolledValue,
    RefreshTracker, Transformation, TransformationRegistry, TransformationService, Update,
};
pub use error::{PanelError, ReplyToken, Result};
pub use event::{event_channel, EventReceiver, EventSender, PanelEvent};
pub use framing::FrameAssembler;
pub use parser::{ActionType, EventParser, ParsedEvent, Subject};
pub use protocol::{ArmMode, Command, Reply};
pub use registry::DeviceRegistry;
pub use transport::command::CommandSession;
pub use transport::{create_transport, InteractiveSerial, PassiveSerial, Simulator, Transport};
