// MIT License - Copyright (c) 2026 Peter Wright
// Owned map of device ids to running device tasks

use std::collections::HashMap;

use tracing::info;

use crate::config::DeviceConfig;
use crate::device::{spawn_device, DeviceClient, DeviceHandle};
use crate::error::{PanelError, Result};
use crate::event::{event_channel, EventReceiver, EventSender};

/// Devices managed by one process. All of them publish on a shared event
/// channel.
pub struct DeviceRegistry {
    devices: HashMap<String, DeviceHandle>,
    event_tx: EventSender,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        let (event_tx, _event_rx) = event_channel(256);
        Self {
            devices: HashMap::new(),
            event_tx,
        }
    }

    /// Subscribe to events from every device in the registry.
    pub fn subscribe(&self) -> EventReceiver {
        self.event_tx.subscribe()
    }

    /// Spawn a device from its config. An existing device with the same id
    /// is shut down first.
    pub async fn add(&mut self, config: DeviceConfig) -> &DeviceHandle {
        let handle = spawn_device(config, self.event_tx.clone());
        self.insert(handle).await
    }

    /// Register an already spawned device.
    pub async fn insert(&mut self, handle: DeviceHandle) -> &DeviceHandle {
        let id = handle.id().to_string();
        if let Some(old) = self.devices.remove(&id) {
            info!("Replacing device {}", id);
            old.shutdown().await;
        }
        self.devices.entry(id).or_insert(handle)
    }

    pub fn get(&self, id: &str) -> Result<&DeviceHandle> {
        self.devices
            .get(id)
            .ok_or_else(|| PanelError::UnknownDevice { id: id.to_string() })
    }

    /// Request handle for a device, usable after the registry is released.
    pub fn client(&self, id: &str) -> Result<DeviceClient> {
        self.get(id).map(DeviceHandle::client)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Restart a device whose task stopped, e.g. after the line failed.
    pub async fn reconnect(&mut self, id: &str) -> Result<&DeviceHandle> {
        let config = self.get(id)?.config().clone();
        info!("Restarting device {}", id);
        Ok(self.add(config).await)
    }

    /// Stop and remove one device.
    pub async fn remove(&mut self, id: &str) -> Result<()> {
        let handle = self
            .devices
            .remove(id)
            .ok_or_else(|| PanelError::UnknownDevice { id: id.to_string() })?;
        handle.shutdown().await;
        Ok(())
    }

    /// Stop every device and wait for their transports to close.
    pub async fn shutdown_all(&mut self) {
        for (id, handle) in self.devices.drain() {
            info!("Shutting down device {}", id);
            handle.shutdown().await;
        }
    }
}
