// MIT License - Copyright (c) 2026 Peter Wright
// Device configuration

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{
    DEFAULT_COMMAND_TIMEOUT, DEFAULT_REFRESH_MS, DEFAULT_SIMULATOR_DELAY, POLL_INTERVAL,
};
use crate::error::PanelError;

/// Printer-port interface variant attached to the serial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PtrType {
    /// PTR1: read-only event reporting
    Ptr1,
    /// PTR3: event reporting plus bidirectional commands
    Ptr3,
    /// Canned event lines, no hardware
    Simulate,
}

impl PtrType {
    /// Whether the variant accepts synchronous commands.
    pub fn supports_commands(&self) -> bool {
        matches!(self, Self::Ptr3)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ptr1 => "PTR1",
            Self::Ptr3 => "PTR3",
            Self::Simulate => "SIMULATE",
        }
    }
}

impl fmt::Display for PtrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PtrType {
    type Err = PanelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PTR1" => Ok(Self::Ptr1),
            "PTR3" => Ok(Self::Ptr3),
            "SIMULATE" => Ok(Self::Simulate),
            other => Err(PanelError::Config {
                details: format!("unknown device type '{}', expected PTR1, PTR3 or SIMULATE", other),
            }),
        }
    }
}

/// Configuration for one panel endpoint.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Identifier used by bindings to address this device
    pub id: String,
    /// Interface variant (selects the transport)
    pub ptr_type: PtrType,
    /// Serial port name (e.g. `/dev/ttyUSB0`, `COM10`)
    pub serial_port: String,
    /// Host refresh granularity in milliseconds (default: 6000)
    pub refresh_ms: u64,
    /// Default timeout for command exchanges in milliseconds (default: 50000)
    pub command_timeout_ms: u64,
    /// Idle wait between line checks in milliseconds (default: 100)
    pub poll_interval_ms: u64,
    /// Simulator delay between canned lines in milliseconds (default: 5000)
    pub simulator_delay_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            id: "paradox".to_string(),
            ptr_type: PtrType::Simulate,
            serial_port: "/dev/ttyS0".to_string(),
            refresh_ms: DEFAULT_REFRESH_MS,
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT.as_millis() as u64,
            poll_interval_ms: POLL_INTERVAL.as_millis() as u64,
            simulator_delay_ms: DEFAULT_SIMULATOR_DELAY.as_millis() as u64,
        }
    }
}

impl DeviceConfig {
    /// Create a new config builder starting from defaults.
    pub fn builder() -> DeviceConfigBuilder {
        DeviceConfigBuilder::default()
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn simulator_delay(&self) -> Duration {
        Duration::from_millis(self.simulator_delay_ms)
    }
}

/// Builder for DeviceConfig.
#[derive(Debug, Clone, Default)]
pub struct DeviceConfigBuilder {
    config: DeviceConfig,
}

impl DeviceConfigBuilder {
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.config.id = id.into();
        self
    }

    pub fn ptr_type(mut self, ptr_type: PtrType) -> Self {
        self.config.ptr_type = ptr_type;
        self
    }

    pub fn serial_port(mut self, port: impl Into<String>) -> Self {
        self.config.serial_port = port.into();
        self
    }

    pub fn refresh_ms(mut self, ms: u64) -> Self {
        self.config.refresh_ms = ms;
        self
    }

    pub fn command_timeout_ms(mut self, ms: u64) -> Self {
        self.config.command_timeout_ms = ms;
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn simulator_delay_ms(mut self, ms: u64) -> Self {
        self.config.simulator_delay_ms = ms;
        self
    }

    pub fn build(self) -> DeviceConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ptr_type_from_str() {
        assert_eq!("PTR1".parse::<PtrType>().unwrap(), PtrType::Ptr1);
        assert_eq!("ptr3".parse::<PtrType>().unwrap(), PtrType::Ptr3);
        assert_eq!("simulate".parse::<PtrType>().unwrap(), PtrType::Simulate);
        assert!("PTR2".parse::<PtrType>().is_err());
    }

    #[test]
    fn test_ptr_type_commands() {
        assert!(PtrType::Ptr3.supports_commands());
        assert!(!PtrType::Ptr1.supports_commands());
        assert!(!PtrType::Simulate.supports_commands());
    }

    #[test]
    fn test_config_defaults() {
        let config = DeviceConfig::builder().build();
        assert_eq!(config.ptr_type, PtrType::Simulate);
        assert_eq!(config.refresh_ms, 6000);
        assert_eq!(config.command_timeout(), Duration::from_secs(50));
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.simulator_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_config_builder() {
        let config = DeviceConfig::builder()
            .id("homealarm")
            .ptr_type(PtrType::Ptr3)
            .serial_port("COM10")
            .refresh_ms(2000)
            .command_timeout_ms(5000)
            .build();

        assert_eq!(config.id, "homealarm");
        assert_eq!(config.ptr_type, PtrType::Ptr3);
        assert_eq!(config.serial_port, "COM10");
        assert_eq!(config.refresh_ms, 2000);
        assert_eq!(config.command_timeout(), Duration::from_secs(5));
    }
}
