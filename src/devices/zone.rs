// MIT License - Copyright (c) 2026 Peter Wright
// Zone status codes reported by RZ queries and zone events

use std::fmt;

use crate::error::{PanelError, Result};

/// Symbolic zone status.
///
/// The PTR3 module answers `RZnnn` with a single status byte in hex. Each
/// recognised byte maps to exactly one variant; anything else is a decode
/// error rather than being folded into a catch-all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZoneStatus {
    /// 0x00 - Zone closed
    Close,
    /// 0x01 - Zone open
    Open,
    /// 0x80 - Zone in alarm
    Alarm,
    /// 0x40 - Vendor-defined (tamper on most panels)
    Other1,
    /// 0x20 - Vendor-defined (trouble on most panels)
    Other2,
    /// 0xFF - Module reported an error for the zone
    Error,
}

const ZONE_STATUS_TABLE: [(u8, ZoneStatus, &str); 6] = [
    (0x00, ZoneStatus::Close, "CLOSE"),
    (0x01, ZoneStatus::Open, "OPEN"),
    (0x80, ZoneStatus::Alarm, "ALARM"),
    (0x40, ZoneStatus::Other1, "OTHER1"),
    (0x20, ZoneStatus::Other2, "OTHER2"),
    (0xFF, ZoneStatus::Error, "ERROR"),
];

impl ZoneStatus {
    /// Decode a wire code.
    pub fn from_code(code: u32) -> Result<Self> {
        ZONE_STATUS_TABLE
            .iter()
            .find(|(c, _, _)| u32::from(*c) == code)
            .map(|(_, status, _)| *status)
            .ok_or(PanelError::Decode {
                kind: "ZoneStatus",
                code,
            })
    }

    pub fn code(&self) -> u8 {
        ZONE_STATUS_TABLE
            .iter()
            .find(|(_, status, _)| status == self)
            .map_or(0xFF, |(c, _, _)| *c)
    }

    pub fn symbol(&self) -> &'static str {
        ZONE_STATUS_TABLE
            .iter()
            .find(|(_, status, _)| status == self)
            .map_or("ERROR", |(_, _, s)| *s)
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    pub fn is_alarm(&self) -> bool {
        matches!(self, Self::Alarm)
    }
}

impl fmt::Display for ZoneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_status_codes() {
        assert_eq!(ZoneStatus::from_code(0x00).unwrap(), ZoneStatus::Close);
        assert_eq!(ZoneStatus::from_code(0x01).unwrap(), ZoneStatus::Open);
        assert_eq!(ZoneStatus::from_code(0x80).unwrap(), ZoneStatus::Alarm);
        assert_eq!(ZoneStatus::from_code(0x40).unwrap(), ZoneStatus::Other1);
        assert_eq!(ZoneStatus::from_code(0x20).unwrap(), ZoneStatus::Other2);
        assert_eq!(ZoneStatus::from_code(0xFF).unwrap(), ZoneStatus::Error);
    }

    #[test]
    fn test_zone_status_unknown_code() {
        for code in [0x02, 0x10, 0x81, 0xFE, 0x100] {
            match ZoneStatus::from_code(code) {
                Err(PanelError::Decode { kind, code: c }) => {
                    assert_eq!(kind, "ZoneStatus");
                    assert_eq!(c, code);
                }
                other => panic!("expected decode error, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_zone_status_code_roundtrip() {
        for (code, status, symbol) in ZONE_STATUS_TABLE {
            assert_eq!(status.code(), code);
            assert_eq!(status.to_string(), symbol);
        }
        assert!(ZoneStatus::Open.is_open());
        assert!(ZoneStatus::Alarm.is_alarm());
        assert!(!ZoneStatus::Close.is_open());
    }
}
