// MIT License - Copyright (c) 2026 Peter Wright
// Area (partition) status codes reported by RA queries

use std::fmt;

use crate::error::{PanelError, Result};

/// Symbolic area status as returned by `RAnnn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AreaStatus {
    /// 0x00 - Normal
    Normal,
    /// 0x01 - Eco
    Eco,
    /// 0xFF - Module reported an error for the area
    Error,
}

const AREA_STATUS_TABLE: [(u8, AreaStatus, &str); 3] = [
    (0x00, AreaStatus::Normal, "NORMAL"),
    (0x01, AreaStatus::Eco, "ECO"),
    (0xFF, AreaStatus::Error, "ERROR"),
];

impl AreaStatus {
    /// Decode a wire code.
    pub fn from_code(code: u32) -> Result<Self> {
        AREA_STATUS_TABLE
            .iter()
            .find(|(c, _, _)| u32::from(*c) == code)
            .map(|(_, status, _)| *status)
            .ok_or(PanelError::Decode {
                kind: "AreaStatus",
                code,
            })
    }

    pub fn code(&self) -> u8 {
        match self {
            Self::Normal => 0x00,
            Self::Eco => 0x01,
            Self::Error => 0xFF,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Eco => "ECO",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for AreaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_area_status_codes() {
        for (code, status, symbol) in AREA_STATUS_TABLE {
            assert_eq!(AreaStatus::from_code(u32::from(code)).unwrap(), status);
            assert_eq!(status.code(), code);
            assert_eq!(status.symbol(), symbol);
        }
    }

    #[test]
    fn test_area_status_unknown_code() {
        let err = AreaStatus::from_code(0x02).unwrap_err();
        assert!(matches!(err, PanelError::Decode { kind: "AreaStatus", code: 2 }));
    }
}
