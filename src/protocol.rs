// MIT License - Copyright (c) 2026 Peter Wright
// PTR3 command strings and reply classification

use std::fmt;

use crate::constants::REPLY_NOISE;
use crate::error::{PanelError, ReplyToken, Result};

/// Arming mode accepted by the `AA` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArmMode {
    /// Regular (away) arm
    Away,
    /// Force arm
    Force,
    /// Stay arm
    Stay,
    /// Instant arm
    Instant,
}

impl ArmMode {
    pub fn as_char(&self) -> char {
        match self {
            Self::Away => 'A',
            Self::Force => 'F',
            Self::Stay => 'S',
            Self::Instant => 'I',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'A' => Some(Self::Away),
            'F' => Some(Self::Force),
            'S' => Some(Self::Stay),
            'I' => Some(Self::Instant),
            _ => None,
        }
    }
}

/// Commands understood by the PTR3 module.
///
/// Indices (zone, area, user, input) are rendered as three zero-padded
/// decimal digits, so the valid range is 0-999. Every command is sent as
/// plain ASCII and the module answers with free text ending in `:`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `RAnnn` - Request area status. Reply decoded as hex.
    RequestAreaStatus { area: u32 },
    /// `RZnnn` - Request zone status. Reply decoded as hex.
    RequestZoneStatus { zone: u32 },
    /// `VOnnn` - Open a virtual input.
    VirtualInputOpen { input: u32 },
    /// `VCnnn` - Close a virtual input.
    VirtualInputClosed { input: u32 },
    /// `PWR?` - Query power state (`PWR=<decimal>`).
    PowerQuery,
    /// `ERR?` - Query module error code (`ERR=<n>`).
    ErrorQuery,
    /// `POWER <n>` - Set power state.
    SetPowerState { state: i64 },
    /// `INITALL` - Reset the module.
    ResetAll,
    /// `ZLnnn` - Request zone label.
    ZoneLabel { zone: u32 },
    /// `ALnnn` - Request area label.
    AreaLabel { area: u32 },
    /// `ULnnn` - Request user label.
    UserLabel { user: u32 },
    /// `AAnnn<mode><code>` - Arm an area.
    AreaArm {
        area: u32,
        mode: ArmMode,
        code: String,
    },
    /// `ADnnn<code>` - Disarm an area.
    AreaDisarm { area: u32, code: String },
    /// `PEnnn` - Emergency panic.
    EmergencyPanic { area: u32 },
    /// `PMnnn` - Medical panic.
    MedicalPanic { area: u32 },
    /// `PFnnn` - Fire panic.
    FirePanic { area: u32 },
    /// `SRnnn` - Smoke detector reset.
    SmokeReset { area: u32 },
    /// Raw command string (for anything unlisted).
    Raw(String),
}

/// Two-letter prefixes of the indexed commands, paired with their builders.
const INDEXED_COMMANDS: [(&str, fn(u32) -> Command); 11] = [
    ("RA", |area| Command::RequestAreaStatus { area }),
    ("RZ", |zone| Command::RequestZoneStatus { zone }),
    ("VO", |input| Command::VirtualInputOpen { input }),
    ("VC", |input| Command::VirtualInputClosed { input }),
    ("ZL", |zone| Command::ZoneLabel { zone }),
    ("AL", |area| Command::AreaLabel { area }),
    ("UL", |user| Command::UserLabel { user }),
    ("PE", |area| Command::EmergencyPanic { area }),
    ("PM", |area| Command::MedicalPanic { area }),
    ("PF", |area| Command::FirePanic { area }),
    ("SR", |area| Command::SmokeReset { area }),
];

impl Command {
    /// Convert the command to its wire string representation.
    pub fn to_wire_string(&self) -> String {
        match self {
            Command::RequestAreaStatus { area } => format!("RA{:03}", area),
            Command::RequestZoneStatus { zone } => format!("RZ{:03}", zone),
            Command::VirtualInputOpen { input } => format!("VO{:03}", input),
            Command::VirtualInputClosed { input } => format!("VC{:03}", input),
            Command::PowerQuery => "PWR?".to_string(),
            Command::ErrorQuery => "ERR?".to_string(),
            Command::SetPowerState { state } => format!("POWER {}", state),
            Command::ResetAll => "INITALL".to_string(),
            Command::ZoneLabel { zone } => format!("ZL{:03}", zone),
            Command::AreaLabel { area } => format!("AL{:03}", area),
            Command::UserLabel { user } => format!("UL{:03}", user),
            Command::AreaArm { area, mode, code } => {
                format!("AA{:03}{}{}", area, mode.as_char(), code)
            }
            Command::AreaDisarm { area, code } => format!("AD{:03}{}", area, code),
            Command::EmergencyPanic { area } => format!("PE{:03}", area),
            Command::MedicalPanic { area } => format!("PM{:03}", area),
            Command::FirePanic { area } => format!("PF{:03}", area),
            Command::SmokeReset { area } => format!("SR{:03}", area),
            Command::Raw(s) => s.clone(),
        }
    }

    /// Parse a rendered command string back into a `Command`.
    ///
    /// Strings that do not follow a known template come back as `Raw`.
    pub fn parse(wire: &str) -> Self {
        match wire {
            "PWR?" => return Command::PowerQuery,
            "ERR?" => return Command::ErrorQuery,
            "INITALL" => return Command::ResetAll,
            _ => {}
        }

        if let Some(state) = wire.strip_prefix("POWER ")
            && let Ok(state) = state.parse::<i64>()
        {
            return Command::SetPowerState { state };
        }

        if let Some((area, rest)) = wire.strip_prefix("AA").and_then(split_index)
            && let Some(mode) = rest.chars().next().and_then(ArmMode::from_char)
        {
            return Command::AreaArm {
                area,
                mode,
                code: rest[1..].to_string(),
            };
        }

        if let Some((area, code)) = wire.strip_prefix("AD").and_then(split_index) {
            return Command::AreaDisarm {
                area,
                code: code.to_string(),
            };
        }

        for (prefix, build) in INDEXED_COMMANDS {
            if let Some((index, rest)) = wire.strip_prefix(prefix).and_then(split_index)
                && rest.is_empty()
            {
                return build(index);
            }
        }

        Command::Raw(wire.to_string())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire_string())
    }
}

/// Split a three-digit zero-padded index off the front of `s`.
fn split_index(s: &str) -> Option<(u32, &str)> {
    let digits = s.get(..3)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let index = digits.parse().ok()?;
    Some((index, &s[3..]))
}

/// Outcome of a single command exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Cleaned payload of a successful reply
    Ok(String),
    /// The module answered with a failure token
    Error(ReplyToken),
    /// No terminator arrived before the deadline
    Timeout,
    /// A terminator arrived but nothing else
    Empty,
}

impl Reply {
    /// Classify the raw text accumulated up to (and including) the terminator.
    pub fn classify(raw: &str) -> Self {
        let cleaned = clean_reply(raw);
        if cleaned.is_empty() {
            return Reply::Empty;
        }
        match ReplyToken::from_reply(&cleaned) {
            Some(token) => Reply::Error(token),
            None => Reply::Ok(cleaned),
        }
    }

    /// Turn the reply into the payload, or the error it stands for.
    pub fn into_payload(self, command: &str) -> Result<String> {
        match self {
            Reply::Ok(payload) => Ok(payload),
            Reply::Error(token) => Err(PanelError::ErrorResponse {
                command: command.to_string(),
                token,
            }),
            Reply::Timeout => Err(PanelError::Timeout {
                command: command.to_string(),
            }),
            Reply::Empty => Err(PanelError::NoResponse {
                command: command.to_string(),
            }),
        }
    }
}

/// Remove `\r:` framing and the trailing terminator noise from a reply.
pub fn clean_reply(raw: &str) -> String {
    raw.replace(REPLY_NOISE, "")
        .trim_matches(&['\r', '\n'][..])
        .trim_end_matches(':')
        .trim_end_matches(&['\r', '\n'][..])
        .to_string()
}

/// Parse a response string to extract the value after '='.
/// e.g., "PWR=1" → "1"
pub fn parse_value_after_eq(response: &str) -> Option<&str> {
    response.split('=').nth(1)
}

/// Decode the integer after '=' in the given radix.
pub fn decode_int(payload: &str, radix: u32) -> Result<i64> {
    let value = parse_value_after_eq(payload)
        .map(str::trim)
        .ok_or_else(|| PanelError::MalformedResponse {
            details: format!("no '=' in reply '{}'", payload),
        })?;
    i64::from_str_radix(value, radix).map_err(|e| PanelError::MalformedResponse {
        details: format!("cannot parse '{}' in base {}: {}", value, radix, e),
    })
}
