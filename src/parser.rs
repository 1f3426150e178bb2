// MIT License - Copyright (c) 2026 Peter Wright
// Turns PTR event lines into structured events

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveTime};
use regex::{Captures, Regex};
use tracing::trace;

use crate::devices::ZoneStatus;
use crate::error::{PanelError, Result};

const DATE_FORMAT: &str = "%Y/%m/%d";
const TIME_FORMAT: &str = "%H:%M";

/// Line shapes the panel prints, tried in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grammar {
    Zone,
    User,
    Partition,
}

static GRAMMARS: LazyLock<[(Grammar, Regex); 3]> = LazyLock::new(|| {
    let head = r"^(\d{4}/\d{2}/\d{2})\s+(\d{2}:\d{2})\s+Partition\s+(\d+)\s+";
    [
        (
            Grammar::Zone,
            Regex::new(&format!(r"{head}(.+?)\s+Zone\s+(\d+)\s*$")).expect("Invalid zone event regex"),
        ),
        (
            Grammar::User,
            Regex::new(&format!(r"{head}(.+?)\s+(?i:User\s+Code)\s+(\d+)\s*$"))
                .expect("Invalid user event regex"),
        ),
        (
            Grammar::Partition,
            Regex::new(&format!(r"{head}(.+?)\s*$")).expect("Invalid partition event regex"),
        ),
    ]
});

/// Event classification of the action phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionType {
    ZoneClose,
    ZoneOpen,
    ZoneTamper,
    ZoneTrouble,
    ZoneBypassed,
    BurglaryAlarm,
    FireAlarm,
    StayArming,
    PartialArming,
    ArmingWithMasterCode,
    ArmingWithUserCode,
    DisarmingWithMasterCode,
    DisarmingWithUserCode,
    AlarmCancelled,
    UserCodeEntered,
    DuressAlarm,
}

/// (action, phrase as printed, variable name, numeric code)
const ACTIONS: [(ActionType, &str, &str, i64); 16] = [
    (ActionType::ZoneClose, "Zone close", "ZoneClose", 1),
    (ActionType::ZoneOpen, "Zone open", "ZoneOpen", 2),
    (ActionType::ZoneTamper, "Zone tamper", "ZoneTamper", 3),
    (ActionType::ZoneTrouble, "Zone trouble", "ZoneTrouble", 4),
    (ActionType::ZoneBypassed, "Zone bypassed", "ZoneBypassed", 5),
    (ActionType::BurglaryAlarm, "Burglary alarm", "BurglaryAlarm", 6),
    (ActionType::FireAlarm, "Fire alarm", "FireAlarm", 7),
    (ActionType::StayArming, "Stay arming", "StayArming", 8),
    (ActionType::PartialArming, "Partial arming", "PartialArming", 9),
    (ActionType::ArmingWithMasterCode, "Arming with master code", "ArmingWithMasterCode", 10),
    (ActionType::ArmingWithUserCode, "Arming with user code", "ArmingWithUserCode", 11),
    (ActionType::DisarmingWithMasterCode, "Disarming with master code", "DisarmingWithMasterCode", 12),
    (ActionType::DisarmingWithUserCode, "Disarming with user code", "DisarmingWithUserCode", 13),
    (ActionType::AlarmCancelled, "Alarm cancelled", "AlarmCancelled", 14),
    (ActionType::UserCodeEntered, "User code entered", "UserCodeEntered", 15),
    (ActionType::DuressAlarm, "Duress alarm on code", "DuressAlarm", 16),
];

impl ActionType {
    /// Look up a printed action phrase (case-insensitive, outer whitespace ignored).
    pub fn from_phrase(phrase: &str) -> Option<Self> {
        let phrase = phrase.trim();
        ACTIONS
            .iter()
            .find(|(_, p, _, _)| p.eq_ignore_ascii_case(phrase))
            .map(|(action, _, _, _)| *action)
    }

    fn entry(&self) -> (ActionType, &'static str, &'static str, i64) {
        ACTIONS
            .iter()
            .copied()
            .find(|(action, _, _, _)| action == self)
            .unwrap_or((*self, "", "", 0))
    }

    pub fn phrase(&self) -> &'static str {
        self.entry().1
    }

    /// Symbolic variable name used as a binding key.
    pub fn variable(&self) -> &'static str {
        self.entry().2
    }

    pub fn code(&self) -> i64 {
        self.entry().3
    }

    /// Zone state implied by the action, for actions that report one.
    pub fn zone_state(&self) -> Option<ZoneStatus> {
        match self {
            Self::ZoneClose => Some(ZoneStatus::Close),
            Self::ZoneOpen => Some(ZoneStatus::Open),
            Self::BurglaryAlarm => Some(ZoneStatus::Alarm),
            Self::ZoneTamper => Some(ZoneStatus::Other1),
            Self::ZoneTrouble => Some(ZoneStatus::Other2),
            _ => None,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.phrase())
    }
}

/// What an event refers to besides its partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subject {
    Zone(u32),
    User(u32),
}

/// A classified event line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEvent {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub partition: u32,
    pub action: ActionType,
    pub subject: Option<Subject>,
}

impl ParsedEvent {
    /// Variable name to value mapping consumed by bindings.
    pub fn values(&self) -> BTreeMap<String, i64> {
        let mut values = BTreeMap::new();
        let partition = i64::from(self.partition);
        values.insert("Partition".to_string(), partition);

        let subject_index = match self.subject {
            Some(Subject::Zone(n)) | Some(Subject::User(n)) => i64::from(n),
            None => partition,
        };
        values.insert(self.action.variable().to_string(), subject_index);

        match self.subject {
            Some(Subject::Zone(n)) => {
                if let Some(state) = self.action.zone_state() {
                    values.insert(format!("Zone {}", n), i64::from(state.code()));
                }
            }
            Some(Subject::User(n)) => {
                values.insert(format!("User {}", n), self.action.code());
            }
            None => {}
        }

        values
    }
}

/// Matches event lines against the known grammars.
#[derive(Debug, Default, Clone, Copy)]
pub struct EventParser;

impl EventParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse one frame.
    ///
    /// Lines matching no grammar give `Ok(None)`. A line that matches a
    /// grammar but names an unknown action is an `UnknownAction` error.
    pub fn parse(&self, line: &str) -> Result<Option<ParsedEvent>> {
        let Some((grammar, caps)) = GRAMMARS
            .iter()
            .find_map(|(grammar, re)| re.captures(line).map(|caps| (*grammar, caps)))
        else {
            trace!("No grammar matches: {:?}", line);
            return Ok(None);
        };

        let phrase = caps[4].trim();
        let action = ActionType::from_phrase(phrase).ok_or_else(|| PanelError::UnknownAction {
            action: phrase.to_string(),
            line: line.to_string(),
        })?;

        let subject = match grammar {
            Grammar::Zone => Some(Subject::Zone(index(&caps, 5, line)?)),
            Grammar::User => Some(Subject::User(index(&caps, 5, line)?)),
            Grammar::Partition => None,
        };

        let date = NaiveDate::parse_from_str(&caps[1], DATE_FORMAT).map_err(|e| {
            PanelError::MalformedResponse {
                details: format!("bad date '{}' in line {:?}: {}", &caps[1], line, e),
            }
        })?;
        let time = NaiveTime::parse_from_str(&caps[2], TIME_FORMAT).map_err(|e| {
            PanelError::MalformedResponse {
                details: format!("bad time '{}' in line {:?}: {}", &caps[2], line, e),
            }
        })?;

        Ok(Some(ParsedEvent {
            date,
            time,
            partition: index(&caps, 3, line)?,
            action,
            subject,
        }))
    }
}

fn index(caps: &Captures<'_>, group: usize, line: &str) -> Result<u32> {
    caps[group]
        .parse()
        .map_err(|e| PanelError::MalformedResponse {
            details: format!("bad index '{}' in line {:?}: {}", &caps[group], line, e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SIMULATOR_LINES;

    #[test]
    fn test_parse_zone_line() {
        let event = EventParser::new()
            .parse(SIMULATOR_LINES[0])
            .unwrap()
            .unwrap();
        assert_eq!(event.date, NaiveDate::from_ymd_opt(2014, 1, 14).unwrap());
        assert_eq!(event.time, NaiveTime::from_hms_opt(17, 1, 0).unwrap());
        assert_eq!(event.partition, 2);
        assert_eq!(event.action, ActionType::ZoneClose);
        assert_eq!(event.subject, Some(Subject::Zone(3)));

        let values = event.values();
        assert_eq!(values["Partition"], 2);
        assert_eq!(values["ZoneClose"], 3);
        assert_eq!(values["Zone 3"], 0);
    }

    #[test]
    fn test_parse_user_line() {
        let event = EventParser::new()
            .parse(SIMULATOR_LINES[4])
            .unwrap()
            .unwrap();
        assert_eq!(event.action, ActionType::ArmingWithMasterCode);
        assert_eq!(event.subject, Some(Subject::User(2)));
        let values = event.values();
        assert_eq!(values["ArmingWithMasterCode"], 2);
        assert_eq!(values["User 2"], ActionType::ArmingWithMasterCode.code());
    }

    #[test]
    fn test_parse_partition_only_line() {
        let event = EventParser::new()
            .parse(SIMULATOR_LINES[2])
            .unwrap()
            .unwrap();
        assert_eq!(event.action, ActionType::StayArming);
        assert_eq!(event.subject, None);
        assert_eq!(event.values()["StayArming"], 2);
        assert_eq!(event.values().len(), 2);
    }

    #[test]
    fn test_alarm_sets_zone_code() {
        let event = EventParser::new()
            .parse(SIMULATOR_LINES[7])
            .unwrap()
            .unwrap();
        assert_eq!(event.action, ActionType::BurglaryAlarm);
        assert_eq!(event.values()["Zone 1"], 0x80);
    }

    #[test]
    fn test_action_lookup_case_insensitive() {
        assert_eq!(ActionType::from_phrase("  ZONE OPEN "), Some(ActionType::ZoneOpen));
        assert_eq!(ActionType::from_phrase("zone open"), Some(ActionType::ZoneOpen));
        assert_eq!(ActionType::from_phrase("Zone ajar"), None);
    }

    #[test]
    fn test_every_simulator_line_is_handled() {
        let parser = EventParser::new();
        for line in SIMULATOR_LINES {
            // "System Area" lines have no partition number and are skipped
            let parsed = parser.parse(line).unwrap();
            assert_eq!(parsed.is_some(), line.contains("Partition"), "{}", line);
        }
    }

    #[test]
    fn test_noise_yields_nothing() {
        let parser = EventParser::new();
        assert_eq!(parser.parse("").unwrap(), None);
        assert_eq!(parser.parse("garbage \x01\x02").unwrap(), None);
        assert_eq!(parser.parse("2014/01/14 17:01").unwrap(), None);
    }

    #[test]
    fn test_unknown_action_is_error() {
        let line = "2014/01/14 17:01  Partition 2    Zone exploded            Zone 3";
        match EventParser::new().parse(line) {
            Err(PanelError::UnknownAction { action, .. }) => assert_eq!(action, "Zone exploded"),
            other => panic!("expected unknown action, got {:?}", other),
        }
    }
}
