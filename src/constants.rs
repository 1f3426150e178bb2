// MIT License - Copyright (c) 2026 Peter Wright
// Line parameters and protocol constants

use std::time::Duration;

/// Serial line settings shared by PTR1 and PTR3 (8N1, no flow control).
pub const BAUD_RATE: u32 = 9600;

/// Marks the end of a reply to a PTR3 command.
pub const REPLY_TERMINATOR: &str = ":";

/// Framing noise the PTR3 module appends to successful replies.
pub const REPLY_NOISE: &str = "\r:";

/// Ends every unsolicited event line.
pub const FRAME_TERMINATOR: &[u8] = b"\r\n";

/// How long to wait before re-checking the line when no input is available.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default timeout for a command exchange.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(50);

/// Default host refresh granularity in milliseconds.
pub const DEFAULT_REFRESH_MS: u64 = 6000;

/// Delay between canned lines emitted by the simulator.
pub const DEFAULT_SIMULATOR_DELAY: Duration = Duration::from_secs(5);

/// Upper bound for the listener buffer before it is reset.
pub const MAX_FRAME_BUFFER: usize = 8192;

/// Canned PTR1 event lines replayed by the simulator, in order.
pub const SIMULATOR_LINES: [&str; 10] = [
    "2014/01/14 17:01  Partition 2    Zone close               Zone 3          ",
    "2014/02/14 17:02  Partition 2    Zone close               Zone 10         ",
    "2014/03/14 17:03  Partition 2    Stay arming             ",
    "2014/04/14 17:04  Partition 2    Partial arming          ",
    "2014/05/14 17:05  Partition 2    Arming with master code  User Code 2     ",
    "2014/06/14 17:06  Partition 2    Zone open                Zone 10         ",
    "2014/07/14 17:07  Partition 2    Zone open                Zone 3          ",
    "2014/08/14 17:08  Partition 2    Burglary alarm           Zone 1          ",
    "2014/09/14 17:09  System Area    User code entered        User Code 2     ",
    "2014/10/14 17:10  Partition 4    Duress alarm on code     User Code 2     ",
];

/// Messages for the numeric codes returned by `ERR?`.
pub fn error_message(code: i64) -> String {
    match code {
        0 => "No error".to_string(),
        other => format!("Unknown error {}", other),
    }
}
