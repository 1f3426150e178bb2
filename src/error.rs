// MIT License - Copyright (c) 2026 Peter Wright
// Error taxonomy for the PTR1/PTR3 driver

use std::fmt;

/// Failure tokens the printer-port module can answer with instead of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyToken {
    /// `&FAIL` - Command rejected by the panel
    Fail,
    /// `ERR` - Transport-level error reported by the module
    Err,
}

impl ReplyToken {
    /// Parse a cleaned reply into a failure token, if it is one.
    pub fn from_reply(s: &str) -> Option<Self> {
        match s {
            "&FAIL" => Some(Self::Fail),
            "ERR" => Some(Self::Err),
            _ => None,
        }
    }

    /// Human-readable description of the token.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Fail => "Command rejected",
            Self::Err => "Module error",
        }
    }

    /// The wire string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fail => "&FAIL",
            Self::Err => "ERR",
        }
    }
}

impl fmt::Display for ReplyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.as_str(), self.description())
    }
}

/// All errors that can occur in the paradox-ptr library.
#[derive(Debug, thiserror::Error)]
pub enum PanelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection error on {port}: {reason}")]
    Connection { port: String, reason: String },

    #[error("No response received for {command}")]
    NoResponse { command: String },

    #[error("Command timeout: {command}")]
    Timeout { command: String },

    #[error("Error response for {command}: {token}")]
    ErrorResponse { command: String, token: ReplyToken },

    #[error("Malformed response: {details}")]
    MalformedResponse { details: String },

    #[error("Cannot decode {code:#04x} as {kind}")]
    Decode { kind: &'static str, code: u32 },

    #[error("Unknown action '{action}' in line: {line}")]
    UnknownAction { action: String, line: String },

    #[error("{operation} not implemented by {transport} transport")]
    NotImplemented {
        operation: &'static str,
        transport: &'static str,
    },

    #[error("{what} has no synchronous query")]
    Unsupported { what: String },

    #[error("Device disconnected")]
    Disconnected,

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Unknown device: {id}")]
    UnknownDevice { id: String },

    #[error("Expression error in '{expression}': {reason}")]
    Expression { expression: String, reason: String },

    #[error("Transformation {kind}({function}) failed: {reason}")]
    Transformation {
        kind: String,
        function: String,
        reason: String,
    },

    #[error("Invalid configuration: {details}")]
    Config { details: String },
}

impl PanelError {
    /// Whether this error means the serial line itself is gone.
    ///
    /// The listener stops on these; every other error is logged and the loop
    /// keeps reading.
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            PanelError::Io(_)
                | PanelError::Connection { .. }
                | PanelError::Disconnected
                | PanelError::ChannelClosed
        )
    }
}

pub type Result<T> = std::result::Result<T, PanelError>;
