//! Protocol error types and error codes.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Protocol-level errors raised while framing or tokenizing a request line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Empty request! Commands should start with $")]
    EmptyRequest,

    #[error("Invalid begin symbol for a command message! Commands should start with $")]
    InvalidMarker,

    #[error("Missing command after $")]
    MissingVerb,

    #[error("Request line too long: {len} bytes (max {max})")]
    LineTooLong { len: usize, max: usize },

    #[error("Request line is not valid UTF-8")]
    InvalidUtf8,
}

impl ProtocolError {
    /// Every protocol error is reported to clients as a malformed request.
    pub fn error_code(&self) -> ErrorCode {
        ErrorCode::MalformedRequest
    }
}

/// Stable error codes for the failure taxonomy.
///
/// Codes are not sent on the wire (clients only see the message text) but are
/// used in logs and statistics, so they must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Empty line, wrong marker, bad framing.
    MalformedRequest,
    /// Verb not recognized.
    UnknownCommand,
    /// Argument value failed type/range/format validation.
    InvalidArgument,
    /// Wrong number of arguments for a known verb.
    ArgumentCountMismatch,
    /// Precondition or business-rule failure during execution.
    UnsuccessfulCommand,
}

impl ErrorCode {
    /// Returns whether the error was detected before a command existed.
    pub fn is_parse_failure(&self) -> bool {
        !matches!(self, ErrorCode::UnsuccessfulCommand)
    }

    /// Returns the stable string form of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::MalformedRequest => "MALFORMED_REQUEST",
            ErrorCode::UnknownCommand => "UNKNOWN_COMMAND",
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::ArgumentCountMismatch => "ARGUMENT_COUNT_MISMATCH",
            ErrorCode::UnsuccessfulCommand => "UNSUCCESSFUL_COMMAND",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
