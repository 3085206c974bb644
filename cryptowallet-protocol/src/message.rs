//! Request and response types.

use crate::error::{ErrorCode, ProtocolError};
use crate::COMMAND_MARKER;
use serde::{Deserialize, Serialize};

/// A tokenized request line: `$ <verb> <args...>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Command verb (second token).
    pub verb: String,
    /// Remaining whitespace-separated tokens.
    pub args: Vec<String>,
}

impl Request {
    /// Creates a request from a verb and arguments.
    pub fn new(verb: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            verb: verb.into(),
            args,
        }
    }

    /// Tokenizes a raw request line.
    ///
    /// The line is trimmed and split on runs of whitespace. The first token must
    /// be the command marker and the second is the verb. There is no quoting, so
    /// an argument can never contain whitespace.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let mut tokens = line.split_whitespace();

        match tokens.next() {
            None => return Err(ProtocolError::EmptyRequest),
            Some(marker) if marker != COMMAND_MARKER => return Err(ProtocolError::InvalidMarker),
            Some(_) => {}
        }

        let verb = tokens.next().ok_or(ProtocolError::MissingVerb)?;

        Ok(Self {
            verb: verb.to_string(),
            args: tokens.map(str::to_string).collect(),
        })
    }

    /// Renders the request back into a line (without the newline).
    pub fn to_line(&self) -> String {
        let mut line = format!("{} {}", COMMAND_MARKER, self.verb);
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Outcome of a request as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Error(ErrorCode),
}

/// A response to a single request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: ResponseStatus,
    pub text: String,
}

impl Response {
    /// Creates a success response.
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Ok,
            text: text.into(),
        }
    }

    /// Creates an error response.
    pub fn error(code: ErrorCode, text: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error(code),
            text: text.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.status, ResponseStatus::Ok)
    }

    /// Returns the error code, if this is an error response.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self.status {
            ResponseStatus::Ok => None,
            ResponseStatus::Error(code) => Some(code),
        }
    }
}
