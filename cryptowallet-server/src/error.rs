//! Server error types.

use cryptowallet_core::{AccountError, WalletError};
use cryptowallet_protocol::{ErrorCode, ProtocolError};
use std::fmt;
use thiserror::Error;

/// Why an otherwise well-formed command could not be carried out.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    NotLoggedIn,
    AlreadyLoggedIn,
    Account(AccountError),
    Wallet(WalletError),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NotLoggedIn => f.write_str("You have to be logged in to use this command!"),
            FailureReason::AlreadyLoggedIn => {
                f.write_str("You are already logged in! Log out first to use this command.")
            }
            FailureReason::Account(e) => write!(f, "{}", e),
            FailureReason::Wallet(e) => write!(f, "{}", e),
        }
    }
}

impl From<AccountError> for FailureReason {
    fn from(err: AccountError) -> Self {
        FailureReason::Account(err)
    }
}

impl From<WalletError> for FailureReason {
    fn from(err: WalletError) -> Self {
        FailureReason::Wallet(err)
    }
}

/// Errors produced while turning a request line into a response.
///
/// The `Display` text is exactly what the client receives.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("{0}")]
    Malformed(#[from] ProtocolError),

    #[error("'{0}' is an invalid command. Try again! Type \"$ help\" to see all commands.")]
    UnknownCommand(String),

    #[error("The {command} command expects {expected} argument(s) but got {actual}! Usage: {usage}")]
    ArgumentCountMismatch {
        command: &'static str,
        expected: usize,
        actual: usize,
        usage: &'static str,
    },

    #[error("Invalid argument for the {command} command: {reason}")]
    InvalidArgument {
        command: &'static str,
        reason: String,
    },

    #[error("The {command} command was unsuccessful! {reason}")]
    Unsuccessful {
        command: &'static str,
        reason: FailureReason,
    },
}

impl CommandError {
    /// Maps to the stable error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            CommandError::Malformed(e) => e.error_code(),
            CommandError::UnknownCommand(_) => ErrorCode::UnknownCommand,
            CommandError::ArgumentCountMismatch { .. } => ErrorCode::ArgumentCountMismatch,
            CommandError::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            CommandError::Unsuccessful { .. } => ErrorCode::UnsuccessfulCommand,
        }
    }

    /// Returns the failure reason for unsuccessful commands.
    pub fn reason(&self) -> Option<&FailureReason> {
        match self {
            CommandError::Unsuccessful { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// Server lifecycle errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("server shutting down")]
    ShuttingDown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            CommandError::from(ProtocolError::InvalidMarker).error_code(),
            ErrorCode::MalformedRequest
        );
        assert_eq!(
            CommandError::UnknownCommand("fly".to_string()).error_code(),
            ErrorCode::UnknownCommand
        );
        assert_eq!(
            CommandError::Unsuccessful {
                command: "buy",
                reason: FailureReason::NotLoggedIn,
            }
            .error_code(),
            ErrorCode::UnsuccessfulCommand
        );
    }

    #[test]
    fn test_unsuccessful_message_includes_reason() {
        let err = CommandError::Unsuccessful {
            command: "login",
            reason: AccountError::WrongPassword.into(),
        };
        assert_eq!(
            err.to_string(),
            "The login command was unsuccessful! The password is incorrect!"
        );
        assert_eq!(
            err.reason(),
            Some(&FailureReason::Account(AccountError::WrongPassword))
        );
    }

    #[test]
    fn test_argument_count_message() {
        let err = CommandError::ArgumentCountMismatch {
            command: "sell",
            expected: 1,
            actual: 0,
            usage: "$ sell --offering=<assetID>",
        };
        let msg = err.to_string();
        assert!(msg.contains("expects 1"));
        assert!(msg.contains("got 0"));
        assert!(msg.ends_with("$ sell --offering=<assetID>"));
    }
}
