//! # cryptowallet-protocol
//!
//! Wire protocol implementation for cryptowallet.
//!
//! This crate provides:
//! - Newline framing with a per-connection accumulation buffer
//! - Request line tokenizing (`$ <verb> <args...>`)
//! - Response encoding with an empty-line terminator
//! - Error codes and protocol constants

pub mod codec;
pub mod error;
pub mod message;

pub use codec::{Decoder, Encoder};
pub use error::{ErrorCode, ProtocolError};
pub use message::{Request, Response, ResponseStatus};

/// Leading token every request line must start with.
pub const COMMAND_MARKER: &str = "$";

/// Default port for the cryptowallet server.
pub const DEFAULT_PORT: u16 = 8888;

/// Maximum request line length in bytes (newline excluded).
pub const MAX_LINE_BYTES: usize = 4096;

/// Terminates every response on the wire (an empty line).
pub const RESPONSE_TERMINATOR: &[u8] = b"\n\n";
