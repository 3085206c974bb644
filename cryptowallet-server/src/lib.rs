//! # cryptowallet-server
//!
//! TCP server for cryptowallet.
//!
//! This crate provides:
//! - A single-task reactor multiplexing all client connections
//! - Per-connection sessions (anonymous or logged in)
//! - Command parsing, validation and execution
//! - Configuration loading
//! - The operator console `stop` command

pub mod command;
pub mod config;
pub mod console;
pub mod error;
pub mod factory;
pub mod handler;
pub mod server;
pub mod session;

pub use command::{help_text, Access, Command, Services, Verb};
pub use config::{Config, ConfigError, MarketConfig, NetworkConfig, PriceSourceKind, StorageConfig};
pub use console::{run_console, wait_for_stop};
pub use error::{CommandError, FailureReason, ServerError};
pub use factory::{BoundCommand, CommandFactory};
pub use handler::CommandHandler;
pub use server::{Server, ServerConfig, ServerStats, StatsSnapshot};
pub use session::{ConnectionId, Session, SessionState};
