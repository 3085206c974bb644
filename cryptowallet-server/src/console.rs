//! Operator console: stops the server when `stop` is typed on stdin.

use crate::server::Server;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

/// Console line that triggers a graceful shutdown.
pub const STOP_COMMAND: &str = "stop";

/// Reads lines until the stop command arrives.
///
/// Returns `Ok(true)` on stop and `Ok(false)` when input ends first. Other
/// lines are logged and ignored.
pub async fn wait_for_stop<R>(input: R) -> std::io::Result<bool>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.eq_ignore_ascii_case(STOP_COMMAND) {
            return Ok(true);
        }
        if !line.is_empty() {
            tracing::warn!(
                "Unknown console command '{}', type '{}' to shut down",
                line,
                STOP_COMMAND
            );
        }
    }
    Ok(false)
}

/// Watches standard input and shuts the server down on `stop`.
///
/// Closed stdin (e.g. when running detached) leaves the server running.
pub async fn run_console(server: Arc<Server>) {
    let stdin = BufReader::new(tokio::io::stdin());
    match wait_for_stop(stdin).await {
        Ok(true) => {
            tracing::info!("Stop requested from console");
            server.shutdown();
        }
        Ok(false) => tracing::debug!("Console input closed"),
        Err(e) => tracing::warn!("Console read error: {}", e),
    }
}
