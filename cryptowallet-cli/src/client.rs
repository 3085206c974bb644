//! Minimal line client for the wallet server.

use cryptowallet_protocol::{Encoder, COMMAND_MARKER};
use std::net::SocketAddr;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server closed the connection")]
    Disconnected,
}

/// A connection to the server. One request is in flight at a time.
pub struct Client {
    addr: SocketAddr,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Client {
    pub async fn connect(addr: SocketAddr) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (read, write) = stream.into_split();
        tracing::debug!("Connected to {}", addr);
        Ok(Self {
            addr,
            reader: BufReader::new(read),
            writer: write,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Sends one request line and collects the response lines.
    ///
    /// The line is prefixed with the command marker when it lacks one.
    pub async fn send(&mut self, line: &str) -> Result<Vec<String>, ClientError> {
        let line = with_marker(line);
        self.writer.write_all(&Encoder::encode_line(&line)).await?;
        self.read_response().await
    }

    /// Reads lines up to the empty-line terminator.
    async fn read_response(&mut self) -> Result<Vec<String>, ClientError> {
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            if self.reader.read_line(&mut line).await? == 0 {
                return Err(ClientError::Disconnected);
            }
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                return Ok(lines);
            }
            lines.push(line.to_string());
        }
    }

    pub async fn close(mut self) -> Result<(), ClientError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// Prepends `$ ` unless the line already starts with the marker.
pub fn with_marker(line: &str) -> String {
    let line = line.trim();
    if line.starts_with(COMMAND_MARKER) {
        line.to_string()
    } else {
        format!("{} {}", COMMAND_MARKER, line)
    }
}

/// Whether the line asks the server to end the session.
pub fn is_disconnect(line: &str) -> bool {
    with_marker(line)
        .split_whitespace()
        .nth(1)
        .is_some_and(|verb| verb == "disconnect")
}
