//! Session management.

use cryptowallet_core::UserRef;
use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Identifies a connection in the reactor's connection table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepting requests.
    Open,
    /// A disconnect was requested; the connection closes after the pending write.
    Closing,
}

/// Per-connection client state.
///
/// Owned by the reactor, so nothing here needs synchronization.
#[derive(Debug)]
pub struct Session {
    pub id: ConnectionId,
    pub remote_addr: SocketAddr,
    state: SessionState,
    /// Set by login, cleared by logout and disconnect.
    user: Option<UserRef>,
    request_count: u64,
    created_at: Instant,
}

impl Session {
    /// Creates an anonymous session.
    pub fn new(id: ConnectionId, remote_addr: SocketAddr) -> Self {
        Self {
            id,
            remote_addr,
            state: SessionState::Open,
            user: None,
            request_count: 0,
            created_at: Instant::now(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_closing(&self) -> bool {
        self.state == SessionState::Closing
    }

    /// Returns the logged-in user, if any.
    pub fn user(&self) -> Option<&UserRef> {
        self.user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// Attaches an authenticated user.
    pub fn login(&mut self, user: UserRef) {
        self.user = Some(user);
    }

    /// Detaches the user, returning it.
    pub fn logout(&mut self) -> Option<UserRef> {
        self.user.take()
    }

    /// Detaches the user and marks the session for closing.
    pub fn close(&mut self) {
        self.user = None;
        self.state = SessionState::Closing;
    }

    /// Records a request.
    pub fn record_request(&mut self) {
        self.request_count += 1;
    }

    pub fn request_count(&self) -> u64 {
        self.request_count
    }

    /// Time since the connection was accepted.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}
