//! Session struct definition
//!
//! Represents one accepted connection: its identity, its bound username
//! and the outbound queue drained by the connection's writer.

use std::net::SocketAddr;
use std::sync::OnceLock;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::SendError;
use crate::types::SessionId;

/// Live connection state shared between the handler and the registry
///
/// The outbound queue has a single consumer (the connection's writer),
/// so lines pushed by concurrent broadcasters never interleave on the wire.
#[derive(Debug)]
pub struct Session {
    /// Unique identifier for this session
    id: SessionId,
    /// Remote address, for logging
    peer: SocketAddr,
    /// Username, set once by a successful LOGIN
    username: OnceLock<String>,
    /// Server → Client line queue
    outbound: mpsc::Sender<String>,
}

impl Session {
    /// Create a new unauthenticated session
    pub fn new(id: SessionId, peer: SocketAddr, outbound: mpsc::Sender<String>) -> Self {
        Self {
            id,
            peer,
            username: OnceLock::new(),
            outbound,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Username if LOGIN has succeeded on this session
    pub fn username(&self) -> Option<&str> {
        self.username.get().map(String::as_str)
    }

    /// Get the display name for this session
    ///
    /// Returns the username if set, otherwise "Unknown".
    pub fn display_name(&self) -> &str {
        self.username().unwrap_or("Unknown")
    }

    pub fn is_authenticated(&self) -> bool {
        self.username.get().is_some()
    }

    /// Bind the session's identity
    ///
    /// Returns false, leaving the existing identity untouched, if a
    /// username was already bound.
    pub fn bind_username(&self, username: String) -> bool {
        self.username.set(username).is_ok()
    }

    /// Queue a broadcast line without waiting
    ///
    /// A full or closed queue means this session does not get the line.
    pub fn deliver(&self, line: &str) -> Result<(), SendError> {
        self.outbound
            .try_send(line.to_string())
            .map_err(|err| match err {
                TrySendError::Full(_) => SendError::QueueFull,
                TrySendError::Closed(_) => SendError::ChannelClosed,
            })
    }

    /// Queue a direct reply, waiting for queue space
    ///
    /// Returns an error if the channel is closed (connection gone).
    pub async fn send(&self, line: impl Into<String>) -> Result<(), SendError> {
        self.outbound
            .send(line.into())
            .await
            .map_err(|_| SendError::ChannelClosed)
    }
}
