//! Error types for the chat relay
//!
//! Defines application-level errors, outbound send errors, store errors
//! and protocol (malformed line) errors.
//! Uses thiserror for ergonomic error definitions.

use std::net::SocketAddr;

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// Application-level errors
///
/// Everything here is fatal to the scope it occurs in: a session for
/// `Io`, `Codec` and `Send`, the whole listener for `Bind`.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error (fatal to the session)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Line framing error, including over-long lines (fatal to the session)
    #[error("Line codec error: {0}")]
    Codec(#[from] LinesCodecError),

    /// Could not bind the listening socket (fatal to the server)
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The session's own outbound queue is gone
    #[error("Send error: {0}")]
    Send(#[from] SendError),
}

/// Message send errors
///
/// Occurs when pushing a line into a session's outbound queue fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The outbound queue is full; the line was not queued
    #[error("Outbound queue full")]
    QueueFull,
}

/// Credential and status store errors
///
/// Any of these means the collaborator is unavailable for this request.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Malformed inbound command lines
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// SIGNUP or LOGIN without both a username and a password
    #[error("{verb} requires a username and a password")]
    MissingArguments { verb: &'static str },
}
