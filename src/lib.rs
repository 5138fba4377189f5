//! Line-oriented TCP Chat Relay Library
//!
//! Clients connect over TCP, sign up or log in, and exchange newline
//! delimited text that the relay fans out to every other connection.
//!
//! # Protocol
//! - `SIGNUP <user> <pass>` → `SIGNUP_SUCCESS` / `SIGNUP_FAILED`, then
//!   `<user> has signed up` to everyone
//! - `LOGIN <user> <pass>` → `LOGIN_SUCCESS` / `LOGIN_FAILED` /
//!   `STATUS_UPDATE_FAILED` / `ALREADY_LOGGED_IN`, then
//!   `<user> has joined the chat` to everyone else
//! - any other line → relayed verbatim to everyone else
//!
//! # Architecture
//! - `Registry` holds the live sessions behind one short-lived lock
//! - `broadcast` iterates over a registry snapshot and queues the line on
//!   each recipient without waiting
//! - each connection runs in its own task: a read loop feeding the
//!   dispatcher and a writer draining the session's outbound queue
//! - `Presence` publishes the online list over a `watch` channel
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use chat_relay::{ChatServer, Config, RelayState, UserStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::with_listen("127.0.0.1:18866".parse().unwrap());
//!     let state = RelayState::with_store(&config, Arc::new(UserStore::in_memory()));
//!     let server = ChatServer::bind(&config, state).await.unwrap();
//!     server.run_until_ctrl_c().await;
//! }
//! ```

pub mod broadcast;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod message;
pub mod presence;
pub mod registry;
pub mod server;
pub mod session;
pub mod store;
pub mod types;

// Re-export main types for convenience
pub use broadcast::{broadcast, BroadcastReport};
pub use config::Config;
pub use error::{AppError, ProtocolError, SendError, StoreError};
pub use handler::handle_connection;
pub use message::{Command, Notice, Reply};
pub use presence::Presence;
pub use registry::Registry;
pub use server::{ChatServer, RelayState};
pub use session::Session;
pub use store::{CredentialGateway, StatusStore, UserStore};
pub use types::SessionId;
