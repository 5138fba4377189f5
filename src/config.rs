//! Server configuration
//!
//! Parsed from command-line flags, each with an environment fallback.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// Default listening address (fixed relay port)
pub const DEFAULT_LISTEN: &str = "0.0.0.0:18866";

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Socket address to listen on. Use port 0 for an ephemeral port.
    #[arg(long, env = "CHAT_RELAY_LISTEN", default_value = DEFAULT_LISTEN)]
    pub listen: SocketAddr,

    /// JSON file holding registered users. In-memory only when omitted.
    #[arg(long, env = "CHAT_RELAY_USERS_FILE")]
    pub users_file: Option<PathBuf>,

    /// Lines queued per session before broadcasts to it are dropped.
    #[arg(long, env = "CHAT_RELAY_OUTBOUND_BUFFER", default_value_t = 256)]
    pub outbound_buffer: usize,

    /// Longest accepted inbound line in bytes; longer lines end the session.
    #[arg(long, env = "CHAT_RELAY_MAX_LINE_LENGTH", default_value_t = 64 * 1024)]
    pub max_line_length: usize,
}

impl Config {
    /// Defaults with a specific listen address
    pub fn with_listen(listen: SocketAddr) -> Self {
        Self {
            listen,
            users_file: None,
            outbound_buffer: 256,
            max_line_length: 64 * 1024,
        }
    }
}
