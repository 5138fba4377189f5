//! Chat relay - Entry Point
//!
//! Loads configuration, opens the user store, binds the listener and
//! accepts connections until Ctrl-C.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chat_relay::{presence, ChatServer, Config, RelayState, UserStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_relay=info")),
        )
        .init();

    let config = Config::parse();

    let store = match &config.users_file {
        Some(path) => UserStore::open(path)?,
        None => {
            info!("No users file configured, accounts are kept in memory");
            UserStore::in_memory()
        }
    };
    let state = RelayState::with_store(&config, Arc::new(store));

    let server = match ChatServer::bind(&config, state).await {
        Ok(server) => server,
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    };

    // Presence display follows the online list for the life of the server
    tokio::spawn(presence::run_display(server.state().presence.subscribe()));

    server.run_until_ctrl_c().await;

    Ok(())
}
