//! Relay state and listener
//!
//! `RelayState` is the context every session handler shares: the
//! registry, the presence feed and the store collaborators. `ChatServer`
//! owns the bound listener and spawns one handler task per connection.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::handler::handle_connection;
use crate::presence::Presence;
use crate::registry::Registry;
use crate::store::{CredentialGateway, StatusStore};

/// Pause after a failed accept (e.g. out of file descriptors)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Shared state for all sessions
pub struct RelayState {
    /// Live sessions
    pub registry: Registry,
    /// Online-usernames feed for displays
    pub presence: Presence,
    pub credentials: Arc<dyn CredentialGateway>,
    pub status: Arc<dyn StatusStore>,
    /// Per-session outbound queue capacity
    pub outbound_buffer: usize,
    /// Longest accepted inbound line in bytes
    pub max_line_length: usize,
}

impl RelayState {
    pub fn new(
        config: &Config,
        credentials: Arc<dyn CredentialGateway>,
        status: Arc<dyn StatusStore>,
    ) -> Self {
        Self {
            registry: Registry::new(),
            presence: Presence::new(),
            credentials,
            status,
            outbound_buffer: config.outbound_buffer,
            max_line_length: config.max_line_length,
        }
    }

    /// State whose credentials and status live in the same store
    pub fn with_store<S>(config: &Config, store: Arc<S>) -> Self
    where
        S: CredentialGateway + StatusStore,
    {
        Self::new(config, store.clone(), store)
    }
}

/// The listening relay
///
/// Constructing one binds the socket; `run_until` accepts until shutdown.
pub struct ChatServer {
    listener: TcpListener,
    state: Arc<RelayState>,
}

impl ChatServer {
    /// Bind the configured address
    ///
    /// A bind failure is fatal and returned as `AppError::Bind`.
    pub async fn bind(config: &Config, state: RelayState) -> Result<Self, AppError> {
        let listener = TcpListener::bind(config.listen)
            .await
            .map_err(|source| AppError::Bind {
                addr: config.listen,
                source,
            })?;

        info!("Chat relay listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            state: Arc::new(state),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn state(&self) -> Arc<RelayState> {
        Arc::clone(&self.state)
    }

    /// Accept connections until `shutdown` resolves
    ///
    /// Accept errors are logged and never stop the loop. Sessions already
    /// running are not interrupted by shutdown.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let ChatServer { listener, state } = self;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Chat relay shutting down");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => spawn_session(stream, addr, &state),
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }
    }

    /// Accept connections until Ctrl-C
    pub async fn run_until_ctrl_c(self) {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to install Ctrl-C handler: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }
}

fn spawn_session(stream: TcpStream, addr: SocketAddr, state: &Arc<RelayState>) {
    info!("New connection from {}", addr);
    let state = Arc::clone(state);

    // Spawn handler task for each connection
    tokio::spawn(async move {
        if let Err(e) = handle_connection(stream, state).await {
            warn!("Connection {} closed with error: {}", addr, e);
        }
    });
}
