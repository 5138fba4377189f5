//! Connection handler
//!
//! Runs one session: registers it, reads lines into the dispatcher,
//! writes its outbound queue to the socket, and tears it down when either
//! side of the connection ends.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, info, warn};

use crate::dispatcher::dispatch;
use crate::error::AppError;
use crate::server::RelayState;
use crate::session::Session;
use crate::store::run_blocking;
use crate::types::SessionId;

type LineReader = FramedRead<OwnedReadHalf, LinesCodec>;
type LineWriter = FramedWrite<OwnedWriteHalf, LinesCodec>;

/// How long replies queued before end-of-stream may take to flush
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle a new TCP connection
///
/// Returns once the connection has ended and the session has been torn
/// down. The returned error, if any, is why the connection ended.
pub async fn handle_connection(stream: TcpStream, state: Arc<RelayState>) -> Result<(), AppError> {
    let peer = stream.peer_addr()?;
    let (read_half, write_half) = stream.into_split();

    let (msg_tx, msg_rx) = mpsc::channel::<String>(state.outbound_buffer.max(1));
    let session = Arc::new(Session::new(SessionId::new(), peer, msg_tx));

    state.registry.add(Arc::clone(&session));
    info!("Session {} connected from {}", session.id(), peer);

    let outcome = {
        let mut lines = FramedRead::new(
            read_half,
            LinesCodec::new_with_max_length(state.max_line_length),
        );
        let mut sink = FramedWrite::new(write_half, LinesCodec::new());
        let mut msg_rx = msg_rx;
        let (read_done_tx, read_done_rx) = oneshot::channel::<()>();

        let reading = async {
            let res = read_loop(&state, &session, &mut lines).await;
            let _ = read_done_tx.send(());
            res
        };
        let writing = write_loop(&session, &mut sink, &mut msg_rx, read_done_rx);
        tokio::pin!(reading, writing);

        // A write failure ends the session at once; the end of reading
        // still lets already queued lines reach the peer
        tokio::select! {
            res = &mut reading => {
                match tokio::time::timeout(DRAIN_TIMEOUT, &mut writing).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => debug!("Session {} failed to flush: {}", session.id(), e),
                    Err(_) => warn!("Session {} timed out flushing queued lines", session.id()),
                }
                res
            }
            res = &mut writing => res,
        }
        // Socket halves and the queue receiver drop here, closing the connection
    };

    teardown(&state, &session).await;
    outcome
}

/// Peer → dispatcher, until end-of-stream or a read error
async fn read_loop(
    state: &RelayState,
    session: &Arc<Session>,
    lines: &mut LineReader,
) -> Result<(), AppError> {
    while let Some(frame) = lines.next().await {
        let line = frame?;
        dispatch(state, session, &line).await?;
    }
    debug!("Session {} reached end of stream", session.id());
    Ok(())
}

/// Outbound queue → peer, until a write fails
///
/// Once `read_done` fires the queue is closed to new lines and the loop
/// returns after writing what was already queued.
async fn write_loop(
    session: &Session,
    sink: &mut LineWriter,
    msg_rx: &mut mpsc::Receiver<String>,
    mut read_done: oneshot::Receiver<()>,
) -> Result<(), AppError> {
    let mut closed = false;
    loop {
        tokio::select! {
            line = msg_rx.recv() => {
                let Some(line) = line else { break };
                sink.send(line.as_str()).await?;
                debug!("Sent to {}: {}", session.id(), line);
            }
            _ = &mut read_done, if !closed => {
                closed = true;
                msg_rx.close();
            }
        }
    }
    Ok(())
}

/// Leave the registry, clear online status, and refresh presence
///
/// Runs exactly once per session, after the connection is closed.
async fn teardown(state: &RelayState, session: &Session) {
    state.registry.remove(session.id());

    // The store counts sessions per user, so this releases only our claim
    if let Some(username) = session.username() {
        let status = Arc::clone(&state.status);
        let name = username.to_string();
        if let Err(e) = run_blocking(move || status.mark_offline(&name)).await {
            warn!("Failed to record '{}' as offline: {}", username, e);
        }
    }

    state.presence.refresh(&state.registry);
    info!(
        "Session {} ({}) from {} disconnected",
        session.id(),
        session.display_name(),
        session.peer()
    );
}
