//! Protocol dispatcher
//!
//! Decodes each inbound line into a `Command` and runs the matching
//! handler. Replies go to the sender's own queue; notices and chat go
//! through the broadcast engine.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::broadcast::broadcast;
use crate::error::SendError;
use crate::message::{Command, Notice, Reply};
use crate::server::RelayState;
use crate::session::Session;
use crate::store::run_blocking;

/// Handle one inbound line for `session`
///
/// Malformed lines are dropped. The only error is the session's own
/// outbound queue being closed, which ends the session.
pub async fn dispatch(state: &RelayState, session: &Arc<Session>, line: &str) -> Result<(), SendError> {
    match Command::parse(line) {
        Ok(Command::Signup { username, password }) => {
            handle_signup(state, session, username, password).await
        }
        Ok(Command::Login { username, password }) => {
            handle_login(state, session, username, password).await
        }
        Ok(Command::Chat { text }) => {
            debug!("Received from {}: {}", session.id(), text);
            broadcast(&state.registry, &text, Some(session.id()));
            Ok(())
        }
        Err(e) => {
            warn!("Dropping malformed line from {}: {}", session.id(), e);
            Ok(())
        }
    }
}

async fn reply(session: &Session, reply: Reply) -> Result<(), SendError> {
    debug!("Reply to {}: {}", session.id(), reply);
    session.send(reply.as_str()).await
}

/// SIGNUP: register, reply, then announce to everyone
async fn handle_signup(
    state: &RelayState,
    session: &Session,
    username: String,
    password: String,
) -> Result<(), SendError> {
    info!("Handling signup for user '{}' on {}", username, session.id());

    let credentials = Arc::clone(&state.credentials);
    let name = username.clone();
    let registered = run_blocking(move || credentials.register(&name, &password)).await;

    match registered {
        Ok(true) => {
            info!("User '{}' signed up", username);
            reply(session, Reply::SignupSuccess).await?;
            broadcast(&state.registry, &Notice::SignedUp { username }.to_string(), None);
        }
        Ok(false) => reply(session, Reply::SignupFailed).await?,
        Err(e) => {
            warn!("Credential store failed during signup for '{}': {}", username, e);
            reply(session, Reply::ServiceUnavailable).await?;
        }
    }

    Ok(())
}

/// LOGIN: authenticate, record online status, bind identity, reply,
/// refresh presence, then announce to everyone else
///
/// The status write happens before any reply, so a login produces
/// exactly one reply line.
async fn handle_login(
    state: &RelayState,
    session: &Session,
    username: String,
    password: String,
) -> Result<(), SendError> {
    info!("Handling login for user '{}' on {}", username, session.id());

    if session.is_authenticated() {
        warn!(
            "Session {} already logged in as '{}', rejecting login as '{}'",
            session.id(),
            session.display_name(),
            username
        );
        return reply(session, Reply::AlreadyLoggedIn).await;
    }

    let credentials = Arc::clone(&state.credentials);
    let name = username.clone();
    match run_blocking(move || credentials.authenticate(&name, &password)).await {
        Ok(true) => {}
        Ok(false) => return reply(session, Reply::LoginFailed).await,
        Err(e) => {
            warn!("Credential store failed during login for '{}': {}", username, e);
            return reply(session, Reply::ServiceUnavailable).await;
        }
    }

    let status = Arc::clone(&state.status);
    let name = username.clone();
    if let Err(e) = run_blocking(move || status.mark_online(&name)).await {
        warn!("Failed to record '{}' as online: {}", username, e);
        return reply(session, Reply::StatusUpdateFailed).await;
    }

    if !session.bind_username(username.clone()) {
        // Give back the online claim taken above
        let status = Arc::clone(&state.status);
        let name = username.clone();
        if let Err(e) = run_blocking(move || status.mark_offline(&name)).await {
            warn!("Failed to release online status for '{}': {}", username, e);
        }
        return reply(session, Reply::AlreadyLoggedIn).await;
    }

    info!("Session {} logged in as '{}'", session.id(), username);
    reply(session, Reply::LoginSuccess).await?;
    state.presence.refresh(&state.registry);
    broadcast(
        &state.registry,
        &Notice::Joined { username }.to_string(),
        Some(session.id()),
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    use crate::config::Config;
    use crate::error::StoreError;
    use crate::store::{CredentialGateway, StatusStore, UserStore};
    use crate::types::SessionId;

    fn state_with(store: Arc<UserStore>) -> RelayState {
        RelayState::with_store(&Config::with_listen("127.0.0.1:0".parse().unwrap()), store)
    }

    fn connect(state: &RelayState) -> (Arc<Session>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(16);
        let session = Arc::new(Session::new(
            SessionId::new(),
            "127.0.0.1:40000".parse().unwrap(),
            tx,
        ));
        state.registry.add(Arc::clone(&session));
        (session, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line);
        }
        lines
    }

    struct BrokenStore;

    impl CredentialGateway for BrokenStore {
        fn register(&self, _: &str, _: &str) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("offline".to_string()))
        }

        fn authenticate(&self, _: &str, _: &str) -> Result<bool, StoreError> {
            Ok(true)
        }
    }

    impl StatusStore for BrokenStore {
        fn mark_online(&self, _: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("offline".to_string()))
        }

        fn mark_offline(&self, _: &str) -> Result<(), StoreError> {
            Ok(())
        }
    }

    struct UnreachableStore;

    impl CredentialGateway for UnreachableStore {
        fn register(&self, _: &str, _: &str) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        fn authenticate(&self, _: &str, _: &str) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    impl StatusStore for UnreachableStore {
        fn mark_online(&self, _: &str) -> Result<(), StoreError> {
            panic!("status must not be touched when authentication fails")
        }

        fn mark_offline(&self, _: &str) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_signup_success_broadcasts_to_everyone() {
        let state = state_with(Arc::new(UserStore::in_memory()));
        let (a, mut rx_a) = connect(&state);
        let (_b, mut rx_b) = connect(&state);

        dispatch(&state, &a, "SIGNUP alice pw1").await.unwrap();

        assert_eq!(drain(&mut rx_a), vec!["SIGNUP_SUCCESS", "alice has signed up"]);
        assert_eq!(drain(&mut rx_b), vec!["alice has signed up"]);
    }

    #[tokio::test]
    async fn test_signup_duplicate_fails_quietly() {
        let store = Arc::new(UserStore::in_memory());
        store.register("alice", "pw1").unwrap();
        let state = state_with(store);
        let (a, mut rx_a) = connect(&state);
        let (_b, mut rx_b) = connect(&state);

        dispatch(&state, &a, "SIGNUP alice other").await.unwrap();

        assert_eq!(drain(&mut rx_a), vec!["SIGNUP_FAILED"]);
        assert!(drain(&mut rx_b).is_empty());
    }

    #[tokio::test]
    async fn test_login_success_reply_then_join_notice() {
        let store = Arc::new(UserStore::in_memory());
        store.register("alice", "pw1").unwrap();
        let state = state_with(Arc::clone(&store));
        let mut presence = state.presence.subscribe();
        let (a, mut rx_a) = connect(&state);
        let (_b, mut rx_b) = connect(&state);

        dispatch(&state, &a, "LOGIN alice pw1").await.unwrap();

        assert_eq!(drain(&mut rx_a), vec!["LOGIN_SUCCESS"]);
        assert_eq!(drain(&mut rx_b), vec!["alice has joined the chat"]);
        assert_eq!(a.username(), Some("alice"));
        assert_eq!(store.online_users(), vec!["alice"]);
        assert!(presence.has_changed().unwrap());
        assert_eq!(*presence.borrow_and_update(), vec!["alice".to_string()]);
    }

    #[tokio::test]
    async fn test_login_bad_password() {
        let store = Arc::new(UserStore::in_memory());
        store.register("alice", "pw1").unwrap();
        let state = state_with(store);
        let (a, mut rx_a) = connect(&state);
        let (_b, mut rx_b) = connect(&state);

        dispatch(&state, &a, "LOGIN alice nope").await.unwrap();

        assert_eq!(drain(&mut rx_a), vec!["LOGIN_FAILED"]);
        assert!(drain(&mut rx_b).is_empty());
        assert!(!a.is_authenticated());
    }

    #[tokio::test]
    async fn test_second_login_rejected() {
        let store = Arc::new(UserStore::in_memory());
        store.register("alice", "pw1").unwrap();
        store.register("bob", "pw2").unwrap();
        let state = state_with(store);
        let (a, mut rx_a) = connect(&state);

        dispatch(&state, &a, "LOGIN alice pw1").await.unwrap();
        dispatch(&state, &a, "LOGIN bob pw2").await.unwrap();

        assert_eq!(drain(&mut rx_a), vec!["LOGIN_SUCCESS", "ALREADY_LOGGED_IN"]);
        assert_eq!(a.username(), Some("alice"));
    }

    #[tokio::test]
    async fn test_status_failure_is_single_reply() {
        let broken = Arc::new(BrokenStore);
        let state = RelayState::new(
            &Config::with_listen("127.0.0.1:0".parse().unwrap()),
            broken.clone(),
            broken,
        );
        let (a, mut rx_a) = connect(&state);
        let (_b, mut rx_b) = connect(&state);

        dispatch(&state, &a, "LOGIN alice pw1").await.unwrap();

        assert_eq!(drain(&mut rx_a), vec!["STATUS_UPDATE_FAILED"]);
        assert!(drain(&mut rx_b).is_empty());
        assert!(!a.is_authenticated());
    }

    #[tokio::test]
    async fn test_store_failure_on_signup() {
        let broken = Arc::new(BrokenStore);
        let state = RelayState::new(
            &Config::with_listen("127.0.0.1:0".parse().unwrap()),
            broken.clone(),
            broken,
        );
        let (a, mut rx_a) = connect(&state);

        dispatch(&state, &a, "SIGNUP alice pw1").await.unwrap();

        assert_eq!(drain(&mut rx_a), vec!["SERVICE_UNAVAILABLE"]);
    }

    #[tokio::test]
    async fn test_store_failure_on_login() {
        let unreachable = Arc::new(UnreachableStore);
        let state = RelayState::new(
            &Config::with_listen("127.0.0.1:0".parse().unwrap()),
            unreachable.clone(),
            unreachable,
        );
        let mut presence = state.presence.subscribe();
        let (a, mut rx_a) = connect(&state);
        let (_b, mut rx_b) = connect(&state);

        dispatch(&state, &a, "LOGIN alice pw1").await.unwrap();

        assert_eq!(drain(&mut rx_a), vec!["SERVICE_UNAVAILABLE"]);
        assert!(drain(&mut rx_b).is_empty());
        assert!(!a.is_authenticated());
        assert!(!presence.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_chat_excludes_sender() {
        let state = state_with(Arc::new(UserStore::in_memory()));
        let (a, mut rx_a) = connect(&state);
        let (_b, mut rx_b) = connect(&state);

        dispatch(&state, &a, "hello world").await.unwrap();

        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(drain(&mut rx_b), vec!["hello world"]);
    }

    #[tokio::test]
    async fn test_malformed_line_dropped() {
        let state = state_with(Arc::new(UserStore::in_memory()));
        let (a, mut rx_a) = connect(&state);
        let (_b, mut rx_b) = connect(&state);

        dispatch(&state, &a, "LOGIN alice").await.unwrap();
        dispatch(&state, &a, "SIGNUP").await.unwrap();

        assert!(drain(&mut rx_a).is_empty());
        assert!(drain(&mut rx_b).is_empty());
    }

    #[tokio::test]
    async fn test_reply_to_closed_session_is_error() {
        let state = state_with(Arc::new(UserStore::in_memory()));
        let (a, rx_a) = connect(&state);
        drop(rx_a);

        let result = dispatch(&state, &a, "SIGNUP alice pw1").await;
        assert_eq!(result, Err(SendError::ChannelClosed));
    }
}
