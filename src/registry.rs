//! Connection registry
//!
//! The authoritative set of live sessions. Every operation takes one short
//! lock and never awaits while holding it; broadcasters iterate over a
//! snapshot instead of the live set.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::session::Session;
use crate::types::SessionId;

/// Live sessions in accept order, keyed by `SessionId`
#[derive(Debug, Default)]
pub struct Registry {
    sessions: Mutex<Vec<Arc<Session>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<Session>>> {
        // A panic elsewhere cannot leave the Vec half-mutated, so the data is still usable
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a session
    ///
    /// Each accepted connection adds its session exactly once.
    pub fn add(&self, session: Arc<Session>) {
        let mut sessions = self.lock();
        sessions.push(session);
        debug!("Total sessions: {}", sessions.len());
    }

    /// Remove a session by identity
    ///
    /// Returns true if it was present; removing an absent session is a no-op.
    pub fn remove(&self, id: SessionId) -> bool {
        let mut sessions = self.lock();
        let Some(index) = sessions.iter().position(|s| s.id() == id) else {
            return false;
        };
        sessions.remove(index);
        debug!("Total sessions: {}", sessions.len());
        true
    }

    /// Point-in-time copy of the live sessions, in accept order
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.lock().clone()
    }

    /// Usernames of every authenticated session, in accept order
    pub fn usernames(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|s| s.username().map(str::to_string))
            .collect()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.lock().iter().any(|s| s.id() == id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
