//! Presence events
//!
//! The core publishes the full list of online usernames whenever
//! membership or identity changes. Displays subscribe to a `watch`
//! channel, so a slow display only ever sees the latest list and
//! publishing never blocks.

use tokio::sync::watch;
use tracing::info;

use crate::registry::Registry;

/// Publisher side of the "currently online usernames" feed
///
/// Only the online list is published; there is no offline-users feed.
#[derive(Debug)]
pub struct Presence {
    online: watch::Sender<Vec<String>>,
}

impl Presence {
    pub fn new() -> Self {
        let (online, _) = watch::channel(Vec::new());
        Self { online }
    }

    /// Subscribe a display to the online list
    pub fn subscribe(&self) -> watch::Receiver<Vec<String>> {
        self.online.subscribe()
    }

    /// Replace the published list with the registry's current usernames
    pub fn refresh(&self, registry: &Registry) {
        let usernames = registry.usernames();
        self.online.send_replace(usernames);
    }

    /// Most recently published list
    pub fn current(&self) -> Vec<String> {
        self.online.borrow().clone()
    }
}

impl Default for Presence {
    fn default() -> Self {
        Self::new()
    }
}

/// Presence display: logs the online list on every change
///
/// Runs until the publisher is dropped.
pub async fn run_display(mut online: watch::Receiver<Vec<String>>) {
    while online.changed().await.is_ok() {
        let usernames = online.borrow_and_update().clone();
        info!("Online users ({}): [{}]", usernames.len(), usernames.join(", "));
    }
}
