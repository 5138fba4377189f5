//! Broadcast engine
//!
//! Fans one line out to every registered session except an optional
//! excluded one. Delivery never waits on a recipient.

use tracing::{debug, warn};

use crate::registry::Registry;
use crate::types::SessionId;

/// Per-call delivery counts
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Recipients whose queue accepted the line
    pub delivered: usize,
    /// Recipients that did not get the line
    pub failed: usize,
}

/// Deliver `message` to every session in a registry snapshot but `exclude`
///
/// A failed delivery is logged and does not stop the remaining ones.
/// Sessions that join after the snapshot miss this message.
pub fn broadcast(registry: &Registry, message: &str, exclude: Option<SessionId>) -> BroadcastReport {
    let mut report = BroadcastReport::default();

    for session in registry.snapshot() {
        if Some(session.id()) == exclude {
            continue;
        }

        match session.deliver(message) {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                warn!(
                    "Broadcast to {} ({}) failed: {}",
                    session.id(),
                    session.display_name(),
                    e
                );
                report.failed += 1;
            }
        }
    }

    debug!(
        "Broadcast {:?}: delivered {}, failed {}",
        message, report.delivered, report.failed
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    use crate::session::Session;

    fn session(capacity: usize) -> (Arc<Session>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        let session = Session::new(SessionId::new(), "127.0.0.1:40000".parse().unwrap(), tx);
        (Arc::new(session), rx)
    }

    #[tokio::test]
    async fn test_broadcast_excludes_sender() {
        let registry = Registry::new();
        let (a, mut rx_a) = session(8);
        let (b, mut rx_b) = session(8);
        let (c, mut rx_c) = session(8);
        registry.add(Arc::clone(&a));
        registry.add(b);
        registry.add(c);

        let report = broadcast(&registry, "hello", Some(a.id()));

        assert_eq!(report, BroadcastReport { delivered: 2, failed: 0 });
        assert_eq!(rx_b.recv().await.as_deref(), Some("hello"));
        assert_eq!(rx_c.recv().await.as_deref(), Some("hello"));
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_without_exclusion() {
        let registry = Registry::new();
        let (a, mut rx_a) = session(8);
        let (b, mut rx_b) = session(8);
        registry.add(a);
        registry.add(b);

        let report = broadcast(&registry, "alice has signed up", None);

        assert_eq!(report.delivered, 2);
        assert_eq!(rx_a.recv().await.as_deref(), Some("alice has signed up"));
        assert_eq!(rx_b.recv().await.as_deref(), Some("alice has signed up"));
    }

    #[tokio::test]
    async fn test_failed_delivery_does_not_stop_fanout() {
        let registry = Registry::new();
        let (sender, _rx_sender) = session(8);
        let (gone, rx_gone) = session(8);
        let (full, _rx_full) = session(1);
        let (ok, mut rx_ok) = session(8);
        drop(rx_gone);
        full.deliver("filler").unwrap();

        registry.add(Arc::clone(&sender));
        registry.add(gone);
        registry.add(full);
        registry.add(ok);

        let report = broadcast(&registry, "still here", Some(sender.id()));

        assert_eq!(report, BroadcastReport { delivered: 1, failed: 2 });
        assert_eq!(rx_ok.recv().await.as_deref(), Some("still here"));
    }

    #[tokio::test]
    async fn test_removed_session_gets_nothing() {
        let registry = Registry::new();
        let (a, mut rx_a) = session(8);
        let (b, mut rx_b) = session(8);
        registry.add(Arc::clone(&a));
        registry.add(b);

        registry.remove(a.id());
        broadcast(&registry, "after removal", None);

        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.recv().await.as_deref(), Some("after removal"));
    }
}
