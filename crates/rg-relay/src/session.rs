//! Connected socket sessions
//!
//! Each session owns a bounded outbound channel drained by its socket writer
//! task. Fan-out never blocks: a full or closed channel drops the frame for
//! that session only.

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Server-assigned identifier for one socket connection.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl Default for SessionId {
    fn default() -> Self {
        Self(format!("session_{}", Uuid::new_v4().simple()))
    }
}

impl SessionId {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Registry of live sessions keyed by [`SessionId`].
pub struct SessionRegistry {
    sessions: DashMap<SessionId, mpsc::Sender<String>>,
    send_queue_capacity: usize,
}

impl SessionRegistry {
    pub fn new(send_queue_capacity: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            send_queue_capacity: send_queue_capacity.max(1),
        }
    }

    /// Register a new session and return its id and outbound receiver.
    pub fn register(&self) -> (SessionId, mpsc::Receiver<String>) {
        let id = SessionId::new();
        let (tx, rx) = mpsc::channel(self.send_queue_capacity);
        self.sessions.insert(id.clone(), tx);
        metrics::gauge!("relay.sessions.connected").set(self.sessions.len() as f64);
        debug!(session_id = %id, "Session registered");
        (id, rx)
    }

    pub fn unregister(&self, id: &SessionId) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            metrics::gauge!("relay.sessions.connected").set(self.sessions.len() as f64);
            debug!(session_id = %id, "Session unregistered");
        }
        removed
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Queue a frame for one session. Returns false when the session is
    /// unknown, gone, or its buffer is full.
    pub fn send_to(&self, id: &SessionId, frame: String) -> bool {
        let Some(tx) = self.sessions.get(id).map(|entry| entry.value().clone()) else {
            return false;
        };

        match tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(frame)) => {
                warn!(
                    session_id = %id,
                    frame_len = frame.len(),
                    "Send queue full, dropping frame"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.unregister(id);
                false
            }
        }
    }

    /// Queue a frame for every session and return how many accepted it.
    pub fn broadcast(&self, frame: &str) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();

        for entry in self.sessions.iter() {
            match entry.value().try_send(frame.to_string()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(session_id = %entry.key(), "Send queue full, dropping frame");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(entry.key().clone()),
            }
        }

        // Removal has to wait until the iterator releases its shard locks
        for id in closed {
            self.unregister(&id);
        }

        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ids_are_unique() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("session_"));
    }

    #[test]
    fn test_register_and_unregister() {
        let registry = SessionRegistry::new(8);
        let (a, _rx_a) = registry.register();
        let (b, _rx_b) = registry.register();
        assert_eq!(registry.count(), 2);
        assert!(registry.session_ids().contains(&a));

        assert!(registry.unregister(&a));
        assert!(!registry.unregister(&a));
        assert_eq!(registry.count(), 1);
        assert_eq!(registry.session_ids(), vec![b]);
    }

    #[test]
    fn test_broadcast_reaches_every_session() {
        let registry = SessionRegistry::new(8);
        let (_a, mut rx_a) = registry.register();
        let (_b, mut rx_b) = registry.register();

        assert_eq!(registry.broadcast("frame"), 2);
        assert_eq!(rx_a.try_recv().unwrap(), "frame");
        assert_eq!(rx_b.try_recv().unwrap(), "frame");
    }

    #[test]
    fn test_broadcast_with_no_sessions() {
        let registry = SessionRegistry::new(8);
        assert_eq!(registry.broadcast("frame"), 0);
    }

    #[test]
    fn test_full_session_does_not_block_others() {
        let registry = SessionRegistry::new(1);
        let (_slow, _rx_slow) = registry.register();
        let (_fast, mut rx_fast) = registry.register();

        assert_eq!(registry.broadcast("one"), 2);
        rx_fast.try_recv().unwrap();

        // Slow session still holds "one"
        assert_eq!(registry.broadcast("two"), 1);
        assert_eq!(rx_fast.try_recv().unwrap(), "two");
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn test_closed_sessions_are_pruned() {
        let registry = SessionRegistry::new(4);
        let (gone, rx_gone) = registry.register();
        let (_live, _rx_live) = registry.register();
        drop(rx_gone);

        assert_eq!(registry.broadcast("frame"), 1);
        assert!(!registry.session_ids().contains(&gone));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_send_to_single_session() {
        let registry = SessionRegistry::new(4);
        let (a, mut rx_a) = registry.register();
        let (_b, mut rx_b) = registry.register();

        assert!(registry.send_to(&a, "only-a".to_string()));
        assert_eq!(rx_a.try_recv().unwrap(), "only-a");
        assert!(rx_b.try_recv().is_err());

        assert!(!registry.send_to(&SessionId::from("session_unknown"), "x".to_string()));
    }
}
