//! Registry of live socket connections for direct (non-broadcast) replies

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::game::store::ConnectionId;

/// Queue depth of each connection's direct channel
pub const DIRECT_CHANNEL_CAPACITY: usize = 32;

/// Serialized frame fanned out to every connection except `except`
#[derive(Debug, Clone)]
pub struct BroadcastFrame {
    pub except: Option<ConnectionId>,
    pub json: Arc<str>,
}

/// Connection id -> direct outbound channel
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, mpsc::Sender<Arc<str>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection, returning the receiving end of its direct channel
    pub fn register(&self, id: ConnectionId) -> mpsc::Receiver<Arc<str>> {
        let (tx, rx) = mpsc::channel(DIRECT_CHANNEL_CAPACITY);
        self.connections.insert(id, tx);
        debug!(connection_id = %id, "Connection registered");
        rx
    }

    pub fn unregister(&self, id: ConnectionId) {
        self.connections.remove(&id);
        debug!(connection_id = %id, "Connection unregistered");
    }

    /// Queue a frame for one connection without blocking the caller.
    /// Returns false if the connection is gone or its queue is full.
    pub fn send(&self, id: ConnectionId, json: Arc<str>) -> bool {
        let Some(tx) = self.connections.get(&id).map(|entry| entry.value().clone()) else {
            debug!(connection_id = %id, "Direct send to unknown connection");
            return false;
        };

        match tx.try_send(json) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(connection_id = %id, "Direct channel full, dropping frame");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn direct_send_reaches_only_that_connection() {
        let registry = ConnectionRegistry::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut rx_a = registry.register(a);
        let mut rx_b = registry.register(b);

        assert!(registry.send(a, Arc::from("hello")));
        assert_eq!(&*rx_a.recv().await.unwrap(), "hello");
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn send_to_unregistered_connection_fails() {
        let registry = ConnectionRegistry::new();
        let id = Uuid::new_v4();
        let _rx = registry.register(id);
        registry.unregister(id);
        assert!(!registry.send(id, Arc::from("x")));
        assert!(registry.is_empty());
    }

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let registry = ConnectionRegistry::new();
        let id = Uuid::new_v4();
        let _rx = registry.register(id);
        for _ in 0..DIRECT_CHANNEL_CAPACITY {
            assert!(registry.send(id, Arc::from("x")));
        }
        assert!(!registry.send(id, Arc::from("overflow")));
    }
}
