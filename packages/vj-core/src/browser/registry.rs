//! Browser/admin observer registry.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;

/// Thread-safe registry of connected browser observer sockets, keyed by a
/// server-assigned connection id.
#[derive(Default)]
pub struct BrowserRegistry {
    observers: DashMap<u64, mpsc::UnboundedSender<Value>>,
    next_id: AtomicU64,
}

impl BrowserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new observer, returning its connection id.
    pub fn register(&self, sender: mpsc::UnboundedSender<Value>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers.insert(id, sender);
        id
    }

    pub fn unregister(&self, id: u64) {
        self.observers.remove(&id);
    }

    pub fn send_to(&self, id: u64, message: Value) {
        if let Some(sender) = self.observers.get(&id) {
            let _ = sender.send(message);
        }
    }

    /// Sends `message` to every registered observer.
    pub fn broadcast(&self, message: Value) {
        for entry in self.observers.iter() {
            let _ = entry.value().send(message.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn ids(&self) -> Vec<u64> {
        self.observers.iter().map(|e| *e.key()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn register_then_broadcast_reaches_all_observers() {
        let registry = BrowserRegistry::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        registry.register(tx1);
        registry.register(tx2);

        registry.broadcast(json!({"type": "pong"}));

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn unregister_stops_delivery() {
        let registry = BrowserRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = registry.register(tx);
        registry.unregister(id);

        registry.broadcast(json!({"type": "pong"}));
        assert!(rx.try_recv().is_err());
    }
}
