//! Pending-DJ approval queue (C6).
//!
//! DJs connecting via connect code land here first; an operator approves
//! or denies them from the browser control plane before they enter the
//! roster proper.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::protocol::DjOutbound;
use crate::utils::now_secs;

/// A DJ awaiting operator approval.
pub struct PendingDj {
    pub dj_id: String,
    pub dj_name: String,
    pub requested_at: f64,
    pub direct_mode: bool,
    pub sender: mpsc::UnboundedSender<DjOutbound>,
}

/// JSON-safe summary of a pending DJ (no sender handle).
#[derive(Debug, Clone, Serialize)]
pub struct PendingDjInfo {
    pub dj_id: String,
    pub dj_name: String,
    pub requested_at: f64,
    pub direct_mode: bool,
}

impl From<&PendingDj> for PendingDjInfo {
    fn from(p: &PendingDj) -> Self {
        Self {
            dj_id: p.dj_id.clone(),
            dj_name: p.dj_name.clone(),
            requested_at: p.requested_at,
            direct_mode: p.direct_mode,
        }
    }
}

/// Queue of DJs awaiting operator approval, keyed by dj_id.
#[derive(Default)]
pub struct PendingQueue {
    inner: Mutex<HashMap<String, PendingDj>>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a DJ to the pending queue. Overwrites any existing entry for
    /// the same id (a DJ reconnecting while still pending).
    pub fn add(
        &self,
        dj_id: String,
        dj_name: String,
        direct_mode: bool,
        sender: mpsc::UnboundedSender<DjOutbound>,
    ) {
        let mut inner = self.inner.lock();
        inner.insert(
            dj_id.clone(),
            PendingDj {
                dj_id,
                dj_name,
                requested_at: now_secs(),
                direct_mode,
                sender,
            },
        );
    }

    /// Removes and returns the pending DJ for approval/denial, if present.
    pub fn take(&self, dj_id: &str) -> Option<PendingDj> {
        self.inner.lock().remove(dj_id)
    }

    /// Removes a pending entry without returning it (e.g. the socket closed
    /// before an operator acted).
    pub fn remove(&self, dj_id: &str) {
        self.inner.lock().remove(dj_id);
    }

    /// Snapshot of all pending DJs, in arbitrary order.
    pub fn list(&self) -> Vec<PendingDjInfo> {
        self.inner.lock().values().map(PendingDjInfo::from).collect()
    }

    pub fn contains(&self, dj_id: &str) -> bool {
        self.inner.lock().contains_key(dj_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> mpsc::UnboundedSender<DjOutbound> {
        let (tx, _rx) = mpsc::unbounded_channel();
        tx
    }

    #[test]
    fn add_then_take_round_trips() {
        let queue = PendingQueue::new();
        queue.add("alice".into(), "Alice".into(), false, sender());
        assert!(queue.contains("alice"));

        let taken = queue.take("alice").expect("present");
        assert_eq!(taken.dj_id, "alice");
        assert!(!queue.contains("alice"));
    }

    #[test]
    fn take_missing_returns_none() {
        let queue = PendingQueue::new();
        assert!(queue.take("ghost").is_none());
    }

    #[test]
    fn list_reflects_current_entries() {
        let queue = PendingQueue::new();
        queue.add("alice".into(), "Alice".into(), false, sender());
        queue.add("bob".into(), "Bob".into(), true, sender());
        let listed = queue.list();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().any(|p| p.dj_id == "bob" && p.direct_mode));
    }

    #[test]
    fn reconnect_while_pending_overwrites_entry() {
        let queue = PendingQueue::new();
        queue.add("alice".into(), "Alice".into(), false, sender());
        queue.add("alice".into(), "Alice Renamed".into(), true, sender());
        let taken = queue.take("alice").unwrap();
        assert_eq!(taken.dj_name, "Alice Renamed");
        assert!(taken.direct_mode);
    }
}
