//! DJ roster & active selector (C5).
//!
//! The roster map, display queue, and `active_dj_id` must move together as
//! a unit (§5), so they live behind one `parking_lot::Mutex` wrapping a
//! single [`RosterInner`] value — this is the `dj_lock` the spec refers to.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::connection::DjConnection;

/// The roster map, display queue, and active DJ id — guarded together.
#[derive(Default)]
pub struct RosterInner {
    pub connections: HashMap<String, DjConnection>,
    pub queue: Vec<String>,
    pub active_dj_id: Option<String>,
}

impl RosterInner {
    /// Spec invariant 9: every id in the queue is present in the map and
    /// vice versa; `active_dj_id`, if set, is in the map.
    #[cfg(test)]
    fn check_consistency(&self) -> bool {
        let queue_set: std::collections::HashSet<_> = self.queue.iter().collect();
        let map_set: std::collections::HashSet<_> = self.connections.keys().collect();
        if queue_set != map_set {
            return false;
        }
        match &self.active_dj_id {
            Some(id) => self.connections.contains_key(id),
            None => true,
        }
    }

    /// Inserts a new connection at the back of the display queue. If the
    /// roster was empty before this insert, the new DJ becomes active
    /// (invariant 1: a non-empty roster always has exactly one active DJ).
    pub fn insert(&mut self, conn: DjConnection) {
        let was_empty = self.connections.is_empty();
        let id = conn.dj_id.clone();
        self.connections.insert(id.clone(), conn);
        if !self.queue.contains(&id) {
            self.queue.push(id);
        }
        if was_empty {
            self.active_dj_id = Some(id);
        }
    }

    /// Removes a connection, clearing `active_dj_id` if it was the one removed.
    /// Returns `true` if the removed DJ was active.
    pub fn remove(&mut self, id: &str) -> bool {
        self.connections.remove(id);
        self.queue.retain(|q| q != id);
        if self.active_dj_id.as_deref() == Some(id) {
            self.active_dj_id = None;
            true
        } else {
            false
        }
    }

    /// Sets the active DJ by id. No-op (with a warning) if the id is unknown.
    pub fn set_active(&mut self, id: &str) -> bool {
        if self.connections.contains_key(id) {
            self.active_dj_id = Some(id.to_string());
            true
        } else {
            log::warn!("[Roster] Cannot set active DJ: {id} not found");
            false
        }
    }

    /// Picks a replacement active DJ by lowest priority number among
    /// present ids (§4.4 auto-switch rule — priority wins over the
    /// operator-ordered display queue per the resolved Open Question).
    pub fn auto_switch(&mut self) -> Option<String> {
        let winner = self
            .connections
            .values()
            .min_by_key(|c| c.priority)
            .map(|c| c.dj_id.clone());
        if let Some(ref id) = winner {
            self.active_dj_id = Some(id.clone());
        }
        winner
    }

    /// Reorders the display queue to the given id sequence. Ids not
    /// present in the roster are dropped; missing roster ids are appended
    /// in their current relative order.
    pub fn reorder(&mut self, new_order: &[String]) {
        let mut reordered: Vec<String> = new_order
            .iter()
            .filter(|id| self.connections.contains_key(*id))
            .cloned()
            .collect();
        for existing in &self.queue {
            if !reordered.contains(existing) {
                reordered.push(existing.clone());
            }
        }
        self.queue = reordered;
    }

    pub fn get(&self, id: &str) -> Option<&DjConnection> {
        self.connections.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut DjConnection> {
        self.connections.get_mut(id)
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.active_dj_id.as_deref() == Some(id)
    }
}

/// Thread-safe roster guarding the roster map/queue/active id as a unit.
#[derive(Default)]
pub struct DjRoster {
    pub inner: Mutex<RosterInner>,
}

impl DjRoster {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    fn make_conn(id: &str, priority: i64) -> DjConnection {
        let (tx, _rx) = unbounded_channel();
        DjConnection::new(id.to_string(), id.to_string(), priority, false, tx)
    }

    #[test]
    fn insert_and_remove_keep_queue_and_map_consistent() {
        let mut roster = RosterInner::default();
        roster.insert(make_conn("alice", 10));
        roster.insert(make_conn("bob", 5));
        assert!(roster.check_consistency());

        roster.set_active("alice");
        assert!(roster.check_consistency());

        let was_active = roster.remove("alice");
        assert!(was_active);
        assert!(roster.check_consistency());
        assert!(roster.active_dj_id.is_none());
    }

    #[test]
    fn insert_into_empty_roster_activates_the_new_dj() {
        let mut roster = RosterInner::default();
        roster.insert(make_conn("alice", 10));
        assert_eq!(roster.active_dj_id.as_deref(), Some("alice"));

        // A second DJ joining a non-empty roster does not steal active.
        roster.insert(make_conn("bob", 5));
        assert_eq!(roster.active_dj_id.as_deref(), Some("alice"));
    }

    #[test]
    fn auto_switch_picks_lowest_priority_number() {
        let mut roster = RosterInner::default();
        roster.insert(make_conn("alice", 10));
        roster.insert(make_conn("bob", 5));
        roster.insert(make_conn("carol", 1));

        // Operator had reordered the display queue the other way.
        roster.reorder(&["alice".into(), "bob".into(), "carol".into()]);

        let winner = roster.auto_switch();
        assert_eq!(winner.as_deref(), Some("carol"));
    }

    #[test]
    fn set_active_unknown_id_is_noop() {
        let mut roster = RosterInner::default();
        roster.insert(make_conn("alice", 10));
        assert!(!roster.set_active("ghost"));
        assert!(roster.active_dj_id.is_none());
    }

    #[test]
    fn reorder_appends_missing_ids() {
        let mut roster = RosterInner::default();
        roster.insert(make_conn("alice", 10));
        roster.insert(make_conn("bob", 5));
        roster.reorder(&["bob".into()]);
        assert_eq!(roster.queue, vec!["bob".to_string(), "alice".to_string()]);
    }
}
