//! FIFO queue of players waiting for an opponent.

use crate::conn::{ConnHandle, ConnId};
use std::collections::VecDeque;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct QueuedPlayer {
    pub token: String,
    pub conn: ConnHandle,
    pub display_name: Option<String>,
    pub joined_at: Instant,
}

#[derive(Debug, Default)]
pub struct Matchmaker {
    queue: VecDeque<QueuedPlayer>,
}

impl Matchmaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a player, or refresh the connection of one already waiting.
    /// Returns the 1-based queue position.
    pub fn join(&mut self, token: &str, conn: ConnHandle, display_name: Option<String>) -> u32 {
        if let Some(idx) = self.queue.iter().position(|p| p.token == token) {
            let entry = &mut self.queue[idx];
            entry.conn = conn;
            if display_name.is_some() {
                entry.display_name = display_name;
            }
            return idx as u32 + 1;
        }
        self.queue.push_back(QueuedPlayer {
            token: token.to_string(),
            conn,
            display_name,
            joined_at: Instant::now(),
        });
        self.queue.len() as u32
    }

    pub fn leave(&mut self, token: &str) -> bool {
        let before = self.queue.len();
        self.queue.retain(|p| p.token != token);
        self.queue.len() != before
    }

    /// Drop a waiting player whose socket closed, unless they already
    /// reconnected on a newer connection.
    pub fn on_disconnect(&mut self, token: &str, conn_id: ConnId) -> bool {
        let before = self.queue.len();
        self.queue
            .retain(|p| !(p.token == token && p.conn.id == conn_id));
        self.queue.len() != before
    }

    /// Pop the two longest-waiting players.
    pub fn try_pop_match(&mut self) -> Option<[QueuedPlayer; 2]> {
        if self.queue.len() < 2 {
            return None;
        }
        let first = self.queue.pop_front()?;
        let second = self.queue.pop_front()?;
        Some([first, second])
    }

    pub fn position(&self, token: &str) -> Option<u32> {
        self.queue
            .iter()
            .position(|p| p.token == token)
            .map(|idx| idx as u32 + 1)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> ConnHandle {
        ConnHandle::channel(4).0
    }

    #[test]
    fn join_reports_position() {
        let mut mm = Matchmaker::new();
        assert_eq!(mm.join("a", conn(), None), 1);
        assert_eq!(mm.join("b", conn(), Some("Bee".to_string())), 2);
        assert_eq!(mm.position("b"), Some(2));
        assert_eq!(mm.position("zz"), None);
    }

    #[test]
    fn rejoin_keeps_place_and_updates_conn() {
        let mut mm = Matchmaker::new();
        mm.join("a", conn(), None);
        mm.join("b", conn(), None);
        let fresh = conn();
        let fresh_id = fresh.id;
        assert_eq!(mm.join("a", fresh, None), 1);
        assert_eq!(mm.len(), 2);

        let [first, _] = mm.try_pop_match().unwrap();
        assert_eq!(first.token, "a");
        assert_eq!(first.conn.id, fresh_id);
    }

    #[test]
    fn pops_in_fifo_order() {
        let mut mm = Matchmaker::new();
        mm.join("a", conn(), None);
        assert!(mm.try_pop_match().is_none());
        mm.join("b", conn(), None);
        mm.join("c", conn(), None);

        let [p0, p1] = mm.try_pop_match().unwrap();
        assert_eq!((p0.token.as_str(), p1.token.as_str()), ("a", "b"));
        assert_eq!(mm.position("c"), Some(1));
        assert!(mm.try_pop_match().is_none());
    }

    #[test]
    fn leave_removes_entry() {
        let mut mm = Matchmaker::new();
        mm.join("a", conn(), None);
        assert!(mm.leave("a"));
        assert!(!mm.leave("a"));
        assert!(mm.is_empty());
    }

    #[test]
    fn disconnect_of_replaced_conn_keeps_entry() {
        let mut mm = Matchmaker::new();
        let old = conn();
        let old_id = old.id;
        mm.join("a", old, None);
        let new = conn();
        let new_id = new.id;
        mm.join("a", new, None);

        assert!(!mm.on_disconnect("a", old_id));
        assert_eq!(mm.len(), 1);
        assert!(mm.on_disconnect("a", new_id));
        assert!(mm.is_empty());
    }
}
