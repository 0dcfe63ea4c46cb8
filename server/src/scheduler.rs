//! Time-ordered queue of pending respawns.
//!
//! Each player has at most one entry. Removing a player cancels its entry, so a
//! disconnect can never be followed by a respawn for that id.

use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Default)]
pub struct RespawnQueue {
    by_deadline: BTreeSet<(u64, u32)>,
    by_player: HashMap<u32, u64>,
}

impl RespawnQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `player_id` at `deadline` (epoch ms), replacing any earlier entry.
    pub fn schedule(&mut self, player_id: u32, deadline: u64) {
        self.cancel(player_id);
        self.by_deadline.insert((deadline, player_id));
        self.by_player.insert(player_id, deadline);
    }

    /// Drops the entry for `player_id`. Returns whether one existed.
    pub fn cancel(&mut self, player_id: u32) -> bool {
        match self.by_player.remove(&player_id) {
            Some(deadline) => self.by_deadline.remove(&(deadline, player_id)),
            None => false,
        }
    }

    pub fn contains(&self, player_id: u32) -> bool {
        self.by_player.contains_key(&player_id)
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.by_deadline.first().map(|(deadline, _)| *deadline)
    }

    /// Removes and returns every player whose deadline is at or before `now`, earliest first.
    pub fn pop_due(&mut self, now: u64) -> Vec<u32> {
        let mut due = Vec::new();
        while let Some(&(deadline, player_id)) = self.by_deadline.first() {
            if deadline > now {
                break;
            }
            self.by_deadline.pop_first();
            self.by_player.remove(&player_id);
            due.push(player_id);
        }
        due
    }

    pub fn len(&self) -> usize {
        self.by_player.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_player.is_empty()
    }
}
