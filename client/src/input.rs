//! Client input: the pending-turn queue and terminal command parsing.

use shared::{can_turn, Direction, MapId, MAX_QUEUED_INPUTS};
use std::collections::VecDeque;
use std::str::FromStr;

/// Bounded queue of direction changes waiting for the next prediction ticks.
///
/// Lets quick double turns (e.g. up then left) land on consecutive ticks
/// instead of the second overwriting the first.
#[derive(Debug, Clone)]
pub struct InputQueue {
    pending: VecDeque<Direction>,
    capacity: usize,
}

impl Default for InputQueue {
    fn default() -> Self {
        Self::new(MAX_QUEUED_INPUTS)
    }
}

impl InputQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Queues `requested` relative to the last queued turn, or `current` if none.
    ///
    /// Rejects duplicates, reversals of a multi-cell snake and pushes onto a full queue.
    pub fn push(&mut self, current: Direction, requested: Direction, length: usize) -> bool {
        if self.pending.len() >= self.capacity {
            return false;
        }
        let last = self.pending.back().copied().unwrap_or(current);
        if requested == last || !can_turn(last, requested, length) {
            return false;
        }
        self.pending.push_back(requested);
        true
    }

    pub fn pop(&mut self) -> Option<Direction> {
        self.pending.pop_front()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// One line typed by the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputCommand {
    Turn(Direction),
    ToggleBoost,
    /// `None` withdraws the vote.
    Vote(Option<MapId>),
    Play,
    Select,
    Quit,
}

impl FromStr for InputCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim().to_ascii_lowercase();
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Err("empty command".to_string());
        };

        match command {
            "b" | "boost" => Ok(InputCommand::ToggleBoost),
            "play" => Ok(InputCommand::Play),
            "select" => Ok(InputCommand::Select),
            "q" | "quit" | "exit" => Ok(InputCommand::Quit),
            "vote" => match words.next() {
                Some("none") => Ok(InputCommand::Vote(None)),
                Some(map) => MapId::from_str(map).map(|m| InputCommand::Vote(Some(m))),
                None => Err("usage: vote <classic|tunnels|portals|none>".to_string()),
            },
            other => Direction::from_str(other)
                .map(InputCommand::Turn)
                .map_err(|_| format!("unknown command '{}'", other)),
        }
    }
}
