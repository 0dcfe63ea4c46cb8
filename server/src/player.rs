//! Per-player session state held by the engine.

use shared::{can_turn, hue_for, Direction, MapId, PlayerSnapshot, Position};

/// Lifecycle of a player's snake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifeState {
    Active,
    /// Dead and waiting; `deadline` is in epoch milliseconds.
    Respawning { deadline: u64 },
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: u32,
    /// Head first. Empty while respawning.
    pub segments: Vec<Position>,
    /// Direction of the last applied move.
    pub direction: Direction,
    /// Turn requested since the last move, applied on the next one.
    pub pending_direction: Option<Direction>,
    pub hue: u16,
    pub size: u32,
    pub boosting: bool,
    pub state: LifeState,
    pub map_vote: Option<MapId>,
    /// Engine ticks elapsed since this snake last moved.
    pub ticks_since_move: u32,
}

impl Player {
    pub fn new(id: u32, spawn: Position, direction: Direction) -> Self {
        Self {
            id,
            segments: vec![spawn],
            direction,
            pending_direction: None,
            hue: hue_for(id),
            size: 1,
            boosting: false,
            state: LifeState::Active,
            map_vote: None,
            ticks_since_move: 0,
        }
    }

    pub fn head(&self) -> Option<Position> {
        self.segments.first().copied()
    }

    pub fn is_active(&self) -> bool {
        self.state == LifeState::Active
    }

    pub fn is_respawning(&self) -> bool {
        matches!(self.state, LifeState::Respawning { .. })
    }

    pub fn respawn_deadline(&self) -> Option<u64> {
        match self.state {
            LifeState::Respawning { deadline } => Some(deadline),
            LifeState::Active => None,
        }
    }

    /// Records a turn for the next move. Reversals are dropped and reported as `false`.
    pub fn queue_direction(&mut self, requested: Direction) -> bool {
        if !can_turn(self.direction, requested, self.segments.len()) {
            return false;
        }
        self.pending_direction = Some(requested);
        true
    }

    /// Direction to use for the move happening now.
    pub fn take_direction(&mut self) -> Direction {
        if let Some(direction) = self.pending_direction.take() {
            self.direction = direction;
        }
        self.direction
    }

    /// Counts one engine tick and reports whether this snake moves on it.
    pub fn move_due(&mut self, boost_multiplier: u32) -> bool {
        let every = if self.boosting { 1 } else { boost_multiplier.max(1) };
        self.ticks_since_move += 1;
        if self.ticks_since_move >= every {
            self.ticks_since_move = 0;
            true
        } else {
            false
        }
    }

    pub fn kill(&mut self, deadline: u64) {
        self.segments.clear();
        self.pending_direction = None;
        self.ticks_since_move = 0;
        self.state = LifeState::Respawning { deadline };
    }

    pub fn revive(&mut self, spawn: Position, direction: Direction) {
        self.segments = vec![spawn];
        self.direction = direction;
        self.pending_direction = None;
        self.size = 1;
        self.ticks_since_move = 0;
        self.state = LifeState::Active;
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            id: self.id,
            segments: self.segments.clone(),
            direction: self.direction,
            hue: self.hue,
            size: self.size,
            is_respawning: self.is_respawning(),
            is_boosting: self.boosting,
            selected_map_id: self.map_vote,
            respawn_at: self.respawn_deadline(),
        }
    }
}
