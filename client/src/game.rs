//! Client-side prediction of the local snake and reconciliation with the server.

use crate::input::InputQueue;
use log::{debug, info};
use shared::rules::segment_difference;
use shared::{
    advance, can_turn, detect_collision, next_head, Collision, Direction, GameMode, GameSnapshot,
    MapId, MapLayout, Position, BOOST_MULTIPLIER, GRID_SIZE, PREDICTION_TICK_MS,
};
use std::fmt;
use std::time::Duration;

/// How authoritative segments are merged into the prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilePolicy {
    /// Soft-merge while at most this many indices disagree, hard reset beyond.
    Threshold(usize),
    /// Always adopt the server's segments.
    Strict,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        ReconcilePolicy::Threshold(2)
    }
}

impl ReconcilePolicy {
    /// Builds a policy from the `--reconcile` mode name and `--threshold` value.
    pub fn from_mode(mode: &str, threshold: usize) -> Result<Self, String> {
        match mode.to_ascii_lowercase().as_str() {
            "threshold" => Ok(ReconcilePolicy::Threshold(threshold)),
            "strict" => Ok(ReconcilePolicy::Strict),
            other => Err(format!("unknown reconcile mode '{}'", other)),
        }
    }
}

impl fmt::Display for ReconcilePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcilePolicy::Threshold(limit) => write!(f, "threshold({})", limit),
            ReconcilePolicy::Strict => write!(f, "strict"),
        }
    }
}

/// Outcome of merging one authoritative snapshot into the prediction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// First state since connecting or respawning, taken as-is.
    InitialSync(Vec<Position>),
    HardReset(Vec<Position>),
    /// Predicted head kept, server body adopted.
    SoftMerge(Vec<Position>),
    Unchanged,
}

impl Reconciliation {
    /// Segments to adopt, or `None` if the prediction stands.
    pub fn segments(&self) -> Option<&[Position]> {
        match self {
            Reconciliation::InitialSync(s)
            | Reconciliation::HardReset(s)
            | Reconciliation::SoftMerge(s) => Some(s),
            Reconciliation::Unchanged => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Reconciliation::InitialSync(_) => "initial sync",
            Reconciliation::HardReset(_) => "hard reset",
            Reconciliation::SoftMerge(_) => "soft merge",
            Reconciliation::Unchanged => "unchanged",
        }
    }
}

/// Merges authoritative segments into predicted ones. Pure and idempotent.
pub fn reconcile(
    predicted: &[Position],
    authoritative: &[Position],
    has_synced: bool,
    policy: ReconcilePolicy,
) -> Reconciliation {
    if !has_synced || predicted.is_empty() {
        return Reconciliation::InitialSync(authoritative.to_vec());
    }
    if predicted == authoritative {
        return Reconciliation::Unchanged;
    }

    match policy {
        ReconcilePolicy::Strict => Reconciliation::HardReset(authoritative.to_vec()),
        ReconcilePolicy::Threshold(limit) => {
            // The predicted head may sit on the server head or one cell ahead of it.
            if authoritative.is_empty()
                || predicted[0].distance(authoritative[0]) > 1
                || segment_difference(predicted, authoritative) > limit
            {
                return Reconciliation::HardReset(authoritative.to_vec());
            }

            let head = predicted[0];
            let mut merged = Vec::with_capacity(authoritative.len());
            merged.push(head);
            merged.extend(
                authoritative
                    .iter()
                    .copied()
                    .filter(|p| *p != head)
                    .take(authoritative.len() - 1),
            );
            if !is_linked(&merged, authoritative) {
                return Reconciliation::HardReset(authoritative.to_vec());
            }
            if merged == predicted {
                Reconciliation::Unchanged
            } else {
                Reconciliation::SoftMerge(merged)
            }
        }
    }
}

/// Every neighbour pair is one cell apart, or already consecutive in the
/// server's body (a teleporter crossing).
fn is_linked(segments: &[Position], authoritative: &[Position]) -> bool {
    segments.windows(2).all(|pair| {
        pair[0].distance(pair[1]) == 1
            || authoritative
                .windows(2)
                .any(|known| known[0] == pair[0] && known[1] == pair[1])
    })
}

/// Result of one local prediction tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictedMove {
    pub segments: Vec<Position>,
    pub direction: Direction,
    /// Set when the move hit a wall, the snake itself or another known snake.
    pub collision: Option<Collision>,
}

#[derive(Debug, Clone)]
pub struct Predictor {
    player_id: Option<u32>,
    segments: Vec<Position>,
    direction: Direction,
    inputs: InputQueue,
    boosting: bool,
    has_synced: bool,
    /// Server deadline while our snake is respawning.
    respawn_at: Option<u64>,
    /// Prediction paused after a locally detected collision until the server answers.
    halted: bool,
    apple: Option<Position>,
    others: Vec<(u32, Vec<Position>)>,
    grid_size: i32,
    map: MapId,
    layout: MapLayout,
    mode: GameMode,
    policy: ReconcilePolicy,
    base_tick: Duration,
}

impl Default for Predictor {
    fn default() -> Self {
        Self::new(
            ReconcilePolicy::default(),
            Duration::from_millis(PREDICTION_TICK_MS),
        )
    }
}

impl Predictor {
    pub fn new(policy: ReconcilePolicy, base_tick: Duration) -> Self {
        Self {
            player_id: None,
            segments: Vec::new(),
            direction: Direction::default(),
            inputs: InputQueue::default(),
            boosting: false,
            has_synced: false,
            respawn_at: None,
            halted: false,
            apple: None,
            others: Vec::new(),
            grid_size: GRID_SIZE,
            map: MapId::Classic,
            layout: MapLayout::classic(),
            mode: GameMode::Selection,
            policy,
            base_tick,
        }
    }

    pub fn player_id(&self) -> Option<u32> {
        self.player_id
    }

    /// Adopts a freshly assigned identity; the next snapshot is an initial sync.
    pub fn set_player_id(&mut self, player_id: u32) {
        self.player_id = Some(player_id);
        self.segments.clear();
        self.inputs.clear();
        self.has_synced = false;
        self.respawn_at = None;
        self.halted = false;
    }

    pub fn segments(&self) -> &[Position] {
        &self.segments
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn has_synced(&self) -> bool {
        self.has_synced
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn apple(&self) -> Option<Position> {
        self.apple
    }

    pub fn is_boosting(&self) -> bool {
        self.boosting
    }

    pub fn set_boosting(&mut self, boosting: bool) {
        self.boosting = boosting;
    }

    pub fn set_mode(&mut self, mode: GameMode) {
        if mode != self.mode {
            self.inputs.clear();
        }
        self.mode = mode;
    }

    pub fn set_apple(&mut self, apple: Position) {
        self.apple = Some(apple);
    }

    pub fn is_respawning(&self) -> bool {
        self.respawn_at.is_some()
    }

    /// Time left until the server revives us.
    pub fn respawn_countdown(&self, now: u64) -> Option<Duration> {
        self.respawn_at
            .map(|deadline| Duration::from_millis(deadline.saturating_sub(now)))
    }

    /// Interval between prediction ticks, shortened while boosting.
    pub fn tick_interval(&self) -> Duration {
        if self.boosting {
            self.base_tick.div_f32(BOOST_MULTIPLIER as f32)
        } else {
            self.base_tick
        }
    }

    /// Queues a turn for the coming ticks.
    pub fn queue_direction(&mut self, requested: Direction) -> bool {
        self.inputs
            .push(self.direction, requested, self.segments.len())
    }

    fn can_predict(&self) -> bool {
        self.mode == GameMode::Playing
            && self.has_synced
            && !self.halted
            && self.respawn_at.is_none()
            && !self.segments.is_empty()
    }

    /// Advances the local snake one cell with the shared rules.
    ///
    /// Returns `None` while there is nothing to predict.
    pub fn tick(&mut self) -> Option<PredictedMove> {
        if !self.can_predict() {
            return None;
        }

        if let Some(turn) = self.inputs.pop() {
            if can_turn(self.direction, turn, self.segments.len()) {
                self.direction = turn;
            }
        }

        let head = self.segments[0];
        let grows = self.apple == Some(next_head(head, self.direction, &self.layout));
        self.segments = advance(&self.segments, self.direction, grows, &self.layout);

        let others = self
            .others
            .iter()
            .map(|(id, segments)| (*id, segments.as_slice()));
        let collision = detect_collision(&self.segments, others, self.grid_size, &self.layout);
        if let Some(collision) = collision {
            debug!("Predicted {} collision, waiting for server", collision.reason);
            self.halted = true;
        }

        Some(PredictedMove {
            segments: self.segments.clone(),
            direction: self.direction,
            collision,
        })
    }

    /// Merges a full snapshot. Returns what happened to our own snake, if present.
    pub fn apply_snapshot(&mut self, snapshot: &GameSnapshot) -> Option<Reconciliation> {
        self.apple = Some(snapshot.apple);
        self.mode = snapshot.game_mode;
        if snapshot.current_map != self.map || snapshot.grid_size != self.grid_size {
            self.map = snapshot.current_map;
            self.grid_size = snapshot.grid_size;
            self.layout = MapLayout::load(self.map, self.grid_size);
        }

        let player_id = self.player_id?;
        self.others = snapshot
            .players
            .iter()
            .filter(|p| p.id != player_id && !p.is_respawning)
            .map(|p| (p.id, p.segments.clone()))
            .collect();

        let me = snapshot.player(player_id)?;
        if me.is_respawning {
            self.enter_respawn(me.respawn_at.unwrap_or(0));
            return None;
        }
        if self.respawn_at.is_some() {
            info!("Back in play at {:?}", me.segments.first());
            self.respawn_at = None;
            self.has_synced = false;
        }

        let outcome = if snapshot.game_mode != GameMode::Playing {
            Reconciliation::InitialSync(me.segments.clone())
        } else if self.halted && self.has_synced && self.segments != me.segments {
            // Still alive on the server: its view replaces the halted prediction.
            Reconciliation::HardReset(me.segments.clone())
        } else {
            reconcile(&self.segments, &me.segments, self.has_synced, self.policy)
        };

        if let Some(segments) = outcome.segments() {
            self.segments = segments.to_vec();
        }
        if matches!(
            outcome,
            Reconciliation::InitialSync(_) | Reconciliation::HardReset(_)
        ) {
            self.direction = me.direction;
            self.inputs.clear();
        }
        if self.halted {
            debug!("Server reports us alive, resuming prediction");
        }
        self.halted = false;
        self.has_synced = true;

        debug!(
            "Reconciled ({}), {} segments",
            outcome.label(),
            self.segments.len()
        );
        Some(outcome)
    }

    /// Handles a `death` event. Only our own death clears the prediction.
    pub fn apply_death(&mut self, player_id: u32, respawn_delay: u64, now: u64) {
        if Some(player_id) == self.player_id {
            self.enter_respawn(now + respawn_delay);
        } else {
            self.others.retain(|(id, _)| *id != player_id);
        }
    }

    /// Handles a `respawn` event. Our own respawn is the fresh position prediction resumes from.
    pub fn apply_respawn(&mut self, player_id: u32, position: Position, direction: Direction) {
        if Some(player_id) != self.player_id {
            return;
        }
        self.segments = vec![position];
        self.direction = direction;
        self.inputs.clear();
        self.respawn_at = None;
        self.halted = false;
        self.has_synced = true;
    }

    fn enter_respawn(&mut self, deadline: u64) {
        if self.respawn_at.is_none() {
            info!("Snake died, respawning at {}", deadline);
        }
        self.respawn_at = Some(deadline);
        self.segments.clear();
        self.inputs.clear();
        self.halted = false;
        self.has_synced = false;
    }
}
