//! Types and rules shared by the snake server and its predicting clients.
//!
//! Everything that must behave identically on both sides of the wire lives
//! here: grid geometry, the movement and collision rules, map layouts and the
//! JSON protocol. The server uses these rules authoritatively; the client runs
//! the very same functions to predict its own snake between snapshots.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod maps;
pub mod protocol;
pub mod rules;

pub use maps::{MapId, MapLayout, Teleporter, Tunnel};
pub use protocol::{
    decode_client, decode_server, encode, ClientMessage, GameSnapshot, PlayerSnapshot,
    ProtocolError, ServerMessage,
};
pub use rules::{advance, can_turn, detect_collision, hits_self, hits_wall, next_head};

pub const GRID_SIZE: i32 = 20;
pub const MIN_GRID_SIZE: i32 = 8;
pub const RESPAWN_DELAY_MS: u64 = 3000;
pub const BROADCAST_INTERVAL_MS: u64 = 100;
/// One engine tick. Normal snakes move every `BOOST_MULTIPLIER` ticks.
pub const ENGINE_TICK_MS: u64 = 75;
pub const BOOST_MULTIPLIER: u32 = 2;
pub const PREDICTION_TICK_MS: u64 = ENGINE_TICK_MS * BOOST_MULTIPLIER as u64;
pub const MAX_QUEUED_INPUTS: usize = 2;
pub const HUE_STEP: u32 = 137;

/// A cell on the square grid. Coordinates grow rightwards and downwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Returns the neighbouring cell one step in `direction`.
    pub fn step(&self, direction: Direction) -> Position {
        let (dx, dy) = direction.delta();
        Position::new(self.x + dx, self.y + dy)
    }

    /// Returns this cell shifted by an arbitrary offset.
    pub fn translate(&self, dx: i32, dy: i32) -> Position {
        Position::new(self.x + dx, self.y + dy)
    }

    pub fn in_bounds(&self, grid_size: i32) -> bool {
        (0..grid_size).contains(&self.x) && (0..grid_size).contains(&self.y)
    }

    /// Manhattan distance, ignoring teleporters.
    pub fn distance(&self, other: Position) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    #[default]
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    pub fn is_opposite(&self, other: Direction) -> bool {
        self.opposite() == other
    }

    /// Unit vector of this direction in grid coordinates.
    pub fn delta(&self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" | "w" => Ok(Direction::Up),
            "down" | "s" => Ok(Direction::Down),
            "left" | "a" => Ok(Direction::Left),
            "right" | "d" => Ok(Direction::Right),
            other => Err(format!("unknown direction '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    #[default]
    Selection,
    Playing,
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameMode::Selection => write!(f, "selection"),
            GameMode::Playing => write!(f, "playing"),
        }
    }
}

/// Who decides where a snake goes.
///
/// `Server`: clients send directions and the engine steps snakes on its own tick.
/// `Client`: clients send their predicted segments and the engine re-checks them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MovementKind {
    #[default]
    Server,
    Client,
}

impl fmt::Display for MovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MovementKind::Server => write!(f, "server"),
            MovementKind::Client => write!(f, "client"),
        }
    }
}

impl FromStr for MovementKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "server" => Ok(MovementKind::Server),
            "client" => Ok(MovementKind::Client),
            other => Err(format!("unknown movement authority '{}'", other)),
        }
    }
}

/// Why a snake died.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeathReason {
    Wall,
    #[serde(rename = "self")]
    SelfCollision,
    OtherSnake,
}

impl fmt::Display for DeathReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeathReason::Wall => write!(f, "wall"),
            DeathReason::SelfCollision => write!(f, "self"),
            DeathReason::OtherSnake => write!(f, "other_snake"),
        }
    }
}

/// Outcome of a collision check; `collided_with` names the other snake when there is one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collision {
    pub reason: DeathReason,
    pub collided_with: Option<u32>,
}

impl Collision {
    pub fn wall() -> Self {
        Self {
            reason: DeathReason::Wall,
            collided_with: None,
        }
    }

    pub fn with_self() -> Self {
        Self {
            reason: DeathReason::SelfCollision,
            collided_with: None,
        }
    }

    pub fn with_snake(other: u32) -> Self {
        Self {
            reason: DeathReason::OtherSnake,
            collided_with: Some(other),
        }
    }
}

/// Hue for a player id, spread around the colour wheel by a fixed step.
pub fn hue_for(player_id: u32) -> u16 {
    (player_id.wrapping_mul(HUE_STEP) % 360) as u16
}
