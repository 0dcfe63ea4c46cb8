//! Movement authorities.
//!
//! The engine never decides on its own how a movement message turns into a
//! move. It asks the configured [`MovementAuthority`], which answers with a
//! [`Proposal`]; the engine then applies the shared collision and apple rules to
//! whatever was proposed. Swapping the authority therefore changes who is
//! trusted without touching the rules.

use crate::game::EngineError;
use crate::player::Player;
use shared::{Direction, MovementKind, Position};
use std::fmt;

/// Movement payload received from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MovementInput {
    Direction(Direction),
    Segments {
        segments: Vec<Position>,
        direction: Direction,
    },
}

impl MovementInput {
    fn label(&self) -> &'static str {
        match self {
            MovementInput::Direction(_) => "direction",
            MovementInput::Segments { .. } => "segment",
        }
    }
}

/// What the engine should do with a player right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Proposal {
    Hold,
    /// Step the snake one cell in this direction.
    Advance(Direction),
    /// Adopt client-computed segments, subject to validation.
    Replace {
        segments: Vec<Position>,
        direction: Direction,
    },
}

pub trait MovementAuthority: Send + fmt::Debug {
    fn kind(&self) -> MovementKind;

    /// Handles one movement message from an active player.
    fn on_input(&self, player: &mut Player, input: MovementInput)
        -> Result<Proposal, EngineError>;

    /// Called once per engine tick for every active player.
    fn on_tick(&self, player: &mut Player, boost_multiplier: u32) -> Proposal;
}

/// Clients send directions; snakes move on the engine tick.
#[derive(Debug, Default)]
pub struct ServerSimulated;

impl MovementAuthority for ServerSimulated {
    fn kind(&self) -> MovementKind {
        MovementKind::Server
    }

    fn on_input(
        &self,
        player: &mut Player,
        input: MovementInput,
    ) -> Result<Proposal, EngineError> {
        match input {
            MovementInput::Direction(direction) => {
                // Reversals are ignored, the snake keeps its heading.
                player.queue_direction(direction);
                Ok(Proposal::Hold)
            }
            other => Err(EngineError::UnsupportedMovement(other.label(), self.kind())),
        }
    }

    fn on_tick(&self, player: &mut Player, boost_multiplier: u32) -> Proposal {
        if player.move_due(boost_multiplier) {
            Proposal::Advance(player.take_direction())
        } else {
            Proposal::Hold
        }
    }
}

/// Clients send their own next segments every tick; the engine only re-checks them.
#[derive(Debug, Default)]
pub struct ClientSubmitted;

impl MovementAuthority for ClientSubmitted {
    fn kind(&self) -> MovementKind {
        MovementKind::Client
    }

    fn on_input(
        &self,
        _player: &mut Player,
        input: MovementInput,
    ) -> Result<Proposal, EngineError> {
        match input {
            MovementInput::Segments {
                segments,
                direction,
            } => {
                if segments.is_empty() {
                    return Err(EngineError::EmptySegments);
                }
                Ok(Proposal::Replace {
                    segments,
                    direction,
                })
            }
            other => Err(EngineError::UnsupportedMovement(other.label(), self.kind())),
        }
    }

    fn on_tick(&self, _player: &mut Player, _boost_multiplier: u32) -> Proposal {
        Proposal::Hold
    }
}

pub fn authority_for(kind: MovementKind) -> Box<dyn MovementAuthority> {
    match kind {
        MovementKind::Server => Box::new(ServerSimulated),
        MovementKind::Client => Box::new(ClientSubmitted),
    }
}
