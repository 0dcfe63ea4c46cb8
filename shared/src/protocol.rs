//! JSON wire protocol.
//!
//! Every frame is an envelope `{"type": ..., "payload": {...}}`. Decoding goes
//! through serde, so unknown types, missing fields and out-of-range enum values
//! are rejected at the boundary with a [`ProtocolError`] instead of surfacing
//! later as half-initialised state.

use crate::{DeathReason, Direction, GameMode, MapId, Position};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(serde_json::Error),
    #[error("Invalid message: {0}")]
    InvalidMessage(serde_json::Error),
    #[error("Encode error: {0}")]
    Encode(serde_json::Error),
    #[error("Unsupported frame: {0}")]
    UnsupportedFrame(&'static str),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        match err.classify() {
            serde_json::error::Category::Data => ProtocolError::InvalidMessage(err),
            _ => ProtocolError::InvalidJson(err),
        }
    }
}

/// Messages sent by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Direction-only input for server-simulated movement.
    Move { direction: Direction },
    /// Whole predicted snake for client-authoritative movement.
    PositionUpdate {
        segments: Vec<Position>,
        direction: Direction,
    },
    BoostUpdate {
        #[serde(rename = "isBoosting")]
        is_boosting: bool,
    },
    MapSelection {
        #[serde(rename = "mapId", default)]
        map_id: Option<MapId>,
    },
    GameModeUpdate { mode: GameMode },
    /// A client claiming its snake died; re-checked by the server.
    Died { reason: DeathReason },
    Ping { ts: u64 },
}

/// Messages sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    AssignId {
        id: u32,
    },
    GameState(GameSnapshot),
    AppleEat {
        #[serde(rename = "playerId")]
        player_id: u32,
        #[serde(rename = "newApple")]
        new_apple: Position,
    },
    Death {
        #[serde(rename = "playerId")]
        player_id: u32,
        reason: DeathReason,
        #[serde(
            rename = "collidedWith",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        collided_with: Option<u32>,
        #[serde(rename = "respawnDelay")]
        respawn_delay: u64,
    },
    Respawn {
        #[serde(rename = "playerId")]
        player_id: u32,
        position: Position,
        direction: Direction,
    },
    GameModeUpdate {
        mode: GameMode,
    },
    Pong {
        ts: u64,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub id: u32,
    pub segments: Vec<Position>,
    pub direction: Direction,
    pub hue: u16,
    pub size: u32,
    pub is_respawning: bool,
    pub is_boosting: bool,
    #[serde(default)]
    pub selected_map_id: Option<MapId>,
    /// Epoch milliseconds at which a respawning player comes back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub respawn_at: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub players: Vec<PlayerSnapshot>,
    pub apple: Position,
    pub grid_size: i32,
    pub game_mode: GameMode,
    pub current_map: MapId,
}

impl GameSnapshot {
    pub fn player(&self, id: u32) -> Option<&PlayerSnapshot> {
        self.players.iter().find(|p| p.id == id)
    }
}

pub fn decode_client(text: &str) -> Result<ClientMessage, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

pub fn decode_server(text: &str) -> Result<ServerMessage, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

pub fn encode<T: Serialize>(msg: &T) -> Result<String, ProtocolError> {
    serde_json::to_string(msg).map_err(ProtocolError::Encode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_move() {
        let msg = decode_client(r#"{"type":"move","payload":{"direction":"left"}}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Move {
                direction: Direction::Left
            }
        );
    }

    #[test]
    fn test_decode_position_update() {
        let msg = decode_client(
            r#"{"type":"position_update","payload":{"segments":[{"x":6,"y":5},{"x":5,"y":5}],"direction":"right"}}"#,
        )
        .unwrap();

        match msg {
            ClientMessage::PositionUpdate {
                segments,
                direction,
            } => {
                assert_eq!(segments, vec![Position::new(6, 5), Position::new(5, 5)]);
                assert_eq!(direction, Direction::Right);
            }
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_decode_map_selection_null_and_missing() {
        let cleared =
            decode_client(r#"{"type":"map_selection","payload":{"mapId":null}}"#).unwrap();
        assert_eq!(cleared, ClientMessage::MapSelection { map_id: None });

        let missing = decode_client(r#"{"type":"map_selection","payload":{}}"#).unwrap();
        assert_eq!(missing, ClientMessage::MapSelection { map_id: None });

        let voted =
            decode_client(r#"{"type":"map_selection","payload":{"mapId":"tunnels"}}"#).unwrap();
        assert_eq!(
            voted,
            ClientMessage::MapSelection {
                map_id: Some(MapId::Tunnels)
            }
        );
    }

    #[test]
    fn test_decode_boost_and_mode() {
        assert_eq!(
            decode_client(r#"{"type":"boost_update","payload":{"isBoosting":true}}"#).unwrap(),
            ClientMessage::BoostUpdate { is_boosting: true }
        );
        assert_eq!(
            decode_client(r#"{"type":"game_mode_update","payload":{"mode":"playing"}}"#)
                .unwrap(),
            ClientMessage::GameModeUpdate {
                mode: GameMode::Playing
            }
        );
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        let err = decode_client("{not json").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidJson(_)));
    }

    #[test]
    fn test_bad_shapes_are_rejected() {
        let bad = [
            r#"{"type":"teleport","payload":{}}"#,
            r#"{"type":"move","payload":{}}"#,
            r#"{"type":"move","payload":{"direction":"diagonal"}}"#,
            r#"{"type":"game_mode_update","payload":{"mode":"paused"}}"#,
            r#"{"payload":{"ts":1}}"#,
            r#"{"type":"ping","payload":{"ts":"soon"}}"#,
        ];
        for text in bad {
            let err = decode_client(text).unwrap_err();
            assert!(
                matches!(err, ProtocolError::InvalidMessage(_)),
                "expected shape error for {}",
                text
            );
        }
    }

    #[test]
    fn test_encode_death_omits_missing_collider() {
        let wall = encode(&ServerMessage::Death {
            player_id: 3,
            reason: DeathReason::Wall,
            collided_with: None,
            respawn_delay: 3000,
        })
        .unwrap();
        assert_eq!(
            wall,
            r#"{"type":"death","payload":{"playerId":3,"reason":"wall","respawnDelay":3000}}"#
        );

        let crash = encode(&ServerMessage::Death {
            player_id: 3,
            reason: DeathReason::OtherSnake,
            collided_with: Some(4),
            respawn_delay: 3000,
        })
        .unwrap();
        assert!(crash.contains(r#""collidedWith":4"#));
    }

    #[test]
    fn test_encode_game_state_field_names() {
        let snapshot = GameSnapshot {
            players: vec![PlayerSnapshot {
                id: 1,
                segments: vec![Position::new(5, 5)],
                direction: Direction::Right,
                hue: 137,
                size: 1,
                is_respawning: false,
                is_boosting: false,
                selected_map_id: None,
                respawn_at: None,
            }],
            apple: Position::new(7, 5),
            grid_size: 20,
            game_mode: GameMode::Selection,
            current_map: MapId::Classic,
        };

        let text = encode(&ServerMessage::GameState(snapshot.clone())).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "game_state");
        assert_eq!(value["payload"]["gridSize"], 20);
        assert_eq!(value["payload"]["gameMode"], "selection");
        assert_eq!(value["payload"]["currentMap"], "classic");
        assert_eq!(value["payload"]["players"][0]["isRespawning"], false);
        assert_eq!(value["payload"]["players"][0]["selectedMapId"], serde_json::Value::Null);

        match decode_server(&text).unwrap() {
            ServerMessage::GameState(decoded) => assert_eq!(decoded, snapshot),
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_encode_apple_eat() {
        let text = encode(&ServerMessage::AppleEat {
            player_id: 2,
            new_apple: Position::new(1, 9),
        })
        .unwrap();
        assert_eq!(
            text,
            r#"{"type":"apple_eat","payload":{"playerId":2,"newApple":{"x":1,"y":9}}}"#
        );
    }
}
