//! Integration tests for the snake server, client predictor and shared rules
//!
//! These tests validate cross-crate interactions and real WebSocket behavior.

use client::game::{reconcile, Predictor, ReconcilePolicy, Reconciliation};
use client::input::InputCommand;
use client::network::{Client, ClientConfig};
use futures_util::{SinkExt, StreamExt};
use rand::rngs::StdRng;
use rand::SeedableRng;
use server::config::ServerConfig;
use server::game::{Dispatch, GameConfig, GameEngine};
use server::movement::{authority_for, MovementInput};
use server::network::Server;
use shared::{
    decode_client, decode_server, encode, ClientMessage, DeathReason, Direction, GameMode, MapId,
    MovementKind, Position, ProtocolError, ServerMessage,
};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message};

fn engine(kind: MovementKind) -> GameEngine {
    GameEngine::with_rng(
        GameConfig::default(),
        authority_for(kind),
        StdRng::seed_from_u64(2024),
    )
}

fn place(engine: &mut GameEngine, id: u32, cells: &[(i32, i32)], direction: Direction) {
    let player = engine.player_mut(id).unwrap();
    player.segments = cells.iter().map(|&(x, y)| Position::new(x, y)).collect();
    player.size = player.segments.len() as u32;
    player.direction = direction;
    player.ticks_since_move = 0;
}

/// Ticks until a normal-speed snake has moved exactly once.
fn step(engine: &mut GameEngine, now: u64) -> Vec<Dispatch> {
    let mut out = Vec::new();
    for _ in 0..engine.config().boost_multiplier {
        out.extend(engine.tick(now));
    }
    out
}

/// WIRE PROTOCOL TESTS
mod protocol_tests {
    use super::*;
    use serde_json::Value;
    use tokio_test::assert_ok;

    /// Tests the `{type, payload}` envelope and camelCase payload fields
    #[test]
    fn envelope_shape() {
        let text = encode(&ServerMessage::Death {
            player_id: 3,
            reason: DeathReason::SelfCollision,
            collided_with: None,
            respawn_delay: 3000,
        })
        .unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["type"], "death");
        assert_eq!(value["payload"]["playerId"], 3);
        assert_eq!(value["payload"]["reason"], "self");
        assert_eq!(value["payload"]["respawnDelay"], 3000);
        assert!(value["payload"].get("collidedWith").is_none());
    }

    /// Tests decoding of messages as a browser client would send them
    #[test]
    fn decode_client_messages() {
        let move_msg = assert_ok!(decode_client(
            r#"{"type":"move","payload":{"direction":"up"}}"#
        ));
        assert_eq!(
            move_msg,
            ClientMessage::Move {
                direction: Direction::Up
            }
        );

        let vote = assert_ok!(decode_client(
            r#"{"type":"map_selection","payload":{"mapId":null}}"#
        ));
        assert_eq!(vote, ClientMessage::MapSelection { map_id: None });

        let update = assert_ok!(decode_client(
            r#"{"type":"position_update","payload":{"segments":[{"x":1,"y":2}],"direction":"left"}}"#
        ));
        assert_eq!(
            update,
            ClientMessage::PositionUpdate {
                segments: vec![Position::new(1, 2)],
                direction: Direction::Left
            }
        );
    }

    /// Tests that malformed frames produce typed errors instead of panics
    #[test]
    fn malformed_frames_rejected() {
        assert!(matches!(
            decode_client("{not json"),
            Err(ProtocolError::InvalidJson(_))
        ));
        assert!(matches!(
            decode_client(r#"{"type":"teleport","payload":{}}"#),
            Err(ProtocolError::InvalidMessage(_))
        ));
        assert!(matches!(
            decode_client(r#"{"type":"move","payload":{"direction":"sideways"}}"#),
            Err(ProtocolError::InvalidMessage(_))
        ));
        assert!(matches!(
            decode_client(r#"{"type":"boost_update","payload":{}}"#),
            Err(ProtocolError::InvalidMessage(_))
        ));
    }

    /// Tests a full snapshot survives the wire as the client sees it
    #[test]
    fn snapshot_over_the_wire() {
        let mut engine = engine(MovementKind::Server);
        engine.add_player(1).unwrap();
        engine.add_player(2).unwrap();
        engine.select_map(2, Some(MapId::Portals)).unwrap();

        let text = encode(&ServerMessage::GameState(engine.snapshot())).unwrap();
        match decode_server(&text).unwrap() {
            ServerMessage::GameState(snapshot) => {
                assert_eq!(snapshot, engine.snapshot());
                assert_eq!(
                    snapshot.player(2).unwrap().selected_map_id,
                    Some(MapId::Portals)
                );
            }
            other => panic!("Unexpected message: {:?}", other),
        }
    }
}

/// AUTHORITATIVE ENGINE SCENARIOS
mod game_logic_tests {
    use super::*;

    /// Tests that reversals never change the heading of a multi-cell snake
    #[test]
    fn reversal_never_applies() {
        for heading in Direction::ALL {
            let mut engine = engine(MovementKind::Server);
            engine.add_player(1).unwrap();
            engine.set_game_mode(GameMode::Playing);
            engine.place_apple(Position::new(0, 0));

            let head = Position::new(10, 10);
            let neck = head.step(heading.opposite());
            place(&mut engine, 1, &[(head.x, head.y), (neck.x, neck.y)], heading);

            engine
                .apply_movement(1, MovementInput::Direction(heading.opposite()), 0)
                .unwrap();
            step(&mut engine, 0);

            let player = engine.player(1).unwrap();
            assert_eq!(player.direction, heading);
            assert_eq!(player.segments[0], head.step(heading));
        }
    }

    /// Tests the basic move and apple scenarios end to end
    #[test]
    fn move_and_eat() {
        let mut engine = engine(MovementKind::Server);
        engine.add_player(1).unwrap();
        engine.set_game_mode(GameMode::Playing);
        engine.place_apple(Position::new(7, 5));
        place(&mut engine, 1, &[(5, 5)], Direction::Right);

        step(&mut engine, 0);
        assert_eq!(engine.player(1).unwrap().segments, vec![Position::new(6, 5)]);

        let events = step(&mut engine, 0);
        let player = engine.player(1).unwrap();
        assert_eq!(player.size, 2);
        assert_eq!(player.segments.len(), 2);
        assert_ne!(engine.apple(), Position::new(7, 5));
        assert!(events
            .iter()
            .any(|d| matches!(d, Dispatch::Broadcast(ServerMessage::AppleEat { .. }))));
    }

    /// Tests that a hook-shaped snake biting itself respawns
    #[test]
    fn self_collision() {
        let mut engine = engine(MovementKind::Server);
        engine.add_player(1).unwrap();
        engine.set_game_mode(GameMode::Playing);
        engine.place_apple(Position::new(0, 0));
        place(
            &mut engine,
            1,
            &[(5, 5), (6, 5), (6, 6), (5, 6), (4, 6)],
            Direction::Left,
        );

        engine
            .apply_movement(1, MovementInput::Direction(Direction::Down), 0)
            .unwrap();
        let events = step(&mut engine, 0);

        assert!(engine.player(1).unwrap().is_respawning());
        assert!(events.contains(&Dispatch::Broadcast(ServerMessage::Death {
            player_id: 1,
            reason: DeathReason::SelfCollision,
            collided_with: None,
            respawn_delay: 3000,
        })));
    }

    /// Tests the tie-break between tunnels and classic
    #[test]
    fn vote_tie_prefers_earliest_player() {
        let mut engine = engine(MovementKind::Server);
        engine.add_player(1).unwrap();
        engine.add_player(2).unwrap();
        engine.select_map(1, Some(MapId::Tunnels)).unwrap();
        engine.select_map(2, Some(MapId::Classic)).unwrap();

        engine.set_game_mode(GameMode::Playing);
        assert_eq!(engine.current_map(), MapId::Tunnels);
        assert_eq!(engine.snapshot().current_map, MapId::Tunnels);
    }

    /// Tests respawn timing and the disconnect-while-respawning path
    #[test]
    fn respawn_lifecycle() {
        let mut engine = engine(MovementKind::Server);
        engine.add_player(1).unwrap();
        engine.add_player(2).unwrap();
        engine.set_game_mode(GameMode::Playing);
        engine.place_apple(Position::new(10, 10));
        place(&mut engine, 1, &[(0, 0)], Direction::Up);
        place(&mut engine, 2, &[(19, 19)], Direction::Down);

        step(&mut engine, 50_000);
        assert!(engine.player(1).unwrap().is_respawning());
        assert!(engine.player(2).unwrap().is_respawning());

        engine.remove_player(2);
        assert!(engine.poll_respawns(52_999).is_empty());

        let events = engine.poll_respawns(53_000);
        assert_eq!(events.len(), 1);
        let player = engine.player(1).unwrap();
        assert!(player.is_active());
        assert_eq!(player.segments.len(), 1);
        assert_ne!(player.segments[0], engine.apple());
        assert!(engine.next_respawn_at().is_none());
    }

    /// Tests client-submitted movement with server-side validation
    #[test]
    fn client_submitted_movement() {
        let mut engine = engine(MovementKind::Client);
        engine.add_player(1).unwrap();
        engine.set_game_mode(GameMode::Playing);
        engine.place_apple(Position::new(0, 0));
        place(&mut engine, 1, &[(3, 3)], Direction::Right);

        let events = engine
            .handle_message(
                1,
                ClientMessage::PositionUpdate {
                    segments: vec![Position::new(4, 3)],
                    direction: Direction::Right,
                },
                0,
            )
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(engine.player(1).unwrap().segments, vec![Position::new(4, 3)]);

        // Direction-only input is not accepted in this mode.
        assert!(engine
            .handle_message(
                1,
                ClientMessage::Move {
                    direction: Direction::Up
                },
                0
            )
            .is_err());

        // Leaving the grid is a wall death even if the client never reports it.
        engine
            .handle_message(
                1,
                ClientMessage::PositionUpdate {
                    segments: vec![Position::new(4, -1)],
                    direction: Direction::Up,
                },
                0,
            )
            .unwrap();
        assert!(engine.player(1).unwrap().is_respawning());
    }
}

/// PREDICTION AND RECONCILIATION TESTS
mod client_server_tests {
    use super::*;

    /// Tests that the predictor and the engine agree step for step
    #[test]
    fn prediction_tracks_engine() {
        let mut engine = engine(MovementKind::Server);
        engine.add_player(1).unwrap();
        engine.set_game_mode(GameMode::Playing);
        engine.place_apple(Position::new(9, 4));
        place(&mut engine, 1, &[(5, 5), (4, 5)], Direction::Right);

        let mut predictor = Predictor::default();
        predictor.set_player_id(1);
        predictor.apply_snapshot(&engine.snapshot());

        // (6,5) -> (6,4) -> (7,4) -> (8,4) -> (9,4) eats -> (10,4)
        let turns = [
            None,
            Some(Direction::Up),
            Some(Direction::Right),
            None,
            None,
            None,
        ];
        for turn in turns {
            if let Some(direction) = turn {
                assert!(predictor.queue_direction(direction));
            }
            let predicted = predictor.tick().unwrap();
            engine
                .apply_movement(1, MovementInput::Direction(predicted.direction), 0)
                .unwrap();
            step(&mut engine, 0);

            let authoritative = &engine.player(1).unwrap().segments;
            assert_eq!(&predicted.segments, authoritative);
            assert_eq!(
                predictor.apply_snapshot(&engine.snapshot()),
                Some(Reconciliation::Unchanged)
            );
        }

        // The apple at (9, 4) was eaten on the fifth step.
        let size = engine.player(1).unwrap().size;
        assert!(size >= 3);
        assert_ne!(engine.apple(), Position::new(9, 4));
        assert_eq!(predictor.segments().len(), size as usize);
    }

    /// Tests that a diverged prediction is reset by a snapshot
    #[test]
    fn divergence_is_corrected() {
        let predicted = vec![Position::new(12, 3), Position::new(11, 3), Position::new(10, 3)];
        let server = vec![Position::new(4, 8), Position::new(4, 9), Position::new(4, 10)];

        for policy in [ReconcilePolicy::Threshold(2), ReconcilePolicy::Strict] {
            assert_eq!(
                reconcile(&predicted, &server, true, policy),
                Reconciliation::HardReset(server.clone())
            );
        }
    }

    /// Tests the move cadence derived from the shared constants
    #[test]
    fn move_cadence() {
        let normal = 1000.0 / (shared::ENGINE_TICK_MS * shared::BOOST_MULTIPLIER as u64) as f64;
        let boosted = 1000.0 / shared::ENGINE_TICK_MS as f64;
        assert_approx_eq::assert_approx_eq!(normal, 6.667, 1e-3);
        assert_approx_eq::assert_approx_eq!(boosted / normal, 2.0, 1e-9);

        let mut predictor = Predictor::default();
        let base = predictor.tick_interval().as_secs_f64();
        predictor.set_boosting(true);
        assert_approx_eq::assert_approx_eq!(base / predictor.tick_interval().as_secs_f64(), 2.0, 1e-6);
    }
}

/// REAL WEBSOCKET TESTS
mod websocket_tests {
    use super::*;
    use futures_util::stream::SplitStream;
    use tokio::net::TcpStream;
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

    type WsRead = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

    async fn start_server(max_clients: usize) -> String {
        let mut config = ServerConfig::default();
        config.port = 0;
        config.max_clients = max_clients;
        let server = Server::bind(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = server.run().await;
        });
        format!("ws://{}", addr)
    }

    async fn next_message(read: &mut WsRead) -> ServerMessage {
        loop {
            let frame = timeout(Duration::from_secs(5), read.next())
                .await
                .expect("Timed out waiting for server")
                .expect("Stream ended")
                .expect("Socket error");
            if let Message::Text(text) = frame {
                return decode_server(&text).unwrap();
            }
        }
    }

    /// Tests connect, identity, ping and tolerance of malformed frames
    #[tokio::test]
    async fn session_lifecycle() {
        let url = start_server(4).await;
        let (socket, _) = connect_async(url.as_str()).await.unwrap();
        let (mut write, mut read) = socket.split();

        assert_eq!(next_message(&mut read).await, ServerMessage::AssignId { id: 1 });
        match next_message(&mut read).await {
            ServerMessage::GameState(snapshot) => {
                assert_eq!(snapshot.players.len(), 1);
                assert_eq!(snapshot.game_mode, GameMode::Selection);
            }
            other => panic!("Expected game_state, got {:?}", other),
        }

        write
            .send(Message::Text("{definitely not json".to_string()))
            .await
            .unwrap();
        let ping = encode(&ClientMessage::Ping { ts: 77 }).unwrap();
        write.send(Message::Text(ping)).await.unwrap();

        loop {
            match next_message(&mut read).await {
                ServerMessage::Pong { ts } => {
                    assert_eq!(ts, 77);
                    break;
                }
                ServerMessage::GameState(_) => continue,
                other => panic!("Unexpected message: {:?}", other),
            }
        }
    }

    /// Tests that connections beyond capacity are refused with an error
    #[tokio::test]
    async fn capacity_limit() {
        let url = start_server(1).await;
        let (first, _) = connect_async(url.as_str()).await.unwrap();
        let (_first_write, mut first_read) = first.split();
        assert_eq!(next_message(&mut first_read).await, ServerMessage::AssignId { id: 1 });

        let (second, _) = connect_async(url.as_str()).await.unwrap();
        let (_second_write, mut second_read) = second.split();
        assert_eq!(
            next_message(&mut second_read).await,
            ServerMessage::Error {
                message: "Server full".to_string()
            }
        );
    }

    /// Tests the headless client against a live server
    #[tokio::test]
    async fn client_starts_a_game() {
        let url = start_server(4).await;
        let mut client = Client::new(ClientConfig {
            server_url: url,
            movement: MovementKind::Server,
            policy: ReconcilePolicy::default(),
            tick: Duration::from_millis(150),
            ping_interval: Duration::from_millis(100),
        });

        let (commands, rx) = tokio::sync::mpsc::unbounded_channel();
        tokio::spawn(async move {
            sleep(Duration::from_millis(200)).await;
            let _ = commands.send(InputCommand::Vote(Some(MapId::Portals)));
            let _ = commands.send(InputCommand::Play);
            sleep(Duration::from_millis(500)).await;
            let _ = commands.send(InputCommand::Quit);
        });

        timeout(Duration::from_secs(5), client.run(rx))
            .await
            .expect("Client did not quit")
            .unwrap();

        let predictor = client.predictor();
        assert_eq!(predictor.player_id(), Some(1));
        assert_eq!(predictor.mode(), GameMode::Playing);
        assert!(predictor.has_synced());
        assert!(client.rtt_ms().is_some());
    }
}
