use crate::game::{Predictor, ReconcilePolicy};
use crate::input::InputCommand;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{decode_server, encode, ClientMessage, GameMode, MovementKind, ServerMessage};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL, e.g. `ws://127.0.0.1:8080`
    pub server_url: String,
    /// Must match the server's `--movement`.
    pub movement: MovementKind,
    pub policy: ReconcilePolicy,
    /// Prediction tick at normal speed.
    pub tick: Duration,
    pub ping_interval: Duration,
}

fn timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

/// Headless client: predicts the local snake and talks to the server.
pub struct Client {
    config: ClientConfig,
    predictor: Predictor,
    rtt_ms: Option<u64>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        let predictor = Predictor::new(config.policy, config.tick);
        Self {
            config,
            predictor,
            rtt_ms: None,
        }
    }

    pub fn predictor(&self) -> &Predictor {
        &self.predictor
    }

    pub fn rtt_ms(&self) -> Option<u64> {
        self.rtt_ms
    }

    /// Applies one server message to the local state.
    pub fn handle_server_message(&mut self, message: ServerMessage, now: u64) {
        let me = self.predictor.player_id();
        match message {
            ServerMessage::AssignId { id } => {
                info!("Connected! Player ID: {}", id);
                self.predictor.set_player_id(id);
            }
            ServerMessage::GameState(snapshot) => {
                self.predictor.apply_snapshot(&snapshot);
            }
            ServerMessage::AppleEat {
                player_id,
                new_apple,
            } => {
                if Some(player_id) == me {
                    info!("Ate the apple, next one at {}", new_apple);
                }
                self.predictor.set_apple(new_apple);
            }
            ServerMessage::Death {
                player_id,
                reason,
                collided_with,
                respawn_delay,
            } => {
                if Some(player_id) == me {
                    match collided_with {
                        Some(other) => info!("Died ({}) hitting player {}", reason, other),
                        None => info!("Died ({})", reason),
                    }
                } else {
                    debug!("Player {} died ({})", player_id, reason);
                }
                self.predictor.apply_death(player_id, respawn_delay, now);
            }
            ServerMessage::Respawn {
                player_id,
                position,
                direction,
            } => {
                if Some(player_id) == me {
                    info!("Respawned at {} heading {:?}", position, direction);
                }
                self.predictor.apply_respawn(player_id, position, direction);
            }
            ServerMessage::GameModeUpdate { mode } => {
                info!("Game mode: {}", mode);
                self.predictor.set_mode(mode);
            }
            ServerMessage::Pong { ts } => {
                let rtt = now.saturating_sub(ts);
                debug!("RTT {}ms", rtt);
                self.rtt_ms = Some(rtt);
            }
            ServerMessage::Error { message } => {
                error!("Server error: {}", message);
            }
        }
    }

    /// Turns a typed command into messages for the server. `None` means quit.
    pub fn handle_command(&mut self, command: InputCommand) -> Option<Vec<ClientMessage>> {
        let messages = match command {
            InputCommand::Turn(direction) => {
                if !self.predictor.queue_direction(direction) {
                    debug!("Ignored turn {:?}", direction);
                }
                Vec::new()
            }
            InputCommand::ToggleBoost => {
                let boosting = !self.predictor.is_boosting();
                self.predictor.set_boosting(boosting);
                info!("Boost {}", if boosting { "on" } else { "off" });
                vec![ClientMessage::BoostUpdate {
                    is_boosting: boosting,
                }]
            }
            InputCommand::Vote(map_id) => vec![ClientMessage::MapSelection { map_id }],
            InputCommand::Play => vec![ClientMessage::GameModeUpdate {
                mode: GameMode::Playing,
            }],
            InputCommand::Select => vec![ClientMessage::GameModeUpdate {
                mode: GameMode::Selection,
            }],
            InputCommand::Quit => return None,
        };
        Some(messages)
    }

    /// Runs one prediction tick and returns what to report to the server.
    pub fn on_tick(&mut self) -> Vec<ClientMessage> {
        let Some(step) = self.predictor.tick() else {
            return Vec::new();
        };
        debug!("Predicted head {:?}", step.segments.first());

        match self.config.movement {
            MovementKind::Server => vec![ClientMessage::Move {
                direction: step.direction,
            }],
            MovementKind::Client => {
                let mut messages = vec![ClientMessage::PositionUpdate {
                    segments: step.segments,
                    direction: step.direction,
                }];
                if let Some(collision) = step.collision {
                    messages.push(ClientMessage::Died {
                        reason: collision.reason,
                    });
                }
                messages
            }
        }
    }

    /// Connects and runs until quit, server close or a socket error.
    pub async fn run(
        &mut self,
        mut commands: mpsc::UnboundedReceiver<InputCommand>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to {}...", self.config.server_url);
        let (socket, _) = connect_async(self.config.server_url.as_str()).await?;
        let (mut write, mut read) = socket.split();
        info!(
            "Connected: {}-side movement, {} reconciliation",
            self.config.movement, self.config.policy
        );

        let mut ping_interval = interval(self.config.ping_interval);
        ping_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut next_tick = Instant::now() + self.predictor.tick_interval();
        let mut commands_open = true;

        loop {
            tokio::select! {
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => match decode_server(&text) {
                            Ok(message) => self.handle_server_message(message, timestamp()),
                            Err(e) => warn!("Dropping frame from server: {}", e),
                        },
                        Some(Ok(Message::Close(_))) | None => {
                            info!("Server closed the connection");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!("Connection error: {}", e);
                            break;
                        }
                    }
                },

                command = commands.recv(), if commands_open => {
                    match command {
                        Some(command) => match self.handle_command(command) {
                            Some(messages) => send_all(&mut write, messages).await?,
                            None => {
                                info!("Quitting");
                                break;
                            }
                        },
                        None => {
                            debug!("Input closed");
                            commands_open = false;
                        }
                    }
                },

                _ = sleep_until(next_tick) => {
                    next_tick = Instant::now() + self.predictor.tick_interval();
                    let messages = self.on_tick();
                    send_all(&mut write, messages).await?;
                },

                _ = ping_interval.tick() => {
                    send_all(&mut write, vec![ClientMessage::Ping { ts: timestamp() }]).await?;
                },
            }
        }

        let _ = write.close().await;
        Ok(())
    }
}

async fn send_all(
    write: &mut WsSink,
    messages: Vec<ClientMessage>,
) -> Result<(), Box<dyn std::error::Error>> {
    for message in messages {
        let text = encode(&message)?;
        write.send(Message::Text(text)).await?;
    }
    Ok(())
}
