//! Server network layer: WebSocket connections and the game loop.
//!
//! One task accepts TCP connections and spawns a task per client. Client tasks
//! only decode frames and forward them as [`ServerEvent`]s; the main loop in
//! [`Server::run`] is the sole owner of the [`GameEngine`] and drives it from
//! those events, the engine tick, the broadcast interval and respawn deadlines.

use crate::client_manager::ClientManager;
use crate::config::ServerConfig;
use crate::game::GameEngine;
use crate::movement::authority_for;
use crate::utils::{get_timestamp, until};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{decode_client, encode, ClientMessage, ProtocolError, ServerMessage};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

type ConnectionResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Messages sent from connection tasks to the main server loop
#[derive(Debug)]
pub enum ServerEvent {
    Connected {
        addr: SocketAddr,
        sender: mpsc::UnboundedSender<String>,
        /// Answered with the assigned id, or `None` when the server is full.
        reply: oneshot::Sender<Option<u32>>,
    },
    Inbound {
        client_id: u32,
        message: ClientMessage,
    },
    Disconnected {
        client_id: u32,
    },
}

pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    engine: GameEngine,
    clients: ClientManager,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let engine = GameEngine::new(config.game_config(), authority_for(config.movement));
        Self::with_engine(config, engine).await
    }

    /// Binds with a prepared engine, e.g. one with a seeded RNG.
    pub async fn with_engine(
        config: ServerConfig,
        engine: GameEngine,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(config.address()).await?;
        info!("Server listening on ws://{}", listener.local_addr()?);

        let clients = ClientManager::new(config.max_clients);
        Ok(Self {
            listener,
            config,
            engine,
            clients,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs until the accept loop stops.
    pub async fn run(mut self) -> Result<(), Box<dyn std::error::Error>> {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let listener = self.listener;
        tokio::spawn(accept_loop(listener, events_tx));

        let mut tick_interval = interval(self.config.tick_interval());
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut broadcast_interval = interval(self.config.broadcast_interval());
        broadcast_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Server started: {}-side movement, tick {}ms, broadcast {}ms",
            self.config.movement, self.config.tick_ms, self.config.broadcast_ms
        );

        loop {
            let respawn_wait = self
                .engine
                .next_respawn_at()
                .map(|deadline| until(deadline, get_timestamp()));

            tokio::select! {
                event = events_rx.recv() => {
                    match event {
                        Some(event) => handle_event(&mut self.engine, &mut self.clients, event),
                        None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    let dispatches = self.engine.tick(get_timestamp());
                    self.clients.dispatch(dispatches);
                },

                _ = broadcast_interval.tick() => {
                    if !self.clients.is_empty() {
                        let snapshot = self.engine.snapshot();
                        self.clients.broadcast(&ServerMessage::GameState(snapshot));
                    }
                },

                _ = sleep(respawn_wait.unwrap_or_default()), if respawn_wait.is_some() => {
                    let dispatches = self.engine.poll_respawns(get_timestamp());
                    self.clients.dispatch(dispatches);
                },
            }
        }

        Ok(())
    }
}

fn handle_event(engine: &mut GameEngine, clients: &mut ClientManager, event: ServerEvent) {
    match event {
        ServerEvent::Connected {
            addr,
            sender,
            reply,
        } => {
            let assigned = clients.add_client(addr, sender);
            if let Some(client_id) = assigned {
                match engine.add_player(client_id) {
                    Ok(dispatches) => clients.dispatch(dispatches),
                    Err(e) => error!("Failed to add player {}: {}", client_id, e),
                }
            }
            if reply.send(assigned).is_err() {
                debug!("Connection from {} went away during registration", addr);
            }
        }
        ServerEvent::Inbound { client_id, message } => {
            match engine.handle_message(client_id, message, get_timestamp()) {
                Ok(dispatches) => clients.dispatch(dispatches),
                Err(e) => warn!("Rejected message from client {}: {}", client_id, e),
            }
        }
        ServerEvent::Disconnected { client_id } => {
            clients.remove_client(&client_id);
            engine.remove_player(client_id);
        }
    }
}

async fn accept_loop(listener: TcpListener, events: mpsc::UnboundedSender<ServerEvent>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let events = events.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, addr, events).await {
                        debug!("Connection {} ended with error: {}", addr, e);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {}", e);
                sleep(std::time::Duration::from_millis(10)).await;
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    events: mpsc::UnboundedSender<ServerEvent>,
) -> ConnectionResult {
    let socket = accept_async(stream).await?;
    let (mut write, mut read) = socket.split();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let (reply_tx, reply_rx) = oneshot::channel();
    events
        .send(ServerEvent::Connected {
            addr,
            sender: out_tx.clone(),
            reply: reply_tx,
        })
        .map_err(|_| "server loop stopped")?;

    let Some(client_id) = reply_rx.await? else {
        let frame = encode(&ServerMessage::Error {
            message: "Server full".to_string(),
        })?;
        write.send(Message::Text(frame)).await?;
        write.close().await?;
        return Ok(());
    };

    tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if let Err(e) = write.send(Message::Text(text)).await {
                debug!("Write to client {} failed: {}", client_id, e);
                break;
            }
        }
        let _ = write.close().await;
    });

    while let Some(frame) = read.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(_)) => {
                warn!(
                    "Client {}: {}",
                    client_id,
                    ProtocolError::UnsupportedFrame("binary")
                );
                continue;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("Read from client {} failed: {}", client_id, e);
                break;
            }
        };

        match decode_client(&text) {
            Ok(ClientMessage::Ping { ts }) => {
                if let Ok(pong) = encode(&ServerMessage::Pong { ts }) {
                    let _ = out_tx.send(pong);
                }
            }
            Ok(message) => {
                if events
                    .send(ServerEvent::Inbound { client_id, message })
                    .is_err()
                {
                    break;
                }
            }
            Err(e) => warn!("Dropping frame from client {}: {}", client_id, e),
        }
    }

    drop(out_tx);
    let _ = events.send(ServerEvent::Disconnected { client_id });
    Ok(())
}
