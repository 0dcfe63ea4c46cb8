//! Connected-client bookkeeping and outbound fan-out.
//!
//! Each WebSocket connection owns a writer task fed by an unbounded channel.
//! The manager holds the sending half of every channel, hands out player ids
//! and enforces the capacity limit. Sending never blocks the game loop: a
//! message is encoded once and queued on every target channel.

use crate::game::Dispatch;
use log::{debug, info, warn};
use shared::{encode, ServerMessage};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;

/// A connected client and the queue feeding its socket writer.
#[derive(Debug)]
pub struct Client {
    pub id: u32,
    pub addr: SocketAddr,
    pub connected_at: Instant,
    sender: mpsc::UnboundedSender<String>,
}

impl Client {
    pub fn new(id: u32, addr: SocketAddr, sender: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id,
            addr,
            connected_at: Instant::now(),
            sender,
        }
    }

    /// Queues an encoded frame. Returns false if the writer task is gone.
    pub fn send_text(&self, text: String) -> bool {
        self.sender.send(text).is_ok()
    }
}

pub struct ClientManager {
    clients: BTreeMap<u32, Client>,
    next_client_id: u32,
    max_clients: usize,
}

impl ClientManager {
    /// Ids start at 1 and are never reused while the server runs.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: BTreeMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Registers a connection. Returns `None` when the server is full.
    pub fn add_client(
        &mut self,
        addr: SocketAddr,
        sender: mpsc::UnboundedSender<String>,
    ) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            warn!(
                "Rejecting {}: server full ({} clients)",
                addr, self.max_clients
            );
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients
            .insert(client_id, Client::new(client_id, addr, sender));
        Some(client_id)
    }

    pub fn remove_client(&mut self, client_id: &u32) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!(
                "Client {} disconnected after {:.1}s",
                client.id,
                client.connected_at.elapsed().as_secs_f32()
            );
            true
        } else {
            false
        }
    }

    pub fn send_to(&self, client_id: u32, message: &ServerMessage) -> bool {
        let Some(client) = self.clients.get(&client_id) else {
            debug!("Dropping message for unknown client {}", client_id);
            return false;
        };
        match encode(message) {
            Ok(text) => {
                if client.send_text(text) {
                    true
                } else {
                    warn!("Client {} writer closed, message dropped", client_id);
                    false
                }
            }
            Err(e) => {
                warn!("Failed to encode message for client {}: {}", client_id, e);
                false
            }
        }
    }

    /// Sends to every client. Returns how many queues accepted the frame.
    pub fn broadcast(&self, message: &ServerMessage) -> usize {
        let text = match encode(message) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode broadcast: {}", e);
                return 0;
            }
        };

        let mut delivered = 0;
        for client in self.clients.values() {
            if client.send_text(text.clone()) {
                delivered += 1;
            } else {
                warn!("Client {} writer closed, broadcast skipped", client.id);
            }
        }
        delivered
    }

    pub fn dispatch(&self, dispatches: Vec<Dispatch>) {
        for dispatch in dispatches {
            match dispatch {
                Dispatch::Direct { player_id, message } => {
                    self.send_to(player_id, &message);
                }
                Dispatch::Broadcast(message) => {
                    self.broadcast(&message);
                }
            }
        }
    }

    pub fn ids(&self) -> Vec<u32> {
        self.clients.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
