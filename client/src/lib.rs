//! # Snake Client Library
//!
//! Headless client for the multiplayer snake server. It predicts its own
//! snake with the same rules the server runs, so turns take effect locally
//! before the server confirms them, and merges every authoritative snapshot
//! back into that prediction.
//!
//! ## Modules
//!
//! ### Game Module (`game`)
//! The [`game::Predictor`] and the pure [`game::reconcile`] function:
//! - initial sync on the first snapshot after connecting or respawning
//! - threshold reconciliation (soft merge keeping the predicted head, hard
//!   reset past the threshold) or strict adoption of server segments
//! - respawn countdown from the server deadline
//!
//! ### Input Module (`input`)
//! The two-slot turn queue and parsing of typed commands.
//!
//! ### Network Module (`network`)
//! The WebSocket loop: decodes server messages, runs the prediction tick,
//! sends directions or segments depending on the server's movement mode,
//! and measures round-trip time with pings.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::game::ReconcilePolicy;
//! use client::network::{Client, ClientConfig};
//! use shared::MovementKind;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (_commands, rx) = tokio::sync::mpsc::unbounded_channel();
//!     let mut client = Client::new(ClientConfig {
//!         server_url: "ws://127.0.0.1:8080".to_string(),
//!         movement: MovementKind::Server,
//!         policy: ReconcilePolicy::default(),
//!         tick: Duration::from_millis(150),
//!         ping_interval: Duration::from_secs(2),
//!     });
//!     client.run(rx).await
//! }
//! ```

pub mod game;
pub mod input;
pub mod network;
