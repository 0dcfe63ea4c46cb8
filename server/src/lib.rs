//! # Snake Server Library
//!
//! Authoritative server for the multiplayer snake game. It owns the canonical
//! board, runs the shared movement and collision rules, and streams snapshots
//! and events to every connected client over WebSockets.
//!
//! ## Architecture
//!
//! ### Single owner, event driven
//! All game state lives in one [`game::GameEngine`] owned by the loop in
//! [`network::Server::run`]. Connection tasks never touch it; they forward
//! decoded messages over a channel. Engine operations are synchronous and
//! return the messages to deliver, so every rule is testable without sockets.
//!
//! ### Pluggable movement authority
//! Whether the server moves snakes from direction inputs or accepts the
//! segments clients predict is decided by a [`movement::MovementAuthority`]
//! chosen at startup. The collision and apple rules are applied the same way
//! in both cases.
//!
//! ### Timing
//! The engine ticks every 75ms by default. Normal snakes move every second
//! tick and boosting snakes every tick. Snapshots go out every 100ms and
//! respawns fire from a deadline queue rather than per-death timers.
//!
//! ## Modules
//!
//! - `client_manager`: connected sockets, id assignment, fan-out
//! - `config`: command-line configuration
//! - `game`: the engine
//! - `movement`: movement authorities
//! - `network`: accept loop, connection tasks, main loop
//! - `player`, `scheduler`, `spawn`: engine building blocks
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind(ServerConfig::default()).await?;
//!     server.run().await
//! }
//! ```

pub mod client_manager;
pub mod config;
pub mod game;
pub mod movement;
pub mod network;
pub mod player;
pub mod scheduler;
pub mod spawn;
pub mod utils;
