//! Command-line configuration for the server binary.

use crate::game::GameConfig;
use clap::Parser;
use shared::{
    MovementKind, BOOST_MULTIPLIER, BROADCAST_INTERVAL_MS, ENGINE_TICK_MS, GRID_SIZE,
    MIN_GRID_SIZE, RESPAWN_DELAY_MS,
};
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about = "Authoritative multiplayer snake server")]
pub struct ServerConfig {
    /// Address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,
    /// WebSocket port
    #[clap(short, long, default_value = "8080")]
    pub port: u16,
    /// Width and height of the square grid
    #[clap(long, default_value_t = GRID_SIZE, value_parser = parse_grid_size)]
    pub grid_size: i32,
    /// Engine tick in milliseconds; normal-speed snakes move every other tick
    #[clap(long, default_value_t = ENGINE_TICK_MS)]
    pub tick_ms: u64,
    /// Snapshot broadcast interval in milliseconds
    #[clap(long, default_value_t = BROADCAST_INTERVAL_MS)]
    pub broadcast_ms: u64,
    /// Delay between death and respawn in milliseconds
    #[clap(long, default_value_t = RESPAWN_DELAY_MS)]
    pub respawn_delay_ms: u64,
    /// Who computes snake movement: `server` or `client`
    #[clap(short, long, default_value = "server")]
    pub movement: MovementKind,
    /// Maximum concurrent connections
    #[clap(long, default_value = "32")]
    pub max_clients: usize,
}

fn parse_grid_size(raw: &str) -> Result<i32, String> {
    let size: i32 = raw.parse().map_err(|e| format!("{}", e))?;
    if size < MIN_GRID_SIZE {
        return Err(format!("grid size must be at least {}", MIN_GRID_SIZE));
    }
    Ok(size)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::parse_from(["server"])
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_ms.max(1))
    }

    pub fn game_config(&self) -> GameConfig {
        GameConfig {
            grid_size: self.grid_size,
            respawn_delay_ms: self.respawn_delay_ms,
            boost_multiplier: BOOST_MULTIPLIER,
        }
    }
}
