use clap::Parser;
use client::game::ReconcilePolicy;
use client::input::InputCommand;
use client::network::{Client, ClientConfig};
use log::{info, warn};
use shared::{MovementKind, PREDICTION_TICK_MS};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server WebSocket URL
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:8080")]
    server: String,

    /// Movement mode of the server: `server` or `client`
    #[arg(short = 'm', long, default_value = "server")]
    movement: MovementKind,

    /// Reconciliation mode: `threshold` or `strict`
    #[arg(short = 'r', long, default_value = "threshold")]
    reconcile: String,

    /// Segment differences tolerated before a hard reset
    #[arg(short = 't', long, default_value = "2")]
    threshold: usize,

    /// Prediction tick in milliseconds at normal speed
    #[arg(long, default_value_t = PREDICTION_TICK_MS)]
    tick_ms: u64,

    /// Interval between RTT pings in milliseconds
    #[arg(long, default_value = "2000")]
    ping_interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let policy = ReconcilePolicy::from_mode(&args.reconcile, args.threshold)?;

    info!("Starting client...");
    info!("Commands: w/a/s/d to turn, b to toggle boost, vote <map>|none, play, select, quit");

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<InputCommand>() {
                Ok(command) => {
                    if command_tx.send(command).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("{}", e),
            }
        }
    });

    let mut client = Client::new(ClientConfig {
        server_url: args.server,
        movement: args.movement,
        policy,
        tick: Duration::from_millis(args.tick_ms.max(1)),
        ping_interval: Duration::from_millis(args.ping_interval_ms.max(1)),
    });

    client.run(command_rx).await?;

    Ok(())
}
