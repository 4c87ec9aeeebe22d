//! Headless smoke client: connects, prints the handshake, sends random
//! inputs for a while and prints every snapshot it receives.

use clap::Parser;
use rand::Rng;
use shared::{InputState, ServerMessage};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{interval, Instant};

#[derive(Parser, Debug)]
#[command(about = "Headless client for poking at a running server")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:8888")]
    server: String,
    /// How long to stay connected, in seconds
    #[arg(short, long, default_value = "10")]
    duration: u64,
    /// Milliseconds between input messages
    #[arg(short, long, default_value = "100")]
    interval_ms: u64,
}

fn random_intent<R: Rng>(rng: &mut R) -> InputState {
    InputState {
        up: rng.gen_bool(0.3),
        down: rng.gen_bool(0.3),
        left: rng.gen_bool(0.3),
        right: rng.gen_bool(0.3),
        fire: rng.gen_bool(0.1),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let stream = TcpStream::connect(&args.server).await?;
    println!("Connected to {}", args.server);

    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let deadline = Instant::now() + Duration::from_secs(args.duration);
    let mut ticker = interval(Duration::from_millis(args.interval_ms.max(1)));
    let mut rng = rand::thread_rng();
    let mut snapshots = 0u64;

    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => break,
            _ = ticker.tick() => {
                let message = random_intent(&mut rng).to_message();
                writer.write_all(message.encode().as_bytes()).await?;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    println!("Server closed the connection");
                    break;
                };
                match ServerMessage::decode(&line) {
                    Ok(ServerMessage::Handshake(handshake)) => {
                        println!("Assigned id {} at ({}, {})", handshake.id, handshake.x, handshake.y);
                    }
                    Ok(ServerMessage::Snapshot(players)) => {
                        snapshots += 1;
                        println!("Snapshot {}: {} players", snapshots, players.len());
                        for player in players {
                            println!("  Player {}: ({:.1}, {:.1})", player.id, player.x, player.y);
                        }
                    }
                    Err(e) => println!("Bad line {:?}: {}", line, e),
                }
            }
        }
    }

    writer.shutdown().await?;
    println!("Test client finished after {} snapshots", snapshots);
    Ok(())
}
