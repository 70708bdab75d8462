//! Scripted bot client for exercising a running server.
//!
//! Connects, joins under the given name, optionally fires the start trigger
//! once the lobby is full, and answers every round with a random pick.
//! Launch four of these to watch a complete game play out.

use bincode::{deserialize, serialize};
use clap::Parser;
use rand::Rng;
use shared::{Packet, CHOICE_MAX, CHOICE_MIN, HEARTBEAT_INTERVAL_SECS, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::interval;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Player name to join with
    #[arg(short, long)]
    name: String,

    /// Send the start trigger once the lobby is full
    #[arg(long)]
    start: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Bot socket bound to {}", socket.local_addr()?);

    let server_addr = args.server.parse::<SocketAddr>()?;

    let connect = serialize(&Packet::Connect {
        client_version: PROTOCOL_VERSION,
    })?;
    println!("Connecting to {}", server_addr);
    socket.send_to(&connect, server_addr).await?;

    let mut buf = [0u8; 2048];
    let mut heartbeat = interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));

    loop {
        tokio::select! {
            result = socket.recv_from(&mut buf) => {
                let (len, _) = result?;
                let packet = match deserialize::<Packet>(&buf[0..len]) {
                    Ok(packet) => packet,
                    Err(e) => {
                        println!("Failed to deserialize packet: {}", e);
                        continue;
                    }
                };

                match packet {
                    Packet::Connected { client_id } => {
                        println!("Connected with client ID {}, joining as {}", client_id, args.name);
                        let join = serialize(&Packet::Join { name: args.name.clone() })?;
                        socket.send_to(&join, server_addr).await?;
                    }
                    Packet::Joined { player_id } => {
                        println!("Joined as player {}", player_id);
                    }
                    Packet::PlayerJoined { roster } => {
                        println!("Lobby: {} players", roster.len());
                        if args.start && roster.len() == shared::MAX_PLAYERS {
                            println!("Lobby full, sending start trigger");
                            let start = serialize(&Packet::Start)?;
                            socket.send_to(&start, server_addr).await?;
                        }
                    }
                    Packet::RoundStarted { round, rule, .. } => {
                        let number = rand::thread_rng().gen_range(CHOICE_MIN..=CHOICE_MAX);
                        println!("Round {} ({}), submitting {}", round, rule, number);
                        let submit = serialize(&Packet::Submit { number })?;
                        socket.send_to(&submit, server_addr).await?;
                    }
                    Packet::RoundEnded { round, average, target, winner, .. } => {
                        println!(
                            "Round {} over: average {:.2}, target {:.2}, winner {}",
                            round, average, target, winner.player_name
                        );
                    }
                    Packet::PlayerEliminated { name, .. } => {
                        println!("{} eliminated", name);
                    }
                    Packet::NewRuleUnlocked { rule } => {
                        println!("New rule: {}", rule);
                    }
                    Packet::GameEnded { winner, .. } => {
                        match winner {
                            Some(player) => println!("Game over, {} wins", player.name),
                            None => println!("Game over with no winner"),
                        }
                        let disconnect = serialize(&Packet::Disconnect)?;
                        socket.send_to(&disconnect, server_addr).await?;
                        break;
                    }
                    Packet::Error { message } => {
                        println!("Server error: {}", message);
                    }
                    _ => {}
                }
            }
            _ = heartbeat.tick() => {
                let beat = serialize(&Packet::Heartbeat)?;
                socket.send_to(&beat, server_addr).await?;
            }
        }
    }

    println!("Bot finished");
    Ok(())
}
