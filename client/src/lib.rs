//! # Game Client Library
//!
//! Terminal client for the multiplayer number-guessing game. The client is
//! deliberately thin: it owns no game logic, it only ships the player's
//! intents to the server and prints what the server broadcasts back. All
//! rule evaluation, timing and scoring happens server-side.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! Manages the UDP connection: the connect/join handshake, the stdin
//! command loop (`start`, a number to submit, `quit`), periodic heartbeats
//! that keep the server from timing the connection out, and dispatch of
//! incoming packets.
//!
//! ### Display Module (`display`)
//! Pure formatting of server packets into terminal lines: lobby changes,
//! round openings with the active rule, countdown marks, eliminations,
//! round results with the scoreboard, and the final result.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::new("127.0.0.1:8080", "alice".to_string()).await?;
//!     client.run().await?;
//!     Ok(())
//! }
//! ```

pub mod display;
pub mod network;
