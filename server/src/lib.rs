//! # Game Server Library
//!
//! This library provides the authoritative server implementation for the
//! multiplayer number-guessing game. The server is the single source of
//! truth: clients only submit intents (join, start, pick a number) and
//! render what the server broadcasts back.
//!
//! ## Game Rules
//!
//! Four players each pick a number between 0 and 100 every round. The round
//! target is derived from the average of all picks (×0.8 under standard
//! rules) and the pick closest to the target wins; losers drop a point. A
//! player whose score falls to -10 is eliminated, and every elimination
//! unlocks the next entry of an escalating special-rule catalog: a doubled
//! target multiplier, reversed winner selection, an instant-win lucky
//! number, and raised stakes. Rule effects gate on elimination thresholds
//! independently, so several can be active at once. The last player
//! standing wins the game.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Event Loop
//! All session mutation happens inside one `tokio::select!` loop that
//! processes events sequentially: incoming packets, one-second countdown
//! ticks, client timeouts, and delayed round transitions. No two game
//! events ever interleave, which keeps round resolution deterministic
//! without any locking around the session.
//!
//! ### Effect-Driven Engine
//! The game engine ([`engine`]) is fully synchronous: every entry point
//! returns a list of effects (reply, broadcast, schedule) that the network
//! layer executes. The complete round lifecycle (countdown, forced
//! auto-submission, resolution, escalation unlocks, game end) is therefore
//! testable without sockets or timers.
//!
//! ### UDP-Based Communication
//! Clients talk to the server over UDP with bincode-serialized packets. The
//! traffic is low-rate and every game-critical state change is re-broadcast
//! with full snapshots (roster, submissions), so lost datagrams heal on the
//! next broadcast. Clients send periodic heartbeats; a silent connection is
//! dropped and treated as a disconnect.
//!
//! ## Module Organization
//!
//! - [`rules`]: the escalating special-rule catalog and its per-effect
//!   threshold predicates.
//! - [`round`]: pure round resolution: target computation, winner
//!   selection, score updates and elimination flagging.
//! - [`session`]: the authoritative state container: roster, round
//!   counter, submissions, countdown, unlock history.
//! - [`engine`]: the round lifecycle orchestrator tying the above
//!   together and deciding continue-versus-end.
//! - [`client_manager`]: connection tracking, player binding and
//!   heartbeat timeout detection.
//! - [`network`]: UDP socket management, packet dispatch, and the main
//!   server loop.
//! - [`error`]: rejected-input and invariant-violation error types.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new("127.0.0.1:8080").await?;
//!
//!     // Runs the main loop: accepts connections and joins, drives the
//!     // per-round countdown, resolves rounds, and broadcasts results
//!     // until the process is stopped.
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod engine;
pub mod error;
pub mod network;
pub mod round;
pub mod rules;
pub mod session;
