//! Client connection bookkeeping for the game server
//!
//! Tracks which network addresses are connected, which player record (if
//! any) each connection is bound to, and when a connection was last heard
//! from. The manager knows nothing about game rules: roster capacity and
//! join validation live in the engine. Its one policy is the heartbeat
//! timeout, which turns a silent connection into a disconnect event so the
//! engine can react.

use log::info;
use shared::CLIENT_TIMEOUT_SECS;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A connected client.
///
/// The player binding is established when the client's `Join` is accepted;
/// before that the connection exists but participates in nothing.
#[derive(Debug)]
pub struct Client {
    pub id: u32,
    pub addr: SocketAddr,
    /// Last time any packet arrived from this address.
    pub last_seen: Instant,
    /// Player record this connection controls, once joined.
    pub player_id: Option<u32>,
}

impl Client {
    pub fn new(id: u32, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            player_id: None,
        }
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected clients.
///
/// Client ids are sequential and never reused within a server run. Capacity
/// equals the player count: there is no spectator tier, so a connection that
/// cannot become a player is turned away at the handshake.
pub struct ClientManager {
    clients: HashMap<u32, Client>,
    next_client_id: u32,
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Registers a new connection, or `None` when at capacity.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));
        Some(client_id)
    }

    /// Drops a connection, returning the player id it was bound to (if any)
    /// so the caller can route a disconnect into the game.
    pub fn remove_client(&mut self, client_id: u32) -> Option<Option<u32>> {
        let client = self.clients.remove(&client_id)?;
        info!("Client {} disconnected", client.id);
        Some(client.player_id)
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    /// Marks the address as alive. Every inbound packet counts as a
    /// heartbeat, not only the dedicated keep-alive.
    pub fn touch(&mut self, addr: SocketAddr) {
        if let Some(client_id) = self.find_client_by_addr(addr) {
            if let Some(client) = self.clients.get_mut(&client_id) {
                client.last_seen = Instant::now();
            }
        }
    }

    /// Binds a connection to the player record it joined as.
    pub fn bind_player(&mut self, client_id: u32, player_id: u32) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.player_id = Some(player_id);
        }
    }

    pub fn player_for_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.clients
            .values()
            .find(|client| client.addr == addr)
            .and_then(|client| client.player_id)
    }

    /// Removes clients that have gone silent past the heartbeat timeout.
    ///
    /// Returns `(client_id, bound_player_id)` pairs so the server loop can
    /// feed each one through the same path as an explicit disconnect.
    pub fn check_timeouts(&mut self) -> Vec<(u32, Option<u32>)> {
        let timeout = Duration::from_secs(CLIENT_TIMEOUT_SECS);
        let timed_out: Vec<(u32, Option<u32>)> = self
            .clients
            .values()
            .filter(|client| client.is_timed_out(timeout))
            .map(|client| (client.id, client.player_id))
            .collect();

        for (client_id, _) in &timed_out {
            self.remove_client(*client_id);
        }
        timed_out
    }

    /// All connections for broadcasting.
    pub fn get_client_addrs(&self) -> Vec<(u32, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
