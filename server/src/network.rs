//! Server network layer handling UDP communications and game loop coordination

use crate::client_manager::ClientManager;
use crate::engine::{DelayedEvent, Effect, GameEngine};
use crate::error::GameError;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, MAX_PLAYERS, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Messages sent from network tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    ClientTimeout {
        client_id: u32,
        player_id: Option<u32>,
    },
    /// A scheduled lifecycle transition coming due.
    Delayed {
        event: DelayedEvent,
        generation: u64,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// Messages sent from the game loop to the network sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket { packet: Packet, addr: SocketAddr },
    BroadcastPacket { packet: Packet },
}

/// Main server coordinating networking and the game engine.
///
/// All game state mutation happens inside [`Server::run`]'s select loop,
/// one event at a time; the receiver, sender and timeout tasks only move
/// messages across channels.
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    engine: GameEngine,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(addr: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(MAX_PLAYERS))),
            engine: GameEngine::new(),
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    /// Spawns task that continuously listens for incoming packets
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes the outgoing packet queue
    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket { packet } => {
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_client_addrs()
                        };

                        for (client_id, addr) in client_addrs {
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client heartbeat timeouts
    async fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for (client_id, player_id) in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout {
                        client_id,
                        player_id,
                    }) {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    async fn send_packet(&self, packet: &Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket {
            packet: packet.clone(),
            addr,
        }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    async fn broadcast_packet(&self, packet: &Packet) {
        if let Err(e) = self.game_tx.send(GameMessage::BroadcastPacket {
            packet: packet.clone(),
        }) {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    async fn send_error(&self, error: &GameError, addr: SocketAddr) {
        self.send_packet(
            &Packet::Error {
                message: error.to_string(),
            },
            addr,
        )
        .await;
    }

    /// Executes the effects an engine call produced: direct replies,
    /// broadcasts, and scheduled lifecycle transitions.
    async fn apply_effects(&mut self, effects: Vec<Effect>, reply_addr: Option<SocketAddr>) {
        for effect in effects {
            match effect {
                Effect::Reply(packet) => {
                    if let Some(addr) = reply_addr {
                        self.send_packet(&packet, addr).await;
                    }
                }
                Effect::Broadcast(packet) => {
                    self.broadcast_packet(&packet).await;
                }
                Effect::Schedule {
                    delay,
                    event,
                    generation,
                } => {
                    self.schedule_event(delay, event, generation);
                }
            }
        }
    }

    /// Posts a delayed lifecycle event back into the main loop. The sleep
    /// itself runs in a detached task; staleness is handled by the engine's
    /// generation check, not by cancelling the task.
    fn schedule_event(&self, delay: Duration, event: DelayedEvent, generation: u64) {
        let server_tx = self.server_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = server_tx.send(ServerMessage::Delayed { event, generation }) {
                error!("Failed to post delayed event: {}", e);
            }
        });
    }

    /// Processes one incoming packet and updates game state
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        {
            let mut clients = self.clients.write().await;
            clients.touch(addr);
        }

        match packet {
            Packet::Connect { client_version } => {
                info!(
                    "Client connecting from {} (version: {})",
                    addr, client_version
                );
                if client_version != PROTOCOL_VERSION {
                    warn!(
                        "Client at {} speaks protocol {} (server: {})",
                        addr, client_version, PROTOCOL_VERSION
                    );
                }

                // Replace an existing connection from the same address
                let existing = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };
                if let Some(existing_id) = existing {
                    info!("Replacing existing client {} from {}", existing_id, addr);
                    let player_id = {
                        let mut clients = self.clients.write().await;
                        clients.remove_client(existing_id).flatten()
                    };
                    if let Some(player_id) = player_id {
                        let effects = self.engine.disconnect(player_id);
                        self.apply_effects(effects, None).await;
                    }
                }

                let client_id = {
                    let mut clients = self.clients.write().await;
                    clients.add_client(addr)
                };

                match client_id {
                    Some(client_id) => {
                        self.send_packet(&Packet::Connected { client_id }, addr).await;
                    }
                    None => {
                        self.send_error(&GameError::GameFull, addr).await;
                    }
                }
            }

            Packet::Join { name } => {
                let client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };
                let Some(client_id) = client_id else {
                    warn!("Join from unconnected address {}", addr);
                    return;
                };

                match self.engine.join(&name) {
                    Ok((player_id, effects)) => {
                        {
                            let mut clients = self.clients.write().await;
                            clients.bind_player(client_id, player_id);
                        }
                        self.apply_effects(effects, Some(addr)).await;
                    }
                    Err(e) => self.send_error(&e, addr).await,
                }
            }

            Packet::Start => {
                let player_id = {
                    let clients = self.clients.read().await;
                    clients.player_for_addr(addr)
                };
                let Some(player_id) = player_id else {
                    self.send_error(&GameError::UnknownPlayer, addr).await;
                    return;
                };

                match self.engine.start(player_id) {
                    Ok(effects) => self.apply_effects(effects, Some(addr)).await,
                    Err(e) => self.send_error(&e, addr).await,
                }
            }

            Packet::Submit { number } => {
                let player_id = {
                    let clients = self.clients.read().await;
                    clients.player_for_addr(addr)
                };
                let Some(player_id) = player_id else {
                    self.send_error(&GameError::UnknownPlayer, addr).await;
                    return;
                };

                match self.engine.submit(player_id, number) {
                    Ok(effects) => self.apply_effects(effects, Some(addr)).await,
                    Err(e) => self.send_error(&e, addr).await,
                }
            }

            Packet::Heartbeat => {
                // The touch above is all a heartbeat is for.
                debug!("Heartbeat from {}", addr);
            }

            Packet::Disconnect => {
                let client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };
                if let Some(client_id) = client_id {
                    let player_id = {
                        let mut clients = self.clients.write().await;
                        clients.remove_client(client_id).flatten()
                    };
                    if let Some(player_id) = player_id {
                        let effects = self.engine.disconnect(player_id);
                        self.apply_effects(effects, None).await;
                    }
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        let mut tick_interval = interval(Duration::from_secs(1));

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle network and scheduled events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id, player_id }) => {
                            info!("Client {} timed out", client_id);
                            if let Some(player_id) = player_id {
                                let effects = self.engine.disconnect(player_id);
                                self.apply_effects(effects, None).await;
                            }
                        },
                        Some(ServerMessage::Delayed { event, generation }) => {
                            let effects = self.engine.delayed(event, generation);
                            self.apply_effects(effects, None).await;
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                // Drive the round countdown
                _ = tick_interval.tick() => {
                    let effects = self.engine.timer_tick();
                    self.apply_effects(effects, None).await;
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::sync::mpsc;

    #[test]
    fn test_server_message_creation() {
        let packet = Packet::Connect { client_version: 1 };
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8080);

        let msg = ServerMessage::PacketReceived {
            packet: packet.clone(),
            addr,
        };

        match msg {
            ServerMessage::PacketReceived { packet: p, addr: a } => {
                assert_eq!(a, addr);
                match p {
                    Packet::Connect { client_version } => {
                        assert_eq!(client_version, 1);
                    }
                    _ => panic!("Unexpected packet type"),
                }
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_client_timeout_message_carries_binding() {
        let msg = ServerMessage::ClientTimeout {
            client_id: 3,
            player_id: Some(7),
        };

        match msg {
            ServerMessage::ClientTimeout {
                client_id,
                player_id,
            } => {
                assert_eq!(client_id, 3);
                assert_eq!(player_id, Some(7));
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_delayed_message_carries_generation() {
        let msg = ServerMessage::Delayed {
            event: DelayedEvent::OpenRound,
            generation: 2,
        };

        match msg {
            ServerMessage::Delayed { event, generation } => {
                assert_eq!(event, DelayedEvent::OpenRound);
                assert_eq!(generation, 2);
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_game_message_send_packet() {
        let packet = Packet::Connected { client_id: 123 };
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)), 9090);

        let msg = GameMessage::SendPacket {
            packet: packet.clone(),
            addr,
        };

        match msg {
            GameMessage::SendPacket { packet: p, addr: a } => {
                assert_eq!(a, addr);
                match p {
                    Packet::Connected { client_id } => {
                        assert_eq!(client_id, 123);
                    }
                    _ => panic!("Unexpected packet type"),
                }
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_channel_communication() {
        let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

        let packet = Packet::Join {
            name: "alice".to_string(),
        };
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8080);

        let msg = ServerMessage::PacketReceived {
            packet: packet.clone(),
            addr,
        };

        assert!(tx.send(msg).is_ok());

        let received = rx.try_recv();
        assert!(received.is_ok());

        match received.unwrap() {
            ServerMessage::PacketReceived { packet: p, addr: a } => {
                assert_eq!(a, addr);
                match p {
                    Packet::Join { name } => assert_eq!(name, "alice"),
                    _ => panic!("Unexpected packet type"),
                }
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_packet_serialization_roundtrip() {
        let test_packets = vec![
            Packet::Connect { client_version: 1 },
            Packet::Connected { client_id: 42 },
            Packet::Join {
                name: "alice".to_string(),
            },
            Packet::Start,
            Packet::Submit { number: 57 },
            Packet::Heartbeat,
            Packet::Disconnect,
            Packet::Error {
                message: "Name already taken".to_string(),
            },
        ];

        for packet in test_packets {
            let serialized = serialize(&packet);
            assert!(serialized.is_ok());

            let deserialized: Result<Packet, _> = deserialize(&serialized.unwrap());
            assert!(deserialized.is_ok());

            match (&packet, &deserialized.unwrap()) {
                (Packet::Connect { .. }, Packet::Connect { .. }) => {}
                (Packet::Connected { .. }, Packet::Connected { .. }) => {}
                (Packet::Join { .. }, Packet::Join { .. }) => {}
                (Packet::Start, Packet::Start) => {}
                (Packet::Submit { .. }, Packet::Submit { .. }) => {}
                (Packet::Heartbeat, Packet::Heartbeat) => {}
                (Packet::Disconnect, Packet::Disconnect) => {}
                (Packet::Error { .. }, Packet::Error { .. }) => {}
                _ => panic!("Packet type mismatch after roundtrip"),
            }
        }
    }

    #[test]
    fn test_address_validation() {
        let valid_addrs = vec![
            "127.0.0.1:8080",
            "0.0.0.0:0",
            "192.168.1.1:9090",
            "[::1]:8080",
        ];

        for addr_str in valid_addrs {
            let result = addr_str.parse::<SocketAddr>();
            assert!(result.is_ok(), "Failed to parse address: {}", addr_str);
        }

        let invalid_addrs = vec!["invalid", "127.0.0.1:99999", "256.256.256.256:8080", ""];

        for addr_str in invalid_addrs {
            let result = addr_str.parse::<SocketAddr>();
            assert!(result.is_err(), "Should fail to parse: {}", addr_str);
        }
    }

    #[test]
    fn test_error_message_formatting() {
        let errors = vec![
            GameError::GameFull,
            GameError::NameTaken,
            GameError::ChoiceOutOfRange,
            GameError::AlreadySubmitted,
        ];

        for error in errors {
            let message = error.to_string();
            assert!(!message.is_empty());
            assert!(message.len() < 256);

            let packet = Packet::Error {
                message: message.clone(),
            };
            match packet {
                Packet::Error { message: m } => assert_eq!(m, message),
                _ => panic!("Wrong packet type"),
            }
        }
    }

    #[test]
    fn test_buffer_bounds() {
        let buffer_size = 2048;

        // Typical packet sizes for this protocol are tiny; the roster and
        // submission payloads stay well under the receive buffer.
        let typical_sizes = vec![16, 64, 256, 512];
        for size in typical_sizes {
            assert!(size < buffer_size, "Packet size {} exceeds buffer", size);
        }

        assert!(buffer_size >= 1024);
        assert!(buffer_size <= 65536);
    }
}
