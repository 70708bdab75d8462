use crate::display;
use bincode::{deserialize, serialize};
use log::{info, warn};
use shared::{validate_choice, Packet, HEARTBEAT_INTERVAL_SECS, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::net::UdpSocket;
use tokio::time::interval;

/// Terminal client: joins the game under a name, forwards stdin commands to
/// the server and renders every broadcast as a line of text.
pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    name: String,
    client_id: Option<u32>,
    connected: bool,
}

impl Client {
    pub async fn new(server_addr: &str, name: String) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(Client {
            socket,
            server_addr,
            name,
            client_id: None,
            connected: false,
        })
    }

    async fn connect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to server...");

        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION,
        };
        self.send_packet(&packet).await
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    async fn handle_packet(&mut self, packet: Packet) -> Result<(), Box<dyn std::error::Error>> {
        match &packet {
            Packet::Connected { client_id } => {
                info!("Connected! Client ID: {}", client_id);
                self.client_id = Some(*client_id);
                self.connected = true;

                let name = self.name.clone();
                self.send_packet(&Packet::Join { name }).await?;
            }
            _ => {}
        }

        if let Some(line) = display::render(&packet) {
            println!("{}", line);
        }
        Ok(())
    }

    /// Turns a line of user input into a packet, or a usage hint.
    ///
    /// Bounds are checked locally so typos never leave the terminal; the
    /// server re-validates regardless.
    fn parse_command(line: &str) -> Result<Option<Packet>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        match line {
            "start" => Ok(Some(Packet::Start)),
            "quit" => Ok(Some(Packet::Disconnect)),
            _ => match line.parse::<i32>() {
                Ok(number) => {
                    if validate_choice(number).is_some() {
                        Ok(Some(Packet::Submit { number }))
                    } else {
                        Err("Pick a number between 0 and 100.".to_string())
                    }
                }
                Err(_) => {
                    Err("Commands: a number 0-100 to submit, 'start', or 'quit'.".to_string())
                }
            },
        }
    }

    async fn handle_line(&mut self, line: &str) -> Result<bool, Box<dyn std::error::Error>> {
        match Self::parse_command(line) {
            Ok(Some(packet)) => {
                let quitting = matches!(packet, Packet::Disconnect);
                self.send_packet(&packet).await?;
                Ok(quitting)
            }
            Ok(None) => Ok(false),
            Err(hint) => {
                println!("{}", hint);
                Ok(false)
            }
        }
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.connect().await?;

        let mut stdin: Lines<BufReader<Stdin>> = BufReader::new(tokio::io::stdin()).lines();
        let mut heartbeat = interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
        let mut buf = [0u8; 2048];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buf) => {
                    let (len, addr) = result?;
                    if addr != self.server_addr {
                        warn!("Ignoring packet from unexpected address {}", addr);
                        continue;
                    }
                    match deserialize::<Packet>(&buf[0..len]) {
                        Ok(packet) => self.handle_packet(packet).await?,
                        Err(e) => warn!("Failed to deserialize packet: {}", e),
                    }
                }
                line = stdin.next_line() => {
                    match line? {
                        Some(line) => {
                            if self.handle_line(&line).await? {
                                info!("Disconnecting client {:?}", self.client_id);
                                break;
                            }
                        }
                        None => {
                            // stdin closed; leave the game cleanly.
                            self.send_packet(&Packet::Disconnect).await?;
                            break;
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    if self.connected {
                        self.send_packet(&Packet::Heartbeat).await?;
                    }
                }
            }
        }

        Ok(())
    }
}
