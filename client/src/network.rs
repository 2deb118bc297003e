use crate::commands::{Command, HELP};
use crate::display::{format_object, format_session, install_reporters};
use crate::replica::ReplicaStore;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{CellId, ClientId, ObjectId, Packet, Request, MAX_PACKET_SIZE, PROTOCOL_VERSION};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;
use tokio::time::{interval, sleep};

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    client_id: Option<ClientId>,
    connected: bool,
    /// Set when the server turns us away; ends the loop.
    disconnect_reason: Option<String>,

    replica: ReplicaStore,
    /// Grabs sent but not yet confirmed or denied.
    pending_grabs: HashSet<ObjectId>,

    fake_ping_ms: u64,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        fake_ping_ms: u64,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        let mut replica = ReplicaStore::new();
        install_reporters(&mut replica);

        Ok(Client {
            socket,
            server_addr,
            client_id: None,
            connected: false,
            disconnect_reason: None,
            replica,
            pending_grabs: HashSet::new(),
            fake_ping_ms,
        })
    }

    pub fn replica(&self) -> &ReplicaStore {
        &self.replica
    }

    async fn connect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to server...");

        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION,
        };
        self.send_packet(&packet).await?;

        Ok(())
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        if self.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
        }

        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    fn handle_packet(&mut self, packet: Packet) {
        match packet {
            Packet::Connected { client_id } => {
                info!("Connected! Client ID: {}", client_id);
                self.client_id = Some(client_id);
                self.connected = true;
            }

            Packet::Snapshot {
                cells,
                objects,
                controllers,
            } => {
                let applied = self.replica.apply_snapshot(&cells, &objects, &controllers);
                debug!(
                    "Snapshot piece applied ({} cells changed, {} objects)",
                    applied,
                    objects.len()
                );
                if cells.iter().any(|update| update.cell == CellId::Phase) {
                    println!("{}", format_session(&self.replica.session()));
                }
            }

            Packet::CellUpdate(update) => {
                if let Err(e) = self.replica.apply(&update) {
                    warn!("Rejected cell update: {}", e);
                }
                if let CellId::Lock(object_id) = update.cell {
                    if self.replica.lock_state(object_id).map_or(false, |lock| lock.is_held()) {
                        self.pending_grabs.remove(&object_id);
                    }
                }
            }

            Packet::GrabDenied {
                resource_id,
                holder,
            } => {
                self.pending_grabs.remove(&resource_id);
                println!(">> Grab of {} denied, held by {}", resource_id, holder);
            }

            Packet::ControlChanged {
                resource_id,
                controller,
            } => {
                self.replica.control_changed(resource_id, controller);
            }

            Packet::ObjectSpawned(info) => {
                self.replica.object_spawned(info);
            }

            Packet::ObjectDespawned { object_id } => {
                self.pending_grabs.remove(&object_id);
                self.replica.object_despawned(object_id);
            }

            Packet::ObjectState {
                object_id,
                position,
            } => {
                self.replica.object_state(object_id, position);
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.connected = false;
                self.client_id = None;
                self.disconnect_reason = Some(reason);
            }

            _ => {
                warn!("Unexpected packet type");
            }
        }
    }

    /// Turns a console command into the packet to send, if any.
    fn outgoing(&mut self, command: Command) -> Option<Packet> {
        let client_id = match (command, self.client_id) {
            (Command::Status, _) => {
                println!("{}", format_session(&self.replica.session()));
                return None;
            }
            (Command::Objects, _) => {
                for info in self.replica.objects() {
                    println!(
                        "{}",
                        format_object(
                            &info,
                            self.replica.lock_state(info.object_id),
                            self.replica.position(info.object_id)
                        )
                    );
                }
                return None;
            }
            (Command::Help, _) => {
                println!("{}", HELP);
                return None;
            }
            (Command::Quit, _) => return Some(Packet::Disconnect),
            (_, None) => {
                println!(">> Not connected yet");
                return None;
            }
            (_, Some(client_id)) => client_id,
        };

        let request = match command {
            Command::Start => Request::StartRound,
            Command::Score { item_id, category } => Request::Score { item_id, category },
            Command::Grab(resource_id) => {
                if !self.replica.can_request_grab(resource_id, client_id) {
                    println!(">> Object {} is held by someone else", resource_id);
                    return None;
                }
                self.pending_grabs.insert(resource_id);
                Request::Grab { resource_id }
            }
            Command::Release(resource_id) => {
                self.pending_grabs.remove(&resource_id);
                Request::Release { resource_id }
            }
            Command::Move {
                object_id,
                position,
            } => {
                if self.replica.controller_of(object_id) != Some(client_id) {
                    println!(">> You do not control object {}", object_id);
                    return None;
                }
                self.replica.object_state(object_id, position);
                return Some(Packet::ObjectState {
                    object_id,
                    position,
                });
            }
            Command::Status | Command::Objects | Command::Help | Command::Quit => return None,
        };

        Some(Packet::Request(request))
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.connect().await?;

        let mut heartbeat_interval = interval(Duration::from_secs(1));
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        let mut buffer = [0u8; MAX_PACKET_SIZE];

        println!("{}", HELP);

        while self.disconnect_reason.is_none() {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            if self.fake_ping_ms > 0 {
                                sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
                            }

                            if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                                self.handle_packet(packet);
                            } else {
                                warn!("Failed to deserialize packet from server");
                            }
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                line = lines.next_line() => {
                    let line = match line {
                        Ok(Some(line)) => line,
                        Ok(None) => break,
                        Err(e) => {
                            error!("Error reading console: {}", e);
                            break;
                        }
                    };

                    if line.trim().is_empty() {
                        continue;
                    }

                    match line.parse::<Command>() {
                        Ok(Command::Quit) => break,
                        Ok(command) => {
                            if let Some(packet) = self.outgoing(command) {
                                if let Err(e) = self.send_packet(&packet).await {
                                    error!("Error sending request: {}", e);
                                }
                            }
                        }
                        Err(e) => println!(">> {}", e),
                    }
                },

                _ = heartbeat_interval.tick() => {
                    if self.connected {
                        if let Err(e) = self.send_packet(&Packet::Heartbeat).await {
                            error!("Error sending heartbeat: {}", e);
                        }
                    }
                },
            }
        }

        if self.connected {
            let _ = self.send_packet(&Packet::Disconnect).await;
        }

        match self.disconnect_reason.take() {
            Some(reason) => Err(format!("Disconnected by server: {}", reason).into()),
            None => Ok(()),
        }
    }
}
