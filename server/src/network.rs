//! Server network layer handling UDP communications and the authority loop

use crate::client_manager::ClientManager;
use crate::config::ServerConfig;
use crate::persistence::{BestScoreStore, JsonFileStore};
use crate::round::RoundController;
use crate::router::{Dispatch, RequestRouter};
use crate::spawner::ItemSpawner;
use crate::world::World;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{ClientId, Packet, MAX_PACKET_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    ClientTimeout {
        client_id: ClientId,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// Messages sent from the authority loop to the network sender
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    SendToClient {
        packet: Packet,
        client_id: ClientId,
    },
    BroadcastPacket {
        packet: Packet,
        exclude: Option<ClientId>,
    },
}

impl From<Dispatch> for GameMessage {
    fn from(dispatch: Dispatch) -> Self {
        match dispatch {
            Dispatch::Broadcast { packet, exclude } => GameMessage::BroadcastPacket { packet, exclude },
            Dispatch::Send { client_id, packet } => GameMessage::SendToClient { packet, client_id },
        }
    }
}

/// Authoritative server: owns all replicated state and serializes every
/// mutation through one event loop
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    world: World,
    router: RequestRouter,
    tick_duration: Duration,
    client_timeout: Duration,
    auto_start: bool,
    tick: u64,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    /// Binds the server and loads the best score from the configured file
    pub async fn new(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let store = JsonFileStore::new(config.best_score_path.clone());
        Self::with_store(config, Box::new(store)).await
    }

    pub async fn with_store(
        config: ServerConfig,
        store: Box<dyn BestScoreStore>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(&config.bind_addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        let round = RoundController::new(config.round_seconds, store);
        let spawner = ItemSpawner::new(config.spawn_count, config.max_item_value);

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(config.max_clients))),
            world: World::new(round),
            router: RequestRouter::new(spawner),
            tick_duration: config.tick_duration,
            client_timeout: config.client_timeout,
            auto_start: config.auto_start,
            tick: 0,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Sender that can stop the loop from outside
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_PACKET_SIZE];

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

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) {
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
                    GameMessage::SendToClient { packet, client_id } => {
                        let addr = {
                            let clients_guard = clients.read().await;
                            clients_guard.addr_of(client_id)
                        };

                        match addr {
                            Some(addr) => {
                                if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await
                                {
                                    error!("Failed to send to client {}: {}", client_id, e);
                                }
                            }
                            None => debug!("Dropping packet for departed client {}", client_id),
                        }
                    }
                    GameMessage::BroadcastPacket { packet, exclude } => {
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_client_addrs()
                        };

                        for (client_id, addr) in client_addrs {
                            if Some(client_id) == exclude {
                                continue;
                            }

                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that reports silent clients to the main loop
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();
        let timeout = self.client_timeout;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let clients_guard = clients.read().await;
                    clients_guard.timed_out_clients(timeout)
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
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

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn dispatch(&self, out: Vec<Dispatch>) {
        for dispatch in out {
            if let Err(e) = self.game_tx.send(dispatch.into()) {
                error!("Failed to queue outgoing packet: {}", e);
                return;
            }
        }
    }

    /// Removes a client and force-releases everything it held, in one step
    async fn disconnect_client(&mut self, client_id: ClientId) {
        let removed = {
            let mut clients = self.clients.write().await;
            clients.remove_client(&client_id)
        };

        if removed {
            let out = self.router.client_disconnected(&mut self.world, client_id);
            self.dispatch(out);
        }
    }

    /// Resolves the requester of a packet from its address
    async fn requester(&mut self, addr: SocketAddr) -> Option<ClientId> {
        let client_id = {
            let mut clients = self.clients.write().await;
            clients.touch_by_addr(addr)
        };

        if client_id.is_none() {
            warn!("Packet from unknown sender {}", addr);
        }
        client_id
    }

    /// Processes incoming packets in arrival order
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { client_version } => {
                info!(
                    "Client connecting from {} (version: {})",
                    addr, client_version
                );

                if client_version != PROTOCOL_VERSION {
                    self.send_packet(
                        Packet::Disconnected {
                            reason: "Protocol version mismatch".to_string(),
                        },
                        addr,
                    );
                    return;
                }

                // Remove existing connection if present
                let existing_client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };

                if let Some(existing_id) = existing_client_id {
                    info!("Removing existing client {} from {}", existing_id, addr);
                    self.disconnect_client(existing_id).await;
                }

                let client_id = {
                    let mut clients = self.clients.write().await;
                    clients.add_client(addr)
                };

                if let Some(client_id) = client_id {
                    self.send_packet(Packet::Connected { client_id }, addr);
                    for packet in self.world.snapshot() {
                        self.send_packet(packet, addr);
                    }
                } else {
                    self.send_packet(
                        Packet::Disconnected {
                            reason: "Server full".to_string(),
                        },
                        addr,
                    );
                }
            }

            Packet::Request(request) => {
                if let Some(client_id) = self.requester(addr).await {
                    let out = self.router.route(&mut self.world, client_id, request);
                    self.dispatch(out);
                }
            }

            Packet::ObjectState {
                object_id,
                position,
            } => {
                if let Some(client_id) = self.requester(addr).await {
                    let out =
                        self.router
                            .route_object_state(&self.world, client_id, object_id, position);
                    self.dispatch(out);
                }
            }

            Packet::Heartbeat => {
                self.requester(addr).await;
            }

            Packet::Disconnect => {
                let client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };

                if let Some(client_id) = client_id {
                    self.disconnect_client(client_id).await;
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Advances the round timer and publishes the resulting cell writes
    fn advance(&mut self, dt: f32) {
        let out = self.router.tick(&mut self.world, dt);
        self.dispatch(out);
        self.tick += 1;
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        // Initialize concurrent tasks
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        if self.auto_start {
            let out = self.router.start_round(&mut self.world);
            self.dispatch(out);
        }

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            info!("Client {} timed out", client_id);
                            self.disconnect_client(client_id).await;
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                // Handle server tick events
                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f32();
                    last_tick = now;

                    self.advance(dt);

                    // Periodic monitoring
                    if self.tick % 600 == 0 {
                        let client_count = {
                            let clients = self.clients.read().await;
                            clients.len()
                        };

                        debug!(
                            "Tick {}: {} clients, {} objects, {:?}",
                            self.tick,
                            client_count,
                            self.world.arbiter().len(),
                            self.router.stats()
                        );
                    }
                },
            }
        }

        Ok(())
    }
}
