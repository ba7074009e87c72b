//! Server network layer: UDP transport, client handshake and the tick loop

use crate::client_manager::ClientManager;
use crate::config::ServerConfig;
use crate::entity::LifecycleEvent;
use crate::error::Result;
use crate::game::{GameState, TickOutput};
use log::{debug, error, info, warn};
use shared::{
    timestamp_ms, ClientId, FieldUpdate, NotificationTarget, Packet, MAX_CHANGES_PER_PACKET,
    MAX_PACKET_SIZE, PROTOCOL_VERSION, REASON_TIMED_OUT,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};

/// Longest step the simulation takes after a stall
const MAX_TICK_DT: f32 = 0.05;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: ClientId },
    Shutdown,
}

/// Messages sent from game loop to network tasks
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

/// Stops a running server from another task
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    server_tx: mpsc::UnboundedSender<ServerMessage>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        if self.server_tx.send(ServerMessage::Shutdown).is_err() {
            debug!("Server already stopped");
        }
    }
}

/// Main server coordinating networking and game simulation
pub struct Server {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    clients: Arc<RwLock<ClientManager>>,
    game_state: GameState,
    tick_duration: Duration,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(config: ServerConfig) -> Result<Self> {
        let socket = Arc::new(UdpSocket::bind(config.bind_addr).await?);
        let local_addr = socket.local_addr()?;
        info!("Server listening on {}", local_addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            local_addr,
            clients: Arc::new(RwLock::new(ClientManager::with_timeout(
                config.max_clients,
                config.client_timeout,
            ))),
            game_state: GameState::new(&config.game),
            tick_duration: config.tick_duration,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            server_tx: self.server_tx.clone(),
        }
    }

    pub fn game_state(&self) -> &GameState {
        &self.game_state
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_PACKET_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match Packet::decode(&buffer[..len]) {
                        Ok(packet) => {
                            if server_tx
                                .send(ServerMessage::PacketReceived { packet, addr })
                                .is_err()
                            {
                                debug!("Main loop gone, stopping receiver");
                                break;
                            }
                        }
                        Err(e) => warn!("Malformed packet from {}: {}", addr, e),
                    },
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
                        if let Err(e) = send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::SendToClient { packet, client_id } => {
                        let addr = clients.read().await.addr_of(client_id);
                        match addr {
                            Some(addr) => {
                                if let Err(e) = send_packet_impl(&socket, &packet, addr).await {
                                    error!("Failed to send to client {}: {}", client_id, e);
                                }
                            }
                            None => debug!("Client {} left before packet was sent", client_id),
                        }
                    }
                    GameMessage::BroadcastPacket { packet, exclude } => {
                        let client_addrs = clients.read().await.get_client_addrs();

                        for (client_id, addr) in client_addrs {
                            if Some(client_id) == exclude {
                                continue;
                            }
                            if let Err(e) = send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self, timeout: Duration) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();
        let period = timeout.min(Duration::from_secs(1)).max(Duration::from_millis(10));

        tokio::spawn(async move {
            let mut interval = interval(period);

            loop {
                interval.tick().await;

                let timed_out = clients.write().await.check_timeouts();
                for client_id in timed_out {
                    if server_tx
                        .send(ServerMessage::ClientTimeout { client_id })
                        .is_err()
                    {
                        return;
                    }
                }
            }
        });
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn send_to_client(&self, packet: Packet, client_id: ClientId) {
        if let Err(e) = self
            .game_tx
            .send(GameMessage::SendToClient { packet, client_id })
        {
            error!("Failed to queue packet for client {}: {}", client_id, e);
        }
    }

    fn broadcast_packet(&self, packet: Packet, exclude: Option<ClientId>) {
        if let Err(e) = self
            .game_tx
            .send(GameMessage::BroadcastPacket { packet, exclude })
        {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    /// Processes one packet from a client
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { client_version } => self.handle_connect(client_version, addr).await,

            Packet::Command {
                client_id,
                sequence,
                command,
            } => {
                let known = {
                    let mut clients = self.clients.write().await;
                    let bound = clients.find_client_by_addr(addr);
                    match bound {
                        Some(bound) if bound == client_id => {
                            clients.queue_command(client_id, sequence, command);
                        }
                        Some(bound) => warn!(
                            "Client {} at {} sent a command as client {}, dropping",
                            bound, addr, client_id
                        ),
                        None => {}
                    }
                    bound.is_some()
                };
                if !known {
                    debug!("Command from unknown address {}", addr);
                    self.reject_stale_session(addr);
                }
            }

            Packet::Heartbeat => {
                let known = {
                    let mut clients = self.clients.write().await;
                    let client_id = clients.find_client_by_addr(addr);
                    if let Some(client_id) = client_id {
                        clients.touch(client_id);
                    }
                    client_id.is_some()
                };
                if !known {
                    debug!("Heartbeat from unknown address {}", addr);
                    self.reject_stale_session(addr);
                }
            }

            Packet::Disconnect => {
                let client_id = {
                    let mut clients = self.clients.write().await;
                    let client_id = clients.find_client_by_addr(addr);
                    if let Some(id) = client_id {
                        clients.remove_client(&id);
                    }
                    client_id
                };
                if let Some(client_id) = client_id {
                    self.game_state.remove_player(&client_id);
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Tells a sender we no longer know that its session is gone, so it
    /// reconnects instead of talking into the void
    fn reject_stale_session(&self, addr: SocketAddr) {
        self.send_packet(
            Packet::Disconnected {
                reason: REASON_TIMED_OUT.to_string(),
            },
            addr,
        );
    }

    async fn handle_connect(&mut self, client_version: u32, addr: SocketAddr) {
        info!(
            "Client connecting from {} (version: {})",
            addr, client_version
        );

        if client_version != PROTOCOL_VERSION {
            warn!(
                "Rejecting {}: protocol version {} (expected {})",
                addr, client_version, PROTOCOL_VERSION
            );
            self.send_packet(
                Packet::Disconnected {
                    reason: "Protocol version mismatch".to_string(),
                },
                addr,
            );
            return;
        }

        // A reconnect from the same address replaces the old session
        let existing = {
            let mut clients = self.clients.write().await;
            let existing = clients.find_client_by_addr(addr);
            if let Some(id) = existing {
                info!("Removing existing client {} from {}", id, addr);
                clients.remove_client(&id);
            }
            existing
        };
        if let Some(id) = existing {
            self.game_state.remove_player(&id);
        }

        let client_id = self.clients.write().await.add_client(addr);
        let Some(client_id) = client_id else {
            self.send_packet(
                Packet::Disconnected {
                    reason: "Server full".to_string(),
                },
                addr,
            );
            return;
        };

        let player = self.game_state.add_player(client_id);
        self.send_packet(Packet::Connected { client_id, player }, addr);
        self.send_snapshot(client_id, addr).await;
    }

    /// Sends the whole world to a newly connected client
    async fn send_snapshot(&self, client_id: ClientId, addr: SocketAddr) {
        let (spawns, fields) = self.game_state.snapshot();
        let ack = self
            .clients
            .read()
            .await
            .get_last_processed_commands()
            .get(&client_id)
            .copied()
            .unwrap_or(0);
        let last_processed = HashMap::from([(client_id, ack)]);

        for event in spawns {
            self.send_packet(lifecycle_packet(event), addr);
        }
        for packet in state_update_packets(
            self.game_state.tick,
            timestamp_ms(),
            &last_processed,
            fields,
        ) {
            self.send_packet(packet, addr);
        }
    }

    /// Applies every queued command in arrival order
    async fn process_commands(&mut self) {
        let commands = self.clients.write().await.take_commands();
        if commands.is_empty() {
            return;
        }

        let mut processed: HashMap<ClientId, u32> = HashMap::new();
        for queued in &commands {
            self.game_state
                .apply_command(queued.client_id, &queued.command);
            let highest = processed.entry(queued.client_id).or_insert(0);
            *highest = (*highest).max(queued.sequence);
        }

        let mut clients = self.clients.write().await;
        for (client_id, sequence) in processed {
            clients.mark_command_processed(client_id, sequence);
        }
    }

    /// Runs one simulation tick and queues everything it produced
    pub async fn tick(&mut self, dt: f32) {
        self.process_commands().await;
        self.game_state.step(dt.min(MAX_TICK_DT));

        let output = self.game_state.drain_output();
        self.broadcast_tick_output(output).await;
    }

    async fn broadcast_tick_output(&self, output: TickOutput) {
        let (client_count, last_processed) = {
            let clients = self.clients.read().await;
            (clients.len(), clients.get_last_processed_commands())
        };
        if client_count == 0 {
            return;
        }

        for event in output.lifecycle {
            self.broadcast_packet(lifecycle_packet(event), None);
        }

        // Each recipient only hears its own ack, which keeps datagrams the
        // same size no matter how many clients are connected
        let timestamp = timestamp_ms();
        for (client_id, ack) in last_processed {
            let own = HashMap::from([(client_id, ack)]);
            for packet in
                state_update_packets(self.game_state.tick, timestamp, &own, output.changes.clone())
            {
                self.send_to_client(packet, client_id);
            }
        }

        for dispatch in output.dispatches {
            let packet = Packet::Notify {
                notification: dispatch.notification,
            };
            match dispatch.target {
                NotificationTarget::All => self.broadcast_packet(packet, None),
                NotificationTarget::Client(client_id) => self.send_to_client(packet, client_id),
            }
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<()> {
        let timeout = self.clients.read().await.timeout();
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker(timeout);

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();

        info!(
            "Server started at {:.0}Hz",
            1.0 / self.tick_duration.as_secs_f64()
        );

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        }
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            self.game_state.remove_player(&client_id);
                        }
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            self.broadcast_packet(
                                Packet::Disconnected { reason: "Server shutting down".to_string() },
                                None,
                            );
                            break;
                        }
                    }
                }

                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f32();
                    last_tick = now;

                    self.tick(dt).await;

                    if self.game_state.tick % 600 == 0 {
                        let client_count = self.clients.read().await.len();
                        debug!(
                            "Tick {}: {} clients, {} entities, {:.1}Hz",
                            self.game_state.tick,
                            client_count,
                            self.game_state.registry().len(),
                            1.0 / dt.max(f32::EPSILON)
                        );
                    }
                }
            }
        }

        // Let the sender flush the goodbye
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(())
    }
}

async fn send_packet_impl(socket: &UdpSocket, packet: &Packet, addr: SocketAddr) -> Result<()> {
    let data = packet.encode()?;
    if data.len() > MAX_PACKET_SIZE {
        warn!(
            "Packet of {} bytes to {} exceeds {} bytes",
            data.len(),
            addr,
            MAX_PACKET_SIZE
        );
    }
    socket.send_to(&data, addr).await?;
    Ok(())
}

pub fn lifecycle_packet(event: LifecycleEvent) -> Packet {
    match event {
        LifecycleEvent::Spawned {
            entity,
            kind,
            owner,
        } => Packet::Spawn {
            entity,
            kind,
            owner,
        },
        LifecycleEvent::Despawned { entity } => Packet::Despawn { entity },
    }
}

/// Splits field changes into datagram-sized state updates.
///
/// Always yields at least one packet so clients keep receiving acks.
pub fn state_update_packets(
    tick: u32,
    timestamp: u64,
    last_processed: &HashMap<ClientId, u32>,
    changes: Vec<FieldUpdate>,
) -> Vec<Packet> {
    let make = |changes: Vec<FieldUpdate>| Packet::StateUpdate {
        tick,
        timestamp,
        last_processed: last_processed.clone(),
        changes,
    };

    if changes.is_empty() {
        return vec![make(Vec::new())];
    }
    changes
        .chunks(MAX_CHANGES_PER_PACKET)
        .map(|chunk| make(chunk.to_vec()))
        .collect()
}
