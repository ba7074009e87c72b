//! Connected clients and their queued commands
//!
//! Commands are queued as they arrive and handed to the simulation once per
//! tick in global arrival order. Nothing is reordered by sequence number: a
//! late command is applied late, not rejected.

use log::{error, info};
use shared::{ClientId, Command};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// A command waiting for the next tick
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedCommand {
    /// Position in the server-wide arrival order
    pub arrival: u64,
    pub client_id: ClientId,
    pub sequence: u32,
    pub command: Command,
}

#[derive(Debug)]
pub struct Client {
    pub id: ClientId,
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
    /// Highest command sequence applied by the simulation
    pub last_processed_command: u32,
    pub pending_commands: Vec<QueuedCommand>,
}

impl Client {
    pub fn new(id: ClientId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            last_processed_command: 0,
            pending_commands: Vec::new(),
        }
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Roster of connected clients with a capacity limit.
///
/// Client ids start at 1 and are never reused while the server runs.
pub struct ClientManager {
    clients: HashMap<ClientId, Client>,
    next_client_id: ClientId,
    max_clients: usize,
    timeout: Duration,
    next_arrival: u64,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self::with_timeout(max_clients, DEFAULT_CLIENT_TIMEOUT)
    }

    pub fn with_timeout(max_clients: usize, timeout: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
            timeout,
            next_arrival: 0,
        }
    }

    /// Registers a client. Returns `None` when the server is full or has
    /// handed out every client id.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<ClientId> {
        if self.is_full() {
            return None;
        }

        let client_id = self.next_client_id;
        let Some(next) = client_id.checked_add(1) else {
            error!("Client ids exhausted, refusing {}", addr);
            return None;
        };
        self.next_client_id = next;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));
        Some(client_id)
    }

    pub fn remove_client(&mut self, client_id: &ClientId) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!("Client {} disconnected", client.id);
            true
        } else {
            false
        }
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<ClientId> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn addr_of(&self, client_id: ClientId) -> Option<SocketAddr> {
        self.clients.get(&client_id).map(|client| client.addr)
    }

    /// Records activity from a client so it does not time out
    pub fn touch(&mut self, client_id: ClientId) -> bool {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.last_seen = Instant::now();
            true
        } else {
            false
        }
    }

    /// Queues a command for the next tick. Returns false for unknown clients.
    pub fn queue_command(&mut self, client_id: ClientId, sequence: u32, command: Command) -> bool {
        let arrival = self.next_arrival;
        let Some(client) = self.clients.get_mut(&client_id) else {
            return false;
        };

        client.last_seen = Instant::now();
        client.pending_commands.push(QueuedCommand {
            arrival,
            client_id,
            sequence,
            command,
        });
        self.next_arrival += 1;
        true
    }

    /// Removes and returns every queued command, oldest arrival first
    pub fn take_commands(&mut self) -> Vec<QueuedCommand> {
        let mut commands: Vec<QueuedCommand> = self
            .clients
            .values_mut()
            .flat_map(|client| std::mem::take(&mut client.pending_commands))
            .collect();
        commands.sort_by_key(|queued| queued.arrival);
        commands
    }

    pub fn mark_command_processed(&mut self, client_id: ClientId, sequence: u32) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.last_processed_command = client.last_processed_command.max(sequence);
        }
    }

    /// Highest processed command sequence of every client, sent as acks
    pub fn get_last_processed_commands(&self) -> HashMap<ClientId, u32> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.last_processed_command))
            .collect()
    }

    /// Removes clients that have been silent for longer than the timeout
    pub fn check_timeouts(&mut self) -> Vec<ClientId> {
        let timeout = self.timeout;
        let timed_out: Vec<ClientId> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &timed_out {
            info!("Client {} timed out", client_id);
            self.remove_client(client_id);
        }

        timed_out
    }

    pub fn get_client_addrs(&self) -> Vec<(ClientId, SocketAddr)> {
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

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_full(&self) -> bool {
        self.clients.len() >= self.max_clients
    }
}
