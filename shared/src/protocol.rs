//! Wire protocol between client and server
//!
//! One `Packet` per UDP datagram, encoded with bincode.

use crate::math::{Quat, Vec3};
use crate::replication::FieldUpdate;
use crate::types::{ClientId, EntityId, EntityKind, Owner, PowerUpKind};
use bincode::Options;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_PACKET_SIZE: usize = 4096;
/// Field updates per `StateUpdate` datagram; larger batches are split
pub const MAX_CHANGES_PER_PACKET: usize = 32;
/// `Disconnected` reason for a sender whose session the server dropped
pub const REASON_TIMED_OUT: &str = "Timed out";

/// Gameplay request from a client. The server may drop any of them silently.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub enum Command {
    Move { direction: Vec3 },
    Fire { position: Vec3, rotation: Quat },
    Interact,
    Dash { direction: Vec3 },
    Look { delta_x: f32, delta_y: f32 },
    Respawn,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Move { .. } => "move",
            Command::Fire { .. } => "fire",
            Command::Interact => "interact",
            Command::Dash { .. } => "dash",
            Command::Look { .. } => "look",
            Command::Respawn => "respawn",
        }
    }
}

/// Cosmetic cue from the server. Losing one never affects game state.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub enum Notification {
    BulletImpact {
        position: Vec3,
        normal: Vec3,
    },
    PlayerDeath {
        player: EntityId,
        position: Vec3,
        rotation: Quat,
    },
    DashStarted {
        player: EntityId,
        position: Vec3,
        direction: Vec3,
    },
    PowerUpPickedUp {
        player: EntityId,
        kind: PowerUpKind,
    },
    PlayerRespawned {
        player: EntityId,
        position: Vec3,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationTarget {
    All,
    Client(ClientId),
}

/// A notification together with who should receive it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dispatch {
    pub target: NotificationTarget,
    pub notification: Notification,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    // Client -> server
    Connect {
        client_version: u32,
    },
    Command {
        client_id: ClientId,
        sequence: u32,
        command: Command,
    },
    Heartbeat,
    Disconnect,

    // Server -> client
    Connected {
        client_id: ClientId,
        player: EntityId,
    },
    Spawn {
        entity: EntityId,
        kind: EntityKind,
        owner: Owner,
    },
    Despawn {
        entity: EntityId,
    },
    StateUpdate {
        tick: u32,
        timestamp: u64,
        last_processed: HashMap<ClientId, u32>,
        changes: Vec<FieldUpdate>,
    },
    Notify {
        notification: Notification,
    },
    Disconnected {
        reason: String,
    },
}

impl Packet {
    pub fn encode(&self) -> bincode::Result<Vec<u8>> {
        bincode::serialize(self)
    }

    /// Decodes a datagram, refusing to allocate more than a datagram's worth
    pub fn decode(bytes: &[u8]) -> bincode::Result<Packet> {
        bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .allow_trailing_bytes()
            .with_limit(MAX_PACKET_SIZE as u64)
            .deserialize(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::{FieldKey, FieldValue};

    #[test]
    fn test_packet_serialization_command() {
        let packet = Packet::Command {
            client_id: 3,
            sequence: 17,
            command: Command::Fire {
                position: Vec3::new(1.0, 1.5, -2.0),
                rotation: crate::math::yaw_pitch(90.0, 0.0),
            },
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Command {
                client_id,
                sequence,
                command: Command::Fire { position, .. },
            } => {
                assert_eq!(client_id, 3);
                assert_eq!(sequence, 17);
                assert_eq!(position, Vec3::new(1.0, 1.5, -2.0));
            }
            other => panic!("Wrong packet after deserialization: {:?}", other),
        }
    }

    #[test]
    fn test_full_state_update_fits_in_datagram() {
        let changes: Vec<FieldUpdate> = (0..MAX_CHANGES_PER_PACKET as u64)
            .map(|i| FieldUpdate {
                entity: EntityId(i),
                field: FieldKey::Position,
                value: FieldValue::Vec3(Vec3::new(1.0, 2.0, 3.0)),
                revision: u64::MAX,
            })
            .collect();

        // Every recipient gets its own ack only
        let last_processed = HashMap::from([(u32::MAX, u32::MAX)]);

        let packet = Packet::StateUpdate {
            tick: u32::MAX,
            timestamp: u64::MAX,
            last_processed,
            changes,
        };

        let size = bincode::serialize(&packet).unwrap().len();
        assert!(size < MAX_PACKET_SIZE, "state update is {} bytes", size);
    }

    #[test]
    fn test_command_names() {
        assert_eq!(Command::Interact.name(), "interact");
        assert_eq!(Command::Respawn.name(), "respawn");
        assert_eq!(
            Command::Look {
                delta_x: 0.0,
                delta_y: 0.0
            }
            .name(),
            "look"
        );
    }

    #[test]
    fn test_decode_matches_encode() {
        let packet = Packet::Connected {
            client_id: 7,
            player: EntityId(12),
        };
        let bytes = packet.encode().unwrap();
        assert_eq!(bytes, bincode::serialize(&packet).unwrap());

        match Packet::decode(&bytes).unwrap() {
            Packet::Connected { client_id, player } => {
                assert_eq!(client_id, 7);
                assert_eq!(player, EntityId(12));
            }
            other => panic!("Unexpected packet {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Packet::decode(&[]).is_err());
        assert!(Packet::decode(&[0xff, 0xff, 0xff, 0xff, 1, 2]).is_err());

        // Disconnected with a reason claiming to be 4GB long
        let mut bytes = 9u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&u64::MAX.to_le_bytes());
        assert!(Packet::decode(&bytes).is_err());
    }
}
