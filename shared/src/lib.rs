//! Types shared by the arena server and its clients: math, wire protocol,
//! replicated state store and game configuration.

pub mod config;
pub mod math;
pub mod protocol;
pub mod replication;
pub mod types;

pub use config::{ArenaConfig, ConfigError, GameConfig, GameRules};
pub use math::{Aabb, Quat, Vec3};
pub use protocol::{
    Command, Dispatch, Notification, NotificationTarget, Packet, MAX_CHANGES_PER_PACKET,
    MAX_PACKET_SIZE, PROTOCOL_VERSION, REASON_TIMED_OUT,
};
pub use replication::{
    fields, FieldChange, FieldKey, FieldUpdate, FieldValue, ObserverId, ReplicatedField,
    ReplicatedStore, ReplicationError, Role,
};
pub use types::{ClientId, Color, EntityId, EntityKind, Owner, PowerUpKind};

/// Milliseconds since the Unix epoch, saturating at zero on clock errors
pub fn timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or(std::time::Duration::from_secs(0))
        .as_millis()
        .min(u64::MAX as u128) as u64
}
