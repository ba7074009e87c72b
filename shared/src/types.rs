use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier assigned by the server to each connected client
pub type ClientId = u32;

/// Identifier of a networked entity, unique for the lifetime of a server run
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Player,
    Bullet,
    Door,
    PowerUp,
    MovingPlatform,
}

/// Who owns an entity. Owned entities are despawned with their client.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    Server,
    Client(ClientId),
}

impl Owner {
    pub fn client(&self) -> Option<ClientId> {
        match self {
            Owner::Server => None,
            Owner::Client(id) => Some(*id),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PowerUpKind {
    Speed,
    FireRate,
    Health,
}

impl PowerUpKind {
    pub const ALL: [PowerUpKind; 3] = [PowerUpKind::Speed, PowerUpKind::FireRate, PowerUpKind::Health];
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const RED: Color = Color::rgb(220, 40, 40);
    pub const BLUE: Color = Color::rgb(40, 90, 220);
    pub const GREEN: Color = Color::rgb(40, 180, 70);
    pub const YELLOW: Color = Color::rgb(230, 210, 40);
    pub const PURPLE: Color = Color::rgb(140, 60, 200);
    pub const ORANGE: Color = Color::rgb(240, 140, 30);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}
