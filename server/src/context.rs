//! Services shared by the simulation: spawn points, player colors,
//! randomness and the outgoing notification queue.
//!
//! Owned by `GameState` and passed by reference to whatever needs it.

use log::{info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use shared::config::{ArenaConfig, SpawnPoint};
use shared::{ClientId, Color, Dispatch, Notification, NotificationTarget, PowerUpKind, Vec3};
use std::collections::HashMap;

const FALLBACK_SPAWN: SpawnPoint = SpawnPoint {
    position: Vec3::Y,
    yaw: 0.0,
};

#[derive(Debug)]
pub struct GameContext {
    spawn_points: Vec<SpawnPoint>,
    available_spawns: Vec<usize>,
    spawn_of_client: HashMap<ClientId, usize>,

    palette: Vec<Color>,
    available_colors: Vec<usize>,
    color_of_client: HashMap<ClientId, usize>,

    rng: StdRng,
    dispatches: Vec<Dispatch>,
}

impl GameContext {
    pub fn new(arena: &ArenaConfig) -> Self {
        if arena.spawn_points.is_empty() {
            warn!("No spawn points configured, players will spawn at {:?}", FALLBACK_SPAWN.position);
        }

        Self {
            spawn_points: arena.spawn_points.clone(),
            available_spawns: (0..arena.spawn_points.len()).collect(),
            spawn_of_client: HashMap::new(),
            palette: arena.colors.clone(),
            available_colors: (0..arena.colors.len()).collect(),
            color_of_client: HashMap::new(),
            rng: StdRng::seed_from_u64(arena.seed),
            dispatches: Vec::new(),
        }
    }

    /// Picks an unused color for a client, or white once the palette is exhausted
    pub fn assign_color(&mut self, client_id: ClientId) -> Color {
        if let Some(&index) = self.color_of_client.get(&client_id) {
            return self.palette[index];
        }

        if self.available_colors.is_empty() {
            warn!("No colors left for client {}, using white", client_id);
            return Color::WHITE;
        }

        let pick = self.rng.gen_range(0..self.available_colors.len());
        let index = self.available_colors.swap_remove(pick);
        self.color_of_client.insert(client_id, index);
        info!("Assigned color {} to client {}", self.palette[index], client_id);
        self.palette[index]
    }

    pub fn color_of(&self, client_id: ClientId) -> Color {
        self.color_of_client
            .get(&client_id)
            .map(|&i| self.palette[i])
            .unwrap_or(Color::WHITE)
    }

    /// Picks an unused spawn point for a joining client.
    /// Falls back to a random (possibly shared) one when all are taken.
    pub fn assign_spawn(&mut self, client_id: ClientId) -> SpawnPoint {
        if self.available_spawns.is_empty() {
            if !self.spawn_points.is_empty() {
                warn!("No free spawn point for client {}, sharing one", client_id);
            }
            return self.random_spawn();
        }

        let pick = self.rng.gen_range(0..self.available_spawns.len());
        let index = self.available_spawns.swap_remove(pick);
        self.spawn_of_client.insert(client_id, index);
        self.spawn_points[index].clone()
    }

    pub fn random_spawn(&mut self) -> SpawnPoint {
        self.spawn_points
            .choose(&mut self.rng)
            .cloned()
            .unwrap_or(FALLBACK_SPAWN)
    }

    /// Returns a client's color and spawn point to the pools
    pub fn release_client(&mut self, client_id: ClientId) {
        if let Some(index) = self.color_of_client.remove(&client_id) {
            if !self.available_colors.contains(&index) {
                self.available_colors.push(index);
            }
        }
        if let Some(index) = self.spawn_of_client.remove(&client_id) {
            if !self.available_spawns.contains(&index) {
                self.available_spawns.push(index);
            }
        }
    }

    pub fn random_powerup_kind(&mut self) -> PowerUpKind {
        *PowerUpKind::ALL
            .choose(&mut self.rng)
            .unwrap_or(&PowerUpKind::Health)
    }

    pub fn random_index(&mut self, len: usize) -> Option<usize> {
        if len == 0 {
            None
        } else {
            Some(self.rng.gen_range(0..len))
        }
    }

    pub fn broadcast(&mut self, notification: Notification) {
        self.dispatches.push(Dispatch {
            target: NotificationTarget::All,
            notification,
        });
    }

    pub fn send_to(&mut self, client_id: ClientId, notification: Notification) {
        self.dispatches.push(Dispatch {
            target: NotificationTarget::Client(client_id),
            notification,
        });
    }

    pub fn drain_dispatches(&mut self) -> Vec<Dispatch> {
        std::mem::take(&mut self.dispatches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn arena() -> ArenaConfig {
        ArenaConfig::default()
    }

    #[test]
    fn test_colors_are_unique_until_exhausted() {
        let config = arena();
        let mut ctx = GameContext::new(&config);

        let colors: HashSet<Color> = (1..=config.colors.len() as u32)
            .map(|id| ctx.assign_color(id))
            .collect();
        assert_eq!(colors.len(), config.colors.len());

        assert_eq!(ctx.assign_color(99), Color::WHITE);
    }

    #[test]
    fn test_released_color_is_reused() {
        let mut config = arena();
        config.colors = vec![Color::RED];
        let mut ctx = GameContext::new(&config);

        assert_eq!(ctx.assign_color(1), Color::RED);
        assert_eq!(ctx.assign_color(2), Color::WHITE);
        ctx.release_client(1);
        assert_eq!(ctx.assign_color(2), Color::RED);
        assert_eq!(ctx.color_of(2), Color::RED);
        assert_eq!(ctx.color_of(1), Color::WHITE);
    }

    #[test]
    fn test_assign_color_is_stable_per_client() {
        let mut ctx = GameContext::new(&arena());
        let first = ctx.assign_color(5);
        assert_eq!(ctx.assign_color(5), first);
    }

    #[test]
    fn test_spawn_points_unique() {
        let config = arena();
        let mut ctx = GameContext::new(&config);

        let mut seen = Vec::new();
        for id in 1..=config.spawn_points.len() as u32 {
            let p = ctx.assign_spawn(id).position;
            assert!(!seen.contains(&p));
            seen.push(p);
        }
    }

    #[test]
    fn test_empty_spawn_list_falls_back() {
        let mut config = arena();
        config.spawn_points.clear();
        let mut ctx = GameContext::new(&config);

        assert_eq!(ctx.assign_spawn(1).position, Vec3::Y);
        assert_eq!(ctx.random_spawn().position, Vec3::Y);
    }

    #[test]
    fn test_dispatch_targets() {
        let mut ctx = GameContext::new(&arena());
        ctx.broadcast(Notification::BulletImpact {
            position: Vec3::ZERO,
            normal: Vec3::Y,
        });
        ctx.send_to(
            3,
            Notification::PowerUpPickedUp {
                player: shared::EntityId(1),
                kind: PowerUpKind::Speed,
            },
        );

        let dispatches = ctx.drain_dispatches();
        assert_eq!(dispatches[0].target, NotificationTarget::All);
        assert_eq!(dispatches[1].target, NotificationTarget::Client(3));
        assert!(ctx.drain_dispatches().is_empty());
    }
}
