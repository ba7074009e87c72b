//! Authoritative simulation
//!
//! `GameState` owns every entity, the replicated store and the services
//! context. The network layer feeds it commands and calls [`GameState::step`]
//! once per tick, then drains [`GameState::drain_output`] to broadcast what
//! changed.

pub mod bullet;
pub mod door;
pub mod effects;
pub mod platform;
pub mod player;
pub mod powerup;

use crate::context::GameContext;
use crate::entity::{EntityRegistry, LifecycleEvent};
use bullet::{required_substeps, Bullet};
use door::Door;
use effects::EffectKind;
use log::{debug, error, info};
use platform::MovingPlatform;
use player::{DamageOutcome, Player};
use powerup::{PowerUp, PowerUpSpawner};
use shared::config::PlatformConfig;
use shared::math::{flatten, forward, sanitize_rotation};
use shared::{
    Aabb, ClientId, Command, Dispatch, EntityId, EntityKind, FieldChange, FieldKey, FieldUpdate, FieldValue,
    GameConfig, GameRules, Notification, Owner, PowerUpKind, Quat, ReplicatedStore, Role, Vec3,
};
use std::collections::{BTreeMap, HashMap};

/// Everything produced by the simulation since the last drain, in send order
#[derive(Debug, Default)]
pub struct TickOutput {
    pub lifecycle: Vec<LifecycleEvent>,
    pub changes: Vec<FieldUpdate>,
    pub dispatches: Vec<Dispatch>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BulletHit {
    Player(EntityId),
    Door,
}

pub struct GameState {
    pub tick: u32,
    time: f64,
    rules: GameRules,
    half_extent: f32,

    registry: EntityRegistry,
    store: ReplicatedStore,
    context: GameContext,

    players: BTreeMap<EntityId, Player>,
    player_of_client: HashMap<ClientId, EntityId>,
    bullets: BTreeMap<EntityId, Bullet>,
    doors: BTreeMap<EntityId, Door>,
    powerups: BTreeMap<EntityId, PowerUp>,
    platforms: BTreeMap<EntityId, MovingPlatform>,
    spawner: PowerUpSpawner,
}

impl GameState {
    pub fn new(config: &GameConfig) -> Self {
        let rules = config.rules.clone();
        let arena = &config.arena;

        let mut state = Self {
            tick: 0,
            time: 0.0,
            half_extent: arena.half_extent,
            registry: EntityRegistry::new(),
            store: ReplicatedStore::new(Role::Server),
            context: GameContext::new(arena),
            players: BTreeMap::new(),
            player_of_client: HashMap::new(),
            bullets: BTreeMap::new(),
            doors: BTreeMap::new(),
            powerups: BTreeMap::new(),
            platforms: BTreeMap::new(),
            spawner: PowerUpSpawner::new(
                arena.powerup_spawn_points.clone(),
                rules.powerup_initial_delay,
                rules.powerup_spawn_interval,
                rules.powerup_max_concurrent,
            ),
            rules,
        };

        for door in &arena.doors {
            state.spawn_door(Aabb::new(door.position, door.half_extents), door.open);
        }
        for platform in &arena.platforms {
            state.spawn_platform(platform);
        }
        state.replicate();

        info!(
            "Arena ready: {} doors, {} platforms, {} power-up spawn points",
            state.doors.len(),
            state.platforms.len(),
            state.spawner.spawn_points().len()
        );

        state
    }

    /// Simulation time in seconds
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    pub fn store(&self) -> &ReplicatedStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ReplicatedStore {
        &mut self.store
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn player(&self, id: EntityId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn player_mut(&mut self, id: EntityId) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    pub fn player_of(&self, client_id: ClientId) -> Option<EntityId> {
        self.player_of_client.get(&client_id).copied()
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn bullets(&self) -> impl Iterator<Item = &Bullet> {
        self.bullets.values()
    }

    pub fn doors(&self) -> impl Iterator<Item = &Door> {
        self.doors.values()
    }

    pub fn powerups(&self) -> impl Iterator<Item = &PowerUp> {
        self.powerups.values()
    }

    pub fn platforms(&self) -> impl Iterator<Item = &MovingPlatform> {
        self.platforms.values()
    }

    // ---- Entity creation and teardown ----

    /// Creates the player entity of a newly connected client
    pub fn add_player(&mut self, client_id: ClientId) -> EntityId {
        if let Some(existing) = self.player_of(client_id) {
            return existing;
        }

        let spawn = self.context.assign_spawn(client_id);
        let color = self.context.assign_color(client_id);
        let id = self
            .registry
            .spawn(EntityKind::Player, Owner::Client(client_id));

        let player = Player::new(
            id,
            client_id,
            self.clamp_to_arena(spawn.position),
            spawn.yaw,
            color,
            self.rules.max_health,
        );

        info!(
            "Added player {} for client {} at ({:.1}, {:.1}, {:.1})",
            id, client_id, player.position.x, player.position.y, player.position.z
        );

        if let Err(e) = player.replicate(&mut self.store) {
            error!("Failed to replicate new player {}: {}", id, e);
        }
        self.players.insert(id, player);
        self.player_of_client.insert(client_id, id);
        id
    }

    /// Tears down everything a client owns and returns its pooled resources
    pub fn remove_player(&mut self, client_id: &ClientId) {
        for entity in self.registry.owned_by(*client_id) {
            self.despawn(entity);
        }
        self.player_of_client.remove(client_id);
        self.context.release_client(*client_id);
        info!("Removed player for client {}", client_id);
    }

    fn spawn_door(&mut self, bounds: Aabb, open: bool) -> EntityId {
        let id = self.registry.spawn(EntityKind::Door, Owner::Server);
        self.doors.insert(id, Door::new(id, bounds, open));
        self.store.on_change(
            id,
            FieldKey::DoorOpen,
            Box::new(move |change: &FieldChange| {
                if change.previous.is_some() {
                    let open = matches!(change.value, FieldValue::Bool(true));
                    info!("Door {} is now {}", id, if open { "open" } else { "closed" });
                }
            }),
        );
        id
    }

    fn spawn_platform(&mut self, config: &PlatformConfig) -> EntityId {
        let id = self
            .registry
            .spawn(EntityKind::MovingPlatform, Owner::Server);
        self.platforms.insert(id, MovingPlatform::new(id, config));
        id
    }

    fn spawn_bullet(&mut self, owner: ClientId, position: Vec3, rotation: Quat) -> EntityId {
        let id = self.registry.spawn(EntityKind::Bullet, Owner::Server);
        let bullet = Bullet::new(
            id,
            owner,
            position,
            forward(rotation) * self.rules.bullet_speed,
            self.rules.bullet_damage,
            self.context.color_of(owner),
            self.time + self.rules.bullet_lifetime as f64,
        );
        self.bullets.insert(id, bullet);
        id
    }

    fn spawn_powerup(&mut self) -> Option<EntityId> {
        let points = self.spawner.spawn_points();
        let index = self.context.random_index(points.len())?;
        let position = points[index];
        let kind = self.context.random_powerup_kind();

        let id = self.registry.spawn(EntityKind::PowerUp, Owner::Server);
        self.powerups.insert(id, PowerUp::new(id, kind, position));
        info!(
            "Spawned {:?} power-up {} at ({:.1}, {:.1}, {:.1})",
            kind, id, position.x, position.y, position.z
        );
        Some(id)
    }

    /// Removes an entity from the world. Returns false if it was already gone.
    pub fn despawn(&mut self, id: EntityId) -> bool {
        let Some(record) = self.registry.despawn(id) else {
            return false;
        };

        self.store.remove_entity(id);
        match record.kind {
            EntityKind::Player => {
                self.players.remove(&id);
            }
            EntityKind::Bullet => {
                self.bullets.remove(&id);
            }
            EntityKind::Door => {
                self.doors.remove(&id);
            }
            EntityKind::PowerUp => {
                self.powerups.remove(&id);
            }
            EntityKind::MovingPlatform => {
                self.platforms.remove(&id);
            }
        }
        true
    }

    // ---- Commands ----

    /// Validates and applies one client command. Returns whether it was accepted;
    /// rejected commands have no effect and are not reported to the client.
    pub fn apply_command(&mut self, client_id: ClientId, command: &Command) -> bool {
        let Some(player_id) = self.player_of(client_id) else {
            debug!("Dropping {} from client {} without a player", command.name(), client_id);
            return false;
        };

        let accepted = match *command {
            Command::Move { direction } => self.handle_move(player_id, direction),
            Command::Fire { position, rotation } => self.handle_fire(player_id, position, rotation),
            Command::Interact => self.handle_interact(player_id),
            Command::Dash { direction } => self.handle_dash(player_id, direction),
            Command::Look { delta_x, delta_y } => self.handle_look(player_id, delta_x, delta_y),
            Command::Respawn => self.handle_respawn(player_id),
        };

        if !accepted {
            debug!("Dropped {} from client {}", command.name(), client_id);
        }
        accepted
    }

    fn handle_move(&mut self, player_id: EntityId, direction: Vec3) -> bool {
        let Some(player) = self.players.get_mut(&player_id) else {
            return false;
        };
        if player.is_dead() || !direction.is_finite() {
            return false;
        }

        let flat = flatten(direction);
        player.move_direction = if flat.length() > 1.0 {
            flat.normalize_or_zero()
        } else {
            flat
        };
        true
    }

    fn handle_fire(&mut self, player_id: EntityId, position: Vec3, rotation: Quat) -> bool {
        let now = self.time;
        let Some(player) = self.players.get_mut(&player_id) else {
            return false;
        };
        if !player.can_fire(now) || !position.is_finite() {
            return false;
        }
        if position.distance(player.position) > self.rules.fire_origin_tolerance {
            return false;
        }

        player.record_shot(now, &self.rules);
        let owner = player.client_id;
        self.spawn_bullet(owner, position, sanitize_rotation(rotation));
        true
    }

    fn handle_interact(&mut self, player_id: EntityId) -> bool {
        let Some(player) = self.players.get(&player_id) else {
            return false;
        };
        if player.is_dead() {
            return false;
        }

        let origin = player.position;
        let range = self.rules.interaction_range;
        let nearest = self
            .doors
            .values()
            .map(|door| (door.id, door.bounds.closest_point(origin).distance(origin)))
            .filter(|(_, dist)| *dist <= range)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id);

        let Some(door_id) = nearest else {
            return false;
        };
        let Some(door) = self.doors.get_mut(&door_id) else {
            return false;
        };

        match door.toggle(&mut self.store) {
            Ok(_) => true,
            Err(e) => {
                error!("Door {} could not be toggled: {}", door_id, e);
                false
            }
        }
    }

    fn handle_dash(&mut self, player_id: EntityId, direction: Vec3) -> bool {
        let now = self.time;
        let Some(player) = self.players.get_mut(&player_id) else {
            return false;
        };
        if !direction.is_finite() || !player.start_dash(direction, now, &self.rules) {
            return false;
        }

        let notification = Notification::DashStarted {
            player: player_id,
            position: player.position,
            direction: player.velocity(now, &self.rules).normalize_or_zero(),
        };
        self.context.broadcast(notification);
        true
    }

    fn handle_look(&mut self, player_id: EntityId, delta_x: f32, delta_y: f32) -> bool {
        let Some(player) = self.players.get_mut(&player_id) else {
            return false;
        };
        if player.is_dead() || !delta_x.is_finite() || !delta_y.is_finite() {
            return false;
        }
        player.apply_look(delta_x, delta_y, &self.rules);
        true
    }

    fn handle_respawn(&mut self, player_id: EntityId) -> bool {
        let alive = self
            .players
            .get(&player_id)
            .map_or(true, |player| player.is_alive());
        if alive {
            return false;
        }

        let spawn = self.context.random_spawn();
        let position = self.clamp_to_arena(spawn.position);
        let Some(player) = self.players.get_mut(&player_id) else {
            return false;
        };
        if !player.respawn(position, spawn.yaw) {
            return false;
        }

        info!("Player {} respawned", player_id);
        self.context
            .broadcast(Notification::PlayerRespawned { player: player_id, position });
        true
    }

    // ---- Damage ----

    /// Applies damage to a player, firing the death transition at most once per life
    pub fn apply_damage(&mut self, player_id: EntityId, amount: i32) -> DamageOutcome {
        let Some(player) = self.players.get_mut(&player_id) else {
            return DamageOutcome::Ignored;
        };

        let outcome = player.take_damage(amount);
        if outcome == DamageOutcome::Died {
            info!("Player {} died", player_id);
            let notification = Notification::PlayerDeath {
                player: player_id,
                position: player.position,
                rotation: player.orientation(),
            };
            self.context.broadcast(notification);
        }
        outcome
    }

    // ---- Simulation ----

    /// Advances the world by `dt` seconds
    pub fn step(&mut self, dt: f32) {
        let dt = dt.max(0.0);
        self.time += dt as f64;
        self.tick = self.tick.wrapping_add(1);

        if self.spawner.poll(self.time, self.powerups.len()) {
            self.spawn_powerup();
        }

        self.move_players(dt);
        for platform in self.platforms.values_mut() {
            platform.step(self.time, dt);
        }
        self.update_bullets(dt);
        self.collect_powerups();
        self.expire_timers();
        self.replicate();
    }

    fn move_players(&mut self, dt: f32) {
        let now = self.time;
        let limit = self.half_extent;
        for player in self.players.values_mut() {
            if player.is_dead() {
                continue;
            }
            let velocity = player.velocity(now, &self.rules);
            let mut next = player.position + velocity * dt;
            next.x = next.x.clamp(-limit, limit);
            next.z = next.z.clamp(-limit, limit);
            player.position = next;
        }
    }

    fn update_bullets(&mut self, dt: f32) {
        let now = self.time;
        let ids: Vec<EntityId> = self.bullets.keys().copied().collect();

        for id in ids {
            let Some(bullet) = self.bullets.get(&id) else {
                continue;
            };
            if bullet.is_expired(now) {
                self.despawn(id);
                continue;
            }
            let (start, owner) = (bullet.position, bullet.owner);
            let travel = bullet.velocity * dt;

            let steps = required_substeps(travel.length(), self.rules.bullet_radius * 2.0);
            let step = travel * (1.0 / steps as f32);

            let mut position = start;
            let mut hit = None;
            for _ in 0..steps {
                position += step;
                hit = self.find_bullet_hit(owner, position);
                if hit.is_some() {
                    break;
                }
            }

            let out_of_bounds =
                position.x.abs() > self.half_extent || position.z.abs() > self.half_extent;

            match hit {
                Some(target) => self.resolve_bullet_hit(id, position, target),
                None if out_of_bounds => {
                    self.despawn(id);
                }
                None => {
                    if let Some(bullet) = self.bullets.get_mut(&id) {
                        bullet.position = position;
                    }
                }
            }
        }
    }

    fn find_bullet_hit(&self, owner: ClientId, position: Vec3) -> Option<BulletHit> {
        let reach = self.rules.player_radius + self.rules.bullet_radius;
        let player = self
            .players
            .values()
            .filter(|p| p.is_alive() && p.client_id != owner)
            .find(|p| p.position.distance(position) <= reach)
            .map(|p| BulletHit::Player(p.id));
        if player.is_some() {
            return player;
        }

        self.doors
            .values()
            .filter(|d| d.blocks_bullets())
            .find(|d| d.bounds.intersects_sphere(position, self.rules.bullet_radius))
            .map(|_| BulletHit::Door)
    }

    fn resolve_bullet_hit(&mut self, bullet_id: EntityId, position: Vec3, target: BulletHit) {
        let Some(bullet) = self.bullets.get_mut(&bullet_id) else {
            return;
        };
        if !bullet.register_hit() {
            return;
        }
        let damage = bullet.damage;
        let incoming = bullet.velocity.normalize_or_zero();

        let normal = match target {
            BulletHit::Player(player_id) => {
                let outcome = self.apply_damage(player_id, damage);
                debug!("Bullet {} hit player {}: {:?}", bullet_id, player_id, outcome);
                self.players
                    .get(&player_id)
                    .map(|p| (position - p.position).normalize_or_zero())
                    .unwrap_or(-incoming)
            }
            BulletHit::Door => -incoming,
        };

        self.context
            .broadcast(Notification::BulletImpact { position, normal });
        self.despawn(bullet_id);
    }

    fn collect_powerups(&mut self) {
        let now = self.time;
        let radius = self.rules.player_radius + self.rules.powerup_pickup_radius;
        let ids: Vec<EntityId> = self.powerups.keys().copied().collect();

        for id in ids {
            let Some(powerup) = self.powerups.get(&id) else {
                continue;
            };
            if !powerup.can_be_picked_up() {
                continue;
            }
            let at = powerup.position;

            let picker = self
                .players
                .values()
                .filter(|p| p.is_alive())
                .map(|p| (p.id, p.position.distance(at)))
                .filter(|(_, dist)| *dist <= radius)
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(pid, _)| pid);

            let Some(player_id) = picker else {
                continue;
            };
            let Some(kind) = self.powerups.get_mut(&id).and_then(|p| p.try_consume()) else {
                continue;
            };

            self.apply_powerup(player_id, kind, now);
            self.despawn(id);
        }
    }

    fn apply_powerup(&mut self, player_id: EntityId, kind: PowerUpKind, now: f64) {
        let Some(player) = self.players.get_mut(&player_id) else {
            return;
        };

        match kind {
            PowerUpKind::Speed => {
                player
                    .effects
                    .apply(EffectKind::SpeedBoost, now, self.rules.speed_boost_duration);
            }
            PowerUpKind::FireRate => {
                player
                    .effects
                    .apply(EffectKind::RapidFire, now, self.rules.fire_rate_duration);
            }
            PowerUpKind::Health => {
                player.heal(self.rules.health_pickup_amount);
            }
        }

        info!("Player {} picked up {:?}", player_id, kind);
        let client_id = player.client_id;
        self.context.send_to(
            client_id,
            Notification::PowerUpPickedUp {
                player: player_id,
                kind,
            },
        );
    }

    fn expire_timers(&mut self) {
        let now = self.time;
        for player in self.players.values_mut() {
            if player.update_dash(now) {
                debug!("Player {} dash ended", player.id);
            }
            for effect in player.effects.expire(now) {
                debug!("Player {} effect {:?} ended", player.id, effect);
            }
        }
    }

    /// Writes the current state of every entity into the store
    fn replicate(&mut self) {
        let store = &mut self.store;
        let mut failures = Vec::new();

        for player in self.players.values() {
            if let Err(e) = player.replicate(store) {
                failures.push((player.id, e));
            }
        }
        for door in self.doors.values() {
            if let Err(e) = door.replicate(store) {
                failures.push((door.id, e));
            }
        }
        for powerup in self.powerups.values() {
            if let Err(e) = powerup.replicate(store) {
                failures.push((powerup.id, e));
            }
        }
        for platform in self.platforms.values() {
            if let Err(e) = platform.replicate(store) {
                failures.push((platform.id, e));
            }
        }
        for bullet in self.bullets.values() {
            if let Err(e) = bullet.replicate(store) {
                failures.push((bullet.id, e));
            }
        }

        for (id, e) in failures {
            error!("Failed to replicate {}: {}", id, e);
        }
    }

    fn clamp_to_arena(&self, position: Vec3) -> Vec3 {
        let limit = self.half_extent;
        Vec3::new(
            position.x.clamp(-limit, limit),
            position.y,
            position.z.clamp(-limit, limit),
        )
    }

    // ---- Output ----

    pub fn drain_output(&mut self) -> TickOutput {
        TickOutput {
            lifecycle: self.registry.drain_events(),
            changes: self.store.drain_changes(),
            dispatches: self.context.drain_dispatches(),
        }
    }

    /// Spawn events and field values describing the whole world
    pub fn snapshot(&self) -> (Vec<LifecycleEvent>, Vec<FieldUpdate>) {
        (self.registry.spawn_events(), self.store.snapshot())
    }
}
