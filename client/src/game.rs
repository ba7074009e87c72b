//! Client-side view of the world: a read-only mirror of the server's
//! replicated store plus the set of entities the server told us about.

use log::{debug, info, warn};
use shared::{
    fields, ClientId, EntityId, EntityKind, FieldChange, FieldKey, FieldUpdate, FieldValue,
    Notification, ObserverId, Owner, ReplicatedStore, Role, Vec3,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownEntity {
    pub kind: EntityKind,
    pub owner: Owner,
}

pub struct ClientGameState {
    pub tick: u32,
    pub client_id: Option<ClientId>,
    pub player: Option<EntityId>,
    store: ReplicatedStore,
    entities: BTreeMap<EntityId, KnownEntity>,
    /// Entity ids are never reused, so late updates for these are dropped
    despawned: HashSet<EntityId>,
    health_history: Arc<Mutex<Vec<i32>>>,
    observers: Vec<ObserverId>,
    last_acked: u32,
    notifications: usize,
}

impl ClientGameState {
    pub fn new() -> Self {
        Self {
            tick: 0,
            client_id: None,
            player: None,
            store: ReplicatedStore::new(Role::Client),
            entities: BTreeMap::new(),
            despawned: HashSet::new(),
            health_history: Arc::new(Mutex::new(Vec::new())),
            observers: Vec::new(),
            last_acked: 0,
            notifications: 0,
        }
    }

    /// Binds this state to our client id and player entity and starts
    /// watching that player's health.
    pub fn on_connected(&mut self, client_id: ClientId, player: EntityId) {
        self.reset();
        self.client_id = Some(client_id);
        self.player = Some(player);

        let history = Arc::clone(&self.health_history);
        let health = self.store.on_change(
            player,
            FieldKey::Health,
            Box::new(move |change: &FieldChange| {
                if let FieldValue::Int(hp) = change.value {
                    match change.previous {
                        Some(FieldValue::Int(old)) => info!("Health {} -> {}", old, hp),
                        _ => info!("Health {}", hp),
                    }
                    if let Ok(mut history) = history.lock() {
                        history.push(hp);
                    }
                }
            }),
        );
        let dead = self.store.on_change(
            player,
            FieldKey::Dead,
            Box::new(|change: &FieldChange| {
                if change.value == FieldValue::Bool(true) {
                    info!("You died");
                } else if change.previous.is_some() {
                    info!("You are alive again");
                }
            }),
        );
        self.observers = vec![health, dead];
    }

    /// Forgets everything, e.g. after a disconnect
    pub fn reset(&mut self) {
        for id in self.observers.drain(..) {
            self.store.remove_observer(id);
        }
        self.store = ReplicatedStore::new(Role::Client);
        self.entities.clear();
        self.despawned.clear();
        self.tick = 0;
        self.client_id = None;
        self.player = None;
        self.last_acked = 0;
        if let Ok(mut history) = self.health_history.lock() {
            history.clear();
        }
    }

    /// Returns false if the entity was already known
    pub fn on_spawn(&mut self, entity: EntityId, kind: EntityKind, owner: Owner) -> bool {
        if self.entities.contains_key(&entity) || self.despawned.contains(&entity) {
            return false;
        }
        debug!("Spawned {:?} {} owned by {:?}", kind, entity, owner);
        self.entities.insert(entity, KnownEntity { kind, owner });
        true
    }

    pub fn on_despawn(&mut self, entity: EntityId) -> bool {
        let known = self.entities.remove(&entity).is_some();
        self.despawned.insert(entity);
        self.store.remove_entity(entity);
        if known && Some(entity) == self.player {
            warn!("Our player {} was despawned", entity);
        }
        known
    }

    /// Applies a state update; returns how many field changes were new
    pub fn apply_state_update(
        &mut self,
        tick: u32,
        last_processed: &HashMap<ClientId, u32>,
        changes: Vec<FieldUpdate>,
    ) -> usize {
        self.tick = self.tick.max(tick);
        if let Some(ack) = self.client_id.and_then(|id| last_processed.get(&id)) {
            self.last_acked = self.last_acked.max(*ack);
        }

        let mut applied = 0;
        for update in changes {
            if self.despawned.contains(&update.entity) {
                continue;
            }
            match self.store.apply_remote(update) {
                Ok(true) => applied += 1,
                Ok(false) => {}
                Err(e) => warn!("Could not apply update: {}", e),
            }
        }
        applied
    }

    pub fn on_notification(&mut self, notification: &Notification) {
        self.notifications += 1;
        let mine = |player: &EntityId| Some(*player) == self.player;

        match notification {
            Notification::BulletImpact { position, .. } => {
                debug!(
                    "Impact at ({:.1}, {:.1}, {:.1})",
                    position.x, position.y, position.z
                );
            }
            Notification::PlayerDeath { player, .. } if !mine(player) => {
                info!("Player {} died", player)
            }
            Notification::PlayerDeath { .. } => {}
            Notification::DashStarted { player, .. } => debug!("Player {} dashed", player),
            Notification::PowerUpPickedUp { kind, .. } => info!("Picked up {:?}", kind),
            Notification::PlayerRespawned { player, .. } => info!("Player {} respawned", player),
        }
    }

    pub fn store(&self) -> &ReplicatedStore {
        &self.store
    }

    pub fn kind_of(&self, entity: EntityId) -> Option<EntityKind> {
        self.entities.get(&entity).map(|known| known.kind)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn count_of(&self, kind: EntityKind) -> usize {
        self.entities.values().filter(|e| e.kind == kind).count()
    }

    pub fn own_health(&self) -> Option<i32> {
        self.store.get_field(self.player?, fields::HEALTH)
    }

    pub fn is_dead(&self) -> bool {
        self.player
            .and_then(|p| self.store.get_field(p, fields::DEAD))
            .unwrap_or(false)
    }

    pub fn own_position(&self) -> Option<Vec3> {
        self.store.get_field(self.player?, fields::POSITION)
    }

    pub fn own_yaw(&self) -> f32 {
        self.player
            .and_then(|p| self.store.get_field(p, fields::YAW))
            .unwrap_or(0.0)
    }

    /// Every health value our player has had, in order
    pub fn health_history(&self) -> Vec<i32> {
        self.health_history
            .lock()
            .map(|history| history.clone())
            .unwrap_or_default()
    }

    pub fn last_acked(&self) -> u32 {
        self.last_acked
    }

    pub fn notifications_seen(&self) -> usize {
        self.notifications
    }
}

impl Default for ClientGameState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(entity: u32, field: FieldKey, value: FieldValue, revision: u64) -> FieldUpdate {
        FieldUpdate {
            entity: EntityId(entity.into()),
            field,
            value,
            revision,
        }
    }

    fn connected() -> ClientGameState {
        let mut state = ClientGameState::new();
        state.on_connected(2, EntityId(5));
        state
    }

    #[test]
    fn test_mirror_applies_updates_and_acks() {
        let mut state = connected();
        let acks = HashMap::from([(2, 7), (3, 100)]);

        let applied = state.apply_state_update(
            10,
            &acks,
            vec![
                update(5, FieldKey::Health, FieldValue::Int(100), 1),
                update(5, FieldKey::Position, FieldValue::Vec3(Vec3::Y), 2),
            ],
        );

        assert_eq!(applied, 2);
        assert_eq!(state.tick, 10);
        assert_eq!(state.last_acked(), 7);
        assert_eq!(state.own_health(), Some(100));
        assert_eq!(state.own_position(), Some(Vec3::Y));
    }

    #[test]
    fn test_stale_update_is_ignored() {
        let mut state = connected();
        let acks = HashMap::new();

        state.apply_state_update(2, &acks, vec![update(5, FieldKey::Health, FieldValue::Int(60), 9)]);
        let applied =
            state.apply_state_update(1, &acks, vec![update(5, FieldKey::Health, FieldValue::Int(90), 4)]);

        assert_eq!(applied, 0);
        assert_eq!(state.own_health(), Some(60));
        assert_eq!(state.tick, 2);
    }

    #[test]
    fn test_health_observer_records_history() {
        let mut state = connected();
        let acks = HashMap::new();

        for (rev, hp) in [(1, 100), (2, 90), (3, 90), (4, 40)] {
            state.apply_state_update(
                rev as u32,
                &acks,
                vec![update(5, FieldKey::Health, FieldValue::Int(hp), rev)],
            );
        }
        // Another player's health is not ours
        state.apply_state_update(5, &acks, vec![update(6, FieldKey::Health, FieldValue::Int(1), 5)]);

        assert_eq!(state.health_history(), vec![100, 90, 40]);
    }

    #[test]
    fn test_dead_flag() {
        let mut state = connected();
        assert!(!state.is_dead());
        state.apply_state_update(
            1,
            &HashMap::new(),
            vec![update(5, FieldKey::Dead, FieldValue::Bool(true), 1)],
        );
        assert!(state.is_dead());
    }

    #[test]
    fn test_spawn_and_despawn() {
        let mut state = connected();

        assert!(state.on_spawn(EntityId(8), EntityKind::Bullet, Owner::Server));
        assert!(!state.on_spawn(EntityId(8), EntityKind::Bullet, Owner::Server));
        assert_eq!(state.kind_of(EntityId(8)), Some(EntityKind::Bullet));
        state.apply_state_update(
            1,
            &HashMap::new(),
            vec![update(8, FieldKey::Position, FieldValue::Vec3(Vec3::ZERO), 1)],
        );

        assert!(state.on_despawn(EntityId(8)));
        assert!(!state.on_despawn(EntityId(8)));
        assert_eq!(state.entity_count(), 0);
        assert!(state.store().entity_fields(EntityId(8)).is_empty());
    }

    #[test]
    fn test_late_update_does_not_resurrect_despawned_entity() {
        let mut state = connected();
        state.on_spawn(EntityId(8), EntityKind::Bullet, Owner::Server);
        state.on_despawn(EntityId(8));

        // Delayed datagrams from before the despawn
        let applied = state.apply_state_update(
            4,
            &HashMap::new(),
            vec![
                update(8, FieldKey::Position, FieldValue::Vec3(Vec3::X), 3),
                update(5, FieldKey::Health, FieldValue::Int(70), 4),
            ],
        );
        assert!(!state.on_spawn(EntityId(8), EntityKind::Bullet, Owner::Server));

        assert_eq!(applied, 1);
        assert!(state.store().entity_fields(EntityId(8)).is_empty());
        assert_eq!(state.kind_of(EntityId(8)), None);
        assert_eq!(state.own_health(), Some(70));
    }

    #[test]
    fn test_reset_forgets_everything() {
        let mut state = connected();
        state.on_spawn(EntityId(5), EntityKind::Player, Owner::Client(2));
        state.apply_state_update(
            3,
            &HashMap::from([(2, 4)]),
            vec![update(5, FieldKey::Health, FieldValue::Int(100), 1)],
        );

        state.reset();
        assert_eq!(state.player, None);
        assert_eq!(state.entity_count(), 0);
        assert_eq!(state.last_acked(), 0);
        assert!(state.health_history().is_empty());
        assert_eq!(state.own_health(), None);
    }

    #[test]
    fn test_notifications_are_counted() {
        let mut state = connected();
        state.on_notification(&Notification::BulletImpact {
            position: Vec3::ZERO,
            normal: Vec3::Y,
        });
        state.on_notification(&Notification::PlayerDeath {
            player: EntityId(5),
            position: Vec3::ZERO,
            rotation: shared::Quat::IDENTITY,
        });
        assert_eq!(state.notifications_seen(), 2);
    }
}
