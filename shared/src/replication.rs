//! Replicated state store
//!
//! Maps `(entity, field)` to a value. The server instance is the only one
//! allowed to commit new values through [`ReplicatedStore::set`]; client
//! instances are mirrors updated from the wire via
//! [`ReplicatedStore::apply_remote`]. Both sides can subscribe to changes of a
//! single field. Observers run synchronously inside the call that commits the
//! change, so they see changes exactly once and in commit order.

use crate::math::Vec3;
use crate::types::{Color, EntityId, PowerUpKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::marker::PhantomData;
use thiserror::Error;

/// Which side of the connection a store lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReplicationError {
    #[error("only the server may write replicated field {field:?} of entity {entity}")]
    NotAuthoritative { entity: EntityId, field: FieldKey },
    #[error("the server store does not accept remote updates")]
    NotAMirror,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldKey {
    Health,
    Dead,
    Color,
    Position,
    Yaw,
    CameraPitch,
    Dashing,
    DoorOpen,
    PowerUpKind,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Int(i32),
    Bool(bool),
    Float(f32),
    Vec3(Vec3),
    Color(Color),
    PowerUp(PowerUpKind),
}

/// A value type that can live in the store
pub trait FieldType: Sized + Copy {
    fn into_value(self) -> FieldValue;
    fn from_value(value: &FieldValue) -> Option<Self>;
}

macro_rules! field_type {
    ($ty:ty, $variant:ident) => {
        impl FieldType for $ty {
            fn into_value(self) -> FieldValue {
                FieldValue::$variant(self)
            }

            fn from_value(value: &FieldValue) -> Option<Self> {
                match value {
                    FieldValue::$variant(v) => Some(*v),
                    _ => None,
                }
            }
        }
    };
}

field_type!(i32, Int);
field_type!(bool, Bool);
field_type!(f32, Float);
field_type!(Vec3, Vec3);
field_type!(Color, Color);
field_type!(PowerUpKind, PowerUp);

/// Typed handle to a field key
pub struct ReplicatedField<T> {
    pub key: FieldKey,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for ReplicatedField<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ReplicatedField<T> {}

impl<T: FieldType> ReplicatedField<T> {
    pub const fn new(key: FieldKey) -> Self {
        Self {
            key,
            _marker: PhantomData,
        }
    }
}

pub mod fields {
    use super::{FieldKey, ReplicatedField};
    use crate::math::Vec3;
    use crate::types::{Color, PowerUpKind};

    pub const HEALTH: ReplicatedField<i32> = ReplicatedField::new(FieldKey::Health);
    pub const DEAD: ReplicatedField<bool> = ReplicatedField::new(FieldKey::Dead);
    pub const COLOR: ReplicatedField<Color> = ReplicatedField::new(FieldKey::Color);
    pub const POSITION: ReplicatedField<Vec3> = ReplicatedField::new(FieldKey::Position);
    pub const YAW: ReplicatedField<f32> = ReplicatedField::new(FieldKey::Yaw);
    pub const CAMERA_PITCH: ReplicatedField<f32> = ReplicatedField::new(FieldKey::CameraPitch);
    pub const DASHING: ReplicatedField<bool> = ReplicatedField::new(FieldKey::Dashing);
    pub const DOOR_OPEN: ReplicatedField<bool> = ReplicatedField::new(FieldKey::DoorOpen);
    pub const POWER_UP_KIND: ReplicatedField<PowerUpKind> =
        ReplicatedField::new(FieldKey::PowerUpKind);
}

/// A committed value as it travels on the wire
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct FieldUpdate {
    pub entity: EntityId,
    pub field: FieldKey,
    pub value: FieldValue,
    /// Store-wide commit counter on the server, increasing with every change
    pub revision: u64,
}

/// What observers receive
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldChange {
    pub entity: EntityId,
    pub field: FieldKey,
    pub previous: Option<FieldValue>,
    pub value: FieldValue,
    pub revision: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

pub type Observer = Box<dyn FnMut(&FieldChange) + Send + Sync>;

#[derive(Debug, Clone, Copy)]
struct Slot {
    value: FieldValue,
    revision: u64,
}

pub struct ReplicatedStore {
    role: Role,
    slots: HashMap<(EntityId, FieldKey), Slot>,
    observers: HashMap<(EntityId, FieldKey), Vec<(ObserverId, Observer)>>,
    next_observer: u64,
    revision: u64,
    outbox: Vec<FieldUpdate>,
}

impl ReplicatedStore {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            slots: HashMap::new(),
            observers: HashMap::new(),
            next_observer: 1,
            revision: 0,
            outbox: Vec::new(),
        }
    }

    /// Commits a value. Returns `Ok(false)` when the value is unchanged.
    pub fn set(
        &mut self,
        entity: EntityId,
        field: FieldKey,
        value: FieldValue,
    ) -> Result<bool, ReplicationError> {
        if self.role != Role::Server {
            return Err(ReplicationError::NotAuthoritative { entity, field });
        }

        let previous = self.slots.get(&(entity, field)).map(|slot| slot.value);
        if previous == Some(value) {
            return Ok(false);
        }

        self.revision += 1;
        let revision = self.revision;
        self.slots.insert((entity, field), Slot { value, revision });
        self.outbox.push(FieldUpdate {
            entity,
            field,
            value,
            revision,
        });
        self.notify(FieldChange {
            entity,
            field,
            previous,
            value,
            revision,
        });

        Ok(true)
    }

    pub fn set_field<T: FieldType>(
        &mut self,
        entity: EntityId,
        field: ReplicatedField<T>,
        value: T,
    ) -> Result<bool, ReplicationError> {
        self.set(entity, field.key, value.into_value())
    }

    pub fn get(&self, entity: EntityId, field: FieldKey) -> Option<&FieldValue> {
        self.slots.get(&(entity, field)).map(|slot| &slot.value)
    }

    pub fn get_field<T: FieldType>(&self, entity: EntityId, field: ReplicatedField<T>) -> Option<T> {
        self.get(entity, field.key).and_then(T::from_value)
    }

    /// Applies an update received from the server to a client mirror.
    ///
    /// Updates older than what the mirror already holds for that field are
    /// discarded, so out-of-order datagrams cannot roll a field back.
    pub fn apply_remote(&mut self, update: FieldUpdate) -> Result<bool, ReplicationError> {
        if self.role != Role::Client {
            return Err(ReplicationError::NotAMirror);
        }

        let key = (update.entity, update.field);
        let previous = match self.slots.get(&key) {
            Some(slot) if slot.revision >= update.revision => return Ok(false),
            Some(slot) => Some(slot.value),
            None => None,
        };

        self.slots.insert(
            key,
            Slot {
                value: update.value,
                revision: update.revision,
            },
        );

        if previous == Some(update.value) {
            return Ok(false);
        }

        self.notify(FieldChange {
            entity: update.entity,
            field: update.field,
            previous,
            value: update.value,
            revision: update.revision,
        });

        Ok(true)
    }

    /// Registers a callback for changes of one field of one entity
    pub fn on_change(&mut self, entity: EntityId, field: FieldKey, observer: Observer) -> ObserverId {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers
            .entry((entity, field))
            .or_default()
            .push((id, observer));
        id
    }

    pub fn remove_observer(&mut self, id: ObserverId) -> bool {
        for list in self.observers.values_mut() {
            if let Some(pos) = list.iter().position(|(oid, _)| *oid == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    /// Drops every field and observer of an entity, including unsent changes
    pub fn remove_entity(&mut self, entity: EntityId) {
        self.slots.retain(|(e, _), _| *e != entity);
        self.observers.retain(|(e, _), _| *e != entity);
        self.outbox.retain(|update| update.entity != entity);
    }

    /// Takes all changes committed since the last call, in commit order
    pub fn drain_changes(&mut self) -> Vec<FieldUpdate> {
        std::mem::take(&mut self.outbox)
    }

    /// Current value of every field, ordered by entity and field
    pub fn snapshot(&self) -> Vec<FieldUpdate> {
        let mut updates: Vec<FieldUpdate> = self
            .slots
            .iter()
            .map(|((entity, field), slot)| FieldUpdate {
                entity: *entity,
                field: *field,
                value: slot.value,
                revision: slot.revision,
            })
            .collect();
        updates.sort_by_key(|u| (u.entity, u.field));
        updates
    }

    pub fn entity_fields(&self, entity: EntityId) -> Vec<(FieldKey, FieldValue)> {
        let mut fields: Vec<(FieldKey, FieldValue)> = self
            .slots
            .iter()
            .filter(|((e, _), _)| *e == entity)
            .map(|((_, field), slot)| (*field, slot.value))
            .collect();
        fields.sort_by_key(|(field, _)| *field);
        fields
    }

    fn notify(&mut self, change: FieldChange) {
        if let Some(list) = self.observers.get_mut(&(change.entity, change.field)) {
            for (_, observer) in list.iter_mut() {
                observer(&change);
            }
        }
    }
}

impl std::fmt::Debug for ReplicatedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicatedStore")
            .field("role", &self.role)
            .field("fields", &self.slots.len())
            .field("revision", &self.revision)
            .field("pending", &self.outbox.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder() -> (Arc<Mutex<Vec<FieldChange>>>, Observer) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let observer: Observer = Box::new(move |change: &FieldChange| {
            sink.lock().unwrap().push(*change);
        });
        (seen, observer)
    }

    #[test]
    fn test_server_set_and_get() {
        let mut store = ReplicatedStore::new(Role::Server);
        let e = EntityId(1);

        assert_eq!(store.set_field(e, fields::HEALTH, 100), Ok(true));
        assert_eq!(store.get_field(e, fields::HEALTH), Some(100));
        assert_eq!(store.get_field(e, fields::DEAD), None);
    }

    #[test]
    fn test_client_cannot_set() {
        let mut store = ReplicatedStore::new(Role::Client);
        let result = store.set_field(EntityId(3), fields::DOOR_OPEN, true);

        assert_eq!(
            result,
            Err(ReplicationError::NotAuthoritative {
                entity: EntityId(3),
                field: FieldKey::DoorOpen
            })
        );
        assert_eq!(store.get_field(EntityId(3), fields::DOOR_OPEN), None);
    }

    #[test]
    fn test_server_rejects_remote_updates() {
        let mut store = ReplicatedStore::new(Role::Server);
        let update = FieldUpdate {
            entity: EntityId(1),
            field: FieldKey::Health,
            value: FieldValue::Int(5),
            revision: 1,
        };
        assert_eq!(store.apply_remote(update), Err(ReplicationError::NotAMirror));
    }

    #[test]
    fn test_equal_value_is_not_a_change() {
        let mut store = ReplicatedStore::new(Role::Server);
        let e = EntityId(1);
        let (seen, observer) = recorder();
        store.on_change(e, FieldKey::Health, observer);

        store.set_field(e, fields::HEALTH, 50).unwrap();
        assert_eq!(store.set_field(e, fields::HEALTH, 50), Ok(false));

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(store.drain_changes().len(), 1);
    }

    #[test]
    fn test_observer_sees_each_change_once_in_order() {
        let mut store = ReplicatedStore::new(Role::Server);
        let e = EntityId(7);
        let (seen, observer) = recorder();
        store.on_change(e, FieldKey::Health, observer);

        for hp in [90, 70, 40, 0] {
            store.set_field(e, fields::HEALTH, hp).unwrap();
        }

        let seen = seen.lock().unwrap();
        let values: Vec<FieldValue> = seen.iter().map(|c| c.value).collect();
        assert_eq!(
            values,
            vec![
                FieldValue::Int(90),
                FieldValue::Int(70),
                FieldValue::Int(40),
                FieldValue::Int(0)
            ]
        );
        assert_eq!(seen[0].previous, None);
        assert_eq!(seen[1].previous, Some(FieldValue::Int(90)));
        assert!(seen.windows(2).all(|w| w[0].revision < w[1].revision));
    }

    #[test]
    fn test_observer_only_for_its_field() {
        let mut store = ReplicatedStore::new(Role::Server);
        let (seen, observer) = recorder();
        store.on_change(EntityId(1), FieldKey::DoorOpen, observer);

        store.set_field(EntityId(1), fields::HEALTH, 10).unwrap();
        store.set_field(EntityId(2), fields::DOOR_OPEN, true).unwrap();
        assert!(seen.lock().unwrap().is_empty());

        store.set_field(EntityId(1), fields::DOOR_OPEN, true).unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_remove_observer() {
        let mut store = ReplicatedStore::new(Role::Server);
        let (seen, observer) = recorder();
        let id = store.on_change(EntityId(1), FieldKey::Color, observer);

        assert!(store.remove_observer(id));
        assert!(!store.remove_observer(id));

        store.set_field(EntityId(1), fields::COLOR, Color::RED).unwrap();
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_remove_entity_drops_pending_changes() {
        let mut store = ReplicatedStore::new(Role::Server);
        store.set_field(EntityId(1), fields::HEALTH, 100).unwrap();
        store.set_field(EntityId(2), fields::HEALTH, 100).unwrap();

        store.remove_entity(EntityId(1));

        let pending = store.drain_changes();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].entity, EntityId(2));
        assert_eq!(store.get(EntityId(1), FieldKey::Health), None);
    }

    #[test]
    fn test_mirror_follows_server() {
        let mut server = ReplicatedStore::new(Role::Server);
        let mut mirror = ReplicatedStore::new(Role::Client);
        let (seen, observer) = recorder();
        mirror.on_change(EntityId(4), FieldKey::DoorOpen, observer);

        server.set_field(EntityId(4), fields::DOOR_OPEN, true).unwrap();
        server.set_field(EntityId(4), fields::DOOR_OPEN, false).unwrap();

        for update in server.drain_changes() {
            mirror.apply_remote(update).unwrap();
        }

        assert_eq!(mirror.get_field(EntityId(4), fields::DOOR_OPEN), Some(false));
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].previous, Some(FieldValue::Bool(true)));
    }

    #[test]
    fn test_mirror_ignores_stale_updates() {
        let mut server = ReplicatedStore::new(Role::Server);
        let mut mirror = ReplicatedStore::new(Role::Client);

        server.set_field(EntityId(1), fields::HEALTH, 80).unwrap();
        server.set_field(EntityId(1), fields::HEALTH, 60).unwrap();
        let updates = server.drain_changes();

        // Newer datagram arrives first
        assert_eq!(mirror.apply_remote(updates[1]), Ok(true));
        assert_eq!(mirror.apply_remote(updates[0]), Ok(false));
        assert_eq!(mirror.get_field(EntityId(1), fields::HEALTH), Some(60));
    }

    #[test]
    fn test_snapshot_is_sorted() {
        let mut store = ReplicatedStore::new(Role::Server);
        store.set_field(EntityId(2), fields::HEALTH, 1).unwrap();
        store.set_field(EntityId(1), fields::DEAD, false).unwrap();
        store.set_field(EntityId(1), fields::HEALTH, 1).unwrap();

        let snapshot = store.snapshot();
        let keys: Vec<(EntityId, FieldKey)> = snapshot.iter().map(|u| (u.entity, u.field)).collect();
        assert_eq!(
            keys,
            vec![
                (EntityId(1), FieldKey::Health),
                (EntityId(1), FieldKey::Dead),
                (EntityId(2), FieldKey::Health)
            ]
        );
    }
}
