//! Entity lifecycle: id allocation, ownership and spawn/despawn bookkeeping

use log::debug;
use shared::{ClientId, EntityId, EntityKind, Owner};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityRecord {
    pub id: EntityId,
    pub kind: EntityKind,
    pub owner: Owner,
}

/// Spawn and despawn notifications queued for the network layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Spawned {
        entity: EntityId,
        kind: EntityKind,
        owner: Owner,
    },
    Despawned {
        entity: EntityId,
    },
}

/// Registry of every live networked entity
///
/// Ids start at 1 and are never reused; a 64-bit counter cannot run out
/// during a server run. Records are kept in a `BTreeMap` so
/// iteration order is stable across runs.
#[derive(Debug)]
pub struct EntityRegistry {
    next_id: u64,
    records: BTreeMap<EntityId, EntityRecord>,
    events: Vec<LifecycleEvent>,
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            records: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    pub fn spawn(&mut self, kind: EntityKind, owner: Owner) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;

        self.records.insert(id, EntityRecord { id, kind, owner });
        self.events.push(LifecycleEvent::Spawned {
            entity: id,
            kind,
            owner,
        });
        debug!("Spawned {:?} {} owned by {:?}", kind, id, owner);

        id
    }

    /// Removes an entity. Returns `None` if it was already despawned.
    pub fn despawn(&mut self, id: EntityId) -> Option<EntityRecord> {
        let record = self.records.remove(&id)?;
        self.events.push(LifecycleEvent::Despawned { entity: id });
        debug!("Despawned {:?} {}", record.kind, id);
        Some(record)
    }

    pub fn is_spawned(&self, id: EntityId) -> bool {
        self.records.contains_key(&id)
    }

    pub fn owned_by(&self, client_id: ClientId) -> Vec<EntityId> {
        self.records
            .values()
            .filter(|r| r.owner == Owner::Client(client_id))
            .map(|r| r.id)
            .collect()
    }

    pub fn count_of(&self, kind: EntityKind) -> usize {
        self.records.values().filter(|r| r.kind == kind).count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn drain_events(&mut self) -> Vec<LifecycleEvent> {
        std::mem::take(&mut self.events)
    }

    /// One `Spawned` event per live entity, used to bring a new client up to date
    pub fn spawn_events(&self) -> Vec<LifecycleEvent> {
        self.records
            .values()
            .map(|r| LifecycleEvent::Spawned {
                entity: r.id,
                kind: r.kind,
                owner: r.owner,
            })
            .collect()
    }
}
