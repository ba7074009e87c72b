use log::error;
use shared::{fields, EntityId, PowerUpKind, ReplicatedStore, ReplicationError, Vec3};

#[derive(Debug, Clone)]
pub struct PowerUp {
    pub id: EntityId,
    pub kind: PowerUpKind,
    pub position: Vec3,
    can_be_picked_up: bool,
}

impl PowerUp {
    pub fn new(id: EntityId, kind: PowerUpKind, position: Vec3) -> Self {
        Self {
            id,
            kind,
            position,
            can_be_picked_up: true,
        }
    }

    pub fn can_be_picked_up(&self) -> bool {
        self.can_be_picked_up
    }

    /// Consumes the power-up. Only the first call yields its kind.
    pub fn try_consume(&mut self) -> Option<PowerUpKind> {
        if !self.can_be_picked_up {
            return None;
        }
        self.can_be_picked_up = false;
        Some(self.kind)
    }

    pub fn replicate(&self, store: &mut ReplicatedStore) -> Result<(), ReplicationError> {
        store.set_field(self.id, fields::POWER_UP_KIND, self.kind)?;
        store.set_field(self.id, fields::POSITION, self.position)?;
        Ok(())
    }
}

/// Periodically places power-ups on configured spawn points
#[derive(Debug, Clone)]
pub struct PowerUpSpawner {
    spawn_points: Vec<Vec3>,
    interval: f64,
    max_concurrent: usize,
    next_spawn_at: f64,
    enabled: bool,
}

impl PowerUpSpawner {
    pub fn new(spawn_points: Vec<Vec3>, initial_delay: f32, interval: f32, max_concurrent: usize) -> Self {
        let enabled = !spawn_points.is_empty();
        if !enabled {
            error!("Power-up spawner has no spawn points, disabling it");
        }

        Self {
            spawn_points,
            interval: interval.max(0.0) as f64,
            max_concurrent,
            next_spawn_at: initial_delay.max(0.0) as f64,
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn spawn_points(&self) -> &[Vec3] {
        &self.spawn_points
    }

    /// True when a spawn attempt is due; schedules the following attempt.
    ///
    /// An attempt at capacity is skipped, not postponed.
    pub fn poll(&mut self, now: f64, active: usize) -> bool {
        if !self.enabled || now < self.next_spawn_at {
            return false;
        }
        self.next_spawn_at = now + self.interval;
        active < self.max_concurrent
    }
}
