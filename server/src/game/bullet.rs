use shared::{fields, ClientId, Color, EntityId, ReplicatedStore, ReplicationError, Vec3};

/// Upper bound on collision substeps for a single bullet per tick
const MAX_SUBSTEPS: u32 = 64;

#[derive(Debug, Clone)]
pub struct Bullet {
    pub id: EntityId,
    /// Client whose player fired this bullet; that player cannot be hit by it
    pub owner: ClientId,
    pub position: Vec3,
    pub velocity: Vec3,
    pub damage: i32,
    pub color: Color,
    pub expires_at: f64,
    hit: bool,
}

impl Bullet {
    pub fn new(
        id: EntityId,
        owner: ClientId,
        position: Vec3,
        velocity: Vec3,
        damage: i32,
        color: Color,
        expires_at: f64,
    ) -> Self {
        Self {
            id,
            owner,
            position,
            velocity,
            damage,
            color,
            expires_at,
            hit: false,
        }
    }

    /// Marks the bullet as spent. Only the first call returns true.
    pub fn register_hit(&mut self) -> bool {
        if self.hit {
            return false;
        }
        self.hit = true;
        true
    }

    pub fn is_spent(&self) -> bool {
        self.hit
    }

    pub fn is_expired(&self, now: f64) -> bool {
        now >= self.expires_at
    }

    pub fn replicate(&self, store: &mut ReplicatedStore) -> Result<(), ReplicationError> {
        store.set_field(self.id, fields::POSITION, self.position)?;
        store.set_field(self.id, fields::COLOR, self.color)?;
        Ok(())
    }
}

/// Number of substeps needed so that no step moves further than `max_step`
pub fn required_substeps(distance: f32, max_step: f32) -> u32 {
    if max_step <= 0.0 || !distance.is_finite() {
        return 1;
    }
    if distance > max_step {
        ((distance / max_step).ceil() as u32).clamp(1, MAX_SUBSTEPS)
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bullet() -> Bullet {
        Bullet::new(
            EntityId(9),
            1,
            Vec3::ZERO,
            Vec3::new(0.0, 0.0, 50.0),
            10,
            Color::RED,
            5.0,
        )
    }

    #[test]
    fn test_at_most_one_hit() {
        let mut b = bullet();
        assert!(!b.is_spent());
        assert!(b.register_hit());
        assert!(!b.register_hit());
        assert!(!b.register_hit());
        assert!(b.is_spent());
    }

    #[test]
    fn test_expiry() {
        let b = bullet();
        assert!(!b.is_expired(4.99));
        assert!(b.is_expired(5.0));
    }

    #[test]
    fn test_substep_calculation() {
        assert_eq!(required_substeps(0.1, 0.2), 1);
        assert_eq!(required_substeps(0.2, 0.2), 1);
        assert_eq!(required_substeps(0.5, 0.2), 3);
        assert_eq!(required_substeps(1000.0, 0.2), MAX_SUBSTEPS);
        assert_eq!(required_substeps(1.0, 0.0), 1);
        assert_eq!(required_substeps(f32::NAN, 0.2), 1);
    }
}
