use shared::{fields, Aabb, EntityId, ReplicatedStore, ReplicationError};

#[derive(Debug, Clone)]
pub struct Door {
    pub id: EntityId,
    pub bounds: Aabb,
    open: bool,
}

impl Door {
    pub fn new(id: EntityId, bounds: Aabb, open: bool) -> Self {
        Self { id, bounds, open }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Flips the door through the store and returns the new state.
    ///
    /// Fails without touching the door when the store is not authoritative.
    pub fn toggle(&mut self, store: &mut ReplicatedStore) -> Result<bool, ReplicationError> {
        let next = !self.open;
        store.set_field(self.id, fields::DOOR_OPEN, next)?;
        self.open = next;
        Ok(next)
    }

    /// Closed doors stop bullets
    pub fn blocks_bullets(&self) -> bool {
        !self.open
    }

    pub fn replicate(&self, store: &mut ReplicatedStore) -> Result<(), ReplicationError> {
        store.set_field(self.id, fields::DOOR_OPEN, self.open)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Role, Vec3};

    fn door() -> Door {
        Door::new(
            EntityId(2),
            Aabb::new(Vec3::new(0.0, 1.0, 0.0), Vec3::new(1.0, 1.0, 0.1)),
            false,
        )
    }

    #[test]
    fn test_toggle_open_then_closed() {
        let mut store = ReplicatedStore::new(Role::Server);
        let mut d = door();

        assert_eq!(d.toggle(&mut store), Ok(true));
        assert!(d.is_open());
        assert_eq!(store.get_field(d.id, fields::DOOR_OPEN), Some(true));

        assert_eq!(d.toggle(&mut store), Ok(false));
        assert!(!d.is_open());
        assert_eq!(store.get_field(d.id, fields::DOOR_OPEN), Some(false));
    }

    #[test]
    fn test_toggle_rejected_without_authority() {
        let mut mirror = ReplicatedStore::new(Role::Client);
        let mut d = door();

        assert!(matches!(
            d.toggle(&mut mirror),
            Err(ReplicationError::NotAuthoritative { .. })
        ));
        assert!(!d.is_open());
    }

    #[test]
    fn test_only_closed_door_blocks() {
        let mut store = ReplicatedStore::new(Role::Server);
        let mut d = door();
        assert!(d.blocks_bullets());
        d.toggle(&mut store).unwrap();
        assert!(!d.blocks_bullets());
    }
}
