use log::error;
use shared::config::PlatformConfig;
use shared::math::move_towards;
use shared::{fields, EntityId, ReplicatedStore, ReplicationError, Vec3};

const ARRIVAL_EPSILON: f32 = 1e-3;

/// Server-driven platform following its waypoints, pausing at each one.
///
/// Looping platforms go 0, 1, .., n-1, 0, ..; others reverse at either end.
#[derive(Debug, Clone)]
pub struct MovingPlatform {
    pub id: EntityId,
    pub position: Vec3,
    waypoints: Vec<Vec3>,
    speed: f32,
    wait_time: f32,
    looping: bool,
    current: usize,
    forward: bool,
    wait_until: Option<f64>,
    enabled: bool,
}

impl MovingPlatform {
    pub fn new(id: EntityId, config: &PlatformConfig) -> Self {
        let enabled = config.waypoints.len() >= 2;
        if !enabled {
            error!(
                "Moving platform {} needs at least 2 waypoints, got {}; disabling it",
                id,
                config.waypoints.len()
            );
        }

        Self {
            id,
            position: config.waypoints.first().copied().unwrap_or_default(),
            waypoints: config.waypoints.clone(),
            speed: config.speed,
            wait_time: config.wait_time,
            looping: config.looping,
            current: 0,
            forward: true,
            wait_until: None,
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_waiting(&self) -> bool {
        self.wait_until.is_some()
    }

    pub fn current_waypoint(&self) -> usize {
        self.current
    }

    pub fn step(&mut self, now: f64, dt: f32) {
        if !self.enabled {
            return;
        }

        if let Some(until) = self.wait_until {
            if now >= until {
                self.wait_until = None;
                self.turn_around_at_ends();
            }
            return;
        }

        let next = self.next_index();
        let target = self.waypoints[next];
        self.position = move_towards(self.position, target, self.speed * dt);

        if self.position.distance(target) < ARRIVAL_EPSILON {
            self.position = target;
            self.current = next;
            self.wait_until = Some(now + self.wait_time as f64);
        }
    }

    fn next_index(&self) -> usize {
        let n = self.waypoints.len();
        if self.forward {
            (self.current + 1) % n
        } else {
            (self.current + n - 1) % n
        }
    }

    fn turn_around_at_ends(&mut self) {
        if self.looping {
            return;
        }
        let last = self.waypoints.len() - 1;
        if self.forward && self.current >= last {
            self.forward = false;
        } else if !self.forward && self.current == 0 {
            self.forward = true;
        }
    }

    pub fn replicate(&self, store: &mut ReplicatedStore) -> Result<(), ReplicationError> {
        store.set_field(self.id, fields::POSITION, self.position)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(looping: bool) -> PlatformConfig {
        PlatformConfig {
            waypoints: vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(2.0, 0.0, 0.0),
                Vec3::new(4.0, 0.0, 0.0),
            ],
            speed: 2.0,
            wait_time: 0.5,
            looping,
        }
    }

    /// Runs the platform at 10Hz and records each waypoint it stops at
    fn visited(platform: &mut MovingPlatform, seconds: f64) -> Vec<usize> {
        let dt = 0.1;
        let mut now = 0.0;
        let mut stops = Vec::new();
        while now < seconds {
            now += dt as f64;
            let was_waiting = platform.is_waiting();
            platform.step(now, dt);
            if !was_waiting && platform.is_waiting() {
                stops.push(platform.current_waypoint());
            }
        }
        stops
    }

    #[test]
    fn test_ping_pong_reverses_at_the_ends() {
        let mut platform = MovingPlatform::new(EntityId(1), &config(false));
        let stops = visited(&mut platform, 8.0);
        assert_eq!(&stops[..4], &[1, 2, 1, 0]);
    }

    #[test]
    fn test_looping_wraps_to_start() {
        let mut platform = MovingPlatform::new(EntityId(1), &config(true));
        let stops = visited(&mut platform, 10.0);
        assert_eq!(&stops[..4], &[1, 2, 0, 1]);
    }

    #[test]
    fn test_waits_at_waypoint() {
        let mut platform = MovingPlatform::new(EntityId(1), &config(false));
        platform.step(1.0, 1.0);
        assert_eq!(platform.position, Vec3::new(2.0, 0.0, 0.0));
        assert!(platform.is_waiting());

        platform.step(1.2, 0.2);
        assert_eq!(platform.position, Vec3::new(2.0, 0.0, 0.0));
        platform.step(1.5, 0.3);
        assert!(!platform.is_waiting());
    }

    #[test]
    fn test_single_waypoint_disables() {
        let mut cfg = config(true);
        cfg.waypoints.truncate(1);
        let mut platform = MovingPlatform::new(EntityId(1), &cfg);

        assert!(!platform.is_enabled());
        platform.step(1.0, 1.0);
        assert_eq!(platform.position, Vec3::ZERO);
    }
}
