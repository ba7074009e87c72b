use super::effects::{EffectKind, TimedEffects};
use shared::math::{flatten, forward, yaw_pitch};
use shared::{
    fields, ClientId, Color, EntityId, GameRules, Quat, ReplicatedStore, ReplicationError, Vec3,
};

/// Result of applying damage to a player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageOutcome {
    /// Player was already dead or the amount was not positive
    Ignored,
    Damaged { health: i32 },
    /// Health reached zero on this hit
    Died,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Dash {
    direction: Vec3,
    until: f64,
}

/// Server-side state of a connected player
#[derive(Debug, Clone)]
pub struct Player {
    pub id: EntityId,
    pub client_id: ClientId,
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub color: Color,
    /// Latest accepted move direction, horizontal and at most unit length
    pub move_direction: Vec3,
    pub effects: TimedEffects,

    health: i32,
    max_health: i32,
    dead: bool,
    dash: Option<Dash>,
    dash_ready_at: f64,
    fire_ready_at: f64,
}

impl Player {
    pub fn new(
        id: EntityId,
        client_id: ClientId,
        position: Vec3,
        yaw: f32,
        color: Color,
        max_health: i32,
    ) -> Self {
        Self {
            id,
            client_id,
            position,
            yaw,
            pitch: 0.0,
            color,
            move_direction: Vec3::ZERO,
            effects: TimedEffects::new(),
            health: max_health,
            max_health,
            dead: false,
            dash: None,
            dash_ready_at: 0.0,
            fire_ready_at: 0.0,
        }
    }

    pub fn health(&self) -> i32 {
        self.health
    }

    pub fn max_health(&self) -> i32 {
        self.max_health
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn is_alive(&self) -> bool {
        !self.dead
    }

    /// `health = max(0, health - amount)`; the first hit reaching zero kills.
    pub fn take_damage(&mut self, amount: i32) -> DamageOutcome {
        if self.dead || amount <= 0 {
            return DamageOutcome::Ignored;
        }

        self.health = self.health.saturating_sub(amount).max(0);
        if self.health == 0 {
            self.dead = true;
            self.move_direction = Vec3::ZERO;
            self.dash = None;
            self.effects.clear();
            DamageOutcome::Died
        } else {
            DamageOutcome::Damaged {
                health: self.health,
            }
        }
    }

    /// Restores health up to the maximum. Dead players cannot be healed.
    pub fn heal(&mut self, amount: i32) -> bool {
        if self.dead || amount <= 0 || self.health >= self.max_health {
            return false;
        }
        self.health = self.health.saturating_add(amount).min(self.max_health);
        true
    }

    /// Dead -> Alive with full health. Returns false for a living player.
    pub fn respawn(&mut self, position: Vec3, yaw: f32) -> bool {
        if !self.dead {
            return false;
        }
        self.dead = false;
        self.health = self.max_health;
        self.position = position;
        self.yaw = yaw;
        self.pitch = 0.0;
        self.move_direction = Vec3::ZERO;
        self.dash = None;
        self.effects.clear();
        true
    }

    pub fn can_fire(&self, now: f64) -> bool {
        self.is_alive() && now >= self.fire_ready_at
    }

    pub fn record_shot(&mut self, now: f64, rules: &GameRules) {
        let mut cooldown = rules.fire_cooldown;
        if self.effects.is_active(EffectKind::RapidFire, now) && rules.fire_rate_multiplier > 0.0 {
            cooldown /= rules.fire_rate_multiplier;
        }
        self.fire_ready_at = now + cooldown as f64;
    }

    pub fn is_dashing(&self) -> bool {
        self.dash.is_some()
    }

    /// Starts a dash unless dead, already dashing or on cooldown
    pub fn start_dash(&mut self, direction: Vec3, now: f64, rules: &GameRules) -> bool {
        if self.dead || self.dash.is_some() || now < self.dash_ready_at {
            return false;
        }

        let mut direction = flatten(direction).normalize_or_zero();
        if direction == Vec3::ZERO {
            direction = self.facing();
        }

        self.dash = Some(Dash {
            direction,
            until: now + rules.dash_duration as f64,
        });
        self.dash_ready_at = now + rules.dash_cooldown as f64;
        true
    }

    /// Ends the dash once its deadline has passed. Returns true when it ended.
    pub fn update_dash(&mut self, now: f64) -> bool {
        match self.dash {
            Some(dash) if now >= dash.until => {
                self.dash = None;
                true
            }
            _ => false,
        }
    }

    pub fn apply_look(&mut self, delta_x: f32, delta_y: f32, rules: &GameRules) {
        self.yaw = (self.yaw + delta_x * rules.look_sensitivity).rem_euclid(360.0);
        self.pitch = (self.pitch - delta_y * rules.look_sensitivity)
            .clamp(-rules.max_pitch, rules.max_pitch);
    }

    pub fn velocity(&self, now: f64, rules: &GameRules) -> Vec3 {
        if self.dead {
            return Vec3::ZERO;
        }
        if let Some(dash) = self.dash {
            return dash.direction * rules.dash_speed;
        }

        let mut speed = rules.move_speed;
        if self.effects.is_active(EffectKind::SpeedBoost, now) {
            speed *= rules.speed_boost_multiplier;
        }
        self.move_direction * speed
    }

    pub fn orientation(&self) -> Quat {
        yaw_pitch(self.yaw, self.pitch)
    }

    /// Horizontal direction the player is facing
    pub fn facing(&self) -> Vec3 {
        forward(yaw_pitch(self.yaw, 0.0))
    }

    pub fn replicate(&self, store: &mut ReplicatedStore) -> Result<(), ReplicationError> {
        store.set_field(self.id, fields::HEALTH, self.health)?;
        store.set_field(self.id, fields::DEAD, self.dead)?;
        store.set_field(self.id, fields::COLOR, self.color)?;
        store.set_field(self.id, fields::POSITION, self.position)?;
        store.set_field(self.id, fields::YAW, self.yaw)?;
        store.set_field(self.id, fields::CAMERA_PITCH, self.pitch)?;
        store.set_field(self.id, fields::DASHING, self.dash.is_some())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn player() -> Player {
        Player::new(EntityId(1), 1, Vec3::new(0.0, 1.0, 0.0), 0.0, Color::RED, 100)
    }

    #[test]
    fn test_damage_example() {
        let mut p = player();

        assert_eq!(p.take_damage(30), DamageOutcome::Damaged { health: 70 });
        assert!(p.is_alive());

        assert_eq!(p.take_damage(80), DamageOutcome::Died);
        assert_eq!(p.health(), 0);
        assert!(p.is_dead());

        assert_eq!(p.take_damage(10), DamageOutcome::Ignored);
        assert_eq!(p.health(), 0);
    }

    #[test]
    fn test_health_stays_in_bounds_and_non_increasing() {
        let mut p = player();
        let mut last = p.health();
        let mut deaths = 0;

        for amount in [5, 0, -20, 17, 33, 1, 200, 4, 60] {
            if p.take_damage(amount) == DamageOutcome::Died {
                deaths += 1;
            }
            assert!(p.health() <= last);
            assert!((0..=p.max_health()).contains(&p.health()));
            last = p.health();
        }

        assert_eq!(deaths, 1);
    }

    #[test]
    fn test_negative_damage_does_not_heal() {
        let mut p = player();
        p.take_damage(50);
        assert_eq!(p.take_damage(-30), DamageOutcome::Ignored);
        assert_eq!(p.health(), 50);
    }

    #[test]
    fn test_respawn_only_when_dead() {
        let mut p = player();
        assert!(!p.respawn(Vec3::ZERO, 0.0));

        p.take_damage(1000);
        assert!(p.respawn(Vec3::new(5.0, 1.0, 5.0), 90.0));
        assert_eq!(p.health(), 100);
        assert!(p.is_alive());
        assert_eq!(p.position, Vec3::new(5.0, 1.0, 5.0));

        // A second life gets its own single death
        assert_eq!(p.take_damage(100), DamageOutcome::Died);
    }

    #[test]
    fn test_heal_is_clamped_and_needs_a_living_player() {
        let mut p = player();
        assert!(!p.heal(10));

        p.take_damage(10);
        assert!(p.heal(25));
        assert_eq!(p.health(), 100);

        p.take_damage(500);
        assert!(!p.heal(25));
        assert_eq!(p.health(), 0);
    }

    #[test]
    fn test_huge_heal_does_not_overflow() {
        let mut p = Player::new(EntityId(1), 1, Vec3::ZERO, 0.0, Color::RED, i32::MAX);
        p.take_damage(1);
        assert!(p.heal(i32::MAX));
        assert_eq!(p.health(), i32::MAX);
    }

    #[test]
    fn test_fire_cooldown() {
        let rules = GameRules::default();
        let mut p = player();

        assert!(p.can_fire(0.0));
        p.record_shot(0.0, &rules);
        assert!(!p.can_fire(0.1));
        assert!(p.can_fire(rules.fire_cooldown as f64));
    }

    #[test]
    fn test_rapid_fire_shortens_cooldown() {
        let rules = GameRules::default();
        let mut p = player();
        p.effects.apply(EffectKind::RapidFire, 0.0, 10.0);

        p.record_shot(0.0, &rules);
        let expected = (rules.fire_cooldown / rules.fire_rate_multiplier) as f64;
        assert!(p.can_fire(expected));
        assert!(!p.can_fire(expected - 0.01));
    }

    #[test]
    fn test_dash_lifecycle() {
        let rules = GameRules::default();
        let mut p = player();

        assert!(p.start_dash(Vec3::new(1.0, 0.0, 0.0), 0.0, &rules));
        assert!(p.is_dashing());
        assert!(!p.start_dash(Vec3::new(1.0, 0.0, 0.0), 0.05, &rules));

        let v = p.velocity(0.05, &rules);
        assert_approx_eq!(v.x, rules.dash_speed, 1e-4);

        assert!(!p.update_dash(0.1));
        assert!(p.update_dash(rules.dash_duration as f64));
        assert!(!p.is_dashing());

        // Still on cooldown
        assert!(!p.start_dash(Vec3::new(1.0, 0.0, 0.0), 0.5, &rules));
        assert!(p.start_dash(Vec3::new(1.0, 0.0, 0.0), rules.dash_cooldown as f64, &rules));
    }

    #[test]
    fn test_dash_without_direction_uses_facing() {
        let rules = GameRules::default();
        let mut p = player();
        p.yaw = 90.0;

        assert!(p.start_dash(Vec3::ZERO, 0.0, &rules));
        let v = p.velocity(0.0, &rules).normalize_or_zero();
        assert_approx_eq!(v.x, 1.0, 1e-4);
    }

    #[test]
    fn test_look_clamps_pitch_and_wraps_yaw() {
        let rules = GameRules::default();
        let mut p = player();

        p.apply_look(370.0, -500.0, &rules);
        assert_approx_eq!(p.yaw, 10.0, 1e-3);
        assert_approx_eq!(p.pitch, rules.max_pitch, 1e-3);

        p.apply_look(-20.0, 1000.0, &rules);
        assert_approx_eq!(p.yaw, 350.0, 1e-3);
        assert_approx_eq!(p.pitch, -rules.max_pitch, 1e-3);
    }

    #[test]
    fn test_speed_boost_velocity() {
        let rules = GameRules::default();
        let mut p = player();
        p.move_direction = Vec3::new(0.0, 0.0, 1.0);

        assert_approx_eq!(p.velocity(0.0, &rules).z, rules.move_speed, 1e-4);
        p.effects.apply(EffectKind::SpeedBoost, 0.0, 10.0);
        assert_approx_eq!(
            p.velocity(1.0, &rules).z,
            rules.move_speed * rules.speed_boost_multiplier,
            1e-4
        );
    }
}
