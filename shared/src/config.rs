//! Gameplay rules and arena layout, loadable from TOML
//!
//! Every field has a default so a partial (or empty) file is valid.

use crate::math::Vec3;
use crate::types::Color;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config value `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub rules: GameRules,
    pub arena: ArenaConfig,
}

impl GameConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rules.validate()?;
        if !self.arena.half_extent.is_finite() || self.arena.half_extent <= 0.0 {
            return Err(invalid("half_extent", "must be a positive number"));
        }
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

/// Tunable numbers of the simulation. Times are in seconds, distances in world units.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameRules {
    pub max_health: i32,
    pub move_speed: f32,
    pub player_radius: f32,

    pub fire_cooldown: f32,
    /// How far a fire request's origin may be from the shooter
    pub fire_origin_tolerance: f32,
    pub bullet_speed: f32,
    pub bullet_damage: i32,
    pub bullet_lifetime: f32,
    pub bullet_radius: f32,

    pub dash_speed: f32,
    pub dash_duration: f32,
    pub dash_cooldown: f32,

    pub look_sensitivity: f32,
    pub max_pitch: f32,

    pub interaction_range: f32,

    pub powerup_initial_delay: f32,
    pub powerup_spawn_interval: f32,
    pub powerup_max_concurrent: usize,
    pub powerup_pickup_radius: f32,
    pub speed_boost_multiplier: f32,
    pub speed_boost_duration: f32,
    pub fire_rate_multiplier: f32,
    pub fire_rate_duration: f32,
    pub health_pickup_amount: i32,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            max_health: 100,
            move_speed: 5.0,
            player_radius: 0.5,
            fire_cooldown: 0.25,
            fire_origin_tolerance: 2.0,
            bullet_speed: 50.0,
            bullet_damage: 10,
            bullet_lifetime: 5.0,
            bullet_radius: 0.1,
            dash_speed: 20.0,
            dash_duration: 0.2,
            dash_cooldown: 1.0,
            look_sensitivity: 1.0,
            max_pitch: 80.0,
            interaction_range: 2.5,
            powerup_initial_delay: 5.0,
            powerup_spawn_interval: 15.0,
            powerup_max_concurrent: 5,
            powerup_pickup_radius: 1.0,
            speed_boost_multiplier: 1.5,
            speed_boost_duration: 10.0,
            fire_rate_multiplier: 2.0,
            fire_rate_duration: 10.0,
            health_pickup_amount: 25,
        }
    }
}

impl GameRules {
    /// Rejects values the simulation cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_health <= 0 {
            return Err(invalid("max_health", "must be positive"));
        }
        for (field, value) in [
            ("bullet_damage", self.bullet_damage),
            ("health_pickup_amount", self.health_pickup_amount),
        ] {
            if value < 0 {
                return Err(invalid(field, "must not be negative"));
            }
        }

        for (field, value) in [
            ("move_speed", self.move_speed),
            ("player_radius", self.player_radius),
            ("fire_cooldown", self.fire_cooldown),
            ("fire_origin_tolerance", self.fire_origin_tolerance),
            ("bullet_speed", self.bullet_speed),
            ("bullet_lifetime", self.bullet_lifetime),
            ("bullet_radius", self.bullet_radius),
            ("dash_speed", self.dash_speed),
            ("dash_duration", self.dash_duration),
            ("dash_cooldown", self.dash_cooldown),
            ("look_sensitivity", self.look_sensitivity),
            ("max_pitch", self.max_pitch),
            ("interaction_range", self.interaction_range),
            ("powerup_initial_delay", self.powerup_initial_delay),
            ("powerup_spawn_interval", self.powerup_spawn_interval),
            ("powerup_pickup_radius", self.powerup_pickup_radius),
            ("speed_boost_duration", self.speed_boost_duration),
            ("fire_rate_duration", self.fire_rate_duration),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(field, "must be a finite, non-negative number"));
            }
        }

        for (field, value) in [
            ("speed_boost_multiplier", self.speed_boost_multiplier),
            ("fire_rate_multiplier", self.fire_rate_multiplier),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(invalid(field, "must be a positive number"));
            }
        }

        if self.max_pitch > 90.0 {
            return Err(invalid("max_pitch", "must be at most 90 degrees"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &'static str) -> ConfigError {
    ConfigError::Invalid { field, reason }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnPoint {
    pub position: Vec3,
    #[serde(default)]
    pub yaw: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoorConfig {
    pub position: Vec3,
    pub half_extents: Vec3,
    #[serde(default)]
    pub open: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub waypoints: Vec<Vec3>,
    #[serde(default = "default_platform_speed")]
    pub speed: f32,
    #[serde(default = "default_platform_wait")]
    pub wait_time: f32,
    /// Restart from the first waypoint after the last one instead of reversing
    #[serde(default = "default_true")]
    pub looping: bool,
}

fn default_platform_speed() -> f32 {
    2.0
}

fn default_platform_wait() -> f32 {
    1.0
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Players and bullets are kept within `[-half_extent, half_extent]` on x and z
    pub half_extent: f32,
    pub spawn_points: Vec<SpawnPoint>,
    pub colors: Vec<Color>,
    pub doors: Vec<DoorConfig>,
    pub platforms: Vec<PlatformConfig>,
    pub powerup_spawn_points: Vec<Vec3>,
    pub seed: u64,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            half_extent: 20.0,
            spawn_points: vec![
                SpawnPoint {
                    position: Vec3::new(-10.0, 1.0, -10.0),
                    yaw: 45.0,
                },
                SpawnPoint {
                    position: Vec3::new(10.0, 1.0, -10.0),
                    yaw: -45.0,
                },
                SpawnPoint {
                    position: Vec3::new(-10.0, 1.0, 10.0),
                    yaw: 135.0,
                },
                SpawnPoint {
                    position: Vec3::new(10.0, 1.0, 10.0),
                    yaw: -135.0,
                },
            ],
            colors: vec![
                Color::RED,
                Color::BLUE,
                Color::GREEN,
                Color::YELLOW,
                Color::PURPLE,
                Color::ORANGE,
            ],
            doors: vec![
                DoorConfig {
                    position: Vec3::new(0.0, 1.0, -5.0),
                    half_extents: Vec3::new(1.0, 1.0, 0.1),
                    open: false,
                },
                DoorConfig {
                    position: Vec3::new(0.0, 1.0, 5.0),
                    half_extents: Vec3::new(1.0, 1.0, 0.1),
                    open: false,
                },
            ],
            platforms: vec![PlatformConfig {
                waypoints: vec![Vec3::new(-5.0, 0.5, 0.0), Vec3::new(5.0, 0.5, 0.0)],
                speed: default_platform_speed(),
                wait_time: default_platform_wait(),
                looping: false,
            }],
            powerup_spawn_points: vec![
                Vec3::new(0.0, 1.0, 0.0),
                Vec3::new(-15.0, 1.0, 0.0),
                Vec3::new(15.0, 1.0, 0.0),
                Vec3::new(0.0, 1.0, 15.0),
            ],
            seed: 0x5eed,
        }
    }
}
