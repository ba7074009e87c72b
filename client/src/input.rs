//! Scripted input: a seeded bot that produces sequenced commands

use log::error;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::math::yaw_pitch;
use shared::{Command, Vec3};

/// Updates between changes of walking direction
const WANDER_PERIOD: u32 = 40;
/// Updates between respawn requests while dead
const RESPAWN_PERIOD: u32 = 20;

const FIRE_CHANCE: f64 = 0.15;
const DASH_CHANCE: f64 = 0.02;
const INTERACT_CHANCE: f64 = 0.02;

/// What the bot knows about its own player when deciding
#[derive(Debug, Clone, Copy, Default)]
pub struct BotView {
    pub dead: bool,
    pub position: Option<Vec3>,
    pub yaw: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequencedCommand {
    pub sequence: u32,
    pub command: Command,
}

/// Produces a stream of commands. Sequence numbers start at 1 and increase by
/// one per command.
pub struct InputManager {
    next_sequence: u32,
    rng: StdRng,
    updates: u32,
    walking: Vec3,
    dead_for: u32,
}

impl InputManager {
    pub fn new(seed: u64) -> Self {
        Self {
            next_sequence: 1,
            rng: StdRng::seed_from_u64(seed),
            updates: 0,
            walking: Vec3::ZERO,
            dead_for: 0,
        }
    }

    pub fn next_sequence(&self) -> u32 {
        self.next_sequence
    }

    /// Decides what to send this update
    pub fn update(&mut self, view: BotView) -> Vec<SequencedCommand> {
        self.updates += 1;
        let mut commands = Vec::new();

        if view.dead {
            if self.dead_for % RESPAWN_PERIOD == 0 {
                commands.push(Command::Respawn);
            }
            self.dead_for += 1;
            return self.sequence(commands);
        }
        self.dead_for = 0;

        if self.updates % WANDER_PERIOD == 1 {
            self.walking = self.random_direction();
            commands.push(Command::Move {
                direction: self.walking,
            });
        }

        commands.push(Command::Look {
            delta_x: self.rng.gen_range(-4.0..4.0),
            delta_y: self.rng.gen_range(-1.0..1.0),
        });

        if let Some(position) = view.position {
            if self.rng.gen_bool(FIRE_CHANCE) {
                commands.push(Command::Fire {
                    position,
                    rotation: yaw_pitch(view.yaw, 0.0),
                });
            }
        }
        if self.rng.gen_bool(DASH_CHANCE) {
            commands.push(Command::Dash {
                direction: self.walking,
            });
        }
        if self.rng.gen_bool(INTERACT_CHANCE) {
            commands.push(Command::Interact);
        }

        self.sequence(commands)
    }

    fn random_direction(&mut self) -> Vec3 {
        // One in four wanders stop
        if self.rng.gen_range(0..4) == 0 {
            return Vec3::ZERO;
        }
        let angle: f32 = self.rng.gen_range(0.0..std::f32::consts::TAU);
        Vec3::new(angle.sin(), 0.0, angle.cos())
    }

    /// Numbers commands in order. Once the counter is used up further
    /// commands are dropped, since a wrapped sequence would never be acked.
    fn sequence(&mut self, commands: Vec<Command>) -> Vec<SequencedCommand> {
        let mut sequenced = Vec::with_capacity(commands.len());
        for command in commands {
            let Some(next) = self.next_sequence.checked_add(1) else {
                error!("Command sequence exhausted, dropping {}", command.name());
                break;
            };
            sequenced.push(SequencedCommand {
                sequence: self.next_sequence,
                command,
            });
            self.next_sequence = next;
        }
        sequenced
    }
}
