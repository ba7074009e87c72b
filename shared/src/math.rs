//! Vector and rotation helpers on top of `glam`

pub use glam::{Quat, Vec3};

/// Builds a rotation from yaw (around +Y) followed by pitch (around +X), in degrees.
/// Positive pitch tilts the forward vector downwards.
pub fn yaw_pitch(yaw_deg: f32, pitch_deg: f32) -> Quat {
    Quat::from_rotation_y(yaw_deg.to_radians()) * Quat::from_rotation_x(pitch_deg.to_radians())
}

/// Unit rotation, or identity when `rotation` is degenerate or not finite
pub fn sanitize_rotation(rotation: Quat) -> Quat {
    let len = rotation.length();
    if len < 1e-6 || !len.is_finite() {
        Quat::IDENTITY
    } else {
        rotation / len
    }
}

/// Direction of local +Z after rotation
pub fn forward(rotation: Quat) -> Vec3 {
    (sanitize_rotation(rotation) * Vec3::Z).normalize_or_zero()
}

/// Projection onto the ground plane
pub fn flatten(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

/// Moves toward `target` by at most `max_step`, never overshooting
pub fn move_towards(from: Vec3, target: Vec3, max_step: f32) -> Vec3 {
    let delta = target - from;
    let dist = delta.length();
    if dist <= max_step || dist < 1e-6 {
        target
    } else {
        from + delta * (max_step / dist)
    }
}

/// Axis-aligned box given by center and half extents
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub center: Vec3,
    pub half_extents: Vec3,
}

impl Aabb {
    pub fn new(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            center,
            half_extents: half_extents.abs(),
        }
    }

    /// True when a sphere overlaps the box
    pub fn intersects_sphere(&self, point: Vec3, radius: f32) -> bool {
        self.closest_point(point).distance(point) <= radius
    }

    pub fn closest_point(&self, point: Vec3) -> Vec3 {
        let min = self.center - self.half_extents;
        let max = self.center + self.half_extents;
        point.max(min).min(max)
    }
}
