//! Rigid transforms and orientation helpers.

use glam::{EulerRot, Mat3, Quat, Vec3};
use std::ops::Mul;

/// Orientation plus position, applied rotation first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub orientation: Quat,
    pub position: Vec3,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        orientation: Quat::IDENTITY,
        position: Vec3::ZERO,
    };

    /// Pose whose every component is NaN. Marks a slot that has never been
    /// placed.
    pub const NAN: Pose = Pose {
        orientation: Quat::from_xyzw(f32::NAN, f32::NAN, f32::NAN, f32::NAN),
        position: Vec3::NAN,
    };

    pub fn new(orientation: Quat, position: Vec3) -> Self {
        Self {
            orientation,
            position,
        }
    }

    pub fn from_translation(position: Vec3) -> Self {
        Self::new(Quat::IDENTITY, position)
    }

    pub fn is_finite(&self) -> bool {
        self.orientation.is_finite() && self.position.is_finite()
    }

    /// `self ∘ other`: `other` expressed in the frame of `self`.
    pub fn compose(&self, other: &Pose) -> Pose {
        Pose {
            orientation: self.orientation * other.orientation,
            position: self.orientation * other.position + self.position,
        }
    }

    pub fn inverse(&self) -> Pose {
        let orientation = self.orientation.inverse();
        Pose {
            orientation,
            position: orientation * -self.position,
        }
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.orientation * point + self.position
    }

    /// Pointing direction, `-Z` in local space.
    pub fn forward(&self) -> Vec3 {
        self.orientation * Vec3::NEG_Z
    }
}

impl Mul for Pose {
    type Output = Pose;

    fn mul(self, rhs: Pose) -> Pose {
        self.compose(&rhs)
    }
}

/// Remove roll from an orientation, keeping yaw and pitch.
pub fn align_to_gravity(orientation: Quat) -> Quat {
    let (yaw, pitch, _roll) = orientation.to_euler(EulerRot::YXZ);
    Quat::from_euler(EulerRot::YXZ, yaw, pitch, 0.0)
}

/// Orientation that points a quad's `+Z` at `viewer`, with world up kept up.
///
/// Falls back to `current` when the viewer sits on the quad or directly above
/// or below it.
pub fn facing_camera(position: Vec3, viewer: Vec3, current: Quat) -> Quat {
    let Some(z) = (viewer - position).try_normalize() else {
        return current;
    };
    let Some(x) = Vec3::Y.cross(z).try_normalize() else {
        return current;
    };
    let y = z.cross(x);
    Quat::from_mat3(&Mat3::from_cols(x, y, z)).normalize()
}

/// Add to the yaw and pitch of an orientation. Roll is dropped.
pub fn rotate_yaw_pitch(orientation: Quat, yaw: f32, pitch: f32) -> Quat {
    let (current_yaw, current_pitch, _roll) = orientation.to_euler(EulerRot::YXZ);
    Quat::from_euler(EulerRot::YXZ, current_yaw + yaw, current_pitch + pitch, 0.0)
}
