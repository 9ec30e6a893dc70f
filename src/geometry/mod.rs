//! Pose math and ray casting for overlay quads.
//!
//! Everything here is pure: no engine state, no GPU or OS access. Angles are
//! radians, distances meters, and orientations are assumed to be unit
//! quaternions.

pub mod pose;

pub use hit_test::{quad_corners, ray_intersect_quad, world_point_to_uv, QuadHit, Ray};
pub use pose::{align_to_gravity, facing_camera, rotate_yaw_pitch, Pose};
