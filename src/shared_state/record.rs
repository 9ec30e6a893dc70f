//! Binary layout of one overlay slot.
//!
//! Both the engine and the configuration tool map these structs directly, so
//! every type here is `#[repr(C)]`, padding-free and valid for any bit
//! pattern.

use bytemuck::{Pod, Zeroable};
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use windowdeck_targets::CaptureTarget;

use crate::geometry::Pose;

/// Pose as stored in shared memory: quaternion `xyzw` then position `xyz`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SharedPose {
    pub orientation: [f32; 4],
    pub position: [f32; 3],
}

impl From<Pose> for SharedPose {
    fn from(pose: Pose) -> Self {
        Self {
            orientation: pose.orientation.to_array(),
            position: pose.position.to_array(),
        }
    }
}

impl From<SharedPose> for Pose {
    fn from(pose: SharedPose) -> Self {
        Pose::new(
            Quat::from_array(pose.orientation),
            Vec3::from_array(pose.position),
        )
    }
}

/// How an overlay's pose is anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Placement {
    /// Fixed in tracking space.
    #[default]
    WorldLocked,
    /// Relative to the head, moves with the viewer.
    HeadLocked,
}

impl Placement {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Placement::HeadLocked,
            _ => Placement::WorldLocked,
        }
    }

    pub fn raw(self) -> u8 {
        match self {
            Placement::WorldLocked => 0,
            Placement::HeadLocked => 1,
        }
    }

    pub fn is_head_locked(self) -> bool {
        self == Placement::HeadLocked
    }
}

/// One overlay slot. `handle == 0` marks an empty slot.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct OverlayRecord {
    /// Raw `HWND` or `HMONITOR` value.
    pub handle: u64,
    pub pose: SharedPose,
    /// Width in meters.
    pub scale: f32,
    pub is_monitor: u8,
    /// 0-100.
    pub opacity_percent: u8,
    pub placement: u8,
    pub is_interactable: u8,
    pub is_frozen: u8,
    pub is_minimized: u8,
    pub _pad: [u8; 2],
}

impl OverlayRecord {
    /// A freshly configured slot: never placed (NaN pose), fully opaque,
    /// world-locked and interactable.
    pub fn new(target: CaptureTarget) -> Self {
        Self {
            handle: target.raw(),
            pose: Pose::NAN.into(),
            scale: 1.0,
            is_monitor: target.is_monitor() as u8,
            opacity_percent: 100,
            placement: Placement::WorldLocked.raw(),
            is_interactable: 1,
            is_frozen: 0,
            is_minimized: 0,
            _pad: [0; 2],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.handle == 0
    }

    pub fn target(&self) -> Option<CaptureTarget> {
        CaptureTarget::from_raw(self.handle, self.is_monitor != 0)
    }

    pub fn pose(&self) -> Pose {
        self.pose.into()
    }

    pub fn set_pose(&mut self, pose: Pose) {
        self.pose = pose.into();
    }

    /// Opacity in `[0, 1]`.
    pub fn opacity(&self) -> f32 {
        f32::from(self.opacity_percent.min(100)) / 100.0
    }

    pub fn placement(&self) -> Placement {
        Placement::from_raw(self.placement)
    }

    pub fn interactable(&self) -> bool {
        self.is_interactable != 0
    }

    pub fn frozen(&self) -> bool {
        self.is_frozen != 0
    }

    pub fn minimized(&self) -> bool {
        self.is_minimized != 0
    }
}
