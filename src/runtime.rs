//! Contract with the host VR runtime.
//!
//! The host owns the session: it samples tracking and controller state at the
//! predicted display time, owns the swapchains the overlays render into and
//! receives the finished quad layers with its frame submission.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::OverlayResult;
use crate::geometry::Pose;
use crate::gpu::{Extent, Region, ShareableTexture, TextureFormat};

/// Predicted display time in nanoseconds, as the host's runtime counts it.
pub type DisplayTime = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hand {
    Left,
    Right,
}

impl Hand {
    pub const ALL: [Hand; 2] = [Hand::Left, Hand::Right];

    pub fn index(self) -> usize {
        match self {
            Hand::Left => 0,
            Hand::Right => 1,
        }
    }

    pub fn other(self) -> Hand {
        match self {
            Hand::Left => Hand::Right,
            Hand::Right => Hand::Left,
        }
    }
}

/// Aim pose of one controller.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HandPose {
    pub aim: Pose,
    /// Position and orientation are both tracked.
    pub valid: bool,
}

/// Head and controller poses in tracking space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrackingState {
    pub head: Pose,
    pub hands: [HandPose; 2],
}

impl TrackingState {
    pub fn hand(&self, hand: Hand) -> &HandPose {
        &self.hands[hand.index()]
    }
}

/// Buttons and axes of one controller.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControllerState {
    /// Index trigger, 0..1.
    pub trigger: f32,
    /// Hand (grip) trigger, 0..1.
    pub squeeze: f32,
    /// -1..1 on both axes, `+y` pushed away from the user.
    pub thumbstick: Vec2,
    pub thumbstick_click: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControllerInput {
    pub time: DisplayTime,
    pub hands: [ControllerState; 2],
}

impl ControllerInput {
    pub fn hand(&self, hand: Hand) -> &ControllerState {
        &self.hands[hand.index()]
    }
}

/// Runtime-side identifier of a swapchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SwapchainId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainDesc {
    pub extent: Extent,
    pub format: TextureFormat,
    /// Images are written by the transparency compute pass.
    pub unordered_access: bool,
    /// Content is written once and never changes.
    pub static_image: bool,
}

/// One quad in the frame's layer list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadLayer {
    /// Tracking space, or view space for head-locked layers.
    pub pose: Pose,
    /// Width and height in meters.
    pub size: Vec2,
    /// Part of the swapchain image to show.
    pub viewport: Region,
    pub swapchain: SwapchainId,
    pub head_locked: bool,
}

/// The host runtime as seen by the engine.
pub trait VrRuntime {
    fn locate(&mut self, time: DisplayTime) -> OverlayResult<TrackingState>;

    fn input(&mut self, time: DisplayTime) -> OverlayResult<ControllerInput>;

    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> OverlayResult<SwapchainId>;

    fn destroy_swapchain(&mut self, swapchain: SwapchainId);

    /// The swapchain's images, in the order `acquire_image` indexes them.
    fn swapchain_images(
        &mut self,
        swapchain: SwapchainId,
    ) -> OverlayResult<Vec<Box<dyn ShareableTexture>>>;

    /// Acquire and wait for the next image. Returns its index.
    fn acquire_image(&mut self, swapchain: SwapchainId) -> OverlayResult<usize>;

    /// Hand the acquired image back so it can be composited this frame.
    fn release_image(&mut self, swapchain: SwapchainId) -> OverlayResult<()>;
}
