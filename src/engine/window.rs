//! Engine-side model of one occupied overlay slot.

use glam::{Vec2, Vec3};
use windowdeck_targets::CaptureTarget;

use crate::capture::CaptureSession;
use crate::geometry::Pose;
use crate::gpu::{Extent, Region, TextureFormat};
use crate::runtime::{QuadLayer, SwapchainId, VrRuntime};
use crate::shared_state::{OverlayRecord, Placement};

/// A runtime swapchain and its images opened on the composition device.
pub(crate) struct WindowSwapchain<T> {
    pub id: SwapchainId,
    pub extent: Extent,
    pub format: TextureFormat,
    pub images: Vec<T>,
}

/// Placement of a window's quad in its reference space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadGeometry {
    pub pose: Pose,
    /// Width and height in meters.
    pub size: Vec2,
    /// Part of the swapchain image holding the window's content.
    pub viewport: Region,
}

/// Read-only view of a window, as reported by [`OverlayEngine::window`].
///
/// [`OverlayEngine::window`]: super::OverlayEngine::window
#[derive(Debug, Clone, PartialEq)]
pub struct WindowState {
    pub slot: usize,
    pub target: CaptureTarget,
    pub quad: QuadGeometry,
    pub scale: f32,
    pub opacity: f32,
    pub placement: Placement,
    pub is_interactable: bool,
    pub is_frozen: bool,
    pub is_minimized: bool,
    pub has_focus: bool,
    pub swapchain_extent: Option<Extent>,
}

pub(crate) struct Window<T> {
    pub slot: usize,
    pub target: CaptureTarget,
    pub capture: Box<dyn CaptureSession<T>>,
    pub swapchain: Option<WindowSwapchain<T>>,
    pub quad: QuadGeometry,
    pub scale: f32,
    pub opacity: f32,
    pub placement: Placement,
    pub is_interactable: bool,
    pub is_frozen: bool,
    pub is_minimized: bool,
    pub has_focus: bool,
    pub is_dragging: bool,
    pub is_resizing: bool,
}

impl<T> Window<T> {
    /// A window initialized from its slot. The swapchain is created once the
    /// first frame is captured.
    pub fn new(
        slot: usize,
        target: CaptureTarget,
        capture: Box<dyn CaptureSession<T>>,
        record: &OverlayRecord,
    ) -> Self {
        Self {
            slot,
            target,
            capture,
            swapchain: None,
            quad: QuadGeometry {
                pose: record.pose(),
                size: Vec2::splat(record.scale),
                viewport: Region::default(),
            },
            scale: record.scale,
            opacity: record.opacity(),
            placement: record.placement(),
            is_interactable: record.interactable(),
            is_frozen: record.frozen(),
            is_minimized: record.minimized(),
            has_focus: false,
            is_dragging: false,
            is_resizing: false,
        }
    }

    /// Write engine-owned fields to the slot and take the tool-owned ones.
    pub fn sync(&mut self, record: &mut OverlayRecord) {
        record.set_pose(self.quad.pose);
        record.scale = self.scale;
        record.is_minimized = self.is_minimized as u8;

        self.opacity = record.opacity();
        self.placement = record.placement();
        self.is_interactable = record.interactable();
        self.is_frozen = record.frozen();
    }

    /// Recompute the quad size from the scale and the content aspect ratio.
    pub fn refresh_quad_size(&mut self, minimized_icon_size: f32) {
        if self.is_minimized {
            self.quad.size = Vec2::splat(minimized_icon_size);
            return;
        }
        let extent = self.quad.viewport.extent;
        self.quad.size = if extent.is_empty() {
            Vec2::splat(self.scale)
        } else {
            Vec2::new(
                self.scale,
                self.scale * extent.height as f32 / extent.width as f32,
            )
        };
    }

    /// Content size in pixels.
    pub fn pixel_size(&self) -> Vec2 {
        let extent = self.quad.viewport.extent;
        Vec2::new(extent.width as f32, extent.height as f32)
    }

    /// Distance used for draw ordering. Head-locked poses are already
    /// relative to the head.
    pub fn distance_from(&self, head: &Pose) -> f32 {
        if self.placement.is_head_locked() {
            self.quad.pose.position.length()
        } else {
            (self.quad.pose.position - head.position).length()
        }
    }

    pub fn head_position(&self, head: &Pose) -> Vec3 {
        if self.placement.is_head_locked() {
            Vec3::ZERO
        } else {
            head.position
        }
    }

    /// The window's layer, once it has content to show.
    pub fn layer(&self) -> Option<QuadLayer> {
        let swapchain = self.swapchain.as_ref()?;
        if self.quad.viewport.extent.is_empty() || !self.quad.pose.is_finite() {
            return None;
        }
        Some(QuadLayer {
            pose: self.quad.pose,
            size: self.quad.size,
            viewport: self.quad.viewport,
            swapchain: swapchain.id,
            head_locked: self.placement.is_head_locked(),
        })
    }

    /// Drop the swapchain, handing it back to the runtime.
    pub fn release_swapchain(&mut self, runtime: &mut dyn VrRuntime) {
        if let Some(swapchain) = self.swapchain.take() {
            log::debug!(
                "[ENGINE] Slot {}: destroying {}x{} swapchain",
                self.slot,
                swapchain.extent.width,
                swapchain.extent.height
            );
            runtime.destroy_swapchain(swapchain.id);
        }
    }

    pub fn state(&self) -> WindowState {
        WindowState {
            slot: self.slot,
            target: self.target,
            quad: self.quad,
            scale: self.scale,
            opacity: self.opacity,
            placement: self.placement,
            is_interactable: self.is_interactable,
            is_frozen: self.is_frozen,
            is_minimized: self.is_minimized,
            has_focus: self.has_focus,
            swapchain_extent: self.swapchain.as_ref().map(|s| s.extent),
        }
    }
}
