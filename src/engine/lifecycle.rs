//! Opening and closing windows as slots fill and empty, and rebuilding their
//! swapchains when the captured size changes.

use windowdeck_targets::CaptureTarget;

use super::window::{Window, WindowSwapchain};
use crate::capture::CaptureProvider;
use crate::config::CompositionConfig;
use crate::error::OverlayResult;
use crate::geometry::{align_to_gravity, Pose};
use crate::gpu::{CompositionDevice, TextureDesc};
use crate::runtime::{SwapchainDesc, SwapchainId, VrRuntime};
use crate::shared_state::{OverlayRecord, Placement};

/// Pose given to a window whose slot has never been placed.
///
/// World-locked windows appear in front of the head with the head's roll
/// removed. Head-locked windows sit straight ahead.
pub(crate) fn default_pose(placement: Placement, head: &Pose, spawn_distance: f32) -> Pose {
    let front = Pose::from_translation(glam::Vec3::new(0.0, 0.0, -spawn_distance));
    match placement {
        Placement::WorldLocked => {
            let pose = *head * front;
            Pose::new(align_to_gravity(pose.orientation), pose.position)
        }
        Placement::HeadLocked => front,
    }
}

/// Start capturing a newly filled slot.
///
/// A capture failure only affects this slot and is returned to the caller,
/// which treats the slot as closed until the next frame.
pub(crate) fn open_window<D: CompositionDevice>(
    provider: &mut dyn CaptureProvider<D>,
    device: &D,
    slot: usize,
    target: CaptureTarget,
    record: &OverlayRecord,
    head: &Pose,
    config: &CompositionConfig,
) -> OverlayResult<Window<D::Texture>> {
    let capture = provider.open(device, target)?;
    let mut window = Window::new(slot, target, capture, record);

    if !window.quad.pose.is_finite() {
        window.quad.pose = default_pose(window.placement, head, config.spawn_distance);
        log::debug!(
            "[ENGINE] Slot {}: spawning {} at {:?}",
            slot,
            target,
            window.quad.pose.position
        );
    }
    window.refresh_quad_size(config.minimized_icon_size);

    log::info!("[ENGINE] Slot {}: opened {}", slot, target);
    Ok(window)
}

/// Release everything a window holds. The capture session stops when the
/// window is dropped.
pub(crate) fn close_window<T>(mut window: Window<T>, runtime: &mut dyn VrRuntime) {
    window.release_swapchain(runtime);
    log::info!("[ENGINE] Slot {}: closed {}", window.slot, window.target);
}

/// Make sure the window's swapchain matches the captured surface's size and
/// format, creating or rebuilding it as needed.
pub(crate) fn ensure_swapchain<D: CompositionDevice>(
    window: &mut Window<D::Texture>,
    runtime: &mut dyn VrRuntime,
    device: &D,
    surface: TextureDesc,
) -> OverlayResult<()> {
    if window
        .swapchain
        .as_ref()
        .is_some_and(|s| s.extent == surface.extent && s.format == surface.format)
    {
        return Ok(());
    }
    window.release_swapchain(runtime);

    let desc = SwapchainDesc {
        extent: surface.extent,
        format: surface.format,
        unordered_access: true,
        static_image: false,
    };
    let id = runtime.create_swapchain(&desc)?;

    let images = match share_images(runtime, device, id) {
        Ok(images) => images,
        Err(e) => {
            runtime.destroy_swapchain(id);
            return Err(e);
        }
    };

    log::debug!(
        "[ENGINE] Slot {}: created {}x{} {:?} swapchain with {} images",
        window.slot,
        surface.extent.width,
        surface.extent.height,
        surface.format,
        images.len()
    );
    window.swapchain = Some(WindowSwapchain {
        id,
        extent: surface.extent,
        format: surface.format,
        images,
    });
    Ok(())
}

/// Open every image of a runtime swapchain on the composition device.
pub(crate) fn share_images<D: CompositionDevice>(
    runtime: &mut dyn VrRuntime,
    device: &D,
    id: SwapchainId,
) -> OverlayResult<Vec<D::Texture>> {
    runtime
        .swapchain_images(id)?
        .iter()
        .map(|image| device.import_texture(image.export_handle()?))
        .collect()
}
