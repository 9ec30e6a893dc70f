//! Live capture of windows and monitors.
//!
//! A session keeps the most recent frame of one target available as a texture
//! on the composition device. Polling never blocks: without a new frame the
//! previous one is returned again. Dropping a session stops capture and
//! releases its frame pool.

#[cfg(windows)]
pub mod wgc;

use windowdeck_targets::CaptureTarget;

use crate::error::OverlayResult;
use crate::gpu::{CompositionDevice, Extent, Region};

/// One running capture.
pub trait CaptureSession<T> {
    /// Most recent frame, or `None` before the first frame arrived.
    fn latest_surface(&mut self) -> OverlayResult<Option<T>>;

    /// Size of the captured surface. Follows the target when it is resized.
    fn size(&self) -> Extent;

    /// The part of the surface showing the target's visible content.
    fn content_region(&self) -> Region {
        Region::full(self.size())
    }

    /// False once the captured window or monitor no longer exists.
    fn is_alive(&self) -> bool {
        true
    }
}

/// Starts capture sessions on a composition device.
pub trait CaptureProvider<D: CompositionDevice> {
    fn open(
        &mut self,
        device: &D,
        target: CaptureTarget,
    ) -> OverlayResult<Box<dyn CaptureSession<D::Texture>>>;
}
