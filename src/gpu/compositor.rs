//! Per-frame composition and fence bookkeeping.

use super::transparency::{dispatch_groups, TransparencyConstants};
use super::{CompositionDevice, Region};
use crate::config::CompositionConfig;
use crate::error::OverlayResult;

/// Which route a window's pixels took this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositePath {
    /// Plain region copy, used for opaque windows.
    Copy,
    /// Transparency compute pass with the given group counts.
    Transparency { groups: [u32; 2] },
}

/// Owns the composition device and the shared fence timeline.
pub struct Compositor<D: CompositionDevice> {
    device: D,
    fence_value: u64,
    opaque_threshold: f32,
    transparent_color: [f32; 3],
    thread_group_size: u32,
}

impl<D: CompositionDevice> Compositor<D> {
    pub fn new(device: D, config: &CompositionConfig) -> Self {
        Self {
            device,
            fence_value: 0,
            opaque_threshold: config.opaque_threshold,
            transparent_color: config.transparent_color,
            thread_group_size: config.thread_group_size,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Last value signaled on the shared fence.
    pub fn fence_value(&self) -> u64 {
        self.fence_value
    }

    /// Write `region` of the captured surface into a swapchain image.
    pub fn composite(
        &self,
        dst: &D::Texture,
        src: &D::Texture,
        region: Region,
        opacity: f32,
    ) -> OverlayResult<CompositePath> {
        if opacity >= self.opaque_threshold {
            self.device.copy_region(dst, src, region)?;
            return Ok(CompositePath::Copy);
        }

        let constants = TransparencyConstants::new(
            self.transparent_color,
            opacity,
            [region.x, region.y],
            region.extent,
        );
        let groups = dispatch_groups(region.extent, self.thread_group_size);
        self.device
            .dispatch_transparency(dst, src, &constants, groups)?;
        Ok(CompositePath::Transparency { groups })
    }

    /// Order this frame's composition work before the submission queue
    /// touches any swapchain image.
    pub fn commit_frame(&mut self) -> OverlayResult<u64> {
        let value = self.fence_value + 1;
        self.device.signal(value)?;
        self.fence_value = value;
        self.device.wait_on_submission(value)?;
        Ok(value)
    }

    /// Block until all signaled composition work has finished.
    pub fn flush(&self) -> OverlayResult<()> {
        if self.fence_value == 0 {
            return Ok(());
        }
        log::debug!("[GPU] Flushing composition queue at fence {}", self.fence_value);
        self.device.wait_for_completion(self.fence_value)
    }
}

impl<D: CompositionDevice> Drop for Compositor<D> {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            log::error!("[GPU] Failed to flush composition queue: {}", e);
        }
    }
}
