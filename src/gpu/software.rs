//! CPU implementation of the composition device.
//!
//! Images live in memory as `f32` RGBA and are "shared" through a registry
//! keyed by handle, so a submission-side owner and the compositor see the same
//! pixels. The fence is a plain counter that completes immediately. Every call
//! is recorded in [`DeviceStats`].

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::transparency::{transparent_alpha, TransparencyConstants};
use super::{
    CompositionDevice, Extent, Region, ShareableTexture, SharedHandle, TextureDesc, TextureFormat,
};
use crate::error::{OverlayError, OverlayResult};

/// Counters and call history of a [`SoftwareDevice`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceStats {
    pub imports: usize,
    pub copies: usize,
    pub dispatches: usize,
    pub fills: usize,
    pub last_groups: Option<[u32; 2]>,
    pub signaled: Vec<u64>,
    pub submission_waits: Vec<u64>,
    pub completion_waits: Vec<u64>,
}

struct Image {
    handle: SharedHandle,
    desc: TextureDesc,
    pixels: RwLock<Vec<[f32; 4]>>,
}

/// A CPU image. Clones refer to the same pixels.
#[derive(Clone)]
pub struct SoftwareTexture(Arc<Image>);

impl std::fmt::Debug for SoftwareTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareTexture")
            .field("handle", &self.0.handle)
            .field("desc", &self.0.desc)
            .finish()
    }
}

impl SoftwareTexture {
    pub fn handle(&self) -> SharedHandle {
        self.0.handle
    }

    pub fn desc(&self) -> TextureDesc {
        self.0.desc
    }

    /// # Panics
    ///
    /// When `(x, y)` lies outside the image. Test code addresses pixels it
    /// created, so an out-of-range coordinate is a bug in the caller.
    pub fn pixel(&self, x: u32, y: u32) -> [f32; 4] {
        self.0.pixels.read()[self.index(x, y)]
    }

    /// # Panics
    ///
    /// When `(x, y)` lies outside the image.
    pub fn set_pixel(&self, x: u32, y: u32, value: [f32; 4]) {
        let index = self.index(x, y);
        self.0.pixels.write()[index] = value;
    }

    pub fn fill_pixels(&self, value: [f32; 4]) {
        self.0.pixels.write().fill(value);
    }

    pub fn pixels(&self) -> Vec<[f32; 4]> {
        self.0.pixels.read().clone()
    }

    /// Same underlying image.
    pub fn same_image(&self, other: &SoftwareTexture) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn index(&self, x: u32, y: u32) -> usize {
        let extent = self.0.desc.extent;
        assert!(
            x < extent.width && y < extent.height,
            "pixel ({}, {}) outside {}x{} image",
            x,
            y,
            extent.width,
            extent.height
        );
        y as usize * self.0.desc.extent.width as usize + x as usize
    }
}

impl ShareableTexture for SoftwareTexture {
    fn export_handle(&self) -> OverlayResult<SharedHandle> {
        Ok(self.0.handle)
    }
}

struct Inner {
    registry: Mutex<HashMap<SharedHandle, SoftwareTexture>>,
    next_handle: AtomicU64,
    completed: AtomicU64,
    fail_imports: AtomicBool,
    stats: Mutex<DeviceStats>,
}

/// CPU composition device. Clones share textures and statistics.
#[derive(Clone)]
pub struct SoftwareDevice {
    inner: Arc<Inner>,
}

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareDevice {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: Mutex::new(HashMap::new()),
                next_handle: AtomicU64::new(1),
                completed: AtomicU64::new(0),
                fail_imports: AtomicBool::new(false),
                stats: Mutex::new(DeviceStats::default()),
            }),
        }
    }

    /// Allocate a zeroed image and make it importable.
    pub fn create_texture(&self, extent: Extent, format: TextureFormat) -> SoftwareTexture {
        let handle = SharedHandle(self.inner.next_handle.fetch_add(1, Ordering::Relaxed));
        let texture = SoftwareTexture(Arc::new(Image {
            handle,
            desc: TextureDesc { extent, format },
            pixels: RwLock::new(vec![[0.0; 4]; extent.pixel_count()]),
        }));
        self.inner.registry.lock().insert(handle, texture.clone());
        texture
    }

    /// Forget an image. Later imports of its handle fail.
    pub fn release_texture(&self, handle: SharedHandle) {
        self.inner.registry.lock().remove(&handle);
    }

    pub fn live_textures(&self) -> usize {
        self.inner.registry.lock().len()
    }

    /// Make `import_texture` fail, as a lost device would.
    pub fn set_fail_imports(&self, fail: bool) {
        self.inner.fail_imports.store(fail, Ordering::Relaxed);
    }

    pub fn stats(&self) -> DeviceStats {
        self.inner.stats.lock().clone()
    }

    pub fn completed_value(&self) -> u64 {
        self.inner.completed.load(Ordering::Acquire)
    }
}

impl CompositionDevice for SoftwareDevice {
    type Texture = SoftwareTexture;

    fn import_texture(&self, handle: SharedHandle) -> OverlayResult<SoftwareTexture> {
        if self.inner.fail_imports.load(Ordering::Relaxed) {
            return Err(OverlayError::Gpu(format!(
                "OpenSharedResource({:#x}) failed: device removed",
                handle.0
            )));
        }
        let texture = self
            .inner
            .registry
            .lock()
            .get(&handle)
            .cloned()
            .ok_or_else(|| OverlayError::Gpu(format!("Unknown shared handle {:#x}", handle.0)))?;
        self.inner.stats.lock().imports += 1;
        Ok(texture)
    }

    fn texture_desc(&self, texture: &SoftwareTexture) -> OverlayResult<TextureDesc> {
        Ok(texture.desc())
    }

    fn copy_region(
        &self,
        dst: &SoftwareTexture,
        src: &SoftwareTexture,
        region: Region,
    ) -> OverlayResult<()> {
        let src_extent = src.desc().extent;
        let dst_extent = dst.desc().extent;
        let fits_src = region.x + region.extent.width <= src_extent.width
            && region.y + region.extent.height <= src_extent.height;
        let fits_dst = region.extent.width <= dst_extent.width
            && region.extent.height <= dst_extent.height;
        if !fits_src || !fits_dst {
            return Err(OverlayError::Gpu(format!(
                "Copy region {:?} does not fit {:?} -> {:?}",
                region, src_extent, dst_extent
            )));
        }

        let source = src.pixels();
        let mut target = dst.0.pixels.write();
        for y in 0..region.extent.height {
            for x in 0..region.extent.width {
                let from = (region.y + y) as usize * src_extent.width as usize
                    + (region.x + x) as usize;
                let to = y as usize * dst_extent.width as usize + x as usize;
                target[to] = source[from];
            }
        }
        drop(target);

        self.inner.stats.lock().copies += 1;
        Ok(())
    }

    fn dispatch_transparency(
        &self,
        dst: &SoftwareTexture,
        src: &SoftwareTexture,
        constants: &TransparencyConstants,
        groups: [u32; 2],
    ) -> OverlayResult<()> {
        let src_extent = src.desc().extent;
        let dst_extent = dst.desc().extent;
        let [offset_x, offset_y] = constants.source_offset;
        let [width, height] = constants.extent;

        let source = src.pixels();
        let mut target = dst.0.pixels.write();
        for y in 0..height.min(dst_extent.height) {
            for x in 0..width.min(dst_extent.width) {
                let (sx, sy) = (x + offset_x, y + offset_y);
                // Out-of-range loads return zero, as on the GPU.
                let mut color = if sx < src_extent.width && sy < src_extent.height {
                    source[sy as usize * src_extent.width as usize + sx as usize]
                } else {
                    [0.0; 4]
                };
                color[3] = transparent_alpha([color[0], color[1], color[2]], constants);
                target[y as usize * dst_extent.width as usize + x as usize] = color;
            }
        }
        drop(target);

        let mut stats = self.inner.stats.lock();
        stats.dispatches += 1;
        stats.last_groups = Some(groups);
        Ok(())
    }

    fn fill(&self, dst: &SoftwareTexture, rgba: [u8; 4]) -> OverlayResult<()> {
        let value = rgba.map(|c| f32::from(c) / 255.0);
        dst.fill_pixels(value);
        self.inner.stats.lock().fills += 1;
        Ok(())
    }

    fn signal(&self, value: u64) -> OverlayResult<()> {
        self.inner.completed.fetch_max(value, Ordering::AcqRel);
        self.inner.stats.lock().signaled.push(value);
        Ok(())
    }

    fn wait_on_submission(&self, value: u64) -> OverlayResult<()> {
        self.inner.stats.lock().submission_waits.push(value);
        Ok(())
    }

    fn wait_for_completion(&self, value: u64) -> OverlayResult<()> {
        if self.completed_value() < value {
            return Err(OverlayError::Gpu(format!(
                "Fence value {} was never signaled",
                value
            )));
        }
        self.inner.stats.lock().completion_waits.push(value);
        Ok(())
    }
}
