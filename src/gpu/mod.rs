//! GPU resources and synchronization for overlay composition.
//!
//! Composition runs on its own device created on the same adapter as the
//! host's submission device. Textures cross between the two through exported
//! handles, and a shared fence signaled here and waited on by the submission
//! queue is the only ordering between the two timelines.
//!
//! ## Backends
//!
//! - `d3d11`: Direct3D 11 (Windows), the production path
//! - `software`: CPU images behind the same contract, for hosts without a
//!   GPU and for exercising the engine in tests

pub mod compositor;
#[cfg(windows)]
pub mod d3d11;
pub mod software;
pub mod transparency;

pub use compositor::{CompositePath, Compositor};
pub use transparency::TransparencyConstants;

use serde::{Deserialize, Serialize};

use crate::error::OverlayResult;

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// A pixel rectangle inside a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub extent: Extent,
}

impl Region {
    pub fn full(extent: Extent) -> Self {
        Self { x: 0, y: 0, extent }
    }

    /// Shrink the region so it lies within `bounds`.
    pub fn clamped_to(self, bounds: Extent) -> Self {
        let x = self.x.min(bounds.width);
        let y = self.y.min(bounds.height);
        Self {
            x,
            y,
            extent: Extent::new(
                self.extent.width.min(bounds.width - x),
                self.extent.height.min(bounds.height - y),
            ),
        }
    }
}

/// Pixel formats exchanged between capture, composition and swapchains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgb10A2Unorm,
    Rgba16Float,
}

impl TextureFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            TextureFormat::Rgba16Float => 8,
            _ => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub extent: Extent,
    pub format: TextureFormat,
}

/// Opaque OS handle identifying a texture across devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SharedHandle(pub u64);

/// A texture owned by another device that can be opened on ours.
pub trait ShareableTexture {
    fn export_handle(&self) -> OverlayResult<SharedHandle>;
}

/// The composition side device and queue.
///
/// All calls are issued from the engine's update thread.
pub trait CompositionDevice {
    type Texture: Clone;

    /// Open a texture exported by the submission device.
    fn import_texture(&self, handle: SharedHandle) -> OverlayResult<Self::Texture>;

    fn texture_desc(&self, texture: &Self::Texture) -> OverlayResult<TextureDesc>;

    /// Copy `region` of `src` to the top-left of `dst`.
    fn copy_region(
        &self,
        dst: &Self::Texture,
        src: &Self::Texture,
        region: Region,
    ) -> OverlayResult<()>;

    /// Run the transparency pass from `src` into `dst` over `groups`
    /// thread groups.
    fn dispatch_transparency(
        &self,
        dst: &Self::Texture,
        src: &Self::Texture,
        constants: &TransparencyConstants,
        groups: [u32; 2],
    ) -> OverlayResult<()>;

    /// Fill every pixel of an 8-bit texture with one RGBA value.
    fn fill(&self, dst: &Self::Texture, rgba: [u8; 4]) -> OverlayResult<()>;

    /// Signal the shared fence on the composition queue.
    fn signal(&self, value: u64) -> OverlayResult<()>;

    /// Make the submission queue wait for the shared fence.
    fn wait_on_submission(&self, value: u64) -> OverlayResult<()>;

    /// Block the calling thread until the fence reaches `value`.
    fn wait_for_completion(&self, value: u64) -> OverlayResult<()>;
}
