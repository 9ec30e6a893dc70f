//! Windows Graphics Capture sessions.
//!
//! Frames are produced on a free-threaded frame pool and polled from the
//! engine thread with `TryGetNextFrame`, so no dispatcher queue is needed.

use windows::core::Interface;
use windows::Graphics::Capture::{
    Direct3D11CaptureFrame, Direct3D11CaptureFramePool, GraphicsCaptureItem,
    GraphicsCaptureSession,
};
use windows::Graphics::DirectX::Direct3D11::IDirect3DDevice;
use windows::Graphics::DirectX::DirectXPixelFormat;
use windows::Graphics::SizeInt32;
use windows::Win32::Graphics::Direct3D11::ID3D11Texture2D;
use windows::Win32::Graphics::Dxgi::IDXGIDevice;
use windows::Win32::System::WinRT::Direct3D11::{
    CreateDirect3D11DeviceFromDXGIDevice, IDirect3DDxgiInterfaceAccess,
};
use windowdeck_targets::CaptureTarget;

use super::{CaptureProvider, CaptureSession};
use crate::error::{OverlayError, OverlayResult};
use crate::gpu::d3d11::D3D11CompositionDevice;
use crate::gpu::{Extent, Region};

/// Pixel format of captured frames. Matches the swapchains the engine creates.
const CAPTURE_FORMAT: DirectXPixelFormat = DirectXPixelFormat::R8G8B8A8UIntNormalized;

/// Frames buffered in the pool.
const FRAME_BUFFERS: i32 = 2;

fn capture_error(context: &'static str) -> impl Fn(windows::core::Error) -> OverlayError {
    move |e| OverlayError::Capture(format!("{}: {}", context, e))
}

/// Opens Windows Graphics Capture sessions on the composition device.
#[derive(Default)]
pub struct WgcCaptureProvider {
    winrt_device: Option<IDirect3DDevice>,
}

impl WgcCaptureProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn winrt_device(&mut self, device: &D3D11CompositionDevice) -> OverlayResult<IDirect3DDevice> {
        if let Some(existing) = &self.winrt_device {
            return Ok(existing.clone());
        }
        let dxgi_device: IDXGIDevice = device
            .device()
            .cast()
            .map_err(capture_error("ID3D11Device as IDXGIDevice"))?;
        let inspectable = unsafe { CreateDirect3D11DeviceFromDXGIDevice(&dxgi_device) }
            .map_err(capture_error("CreateDirect3D11DeviceFromDXGIDevice"))?;
        let winrt_device: IDirect3DDevice = inspectable
            .cast()
            .map_err(capture_error("IInspectable as IDirect3DDevice"))?;
        self.winrt_device = Some(winrt_device.clone());
        Ok(winrt_device)
    }
}

impl CaptureProvider<D3D11CompositionDevice> for WgcCaptureProvider {
    fn open(
        &mut self,
        device: &D3D11CompositionDevice,
        target: CaptureTarget,
    ) -> OverlayResult<Box<dyn CaptureSession<ID3D11Texture2D>>> {
        let winrt_device = self.winrt_device(device)?;
        let session = WgcSession::start(winrt_device, target)?;
        log::info!(
            "[CAPTURE] Started capture of {} at {}x{}",
            target,
            session.size.width,
            session.size.height
        );
        Ok(Box::new(session))
    }
}

/// One running Windows Graphics Capture session.
pub struct WgcSession {
    target: CaptureTarget,
    device: IDirect3DDevice,
    pool: Direct3D11CaptureFramePool,
    session: GraphicsCaptureSession,
    size: Extent,
    content: Region,
    /// Kept open so its texture stays valid until the next frame replaces it.
    frame: Option<Direct3D11CaptureFrame>,
    texture: Option<ID3D11Texture2D>,
}

impl WgcSession {
    fn start(device: IDirect3DDevice, target: CaptureTarget) -> OverlayResult<Self> {
        let item: GraphicsCaptureItem = target
            .try_as_capture_item()
            .map_err(capture_error("GraphicsCaptureItem"))?;
        let item_size = item.Size().map_err(capture_error("GraphicsCaptureItem::Size"))?;

        let pool = Direct3D11CaptureFramePool::CreateFreeThreaded(
            &device,
            CAPTURE_FORMAT,
            FRAME_BUFFERS,
            item_size,
        )
        .map_err(capture_error("CreateFreeThreaded"))?;
        let session = pool
            .CreateCaptureSession(&item)
            .map_err(capture_error("CreateCaptureSession"))?;

        // Optional on older Windows builds.
        if let Err(e) = session.SetIsBorderRequired(false) {
            log::debug!("[CAPTURE] SetIsBorderRequired unsupported: {}", e);
        }
        if let Err(e) = session.SetIsCursorCaptureEnabled(false) {
            log::debug!("[CAPTURE] SetIsCursorCaptureEnabled unsupported: {}", e);
        }

        session
            .StartCapture()
            .map_err(capture_error("StartCapture"))?;

        let size = extent_of(item_size);
        Ok(Self {
            target,
            device,
            pool,
            session,
            size,
            content: content_region(target, size),
            frame: None,
            texture: None,
        })
    }

    /// Newest frame in the pool, closing any older ones.
    fn drain_pool(&self) -> Option<Direct3D11CaptureFrame> {
        let mut newest: Option<Direct3D11CaptureFrame> = None;
        while let Ok(frame) = self.pool.TryGetNextFrame() {
            if let Some(older) = newest.replace(frame) {
                let _ = older.Close();
            }
        }
        newest
    }

    fn accept(&mut self, frame: Direct3D11CaptureFrame) -> OverlayResult<()> {
        let content_size = frame
            .ContentSize()
            .map_err(capture_error("Direct3D11CaptureFrame::ContentSize"))?;
        let size = extent_of(content_size);

        if size != self.size && !size.is_empty() {
            log::debug!(
                "[CAPTURE] {} resized {}x{} -> {}x{}",
                self.target,
                self.size.width,
                self.size.height,
                size.width,
                size.height
            );
            self.pool
                .Recreate(&self.device, CAPTURE_FORMAT, FRAME_BUFFERS, content_size)
                .map_err(capture_error("Direct3D11CaptureFramePool::Recreate"))?;
            self.size = size;
        }
        self.content = content_region(self.target, self.size);

        let surface = frame
            .Surface()
            .map_err(capture_error("Direct3D11CaptureFrame::Surface"))?;
        let access: IDirect3DDxgiInterfaceAccess = surface
            .cast()
            .map_err(capture_error("IDirect3DSurface as IDirect3DDxgiInterfaceAccess"))?;
        let texture: ID3D11Texture2D = unsafe { access.GetInterface() }
            .map_err(capture_error("IDirect3DDxgiInterfaceAccess::GetInterface"))?;

        if let Some(previous) = self.frame.replace(frame) {
            let _ = previous.Close();
        }
        self.texture = Some(texture);
        Ok(())
    }
}

impl CaptureSession<ID3D11Texture2D> for WgcSession {
    fn latest_surface(&mut self) -> OverlayResult<Option<ID3D11Texture2D>> {
        if let Some(frame) = self.drain_pool() {
            self.accept(frame)?;
        }
        Ok(self.texture.clone())
    }

    fn size(&self) -> Extent {
        self.size
    }

    fn content_region(&self) -> Region {
        self.content
    }

    fn is_alive(&self) -> bool {
        self.target.is_alive()
    }
}

impl Drop for WgcSession {
    fn drop(&mut self) {
        self.texture = None;
        if let Some(frame) = self.frame.take() {
            let _ = frame.Close();
        }
        let _ = self.session.Close();
        let _ = self.pool.Close();
        log::debug!("[CAPTURE] Closed capture of {}", self.target);
    }
}

fn extent_of(size: SizeInt32) -> Extent {
    Extent::new(size.Width.max(0) as u32, size.Height.max(0) as u32)
}

/// Visible content of the target inside a surface of `size`: the DWM frame
/// bounds for windows, everything for monitors.
fn content_region(target: CaptureTarget, size: Extent) -> Region {
    let full = Region::full(size);
    if target.is_monitor() {
        return full;
    }

    let (Some(offset), Some(bounds)) = (target.content_offset(), target.physical_bounds()) else {
        return full;
    };
    let (width, height) = bounds.size().to_pixels();
    Region {
        x: offset.x() as u32,
        y: offset.y() as u32,
        extent: Extent::new(width, height),
    }
    .clamped_to(size)
}
