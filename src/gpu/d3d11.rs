//! Direct3D 11 composition device.
//!
//! A second D3D11 device on the adapter of the host's device. Captured frames
//! are copied or blended into swapchain images opened from their shared
//! handles. A shared `ID3D11Fence` is signaled on our immediate context and
//! waited on by the host's immediate context once per frame.

use std::ffi::CString;

use windows::core::{s, Interface, PCSTR, PCWSTR};
use windows::Win32::Foundation::{CloseHandle, GENERIC_ALL, HANDLE};
use windows::Win32::Graphics::Direct3D::Fxc::{D3DCompile, D3DCOMPILE_ENABLE_STRICTNESS};
use windows::Win32::Graphics::Direct3D::{ID3DBlob, D3D_DRIVER_TYPE_UNKNOWN, D3D_SHADER_MACRO};
use windows::Win32::Graphics::Direct3D11::{
    D3D11CreateDevice, ID3D11Buffer, ID3D11ComputeShader, ID3D11Device, ID3D11Device5,
    ID3D11DeviceContext, ID3D11DeviceContext4, ID3D11Fence, ID3D11ShaderResourceView,
    ID3D11Texture2D, ID3D11UnorderedAccessView, D3D11_BIND_CONSTANT_BUFFER, D3D11_BOX,
    D3D11_BUFFER_DESC, D3D11_CPU_ACCESS_WRITE, D3D11_CREATE_DEVICE_BGRA_SUPPORT,
    D3D11_FENCE_FLAG_SHARED, D3D11_MAPPED_SUBRESOURCE, D3D11_MAP_WRITE_DISCARD,
    D3D11_SDK_VERSION, D3D11_TEX2D_UAV, D3D11_TEXTURE2D_DESC, D3D11_UAV_DIMENSION_TEXTURE2D,
    D3D11_UNORDERED_ACCESS_VIEW_DESC, D3D11_UNORDERED_ACCESS_VIEW_DESC_0, D3D11_USAGE_DYNAMIC,
};
use windows::Win32::Graphics::Dxgi::Common::{
    DXGI_FORMAT, DXGI_FORMAT_B8G8R8A8_TYPELESS, DXGI_FORMAT_B8G8R8A8_UNORM,
    DXGI_FORMAT_B8G8R8A8_UNORM_SRGB, DXGI_FORMAT_R10G10B10A2_TYPELESS,
    DXGI_FORMAT_R10G10B10A2_UNORM, DXGI_FORMAT_R16G16B16A16_FLOAT,
    DXGI_FORMAT_R16G16B16A16_TYPELESS, DXGI_FORMAT_R8G8B8A8_TYPELESS, DXGI_FORMAT_R8G8B8A8_UNORM,
    DXGI_FORMAT_R8G8B8A8_UNORM_SRGB,
};
use windows::Win32::Graphics::Dxgi::{IDXGIDevice, IDXGIResource};
use windows::Win32::System::Threading::{CreateEventW, WaitForSingleObject, INFINITE};

use super::transparency::{
    TransparencyConstants, TRANSPARENCY_ENTRY_POINT, TRANSPARENCY_HLSL, TRANSPARENCY_TARGET,
};
use super::{
    CompositionDevice, Extent, Region, ShareableTexture, SharedHandle, TextureDesc, TextureFormat,
};
use crate::config::CompositionConfig;
use crate::error::{OverlayError, OverlayResult};

// ============================================================================
// Format mapping
// ============================================================================

impl TextureFormat {
    /// Typed and typeless DXGI formats map to the same variant.
    pub fn from_dxgi(format: DXGI_FORMAT) -> Option<Self> {
        Some(match format {
            DXGI_FORMAT_R8G8B8A8_UNORM | DXGI_FORMAT_R8G8B8A8_TYPELESS => Self::Rgba8Unorm,
            DXGI_FORMAT_R8G8B8A8_UNORM_SRGB => Self::Rgba8UnormSrgb,
            DXGI_FORMAT_B8G8R8A8_UNORM | DXGI_FORMAT_B8G8R8A8_TYPELESS => Self::Bgra8Unorm,
            DXGI_FORMAT_B8G8R8A8_UNORM_SRGB => Self::Bgra8UnormSrgb,
            DXGI_FORMAT_R10G10B10A2_UNORM | DXGI_FORMAT_R10G10B10A2_TYPELESS => {
                Self::Rgb10A2Unorm
            }
            DXGI_FORMAT_R16G16B16A16_FLOAT | DXGI_FORMAT_R16G16B16A16_TYPELESS => {
                Self::Rgba16Float
            }
            _ => return None,
        })
    }

    pub fn to_dxgi(self) -> DXGI_FORMAT {
        match self {
            Self::Rgba8Unorm => DXGI_FORMAT_R8G8B8A8_UNORM,
            Self::Rgba8UnormSrgb => DXGI_FORMAT_R8G8B8A8_UNORM_SRGB,
            Self::Bgra8Unorm => DXGI_FORMAT_B8G8R8A8_UNORM,
            Self::Bgra8UnormSrgb => DXGI_FORMAT_B8G8R8A8_UNORM_SRGB,
            Self::Rgb10A2Unorm => DXGI_FORMAT_R10G10B10A2_UNORM,
            Self::Rgba16Float => DXGI_FORMAT_R16G16B16A16_FLOAT,
        }
    }

    /// Format usable for an unordered access view. sRGB formats cannot be
    /// written through a UAV, so their linear sibling is used.
    pub fn to_dxgi_uav(self) -> DXGI_FORMAT {
        match self {
            Self::Rgba8UnormSrgb => DXGI_FORMAT_R8G8B8A8_UNORM,
            Self::Bgra8UnormSrgb => DXGI_FORMAT_B8G8R8A8_UNORM,
            other => other.to_dxgi(),
        }
    }
}

// ============================================================================
// Shareable submission-side texture
// ============================================================================

/// A texture on the host's device exported through its DXGI shared handle.
#[derive(Clone)]
pub struct D3D11SharedTexture(pub ID3D11Texture2D);

impl ShareableTexture for D3D11SharedTexture {
    fn export_handle(&self) -> OverlayResult<SharedHandle> {
        let resource: IDXGIResource = self.0.cast()?;
        let handle = unsafe { resource.GetSharedHandle()? };
        if handle.is_invalid() {
            return Err(OverlayError::Gpu(
                "Swapchain image was not created shareable".to_string(),
            ));
        }
        Ok(SharedHandle(handle.0 as usize as u64))
    }
}

// ============================================================================
// Composition device
// ============================================================================

pub struct D3D11CompositionDevice {
    device: ID3D11Device5,
    context: ID3D11DeviceContext4,
    fence: ID3D11Fence,
    submission_context: ID3D11DeviceContext4,
    submission_fence: ID3D11Fence,
    shader: ID3D11ComputeShader,
    constants: ID3D11Buffer,
}

impl D3D11CompositionDevice {
    /// Create the composition device next to `submission` and open the shared
    /// fence on both.
    pub fn new(submission: &ID3D11Device, config: &CompositionConfig) -> OverlayResult<Self> {
        unsafe {
            let dxgi_device: IDXGIDevice = submission.cast()?;
            let adapter = dxgi_device.GetAdapter()?;

            let mut device: Option<ID3D11Device> = None;
            let mut context: Option<ID3D11DeviceContext> = None;
            D3D11CreateDevice(
                &adapter,
                D3D_DRIVER_TYPE_UNKNOWN,
                None,
                D3D11_CREATE_DEVICE_BGRA_SUPPORT,
                None,
                D3D11_SDK_VERSION,
                Some(&mut device),
                None,
                Some(&mut context),
            )?;
            let device: ID3D11Device5 = device
                .ok_or_else(|| OverlayError::Gpu("D3D11CreateDevice returned no device".into()))?
                .cast()?;
            let context: ID3D11DeviceContext4 = context
                .ok_or_else(|| OverlayError::Gpu("D3D11CreateDevice returned no context".into()))?
                .cast()?;

            let fence: ID3D11Fence = device.CreateFence(0, D3D11_FENCE_FLAG_SHARED)?;
            let fence_handle = fence.CreateSharedHandle(None, GENERIC_ALL.0, PCWSTR::null())?;

            let submission5: ID3D11Device5 = submission.cast()?;
            let opened = submission5.OpenSharedFence::<ID3D11Fence>(fence_handle);
            let _ = CloseHandle(fence_handle);
            let submission_fence = opened?;
            let submission_context: ID3D11DeviceContext4 =
                submission.GetImmediateContext()?.cast()?;

            let bytecode = compile_transparency_shader(config.thread_group_size)?;
            let mut shader: Option<ID3D11ComputeShader> = None;
            device.CreateComputeShader(blob_bytes(&bytecode), None, Some(&mut shader))?;
            let shader = shader
                .ok_or_else(|| OverlayError::Gpu("CreateComputeShader returned nothing".into()))?;

            let buffer_desc = D3D11_BUFFER_DESC {
                ByteWidth: std::mem::size_of::<TransparencyConstants>() as u32,
                Usage: D3D11_USAGE_DYNAMIC,
                BindFlags: D3D11_BIND_CONSTANT_BUFFER.0 as u32,
                CPUAccessFlags: D3D11_CPU_ACCESS_WRITE.0 as u32,
                MiscFlags: 0,
                StructureByteStride: 0,
            };
            let mut constants: Option<ID3D11Buffer> = None;
            device.CreateBuffer(&buffer_desc, None, Some(&mut constants))?;
            let constants = constants
                .ok_or_else(|| OverlayError::Gpu("CreateBuffer returned nothing".into()))?;

            log::info!("[GPU] Composition device created on the host adapter");

            Ok(Self {
                device,
                context,
                fence,
                submission_context,
                submission_fence,
                shader,
                constants,
            })
        }
    }

    /// The composition device, for creating capture sessions on it.
    pub fn device(&self) -> ID3D11Device {
        self.device.clone().into()
    }

    fn write_constants(&self, constants: &TransparencyConstants) -> OverlayResult<()> {
        unsafe {
            let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
            self.context.Map(
                &self.constants,
                0,
                D3D11_MAP_WRITE_DISCARD,
                0,
                Some(&mut mapped),
            )?;
            let bytes = bytemuck::bytes_of(constants);
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), mapped.pData as *mut u8, bytes.len());
            self.context.Unmap(&self.constants, 0);
        }
        Ok(())
    }
}

impl CompositionDevice for D3D11CompositionDevice {
    type Texture = ID3D11Texture2D;

    fn import_texture(&self, handle: SharedHandle) -> OverlayResult<ID3D11Texture2D> {
        unsafe {
            let mut texture: Option<ID3D11Texture2D> = None;
            self.device.OpenSharedResource(
                HANDLE(handle.0 as usize as *mut std::ffi::c_void),
                &mut texture,
            )?;
            texture.ok_or_else(|| {
                OverlayError::Gpu(format!("OpenSharedResource({:#x}) returned nothing", handle.0))
            })
        }
    }

    fn texture_desc(&self, texture: &ID3D11Texture2D) -> OverlayResult<TextureDesc> {
        let mut desc = D3D11_TEXTURE2D_DESC::default();
        unsafe { texture.GetDesc(&mut desc) };
        Ok(TextureDesc {
            extent: Extent::new(desc.Width, desc.Height),
            format: swapchain_format(desc.Format)?,
        })
    }

    fn copy_region(
        &self,
        dst: &ID3D11Texture2D,
        src: &ID3D11Texture2D,
        region: Region,
    ) -> OverlayResult<()> {
        let source_box = D3D11_BOX {
            left: region.x,
            top: region.y,
            front: 0,
            right: region.x + region.extent.width,
            bottom: region.y + region.extent.height,
            back: 1,
        };
        unsafe {
            self.context
                .CopySubresourceRegion(dst, 0, 0, 0, 0, src, 0, Some(&source_box));
        }
        Ok(())
    }

    fn dispatch_transparency(
        &self,
        dst: &ID3D11Texture2D,
        src: &ID3D11Texture2D,
        constants: &TransparencyConstants,
        groups: [u32; 2],
    ) -> OverlayResult<()> {
        let dst_format = self.texture_desc(dst)?.format;
        self.write_constants(constants)?;

        unsafe {
            let mut srv: Option<ID3D11ShaderResourceView> = None;
            self.device
                .CreateShaderResourceView(src, None, Some(&mut srv))?;

            let uav_desc = D3D11_UNORDERED_ACCESS_VIEW_DESC {
                Format: dst_format.to_dxgi_uav(),
                ViewDimension: D3D11_UAV_DIMENSION_TEXTURE2D,
                Anonymous: D3D11_UNORDERED_ACCESS_VIEW_DESC_0 {
                    Texture2D: D3D11_TEX2D_UAV { MipSlice: 0 },
                },
            };
            let mut uav: Option<ID3D11UnorderedAccessView> = None;
            self.device
                .CreateUnorderedAccessView(dst, Some(&uav_desc), Some(&mut uav))?;

            self.context.CSSetShader(&self.shader, None);
            self.context
                .CSSetConstantBuffers(0, Some(&[Some(self.constants.clone())]));
            self.context.CSSetShaderResources(0, Some(&[srv]));
            self.context
                .CSSetUnorderedAccessViews(0, 1, Some(&uav), None);

            self.context.Dispatch(groups[0], groups[1], 1);

            // Unbind so the swapchain image can be handed back to the runtime.
            let no_uav: Option<ID3D11UnorderedAccessView> = None;
            self.context.CSSetShaderResources(0, Some(&[None]));
            self.context
                .CSSetUnorderedAccessViews(0, 1, Some(&no_uav), None);
        }
        Ok(())
    }

    fn fill(&self, dst: &ID3D11Texture2D, rgba: [u8; 4]) -> OverlayResult<()> {
        let desc = self.texture_desc(dst)?;
        if desc.format.bytes_per_pixel() != 4 || desc.format == TextureFormat::Rgb10A2Unorm {
            return Err(OverlayError::Gpu(format!(
                "Cannot fill {:?} with 8-bit color",
                desc.format
            )));
        }
        let texel = match desc.format {
            TextureFormat::Bgra8Unorm | TextureFormat::Bgra8UnormSrgb => {
                [rgba[2], rgba[1], rgba[0], rgba[3]]
            }
            _ => rgba,
        };
        let pixels: Vec<u8> = texel
            .iter()
            .copied()
            .cycle()
            .take(desc.extent.pixel_count() * 4)
            .collect();

        unsafe {
            self.context.UpdateSubresource(
                dst,
                0,
                None,
                pixels.as_ptr() as *const _,
                desc.extent.width * 4,
                0,
            );
        }
        Ok(())
    }

    fn signal(&self, value: u64) -> OverlayResult<()> {
        unsafe {
            self.context.Signal(&self.fence, value)?;
            self.context.Flush();
        }
        Ok(())
    }

    fn wait_on_submission(&self, value: u64) -> OverlayResult<()> {
        unsafe { self.submission_context.Wait(&self.submission_fence, value)? };
        Ok(())
    }

    fn wait_for_completion(&self, value: u64) -> OverlayResult<()> {
        unsafe {
            if self.fence.GetCompletedValue() >= value {
                return Ok(());
            }
            let event = CreateEventW(None, false, false, PCWSTR::null())?;
            let armed = self.fence.SetEventOnCompletion(value, event);
            if armed.is_ok() {
                WaitForSingleObject(event, INFINITE);
            }
            let _ = CloseHandle(event);
            armed?;
        }
        Ok(())
    }
}

// ============================================================================
// Shader compilation
// ============================================================================

fn compile_transparency_shader(group_size: u32) -> OverlayResult<ID3DBlob> {
    let entry = CString::new(TRANSPARENCY_ENTRY_POINT).map_err(|e| OverlayError::Gpu(e.to_string()))?;
    let target = CString::new(TRANSPARENCY_TARGET).map_err(|e| OverlayError::Gpu(e.to_string()))?;
    let group_size =
        CString::new(group_size.to_string()).map_err(|e| OverlayError::Gpu(e.to_string()))?;

    let defines = [
        D3D_SHADER_MACRO {
            Name: s!("GROUP_SIZE"),
            Definition: PCSTR(group_size.as_ptr() as *const u8),
        },
        D3D_SHADER_MACRO {
            Name: PCSTR::null(),
            Definition: PCSTR::null(),
        },
    ];

    let mut blob: Option<ID3DBlob> = None;
    let mut errors: Option<ID3DBlob> = None;
    let result = unsafe {
        D3DCompile(
            TRANSPARENCY_HLSL.as_ptr() as *const _,
            TRANSPARENCY_HLSL.len(),
            s!("transparency.hlsl"),
            Some(defines.as_ptr()),
            None,
            PCSTR(entry.as_ptr() as *const u8),
            PCSTR(target.as_ptr() as *const u8),
            D3DCOMPILE_ENABLE_STRICTNESS,
            0,
            &mut blob,
            Some(&mut errors),
        )
    };

    if let Err(e) = result {
        let detail = errors
            .map(|errors| String::from_utf8_lossy(unsafe { blob_bytes(&errors) }).into_owned())
            .unwrap_or_else(|| e.message().to_string());
        return Err(OverlayError::Gpu(format!(
            "Transparency shader failed to compile: {}",
            detail
        )));
    }

    blob.ok_or_else(|| OverlayError::Gpu("D3DCompile returned no bytecode".into()))
}

unsafe fn blob_bytes(blob: &ID3DBlob) -> &[u8] {
    std::slice::from_raw_parts(blob.GetBufferPointer() as *const u8, blob.GetBufferSize())
}

/// Swapchain format for a captured surface. Surfaces no swapchain can hold
/// are a runtime error, not a device one.
fn swapchain_format(format: DXGI_FORMAT) -> OverlayResult<TextureFormat> {
    TextureFormat::from_dxgi(format).ok_or_else(|| {
        OverlayError::Runtime(format!("No swapchain format for DXGI format {}", format.0))
    })
}
