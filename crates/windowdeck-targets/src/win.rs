#![cfg(windows)]

use std::mem;
use windows::{
    Graphics::Capture::GraphicsCaptureItem,
    Win32::{
        Foundation::{HWND, RECT},
        Graphics::{
            Dwm::{DwmGetWindowAttribute, DWMWA_EXTENDED_FRAME_BOUNDS},
            Gdi::{GetMonitorInfoW, HMONITOR, MONITORINFOEXW},
        },
        System::WinRT::Graphics::Capture::IGraphicsCaptureItemInterop,
        UI::WindowsAndMessaging::{GetWindowRect, IsWindow},
    },
};

use crate::bounds::{PhysicalBounds, PhysicalPosition, PhysicalSize};
use crate::{DisplayId, WindowId};

#[derive(Clone, Copy)]
pub struct DisplayImpl(pub HMONITOR);

unsafe impl Send for DisplayImpl {}

impl DisplayImpl {
    pub fn from_id(id: DisplayId) -> Self {
        Self(HMONITOR(id.raw() as *mut _))
    }

    pub fn physical_bounds(&self) -> Option<PhysicalBounds> {
        let mut info = MONITORINFOEXW::default();
        info.monitorInfo.cbSize = mem::size_of::<MONITORINFOEXW>() as u32;

        unsafe { GetMonitorInfoW(self.0, &mut info as *mut _ as *mut _) }
            .as_bool()
            .then(|| rect_to_bounds(info.monitorInfo.rcMonitor))
    }

    pub fn try_as_capture_item(&self) -> windows::core::Result<GraphicsCaptureItem> {
        let interop = windows::core::factory::<GraphicsCaptureItem, IGraphicsCaptureItemInterop>()?;
        unsafe { interop.CreateForMonitor(self.0) }
    }
}

#[derive(Clone, Copy)]
pub struct WindowImpl(HWND);

unsafe impl Send for WindowImpl {}

impl WindowImpl {
    pub fn from_id(id: WindowId) -> Self {
        Self(HWND(id.raw() as *mut _))
    }

    pub fn is_alive(&self) -> bool {
        unsafe { IsWindow(self.0).as_bool() }
    }

    pub fn physical_bounds(&self) -> Option<PhysicalBounds> {
        let mut rect = RECT::default();
        unsafe {
            DwmGetWindowAttribute(
                self.0,
                DWMWA_EXTENDED_FRAME_BOUNDS,
                (&raw mut rect).cast(),
                size_of::<RECT>() as u32,
            )
            .ok()?;
        }
        Some(rect_to_bounds(rect))
    }

    /// Full window rectangle including the invisible resize borders. This is
    /// what Windows Graphics Capture delivers.
    pub fn window_bounds(&self) -> Option<PhysicalBounds> {
        let mut rect = RECT::default();
        unsafe { GetWindowRect(self.0, &mut rect) }.ok()?;
        Some(rect_to_bounds(rect))
    }

    pub fn try_as_capture_item(&self) -> windows::core::Result<GraphicsCaptureItem> {
        let interop = windows::core::factory::<GraphicsCaptureItem, IGraphicsCaptureItemInterop>()?;
        unsafe { interop.CreateForWindow(self.0) }
    }
}

fn rect_to_bounds(rect: RECT) -> PhysicalBounds {
    PhysicalBounds::new(
        PhysicalPosition::new(rect.left as f64, rect.top as f64),
        PhysicalSize::new(
            (rect.right - rect.left) as f64,
            (rect.bottom - rect.top) as f64,
        ),
    )
}
