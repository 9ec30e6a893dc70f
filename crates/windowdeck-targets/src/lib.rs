//! Identities of the desktop surfaces that can be captured into overlays.
//!
//! A target is either a top-level window or a whole monitor, addressed by the
//! raw OS handle the configuration tool stores in the shared overlay state.

pub mod bounds;

#[cfg(windows)]
mod win;

#[cfg(windows)]
pub use win::{DisplayImpl, WindowImpl};

#[cfg(windows)]
use bounds::*;
use serde::{Deserialize, Serialize};

/// A capturable desktop surface.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum CaptureTarget {
    Window(WindowId),
    Display(DisplayId),
}

impl CaptureTarget {
    /// Build a target from the raw handle stored in a shared overlay slot.
    ///
    /// Returns `None` for the empty handle.
    pub fn from_raw(handle: u64, is_monitor: bool) -> Option<Self> {
        if handle == 0 {
            return None;
        }
        Some(if is_monitor {
            Self::Display(DisplayId(handle))
        } else {
            Self::Window(WindowId(handle))
        })
    }

    pub fn raw(&self) -> u64 {
        match self {
            Self::Window(id) => id.raw(),
            Self::Display(id) => id.raw(),
        }
    }

    pub fn is_monitor(&self) -> bool {
        matches!(self, Self::Display(_))
    }

    /// Screen-space bounds of the visible content of the target.
    ///
    /// For windows this excludes the invisible resize borders that DWM adds
    /// around the frame.
    #[cfg(windows)]
    pub fn physical_bounds(&self) -> Option<PhysicalBounds> {
        match self {
            Self::Window(id) => WindowImpl::from_id(*id).physical_bounds(),
            Self::Display(id) => DisplayImpl::from_id(*id).physical_bounds(),
        }
    }

    #[cfg(windows)]
    pub fn try_as_capture_item(
        &self,
    ) -> windows::core::Result<windows::Graphics::Capture::GraphicsCaptureItem> {
        match self {
            Self::Window(id) => WindowImpl::from_id(*id).try_as_capture_item(),
            Self::Display(id) => DisplayImpl::from_id(*id).try_as_capture_item(),
        }
    }

    /// Offset of the visible content inside the captured surface.
    ///
    /// Captured windows include their invisible resize borders; monitors have
    /// none.
    #[cfg(windows)]
    pub fn content_offset(&self) -> Option<PhysicalPosition> {
        match self {
            Self::Window(id) => {
                let window = WindowImpl::from_id(*id);
                let frame = window.physical_bounds()?.position();
                let outer = window.window_bounds()?.position();
                Some(PhysicalPosition::new(
                    (frame.x() - outer.x()).max(0.0),
                    (frame.y() - outer.y()).max(0.0),
                ))
            }
            Self::Display(_) => Some(PhysicalPosition::new(0.0, 0.0)),
        }
    }

    /// Convert a pixel position relative to the top-left of the visible
    /// content into absolute screen coordinates.
    #[cfg(windows)]
    pub fn content_to_screen(&self, x: i32, y: i32) -> Option<(i32, i32)> {
        let origin = self.physical_bounds()?.position();
        Some((origin.x() as i32 + x, origin.y() as i32 + y))
    }

    /// Whether the underlying window or monitor still exists.
    #[cfg(windows)]
    pub fn is_alive(&self) -> bool {
        match self {
            Self::Window(id) => WindowImpl::from_id(*id).is_alive(),
            Self::Display(id) => DisplayImpl::from_id(*id).physical_bounds().is_some(),
        }
    }
}

impl std::fmt::Display for CaptureTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Window(id) => write!(f, "window:{}", id),
            Self::Display(id) => write!(f, "display:{}", id),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct DisplayId(u64);

impl DisplayId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for DisplayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct WindowId(u64);

impl WindowId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for WindowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
