//! Synthetic desktop input for the windows behind overlays.
//!
//! Fire-and-forget: nothing reports whether the OS delivered an event.

#[cfg(windows)]
mod win;

#[cfg(windows)]
pub use win::Win32DesktopInput;

use windowdeck_targets::CaptureTarget;

pub trait DesktopInput {
    /// Put the OS cursor on a pixel of the target's visible content.
    fn move_cursor(&mut self, target: CaptureTarget, x: i32, y: i32);

    /// Make the target the foreground window.
    fn focus(&mut self, target: CaptureTarget);

    /// Left button press and release at the cursor.
    fn click(&mut self);
}
