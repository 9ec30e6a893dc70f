use windows::Win32::Foundation::HWND;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    SendInput, INPUT, INPUT_0, INPUT_MOUSE, MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP,
    MOUSE_EVENT_FLAGS, MOUSEINPUT,
};
use windows::Win32::UI::WindowsAndMessaging::{SetCursorPos, SetForegroundWindow};
use windowdeck_targets::CaptureTarget;

use super::DesktopInput;

/// Cursor, focus and click through user32.
#[derive(Debug, Default)]
pub struct Win32DesktopInput;

impl Win32DesktopInput {
    pub fn new() -> Self {
        Self
    }
}

impl DesktopInput for Win32DesktopInput {
    fn move_cursor(&mut self, target: CaptureTarget, x: i32, y: i32) {
        let Some((screen_x, screen_y)) = target.content_to_screen(x, y) else {
            log::debug!("[INPUT] No screen bounds for {}", target);
            return;
        };
        if let Err(e) = unsafe { SetCursorPos(screen_x, screen_y) } {
            log::debug!("[INPUT] SetCursorPos({}, {}) failed: {}", screen_x, screen_y, e);
        }
    }

    fn focus(&mut self, target: CaptureTarget) {
        // Monitors have no window to focus.
        let CaptureTarget::Window(id) = target else {
            return;
        };
        let hwnd = HWND(id.raw() as *mut _);
        if !unsafe { SetForegroundWindow(hwnd) }.as_bool() {
            log::debug!("[INPUT] SetForegroundWindow refused for {}", target);
        }
    }

    fn click(&mut self) {
        let inputs = [
            mouse_input(MOUSEEVENTF_LEFTDOWN),
            mouse_input(MOUSEEVENTF_LEFTUP),
        ];
        let sent = unsafe { SendInput(&inputs, std::mem::size_of::<INPUT>() as i32) };
        if sent as usize != inputs.len() {
            log::debug!("[INPUT] SendInput delivered {} of {} events", sent, inputs.len());
        }
    }
}

fn mouse_input(flags: MOUSE_EVENT_FLAGS) -> INPUT {
    INPUT {
        r#type: INPUT_MOUSE,
        Anonymous: INPUT_0 {
            mi: MOUSEINPUT {
                dx: 0,
                dy: 0,
                mouseData: 0,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}
