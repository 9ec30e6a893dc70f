//! Composition and layer sizing.

use serde::{Deserialize, Serialize};

use super::clamp_logged;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompositionConfig {
    /// Opacity at or above which content is copied instead of blended.
    pub opaque_threshold: f32,
    /// Color key made transparent. `[-1, -1, -1]` applies uniform opacity.
    pub transparent_color: [f32; 3],
    /// Edge length of the square compute thread group.
    pub thread_group_size: u32,
    /// Width and height of a minimized window, in meters.
    pub minimized_icon_size: f32,
    /// Width and height of the cursor quad, in meters.
    pub cursor_size: f32,
    /// Edge length of the cursor image, in pixels.
    pub cursor_pixels: u32,
    /// Distance of newly placed windows in front of the head, in meters.
    pub spawn_distance: f32,
}

impl Default for CompositionConfig {
    fn default() -> Self {
        Self {
            opaque_threshold: 0.9999,
            transparent_color: [-1.0, -1.0, -1.0],
            thread_group_size: 32,
            minimized_icon_size: 0.1,
            cursor_size: 0.01,
            cursor_pixels: 32,
            spawn_distance: 1.0,
        }
    }
}

impl CompositionConfig {
    /// True when the color key is the "disabled" sentinel.
    pub fn color_key_disabled(&self) -> bool {
        self.transparent_color == [-1.0, -1.0, -1.0]
    }

    pub(super) fn validate(&mut self) {
        clamp_logged("opaqueThreshold", &mut self.opaque_threshold, 0.0, 1.0);
        if self.thread_group_size == 0 || self.thread_group_size > 32 {
            let clamped = self.thread_group_size.clamp(1, 32);
            log::warn!(
                "[CONFIG] threadGroupSize = {} out of range, using {}",
                self.thread_group_size,
                clamped
            );
            self.thread_group_size = clamped;
        }
        if self.cursor_pixels == 0 {
            log::warn!("[CONFIG] cursorPixels = 0, using 1");
            self.cursor_pixels = 1;
        }
        clamp_logged("minimizedIconSize", &mut self.minimized_icon_size, 0.001, 10.0);
        clamp_logged("cursorSize", &mut self.cursor_size, 0.0001, 1.0);
        clamp_logged("spawnDistance", &mut self.spawn_distance, 0.1, 100.0);
    }
}
