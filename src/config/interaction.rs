//! Controller interaction tuning.

use serde::{Deserialize, Serialize};

use super::clamp_logged;
use crate::runtime::Hand;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InteractionConfig {
    /// Analog trigger value above which a trigger counts as pressed.
    pub click_threshold: f32,
    /// Forward motion gained per meter of change in hand-to-head distance.
    pub drag_sensitivity: f32,
    /// Largest per-frame drag step on each axis, in meters.
    pub max_drag_step: [f32; 3],
    /// Drags never place a window farther than this from the head.
    pub max_distance: f32,
    /// Hit test margin around each window, in window pixels.
    pub hover_margin_px: f32,
    /// Yaw/pitch applied per frame at full thumbstick deflection.
    pub rotate_step_degrees: f32,
    /// Hand tested first before any hand has interacted.
    pub preferred_hand: Hand,
    /// Smallest window width reachable by resizing, in meters.
    pub min_scale: f32,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            click_threshold: 0.75,
            drag_sensitivity: 0.25,
            max_drag_step: [0.02, 0.02, 0.01],
            max_distance: 10.0,
            hover_margin_px: 50.0,
            rotate_step_degrees: 1.0,
            preferred_hand: Hand::Right,
            min_scale: 0.05,
        }
    }
}

impl InteractionConfig {
    pub(super) fn validate(&mut self) {
        clamp_logged("clickThreshold", &mut self.click_threshold, 0.01, 1.0);
        clamp_logged("dragSensitivity", &mut self.drag_sensitivity, 0.0, 10.0);
        for step in self.max_drag_step.iter_mut() {
            clamp_logged("maxDragStep", step, 0.0, 1.0);
        }
        clamp_logged("maxDistance", &mut self.max_distance, 0.1, 1000.0);
        clamp_logged("hoverMarginPx", &mut self.hover_margin_px, 0.0, 1000.0);
        clamp_logged("rotateStepDegrees", &mut self.rotate_step_degrees, 0.0, 45.0);
        clamp_logged("minScale", &mut self.min_scale, 0.001, 100.0);
    }
}
