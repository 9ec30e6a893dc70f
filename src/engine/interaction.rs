//! Controller interaction with overlay windows.
//!
//! Once per frame the aim rays of both controllers are cast against the
//! windows front to back. The first window hit becomes the hovered window and
//! receives the frame's interaction:
//!
//! - hand trigger on one hand + index trigger: drag
//! - hand trigger on one hand alone: rotate with the thumbstick
//! - hand trigger on one hand + thumbstick click: face the viewer
//! - hand triggers on both hands: resize
//! - thumbstick click alone: toggle minimized
//! - index trigger over the content: focus the desktop window and click
//!
//! Frozen windows skip everything but clicks.

use glam::{Vec2, Vec3};

use super::window::Window;
use crate::config::InteractionConfig;
use crate::geometry::{
    align_to_gravity, facing_camera, quad_corners, ray_intersect_quad, rotate_yaw_pitch,
    world_point_to_uv, Pose, QuadHit, Ray,
};
use crate::input::DesktopInput;
use crate::runtime::{ControllerInput, Hand, TrackingState};

/// Where the pointer cursor is drawn this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cursor {
    /// Slot of the hovered window.
    pub slot: usize,
    /// Hit point, oriented like the hovered window. In view space when the
    /// window is head-locked.
    pub pose: Pose,
    pub head_locked: bool,
}

/// One frame of controller state plus the button edges derived from it.
struct FrameInput<'a> {
    tracking: &'a TrackingState,
    input: &'a ControllerInput,
    trigger: [bool; 2],
    thumbstick: [bool; 2],
    trigger_edge: [bool; 2],
    thumbstick_edge: [bool; 2],
}

pub(crate) struct Interaction {
    config: InteractionConfig,
    last_hand: Hand,
    last_head: Pose,
    last_controllers: [Pose; 2],
    last_cursor_position: Vec3,
    cursor: Option<Cursor>,
    trigger_pressed: [bool; 2],
    thumbstick_pressed: [bool; 2],
}

impl Interaction {
    pub fn new(config: InteractionConfig) -> Self {
        Self {
            last_hand: config.preferred_hand,
            config,
            last_head: Pose::IDENTITY,
            last_controllers: [Pose::IDENTITY; 2],
            last_cursor_position: Vec3::ZERO,
            cursor: None,
            trigger_pressed: [false; 2],
            thumbstick_pressed: [false; 2],
        }
    }

    /// Forget everything learned from previous frames.
    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }

    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    /// Run one frame of interaction over `windows`, visited in reverse
    /// `sorted` order (nearest first).
    pub fn update<T>(
        &mut self,
        windows: &mut [Option<Window<T>>],
        sorted: &[usize],
        tracking: &TrackingState,
        input: &ControllerInput,
        desktop: &mut dyn DesktopInput,
    ) {
        let threshold = self.config.click_threshold;
        let trigger = Hand::ALL.map(|hand| input.hand(hand).trigger > threshold);
        let thumbstick = Hand::ALL.map(|hand| input.hand(hand).thumbstick_click);
        let frame = FrameInput {
            tracking,
            input,
            trigger,
            thumbstick,
            trigger_edge: [0usize, 1].map(|i| trigger[i] && !self.trigger_pressed[i]),
            thumbstick_edge: [0usize, 1].map(|i| thumbstick[i] && !self.thumbstick_pressed[i]),
        };

        self.last_cursor_position = self
            .cursor
            .map(|cursor| cursor.pose.position)
            .unwrap_or(Vec3::ZERO);
        self.cursor = None;

        let view_from_world = tracking.head.inverse();
        let mut hovered = None;

        'windows: for &slot in sorted.iter().rev() {
            let Some(window) = windows.get_mut(slot).and_then(Option::as_mut) else {
                continue;
            };
            let Some(corners) = self.hover_corners(window) else {
                continue;
            };

            for hand in [self.last_hand, self.last_hand.other()] {
                let aim = tracking.hand(hand);
                if !aim.valid {
                    continue;
                }
                let aim_pose = if window.placement.is_head_locked() {
                    view_from_world * aim.aim
                } else {
                    aim.aim
                };
                let Some(hit) = ray_intersect_quad(&Ray::from_pose(&aim_pose), &corners) else {
                    continue;
                };

                self.handle_window(window, hand, &hit, &frame, desktop);

                self.cursor = Some(Cursor {
                    slot,
                    pose: Pose::new(window.quad.pose.orientation, hit.pose.position),
                    head_locked: window.placement.is_head_locked(),
                });
                self.last_hand = hand;
                hovered = Some(slot);
                break 'windows;
            }
        }

        for window in windows.iter_mut().flatten() {
            if Some(window.slot) != hovered {
                window.has_focus = false;
                window.is_dragging = false;
                window.is_resizing = false;
            }
        }

        for hand in Hand::ALL {
            let pose = tracking.hand(hand);
            if pose.valid {
                self.last_controllers[hand.index()] = pose.aim;
            }
        }
        self.last_head = tracking.head;
        self.trigger_pressed = frame.trigger;
        self.thumbstick_pressed = frame.thumbstick;
    }

    /// The window's quad grown by the hover margin on every side.
    fn hover_corners<T>(&self, window: &Window<T>) -> Option<[Vec3; 4]> {
        let pixels = window.pixel_size();
        let size = window.quad.size;
        if pixels.min_element() <= 0.0
            || size.min_element() <= 0.0
            || !window.quad.pose.is_finite()
        {
            return None;
        }

        let pixels_per_meter = pixels / size;
        let expanded = (pixels + Vec2::splat(2.0 * self.config.hover_margin_px)) / pixels_per_meter;
        Some(quad_corners(&window.quad.pose, expanded))
    }

    fn handle_window<T>(
        &mut self,
        window: &mut Window<T>,
        hand: Hand,
        hit: &QuadHit,
        frame: &FrameInput<'_>,
        desktop: &mut dyn DesktopInput,
    ) {
        let was_dragging = std::mem::take(&mut window.is_dragging);
        let was_resizing = std::mem::take(&mut window.is_resizing);
        let threshold = self.config.click_threshold;
        let buttons = frame.input.hand(hand);
        let thumbstick_edge = frame.thumbstick_edge[hand.index()];

        if !window.is_frozen {
            if !window.is_minimized && buttons.squeeze > threshold {
                if frame.input.hand(hand.other()).squeeze <= threshold {
                    if thumbstick_edge {
                        face_viewer(window, &frame.tracking.head);
                    } else if buttons.trigger > threshold {
                        if was_dragging {
                            self.drag(window, hand, hit, frame.tracking);
                        }
                        window.is_dragging = true;
                    } else {
                        let step = self.config.rotate_step_degrees.to_radians();
                        window.quad.pose.orientation = rotate_yaw_pitch(
                            window.quad.pose.orientation,
                            buttons.thumbstick.x * step,
                            -buttons.thumbstick.y * step,
                        );
                    }
                    window.quad.pose.orientation = align_to_gravity(window.quad.pose.orientation);
                } else {
                    if was_resizing {
                        self.resize(window, frame.tracking);
                    }
                    window.is_resizing = true;
                }
                return;
            }

            if thumbstick_edge {
                window.is_minimized = !window.is_minimized;
                log::debug!(
                    "[INTERACT] Slot {} {}",
                    window.slot,
                    if window.is_minimized { "minimized" } else { "restored" }
                );
                if !window.is_minimized {
                    face_viewer(window, &frame.tracking.head);
                    window.quad.pose.orientation = align_to_gravity(window.quad.pose.orientation);
                }
                return;
            }
        }

        if window.is_minimized || !window.is_interactable {
            return;
        }

        let size = window.pixel_size();
        let pixel = world_point_to_uv(hit.pose.position, &window.quad.pose, window.quad.size) * size;
        // The hover margin shows the cursor but never reaches the desktop.
        if !(pixel.x > 0.0 && pixel.x < size.x && pixel.y > 0.0 && pixel.y < size.y) {
            return;
        }
        let (x, y) = (pixel.x as i32, pixel.y as i32);

        if window.has_focus {
            desktop.move_cursor(window.target, x, y);
        }

        if frame.trigger_edge[hand.index()] {
            desktop.focus(window.target);
            if !window.has_focus {
                desktop.move_cursor(window.target, x, y);
            }
            window.has_focus = true;
            desktop.click();
            log::debug!(
                "[INTERACT] Click on slot {} at ({}, {})",
                window.slot,
                x,
                y
            );
        }
    }

    /// Follow the cursor across the quad and push or pull the window as the
    /// hand moves away from or toward the head.
    fn drag<T>(&self, window: &mut Window<T>, hand: Hand, hit: &QuadHit, tracking: &TrackingState) {
        let last_distance =
            (self.last_head.position - self.last_controllers[hand.index()].position).length();
        let distance = (tracking.head.position - tracking.hand(hand).aim.position).length();

        let mut delta = hit.pose.position - self.last_cursor_position;
        delta += window.quad.pose.orientation
            * Vec3::new(
                0.0,
                0.0,
                (last_distance - distance) * self.config.drag_sensitivity,
            );

        let max_step = Vec3::from_array(self.config.max_drag_step);
        let delta = delta.clamp(-max_step, max_step);

        let position = window.quad.pose.position + delta;
        if (position - window.head_position(&tracking.head)).length() < self.config.max_distance {
            window.quad.pose.position = position;
        }
    }

    /// Grow or shrink by the change in distance between the two hands.
    fn resize<T>(&self, window: &mut Window<T>, tracking: &TrackingState) {
        let [left, right] = tracking.hands;
        if !left.valid || !right.valid {
            return;
        }
        let last = (self.last_controllers[0].position - self.last_controllers[1].position).length();
        let current = (left.aim.position - right.aim.position).length();
        window.scale = (window.scale + current - last).max(self.config.min_scale);
    }
}

fn face_viewer<T>(window: &mut Window<T>, head: &Pose) {
    window.quad.pose.orientation = facing_camera(
        window.quad.pose.position,
        window.head_position(head),
        window.quad.pose.orientation,
    );
}
