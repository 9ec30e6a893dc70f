//! Host integration points.
//!
//! A cooperating host calls [`FrameSubmitHooks::before_frame_submit`] right
//! before it submits a frame, letting registered callbacks append their quad
//! layers, and runs its controller input through
//! [`FrameSubmitHooks::filter_controller_input`] before the application sees
//! it.

use crate::runtime::{ControllerInput, ControllerState, DisplayTime, QuadLayer};

pub type FrameSubmitCallback = Box<dyn FnMut(DisplayTime, &mut Vec<QuadLayer>)>;
pub type InputFilterCallback = Box<dyn FnMut(&mut ControllerInput)>;

#[derive(Default)]
pub struct FrameSubmitHooks {
    frame_callbacks: Vec<FrameSubmitCallback>,
    input_callbacks: Vec<InputFilterCallback>,
}

impl FrameSubmitHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `callback` before every frame submission. Callbacks run in
    /// registration order, so later layers draw on top.
    pub fn on_before_frame_submit<F>(&mut self, callback: F)
    where
        F: FnMut(DisplayTime, &mut Vec<QuadLayer>) + 'static,
    {
        self.frame_callbacks.push(Box::new(callback));
    }

    /// Run `callback` on every controller input snapshot.
    pub fn on_controller_input<F>(&mut self, callback: F)
    where
        F: FnMut(&mut ControllerInput) + 'static,
    {
        self.input_callbacks.push(Box::new(callback));
    }

    /// Called by the host with the layers it is about to submit.
    pub fn before_frame_submit(&mut self, time: DisplayTime, layers: &mut Vec<QuadLayer>) {
        for callback in &mut self.frame_callbacks {
            callback(time, layers);
        }
    }

    /// Called by the host before handing input to the application.
    pub fn filter_controller_input(&mut self, input: &mut ControllerInput) {
        for callback in &mut self.input_callbacks {
            callback(input);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frame_callbacks.is_empty() && self.input_callbacks.is_empty()
    }
}

/// Clear every button and axis, keeping the sample time.
pub fn mask_controller_input(input: &mut ControllerInput) {
    input.hands = [ControllerState::default(); 2];
}
