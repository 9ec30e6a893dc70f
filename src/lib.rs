//! WindowDeck: desktop windows and monitors as quads in a VR scene.
//!
//! The engine runs inside a host VR application. Each frame it reads which
//! windows the configuration tool placed in the shared overlay state, captures
//! them, composites them into runtime swapchains and hands the host a list of
//! quad layers to submit. Controllers can point at, click, drag, rotate,
//! resize and minimize the windows.
//!
//! A host wires it up like this:
//!
//! 1. [`init_logging`] once at load
//! 2. [`OverlayEngine::open`] with an [`EngineConfig`]
//! 3. [`OverlayEngine::initialize`] when its VR session starts
//! 4. [`OverlayEngine::update`] every frame, or register
//!    [`OverlayEngine::submit_callback`] and [`OverlayEngine::input_callback`]
//!    with [`FrameSubmitHooks`]
//! 5. [`OverlayEngine::shutdown`] when the session ends

pub mod capture;
pub mod config;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod gpu;
pub mod hooks;
pub mod input;
pub mod logging;
pub mod runtime;
pub mod shared_state;

pub use config::{CompositionConfig, EngineConfig, InteractionConfig};
pub use engine::{Cursor, EngineSession, OverlayEngine, QuadGeometry, WindowState};
pub use error::{OverlayError, OverlayResult};
pub use geometry::Pose;
pub use hooks::FrameSubmitHooks;
pub use logging::{init_logging, LogTarget};
pub use runtime::{ControllerInput, DisplayTime, QuadLayer, TrackingState, VrRuntime};
pub use shared_state::{OverlayRecord, Placement, SharedOverlayState, SLOT_COUNT};
pub use windowdeck_targets::CaptureTarget;
