//! Frame-level scenarios run against the software device, a scripted runtime
//! and scripted captures.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use bytemuck::Zeroable;
use glam::{EulerRot, Quat, Vec2, Vec3};
use windowdeck_targets::CaptureTarget;

use super::*;
use crate::capture::CaptureSession;
use crate::gpu::software::{SoftwareDevice, SoftwareTexture};
use crate::gpu::ShareableTexture;
use crate::hooks::FrameSubmitHooks;
use crate::runtime::{ControllerState, Hand, HandPose, TrackingState};
use crate::shared_state::{OverlayRecord, Placement};

const EPS: f32 = 1e-4;

// ============================================================================
// Scripted runtime
// ============================================================================

struct FakeSwapchain {
    desc: SwapchainDesc,
    images: Vec<SoftwareTexture>,
    next: usize,
    acquired: Option<usize>,
}

#[derive(Default)]
struct RuntimeState {
    tracking: TrackingState,
    input: ControllerInput,
    next_id: u64,
    swapchains: HashMap<SwapchainId, FakeSwapchain>,
    created: Vec<SwapchainDesc>,
    destroyed: Vec<SwapchainId>,
    released: Vec<SwapchainId>,
    fail_create: bool,
}

impl RuntimeState {
    fn last_acquired(&self, id: SwapchainId) -> SoftwareTexture {
        let swapchain = &self.swapchains[&id];
        swapchain.images[swapchain.acquired.unwrap()].clone()
    }
}

struct ScriptedRuntime {
    device: SoftwareDevice,
    state: Rc<RefCell<RuntimeState>>,
}

impl VrRuntime for ScriptedRuntime {
    fn locate(&mut self, _time: DisplayTime) -> OverlayResult<TrackingState> {
        Ok(self.state.borrow().tracking)
    }

    fn input(&mut self, time: DisplayTime) -> OverlayResult<ControllerInput> {
        let mut input = self.state.borrow().input;
        input.time = time;
        Ok(input)
    }

    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> OverlayResult<SwapchainId> {
        let mut state = self.state.borrow_mut();
        if state.fail_create {
            return Err(OverlayError::Runtime("CreateSwapchain failed".to_string()));
        }
        state.next_id += 1;
        let id = SwapchainId(state.next_id);
        let count = if desc.static_image { 1 } else { 3 };
        let images = (0..count)
            .map(|_| self.device.create_texture(desc.extent, desc.format))
            .collect();
        state.created.push(*desc);
        state.swapchains.insert(
            id,
            FakeSwapchain {
                desc: *desc,
                images,
                next: 0,
                acquired: None,
            },
        );
        Ok(id)
    }

    fn destroy_swapchain(&mut self, swapchain: SwapchainId) {
        let mut state = self.state.borrow_mut();
        if let Some(removed) = state.swapchains.remove(&swapchain) {
            for image in removed.images {
                self.device.release_texture(image.handle());
            }
        }
        state.destroyed.push(swapchain);
    }

    fn swapchain_images(
        &mut self,
        swapchain: SwapchainId,
    ) -> OverlayResult<Vec<Box<dyn ShareableTexture>>> {
        let state = self.state.borrow();
        let swapchain = state
            .swapchains
            .get(&swapchain)
            .ok_or_else(|| OverlayError::Runtime("unknown swapchain".to_string()))?;
        Ok(swapchain
            .images
            .iter()
            .map(|image| Box::new(image.clone()) as Box<dyn ShareableTexture>)
            .collect())
    }

    fn acquire_image(&mut self, swapchain: SwapchainId) -> OverlayResult<usize> {
        let mut state = self.state.borrow_mut();
        let swapchain = state
            .swapchains
            .get_mut(&swapchain)
            .ok_or_else(|| OverlayError::Runtime("unknown swapchain".to_string()))?;
        let index = swapchain.next;
        swapchain.next = (index + 1) % swapchain.images.len();
        swapchain.acquired = Some(index);
        Ok(index)
    }

    fn release_image(&mut self, swapchain: SwapchainId) -> OverlayResult<()> {
        self.state.borrow_mut().released.push(swapchain);
        Ok(())
    }
}

// ============================================================================
// Scripted capture
// ============================================================================

#[derive(Default)]
struct CaptureState {
    frames: HashMap<u64, SoftwareTexture>,
    failing: HashSet<u64>,
    /// Handles whose running sessions fail to deliver frames.
    broken: HashSet<u64>,
    /// Handles whose window no longer exists.
    gone: HashSet<u64>,
    opened: Vec<CaptureTarget>,
    live: usize,
}

struct ScriptedProvider {
    state: Rc<RefCell<CaptureState>>,
}

impl CaptureProvider<SoftwareDevice> for ScriptedProvider {
    fn open(
        &mut self,
        _device: &SoftwareDevice,
        target: CaptureTarget,
    ) -> OverlayResult<Box<dyn CaptureSession<SoftwareTexture>>> {
        let mut state = self.state.borrow_mut();
        if state.failing.contains(&target.raw()) {
            return Err(OverlayError::Capture(format!("{} is gone", target)));
        }
        state.opened.push(target);
        state.live += 1;
        Ok(Box::new(ScriptedSession {
            handle: target.raw(),
            state: self.state.clone(),
        }))
    }
}

struct ScriptedSession {
    handle: u64,
    state: Rc<RefCell<CaptureState>>,
}

impl CaptureSession<SoftwareTexture> for ScriptedSession {
    fn latest_surface(&mut self) -> OverlayResult<Option<SoftwareTexture>> {
        let state = self.state.borrow();
        if state.broken.contains(&self.handle) {
            return Err(OverlayError::Capture("TryGetNextFrame failed".to_string()));
        }
        Ok(state.frames.get(&self.handle).cloned())
    }

    fn is_alive(&self) -> bool {
        !self.state.borrow().gone.contains(&self.handle)
    }

    fn size(&self) -> Extent {
        self.state
            .borrow()
            .frames
            .get(&self.handle)
            .map(|frame| frame.desc().extent)
            .unwrap_or_default()
    }
}

impl Drop for ScriptedSession {
    fn drop(&mut self) {
        self.state.borrow_mut().live -= 1;
    }
}

// ============================================================================
// Recording desktop input
// ============================================================================

#[derive(Default)]
struct InputLog {
    moves: Vec<(CaptureTarget, i32, i32)>,
    focused: Vec<CaptureTarget>,
    clicks: usize,
}

struct RecordingInput(Rc<RefCell<InputLog>>);

impl DesktopInput for RecordingInput {
    fn move_cursor(&mut self, target: CaptureTarget, x: i32, y: i32) {
        self.0.borrow_mut().moves.push((target, x, y));
    }

    fn focus(&mut self, target: CaptureTarget) {
        self.0.borrow_mut().focused.push(target);
    }

    fn click(&mut self) {
        self.0.borrow_mut().clicks += 1;
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    device: SoftwareDevice,
    shared: SharedOverlayState,
    runtime: Rc<RefCell<RuntimeState>>,
    capture: Rc<RefCell<CaptureState>>,
    input: Rc<RefCell<InputLog>>,
    engine: OverlayEngine<SoftwareDevice>,
    time: DisplayTime,
}

impl Harness {
    fn new() -> Self {
        let shared = SharedOverlayState::in_process();
        let mut engine = OverlayEngine::with_shared_state(EngineConfig::default(), shared.clone());
        let device = SoftwareDevice::new();
        let runtime = Rc::new(RefCell::new(RuntimeState::default()));
        let capture = Rc::new(RefCell::new(CaptureState::default()));
        let input = Rc::new(RefCell::new(InputLog::default()));

        engine
            .initialize(session(&device, &runtime, &capture, &input))
            .unwrap();

        Self {
            device,
            shared,
            runtime,
            capture,
            input,
            engine,
            time: 0,
        }
    }

    /// Show a desktop window of `extent` pixels in `slot`, as the
    /// configuration tool would.
    fn place(&self, slot: usize, handle: u64, extent: Extent, pose: Pose) -> OverlayRecord {
        let target = CaptureTarget::from_raw(handle, false).unwrap();
        let mut record = OverlayRecord::new(target);
        record.set_pose(pose);
        self.set_frame(handle, extent, [0.2, 0.4, 0.6, 1.0]);
        self.shared.write(slot, &record).unwrap();
        record
    }

    fn set_frame(&self, handle: u64, extent: Extent, color: [f32; 4]) {
        self.set_frame_as(handle, extent, TextureFormat::Rgba8Unorm, color);
    }

    fn set_frame_as(&self, handle: u64, extent: Extent, format: TextureFormat, color: [f32; 4]) {
        let frame = self.device.create_texture(extent, format);
        frame.fill_pixels(color);
        self.capture.borrow_mut().frames.insert(handle, frame);
    }

    fn clear(&self, slot: usize) {
        self.shared.write(slot, &OverlayRecord::zeroed()).unwrap();
    }

    fn point_right_hand(&self, from: Vec3) {
        self.runtime.borrow_mut().tracking.hands[Hand::Right.index()] = HandPose {
            aim: Pose::from_translation(from),
            valid: true,
        };
    }

    fn press(&self, state: ControllerState) {
        self.runtime.borrow_mut().input.hands[Hand::Right.index()] = state;
    }

    fn update(&mut self) -> Vec<QuadLayer> {
        self.time += 11_111_111;
        self.engine.update(self.time).unwrap().to_vec()
    }

    fn live_swapchains(&self) -> usize {
        self.runtime.borrow().swapchains.len()
    }

    fn cursor_swapchain(&self) -> SwapchainId {
        self.runtime
            .borrow()
            .swapchains
            .iter()
            .find(|(_, s)| s.desc.static_image)
            .map(|(id, _)| *id)
            .unwrap()
    }
}

fn session(
    device: &SoftwareDevice,
    runtime: &Rc<RefCell<RuntimeState>>,
    capture: &Rc<RefCell<CaptureState>>,
    input: &Rc<RefCell<InputLog>>,
) -> EngineSession<SoftwareDevice> {
    EngineSession {
        device: device.clone(),
        runtime: Box::new(ScriptedRuntime {
            device: device.clone(),
            state: runtime.clone(),
        }),
        capture: Box::new(ScriptedProvider {
            state: capture.clone(),
        }),
        input: Box::new(RecordingInput(input.clone())),
    }
}

fn at(x: f32, y: f32, z: f32) -> Pose {
    Pose::from_translation(Vec3::new(x, y, z))
}


// ============================================================================
// Engine setup
// ============================================================================

#[test]
fn test_missing_shared_state_disables_engine() {
    let config = EngineConfig {
        shared_state_name: "WindowDeck.Tests.DoesNotExist".to_string(),
        ..Default::default()
    };
    let mut engine = OverlayEngine::<SoftwareDevice>::open(config);
    assert!(!engine.is_enabled());

    let device = SoftwareDevice::new();
    let runtime = Rc::new(RefCell::new(RuntimeState::default()));
    let capture = Rc::new(RefCell::new(CaptureState::default()));
    let input = Rc::new(RefCell::new(InputLog::default()));
    engine
        .initialize(session(&device, &runtime, &capture, &input))
        .unwrap();

    assert!(engine.update(1).unwrap().is_empty());
    assert!(!engine.has_focus());
    assert!(runtime.borrow().created.is_empty());
}

#[test]
fn test_update_requires_session() {
    let mut engine = OverlayEngine::<SoftwareDevice>::with_shared_state(
        EngineConfig::default(),
        SharedOverlayState::in_process(),
    );
    assert!(matches!(
        engine.update(1),
        Err(OverlayError::NotInitialized)
    ));
}

#[test]
fn test_initialize_paints_cursor() {
    let harness = Harness::new();

    let runtime = harness.runtime.borrow();
    assert_eq!(runtime.created.len(), 1);
    let desc = runtime.created[0];
    assert!(desc.static_image);
    assert_eq!(desc.extent, Extent::new(32, 32));

    let id = runtime.released[0];
    let image = runtime.last_acquired(id);
    assert!(image.pixels().iter().all(|p| *p == [1.0; 4]));
    assert_eq!(harness.device.stats().signaled, vec![1]);
}

// ============================================================================
// Slot lifecycle
// ============================================================================

#[test]
fn test_empty_slots_allocate_nothing() {
    let mut harness = Harness::new();

    let layers = harness.update();

    assert!(layers.is_empty());
    assert_eq!(harness.capture.borrow().live, 0);
    // Only the cursor.
    assert_eq!(harness.live_swapchains(), 1);
    for slot in 0..SLOT_COUNT {
        assert!(harness.engine.window(slot).is_none());
    }
}

#[test]
fn test_open_and_close_window() {
    let mut harness = Harness::new();
    harness.place(1, 0x100, Extent::new(200, 100), at(0.0, 0.0, -2.0));

    let layers = harness.update();
    assert_eq!(layers.len(), 1);
    assert_eq!(harness.capture.borrow().live, 1);
    assert_eq!(harness.live_swapchains(), 2);

    let layer = layers[0];
    assert_eq!(layer.viewport, Region::full(Extent::new(200, 100)));
    assert_eq!(layer.size, Vec2::new(1.0, 0.5));
    assert!(!layer.head_locked);

    let created = *harness.runtime.borrow().created.last().unwrap();
    assert_eq!(created.extent, Extent::new(200, 100));
    assert!(created.unordered_access);

    harness.clear(1);
    let layers = harness.update();
    assert!(layers.is_empty());
    assert_eq!(harness.capture.borrow().live, 0);
    assert_eq!(harness.live_swapchains(), 1);
    assert!(harness.runtime.borrow().destroyed.contains(&layer.swapchain));
    assert!(harness.engine.window(1).is_none());
}

#[test]
fn test_no_layer_before_first_frame() {
    let mut harness = Harness::new();
    harness.place(0, 0x100, Extent::new(64, 64), at(0.0, 0.0, -2.0));
    harness.capture.borrow_mut().frames.clear();

    assert!(harness.update().is_empty());
    assert!(harness.engine.window(0).is_some());
    assert_eq!(harness.engine.window(0).unwrap().swapchain_extent, None);

    harness.set_frame(0x100, Extent::new(64, 64), [1.0; 4]);
    assert_eq!(harness.update().len(), 1);
}

#[test]
fn test_handle_change_reopens_slot() {
    let mut harness = Harness::new();
    harness.place(0, 0x100, Extent::new(64, 64), at(0.0, 0.0, -2.0));
    harness.update();

    harness.place(0, 0x200, Extent::new(32, 32), at(0.0, 0.0, -2.0));
    harness.update();

    let window = harness.engine.window(0).unwrap();
    assert_eq!(window.target.raw(), 0x200);
    assert_eq!(harness.capture.borrow().live, 1);
    assert_eq!(window.swapchain_extent, Some(Extent::new(32, 32)));
}

#[test]
fn test_swapchain_follows_capture_size() {
    let mut harness = Harness::new();
    harness.place(0, 0x100, Extent::new(64, 64), at(0.0, 0.0, -2.0));
    let first = harness.update()[0].swapchain;

    harness.set_frame(0x100, Extent::new(128, 32), [1.0; 4]);
    let layers = harness.update();

    assert_ne!(layers[0].swapchain, first);
    assert!(harness.runtime.borrow().destroyed.contains(&first));
    assert_eq!(layers[0].viewport.extent, Extent::new(128, 32));
    assert_eq!(harness.live_swapchains(), 2);
}

#[test]
fn test_swapchain_follows_capture_format() {
    let mut harness = Harness::new();
    harness.place(0, 0x100, Extent::new(64, 64), at(0.0, 0.0, -2.0));
    let first = harness.update()[0].swapchain;

    harness.set_frame_as(0x100, Extent::new(64, 64), TextureFormat::Bgra8Unorm, [1.0; 4]);
    let layers = harness.update();

    assert_ne!(layers[0].swapchain, first);
    assert!(harness.runtime.borrow().destroyed.contains(&first));
    let created = *harness.runtime.borrow().created.last().unwrap();
    assert_eq!(created.format, TextureFormat::Bgra8Unorm);
    assert_eq!(created.extent, Extent::new(64, 64));

    // Same size and format again: kept.
    harness.set_frame_as(0x100, Extent::new(64, 64), TextureFormat::Bgra8Unorm, [0.5; 4]);
    assert_eq!(harness.update()[0].swapchain, layers[0].swapchain);
}

#[test]
fn test_capture_failure_closes_only_that_slot() {
    let mut harness = Harness::new();
    harness.capture.borrow_mut().failing.insert(0x200);
    harness.place(0, 0x100, Extent::new(64, 64), at(0.0, 0.0, -2.0));
    harness.place(1, 0x200, Extent::new(64, 64), at(0.0, 0.0, -3.0));

    let layers = harness.update();
    assert_eq!(layers.len(), 1);
    assert!(harness.engine.window(1).is_none());

    // Retried while the slot stays filled.
    harness.capture.borrow_mut().failing.clear();
    assert_eq!(harness.update().len(), 2);
}

#[test]
fn test_capture_lost_mid_session_releases_slot() {
    let mut harness = Harness::new();
    harness.place(0, 0x100, Extent::new(64, 64), at(0.0, 0.0, -2.0));
    harness.place(1, 0x200, Extent::new(64, 64), at(0.0, 0.0, -3.0));
    let layers = harness.update();
    // Back to front: slot 1 then slot 0.
    let (far, near) = (layers[0].swapchain, layers[1].swapchain);

    harness.capture.borrow_mut().broken.insert(0x100);
    let layers = harness.update();

    assert_eq!(layers.len(), 1);
    assert_eq!(layers[0].swapchain, far);
    assert!(harness.engine.window(0).is_none());
    assert!(harness.runtime.borrow().destroyed.contains(&near));
    assert_eq!(harness.capture.borrow().live, 1);
    assert_eq!(harness.live_swapchains(), 2);
    let released = harness.runtime.borrow().released.clone();
    assert_eq!(released.iter().filter(|id| **id == far).count(), 2);
    // The tool still lists the window.
    assert_eq!(harness.shared.read(0).unwrap().handle, 0x100);

    // Reopened on a fresh swapchain once frames flow again.
    harness.capture.borrow_mut().broken.clear();
    let layers = harness.update();
    assert_eq!(layers.len(), 2);
    assert!(layers.iter().all(|layer| layer.swapchain != near));
    assert_eq!(harness.live_swapchains(), 3);

    // Emptying the slot with a live swapchain destroys it.
    let reopened = layers[1].swapchain;
    harness.clear(0);
    assert_eq!(harness.update().len(), 1);
    assert!(harness.runtime.borrow().destroyed.contains(&reopened));
    assert_eq!(harness.live_swapchains(), 2);
}

#[test]
fn test_destroyed_target_closes_slot() {
    let mut harness = Harness::new();
    harness.place(0, 0x100, Extent::new(64, 64), at(0.0, 0.0, -2.0));
    harness.place(1, 0x200, Extent::new(64, 64), at(0.0, 0.0, -3.0));
    let near = harness.update()[1].swapchain;

    {
        let mut capture = harness.capture.borrow_mut();
        capture.gone.insert(0x100);
        // The OS refuses new sessions for a destroyed window.
        capture.failing.insert(0x100);
    }
    let layers = harness.update();

    assert_eq!(layers.len(), 1);
    assert!(harness.engine.window(0).is_none());
    assert!(harness.engine.window(1).is_some());
    assert!(harness.runtime.borrow().destroyed.contains(&near));
    assert_eq!(harness.capture.borrow().live, 1);

    assert_eq!(harness.update().len(), 1);
    let opened = harness.capture.borrow().opened.clone();
    assert_eq!(opened.iter().filter(|t| t.raw() == 0x100).count(), 1);
}

#[test]
fn test_runtime_failure_is_fatal_for_the_frame() {
    let mut harness = Harness::new();
    harness.place(0, 0x100, Extent::new(64, 64), at(0.0, 0.0, -2.0));
    harness.runtime.borrow_mut().fail_create = true;

    let err = harness.engine.update(1).unwrap_err();
    assert!(err.is_fatal());
    assert!(harness.engine.layers().is_empty());

    harness.runtime.borrow_mut().fail_create = false;
    assert_eq!(harness.update().len(), 1);
}

#[test]
fn test_nan_pose_spawns_in_front_of_head() {
    let mut harness = Harness::new();
    let head = Pose::new(
        Quat::from_euler(EulerRot::YXZ, 0.5, 0.0, 0.2),
        Vec3::new(0.0, 1.6, 0.0),
    );
    harness.runtime.borrow_mut().tracking.head = head;
    let target = CaptureTarget::from_raw(0x100, false).unwrap();
    harness.set_frame(0x100, Extent::new(64, 64), [1.0; 4]);
    harness.shared.write(0, &OverlayRecord::new(target)).unwrap();

    harness.update();

    let pose = harness.engine.window(0).unwrap().quad.pose;
    assert!(pose.is_finite());
    let expected = head * at(0.0, 0.0, -1.0);
    assert!(pose.position.abs_diff_eq(expected.position, EPS));
    let (_, _, roll) = pose.orientation.to_euler(EulerRot::YXZ);
    assert!(roll.abs() < EPS);

    // Written back for the tool.
    assert!(harness.shared.read(0).unwrap().pose().is_finite());
}

#[test]
fn test_head_locked_spawn_and_layer() {
    let mut harness = Harness::new();
    harness.runtime.borrow_mut().tracking.head = at(4.0, 1.0, 0.0);
    let target = CaptureTarget::from_raw(0x100, false).unwrap();
    let mut record = OverlayRecord::new(target);
    record.placement = Placement::HeadLocked.raw();
    harness.set_frame(0x100, Extent::new(64, 64), [1.0; 4]);
    harness.shared.write(0, &record).unwrap();

    let layers = harness.update();

    assert!(layers[0].head_locked);
    assert_eq!(layers[0].pose, at(0.0, 0.0, -1.0));
}

// ============================================================================
// Shared state sync
// ============================================================================

#[test]
fn test_engine_values_round_trip_through_shared_state() {
    let mut harness = Harness::new();
    let pose = Pose::new(Quat::from_rotation_y(0.3), Vec3::new(0.5, 1.0, -2.0));
    let mut record = harness.place(0, 0x100, Extent::new(64, 64), pose);
    record.scale = 0.75;
    harness.shared.write(0, &record).unwrap();

    harness.update();

    let window = harness.engine.window(0).unwrap();
    let stored = harness.shared.read(0).unwrap();
    assert_eq!(stored.pose(), window.quad.pose);
    assert_eq!(stored.scale, window.scale);
    assert_eq!(stored.scale, 0.75);
    assert_eq!(stored.minimized(), window.is_minimized);
}

#[test]
fn test_tool_settings_apply_after_sync() {
    let mut harness = Harness::new();
    harness.place(0, 0x100, Extent::new(64, 64), at(0.0, 0.0, -2.0));
    harness.update();

    harness
        .shared
        .modify(0, |record| {
            record.opacity_percent = 30;
            record.is_frozen = 1;
            record.placement = Placement::HeadLocked.raw();
        })
        .unwrap();
    harness.update();

    let window = harness.engine.window(0).unwrap();
    assert_eq!(window.opacity, 0.3);
    assert!(window.is_frozen);
    assert_eq!(window.placement, Placement::HeadLocked);
}

#[test]
fn test_close_then_open_is_idempotent() {
    let mut harness = Harness::new();
    let pose = Pose::new(Quat::from_rotation_y(-0.2), Vec3::new(0.3, 1.2, -1.5));
    let mut record = harness.place(2, 0x100, Extent::new(80, 40), pose);
    record.scale = 1.5;
    record.opacity_percent = 60;
    harness.shared.write(2, &record).unwrap();
    harness.update();
    let first = harness.engine.window(2).unwrap();

    harness.clear(2);
    harness.update();
    harness.shared.write(2, &record).unwrap();
    harness.update();
    let second = harness.engine.window(2).unwrap();

    assert_eq!(first, second);
}

// ============================================================================
// Draw order
// ============================================================================

#[test]
fn test_windows_sorted_back_to_front() {
    let mut harness = Harness::new();
    harness.place(0, 0x100, Extent::new(64, 64), at(0.0, 0.0, -1.0));
    harness.place(1, 0x200, Extent::new(64, 64), at(0.0, 0.0, -5.0));
    harness.place(2, 0x300, Extent::new(64, 64), at(0.0, 0.0, -3.0));

    let layers = harness.update();

    assert_eq!(harness.engine.sorted_slots(), &[1, 2, 0]);
    let depths: Vec<f32> = layers.iter().map(|l| l.pose.position.z).collect();
    assert_eq!(depths, vec![-5.0, -3.0, -1.0]);
}

#[test]
fn test_equal_distances_keep_slot_order() {
    let mut harness = Harness::new();
    harness.place(3, 0x100, Extent::new(64, 64), at(2.0, 0.0, 0.0));
    harness.place(1, 0x200, Extent::new(64, 64), at(-2.0, 0.0, 0.0));

    harness.update();

    assert_eq!(harness.engine.sorted_slots(), &[1, 3]);
}

// ============================================================================
// Composition
// ============================================================================

#[test]
fn test_opaque_copies_and_translucent_blends() {
    let mut harness = Harness::new();
    harness.place(0, 0x100, Extent::new(40, 40), at(0.0, 0.0, -2.0));
    let mut record = harness.place(1, 0x200, Extent::new(40, 40), at(0.0, 0.0, -3.0));
    record.opacity_percent = 50;
    harness.shared.write(1, &record).unwrap();

    let layers = harness.update();

    let stats = harness.device.stats();
    assert_eq!(stats.copies, 1);
    assert_eq!(stats.dispatches, 1);
    assert_eq!(stats.last_groups, Some([2, 2]));

    // Layers are back to front: slot 1 first.
    let image = harness.runtime.borrow().last_acquired(layers[0].swapchain);
    assert!(image.pixels().iter().all(|p| p[3] == 0.5));
    let image = harness.runtime.borrow().last_acquired(layers[1].swapchain);
    assert!(image.pixels().iter().all(|p| *p == [0.2, 0.4, 0.6, 1.0]));
}

#[test]
fn test_fence_committed_before_images_released() {
    let mut harness = Harness::new();
    harness.place(0, 0x100, Extent::new(8, 8), at(0.0, 0.0, -2.0));

    let layers = harness.update();
    harness.update();

    let stats = harness.device.stats();
    // Cursor setup, then one per frame.
    assert_eq!(stats.signaled, vec![1, 2, 3]);
    assert_eq!(stats.submission_waits, vec![1, 2, 3]);
    let released = harness.runtime.borrow().released.clone();
    assert_eq!(
        released.iter().filter(|id| **id == layers[0].swapchain).count(),
        2
    );
}

// ============================================================================
// Interaction
// ============================================================================

#[test]
fn test_minimize_toggle_uses_icon_size() {
    let mut harness = Harness::new();
    let mut record = harness.place(0, 0x100, Extent::new(200, 100), at(0.0, 0.0, -1.0));
    record.scale = 2.0;
    harness.shared.write(0, &record).unwrap();
    harness.point_right_hand(Vec3::new(0.01, 0.02, 0.0));
    harness.update();

    let click = ControllerState {
        thumbstick_click: true,
        ..Default::default()
    };
    harness.press(click);
    harness.update();
    let window = harness.engine.window(0).unwrap();
    assert!(window.is_minimized);
    assert_eq!(window.quad.size, Vec2::splat(0.1));
    assert!(harness.shared.read(0).unwrap().minimized());

    // Held: no second toggle.
    harness.update();
    assert!(harness.engine.window(0).unwrap().is_minimized);

    harness.press(ControllerState::default());
    harness.update();
    harness.press(click);
    harness.update();
    let window = harness.engine.window(0).unwrap();
    assert!(!window.is_minimized);
    assert_eq!(window.quad.size, Vec2::new(2.0, 1.0));
}

#[test]
fn test_cursor_layer_follows_hover() {
    let mut harness = Harness::new();
    harness.place(0, 0x100, Extent::new(100, 100), at(0.0, 0.0, -2.0));
    harness.update();
    assert!(!harness.engine.has_focus());

    harness.point_right_hand(Vec3::new(0.1, 0.2, 0.0));
    let layers = harness.update();

    assert!(harness.engine.has_focus());
    assert_eq!(layers.len(), 2);
    let cursor = layers[1];
    assert_eq!(cursor.swapchain, harness.cursor_swapchain());
    assert_eq!(cursor.size, Vec2::splat(0.01));
    assert!(cursor
        .pose
        .position
        .abs_diff_eq(Vec3::new(0.105, 0.195, -2.0), EPS));

    harness.point_right_hand(Vec3::new(5.0, 0.0, 0.0));
    assert_eq!(harness.update().len(), 1);
    assert!(!harness.engine.has_focus());
}

#[test]
fn test_trigger_clicks_desktop_window() {
    let mut harness = Harness::new();
    harness.place(0, 0x100, Extent::new(100, 100), at(0.0, 0.0, -2.0));
    harness.point_right_hand(Vec3::new(0.25, -0.25, 0.0));
    harness.update();
    harness.update();

    harness.press(ControllerState {
        trigger: 1.0,
        ..Default::default()
    });
    harness.update();

    let log = harness.input.borrow();
    let target = CaptureTarget::from_raw(0x100, false).unwrap();
    assert_eq!(log.clicks, 1);
    assert_eq!(log.focused, vec![target]);
    assert_eq!(log.moves, vec![(target, 75, 75)]);
    drop(log);
    assert!(harness.engine.window(0).unwrap().has_focus);
}

#[test]
fn test_drag_moves_window_and_writes_back() {
    let mut harness = Harness::new();
    harness.place(0, 0x100, Extent::new(100, 100), at(0.0, 0.0, -2.0));
    harness.point_right_hand(Vec3::new(0.1, 0.2, 0.0));
    harness.update();

    harness.press(ControllerState {
        squeeze: 1.0,
        trigger: 1.0,
        ..Default::default()
    });
    harness.update();
    harness.point_right_hand(Vec3::new(0.11, 0.2, 0.0));
    harness.update();

    let position = harness.engine.window(0).unwrap().quad.pose.position;
    assert!(position.x > 0.0);
    assert_eq!(harness.shared.read(0).unwrap().pose().position, position);
}

#[test]
fn test_input_hook_masks_while_hovering() {
    let mut harness = Harness::new();
    harness.place(0, 0x100, Extent::new(100, 100), at(0.0, 0.0, -2.0));
    harness.update();

    let engine = Rc::new(RefCell::new(std::mem::replace(
        &mut harness.engine,
        OverlayEngine::with_shared_state(EngineConfig::default(), SharedOverlayState::in_process()),
    )));
    let mut hooks = FrameSubmitHooks::new();
    hooks.on_before_frame_submit(OverlayEngine::submit_callback(engine.clone()));
    hooks.on_controller_input(OverlayEngine::input_callback(engine.clone()));

    let mut input = ControllerInput::default();
    input.hands[1].trigger = 0.5;

    let mut layers = Vec::new();
    hooks.before_frame_submit(1, &mut layers);
    assert_eq!(layers.len(), 1);
    hooks.filter_controller_input(&mut input);
    assert_eq!(input.hands[1].trigger, 0.5);

    harness.point_right_hand(Vec3::new(0.1, 0.2, 0.0));
    let mut layers = Vec::new();
    hooks.before_frame_submit(2, &mut layers);
    assert_eq!(layers.len(), 2);
    hooks.filter_controller_input(&mut input);
    assert_eq!(input.hands[1].trigger, 0.0);
}

// ============================================================================
// Teardown
// ============================================================================

#[test]
fn test_shutdown_releases_everything() {
    let mut harness = Harness::new();
    harness.place(0, 0x100, Extent::new(64, 64), at(0.0, 0.0, -2.0));
    harness.place(1, 0x200, Extent::new(64, 64), at(0.0, 0.0, -3.0));
    harness.update();

    harness.engine.shutdown();

    assert_eq!(harness.capture.borrow().live, 0);
    assert_eq!(harness.live_swapchains(), 0);
    assert!(harness.device.stats().completion_waits.contains(&2));
    assert!(harness.engine.layers().is_empty());
    assert!(matches!(
        harness.engine.update(1),
        Err(OverlayError::NotInitialized)
    ));
}

#[test]
fn test_reinitialize_moves_windows_to_new_session() {
    let mut harness = Harness::new();
    harness.place(0, 0x100, Extent::new(64, 64), at(0.0, 0.0, -2.0));
    harness.update();

    let runtime = Rc::new(RefCell::new(RuntimeState::default()));
    harness
        .engine
        .initialize(session(
            &harness.device,
            &runtime,
            &harness.capture,
            &harness.input,
        ))
        .unwrap();

    // The old runtime got everything back.
    assert_eq!(harness.live_swapchains(), 0);

    harness.runtime = runtime;
    let layers = harness.update();
    assert_eq!(layers.len(), 1);
    assert_eq!(harness.live_swapchains(), 2);
    assert_eq!(harness.capture.borrow().live, 1);
}
