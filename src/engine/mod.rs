//! The overlay engine.
//!
//! [`OverlayEngine`] owns the overlay windows and runs one frame of the
//! pipeline per [`update`](OverlayEngine::update):
//!
//! 1. sample head, hands and buttons from the runtime
//! 2. open windows for newly filled slots and close emptied ones
//! 3. sort windows back to front by distance from the head
//! 4. run controller interaction against the sorted windows
//! 5. composite each window's latest capture into its swapchain
//! 6. signal the shared fence and release the swapchain images
//! 7. write poses back to the shared state and take the tool's settings
//! 8. publish the window layers, plus the cursor when a window is hovered
//!
//! Without a shared state region the engine is disabled and every call
//! returns without effect.

mod interaction;
mod lifecycle;
mod window;

#[cfg(test)]
mod tests;

pub use interaction::Cursor;
pub use window::{QuadGeometry, WindowState};

use glam::{Vec2, Vec3};
use std::cell::RefCell;
use std::rc::Rc;
use windowdeck_targets::CaptureTarget;

use crate::capture::CaptureProvider;
use crate::config::{CompositionConfig, EngineConfig};
use crate::error::{OverlayError, OverlayResult};
use crate::geometry::{align_to_gravity, facing_camera, Pose};
use crate::gpu::{CompositionDevice, Compositor, Extent, Region, TextureFormat};
use crate::hooks::mask_controller_input;
use crate::input::DesktopInput;
use crate::runtime::{
    ControllerInput, DisplayTime, QuadLayer, SwapchainDesc, SwapchainId, VrRuntime,
};
use crate::shared_state::{SharedOverlayState, SLOT_COUNT};
use interaction::Interaction;
use lifecycle::{close_window, ensure_swapchain, open_window, share_images};
use window::Window;

/// Everything the host hands over when its VR session starts.
pub struct EngineSession<D: CompositionDevice> {
    /// Composition device on the same adapter as the host's submission device.
    pub device: D,
    pub runtime: Box<dyn VrRuntime>,
    pub capture: Box<dyn CaptureProvider<D>>,
    pub input: Box<dyn DesktopInput>,
}

struct CursorSwapchain {
    id: SwapchainId,
    extent: Extent,
}

struct ActiveSession<D: CompositionDevice> {
    compositor: Compositor<D>,
    runtime: Box<dyn VrRuntime>,
    capture: Box<dyn CaptureProvider<D>>,
    input: Box<dyn DesktopInput>,
    cursor: Option<CursorSwapchain>,
}

pub struct OverlayEngine<D: CompositionDevice> {
    config: EngineConfig,
    shared: Option<SharedOverlayState>,
    session: Option<ActiveSession<D>>,
    windows: Vec<Option<Window<D::Texture>>>,
    /// Slots of live windows, farthest first.
    sorted: Vec<usize>,
    interaction: Interaction,
    layers: Vec<QuadLayer>,
    /// Last target each slot failed to open, to log the failure once.
    failed_targets: Vec<Option<CaptureTarget>>,
}

impl<D: CompositionDevice> OverlayEngine<D> {
    /// Attach to the shared state named in `config`.
    ///
    /// When the region does not exist the engine is created disabled.
    pub fn open(config: EngineConfig) -> Self {
        let shared = match SharedOverlayState::open(&config.shared_state_name) {
            Ok(shared) => Some(shared),
            Err(e) => {
                log::warn!("[SHARED] {}, overlays disabled", e);
                None
            }
        };
        Self::build(config, shared)
    }

    /// Use an already opened shared state.
    pub fn with_shared_state(config: EngineConfig, shared: SharedOverlayState) -> Self {
        Self::build(config, Some(shared))
    }

    fn build(config: EngineConfig, shared: Option<SharedOverlayState>) -> Self {
        Self {
            interaction: Interaction::new(config.interaction.clone()),
            config,
            shared,
            session: None,
            windows: std::iter::repeat_with(|| None).take(SLOT_COUNT).collect(),
            sorted: Vec::new(),
            layers: Vec::new(),
            failed_targets: vec![None; SLOT_COUNT],
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.is_some()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn shared_state(&self) -> Option<&SharedOverlayState> {
        self.shared.as_ref()
    }

    /// Start compositing for a new host session.
    ///
    /// A previous session is shut down first and every window is reopened
    /// on the new one.
    pub fn initialize(&mut self, session: EngineSession<D>) -> OverlayResult<()> {
        if !self.is_enabled() {
            log::debug!("[ENGINE] Overlays disabled, ignoring session");
            return Ok(());
        }
        if self.session.is_some() {
            log::info!("[ENGINE] Replacing the active session");
            self.shutdown();
        }

        let EngineSession {
            device,
            mut runtime,
            capture,
            input,
        } = session;
        let mut compositor = Compositor::new(device, &self.config.composition);
        let cursor = create_cursor(&mut compositor, runtime.as_mut(), &self.config.composition)?;

        log::info!("[ENGINE] Session initialized");
        self.session = Some(ActiveSession {
            compositor,
            runtime,
            capture,
            input,
            cursor: Some(cursor),
        });
        Ok(())
    }

    /// Run one frame and return the layers to submit with it.
    ///
    /// On error the frame has no overlays; the next call starts over.
    pub fn update(&mut self, time: DisplayTime) -> OverlayResult<&[QuadLayer]> {
        self.layers.clear();
        if let Err(e) = self.run_frame(time) {
            self.layers.clear();
            log::error!("[ENGINE] Frame update failed: {}", e);
            return Err(e);
        }
        Ok(&self.layers)
    }

    /// Layers produced by the last `update`.
    pub fn layers(&self) -> &[QuadLayer] {
        &self.layers
    }

    /// Whether a controller currently points at a window.
    pub fn has_focus(&self) -> bool {
        self.is_enabled() && self.interaction.cursor().is_some()
    }

    pub fn cursor(&self) -> Option<&Cursor> {
        self.interaction.cursor()
    }

    pub fn window(&self, slot: usize) -> Option<WindowState> {
        self.windows.get(slot)?.as_ref().map(Window::state)
    }

    /// Slots of the live windows in draw order, farthest first.
    pub fn sorted_slots(&self) -> &[usize] {
        &self.sorted
    }

    /// Close every window and release the session's GPU and runtime
    /// resources. Composition work is flushed before anything is released.
    pub fn shutdown(&mut self) {
        if let Some(mut session) = self.session.take() {
            log::info!("[ENGINE] Shutting down session");
            if let Err(e) = session.compositor.flush() {
                log::error!("[GPU] Failed to flush composition queue: {}", e);
            }
            for window in self.windows.iter_mut().filter_map(Option::take) {
                close_window(window, session.runtime.as_mut());
            }
            if let Some(cursor) = session.cursor.take() {
                session.runtime.destroy_swapchain(cursor.id);
            }
        }
        self.sorted.clear();
        self.layers.clear();
        self.failed_targets.fill(None);
        self.interaction.reset();
    }

    fn run_frame(&mut self, time: DisplayTime) -> OverlayResult<()> {
        let Self {
            config,
            shared,
            session,
            windows,
            sorted,
            interaction,
            layers,
            failed_targets,
        } = self;

        let Some(shared) = shared.as_ref() else {
            return Ok(());
        };
        let session = session.as_mut().ok_or(OverlayError::NotInitialized)?;

        let tracking = session.runtime.locate(time)?;
        let input = session.runtime.input(time)?;

        // ====================================================================
        // Slot lifecycle
        // ====================================================================

        for slot in 0..windows.len() {
            let record = match shared.read(slot) {
                Ok(record) => record,
                Err(e) => {
                    log::debug!("[SHARED] {}, keeping cached state", e);
                    continue;
                }
            };
            let target = record.target();

            if windows[slot].as_ref().is_some_and(|w| Some(w.target) != target) {
                if let Some(window) = windows[slot].take() {
                    close_window(window, session.runtime.as_mut());
                }
            }
            if windows[slot].as_ref().is_some_and(|w| !w.capture.is_alive()) {
                if let Some(window) = windows[slot].take() {
                    log::warn!("[ENGINE] Slot {}: {} no longer exists", slot, window.target);
                    failed_targets[slot] = Some(window.target);
                    close_window(window, session.runtime.as_mut());
                }
                continue;
            }
            if target.is_none() {
                failed_targets[slot] = None;
            }

            let Some(target) = target else {
                continue;
            };
            if windows[slot].is_some() {
                continue;
            }

            match open_window(
                session.capture.as_mut(),
                session.compositor.device(),
                slot,
                target,
                &record,
                &tracking.head,
                &config.composition,
            ) {
                Ok(window) => {
                    failed_targets[slot] = None;
                    windows[slot] = Some(window);
                }
                Err(e) if e.is_slot_scoped() => {
                    if failed_targets[slot] != Some(target) {
                        log::warn!("[ENGINE] Slot {}: cannot open {}: {}", slot, target, e);
                        failed_targets[slot] = Some(target);
                    }
                }
                Err(e) => return Err(e),
            }
        }

        // ====================================================================
        // Draw order
        // ====================================================================

        let mut distances: Vec<(f32, usize)> = windows
            .iter()
            .flatten()
            .map(|window| (window.distance_from(&tracking.head), window.slot))
            .collect();
        // Stable: equal distances keep slot order.
        distances.sort_by(|a, b| b.0.total_cmp(&a.0));
        sorted.clear();
        sorted.extend(distances.iter().map(|&(_, slot)| slot));

        // ====================================================================
        // Interaction
        // ====================================================================

        interaction.update(
            windows,
            sorted,
            &tracking,
            &input,
            session.input.as_mut(),
        );

        // ====================================================================
        // Composition
        // ====================================================================

        let mut presented = Vec::new();
        let mut lost = Vec::new();
        for window in windows.iter_mut().flatten() {
            match present_window(window, session) {
                Ok(Some(swapchain)) => presented.push(swapchain),
                Ok(None) => {}
                Err(e) if e.is_slot_scoped() => {
                    log::warn!("[ENGINE] Slot {}: capture lost: {}", window.slot, e);
                    lost.push(window.slot);
                }
                Err(e) => return Err(e),
            }

            window.refresh_quad_size(config.composition.minimized_icon_size);

            // Minimized world-locked windows keep facing the viewer.
            if window.is_minimized && !window.placement.is_head_locked() {
                let facing = facing_camera(
                    window.quad.pose.position,
                    tracking.head.position,
                    window.quad.pose.orientation,
                );
                window.quad.pose.orientation = align_to_gravity(facing);
            }
        }
        for slot in lost {
            if let Some(window) = windows[slot].take() {
                close_window(window, session.runtime.as_mut());
            }
            sorted.retain(|&s| s != slot);
        }

        session.compositor.commit_frame()?;
        for swapchain in presented {
            session.runtime.release_image(swapchain)?;
        }

        // ====================================================================
        // Shared state sync
        // ====================================================================

        for window in windows.iter_mut().flatten() {
            let slot = window.slot;
            let target = window.target;
            let synced = shared.modify(slot, |record| {
                // The tool may have emptied or reassigned the slot since the
                // start of the frame.
                if record.target() == Some(target) {
                    window.sync(record);
                }
            });
            if let Err(e) = synced {
                log::debug!("[SHARED] {}, keeping cached state", e);
            }
        }

        // ====================================================================
        // Layers
        // ====================================================================

        layers.extend(
            sorted
                .iter()
                .filter_map(|&slot| windows[slot].as_ref()?.layer()),
        );

        if let (Some(cursor), Some(swapchain)) = (interaction.cursor(), session.cursor.as_ref()) {
            let size = config.composition.cursor_size;
            // Top-left corner of the cursor image on the hit point.
            let offset = cursor.pose.orientation * Vec3::new(size / 2.0, -size / 2.0, 0.0);
            layers.push(QuadLayer {
                pose: Pose::new(cursor.pose.orientation, cursor.pose.position + offset),
                size: Vec2::splat(size),
                viewport: Region::full(swapchain.extent),
                swapchain: swapchain.id,
                head_locked: cursor.head_locked,
            });
        }

        Ok(())
    }
}

impl<D> OverlayEngine<D>
where
    D: CompositionDevice + 'static,
    D::Texture: 'static,
{
    /// Frame hook running `update` and appending the engine's layers to the
    /// host's.
    pub fn submit_callback(
        engine: Rc<RefCell<Self>>,
    ) -> impl FnMut(DisplayTime, &mut Vec<QuadLayer>) + 'static {
        move |time: DisplayTime, layers: &mut Vec<QuadLayer>| {
            let mut engine = engine.borrow_mut();
            if let Ok(own) = engine.update(time) {
                layers.extend_from_slice(own);
            }
        }
    }

    /// Input hook hiding controller input from the application while a
    /// window is pointed at.
    pub fn input_callback(
        engine: Rc<RefCell<Self>>,
    ) -> impl FnMut(&mut ControllerInput) + 'static {
        move |input: &mut ControllerInput| {
            if engine.borrow().has_focus() {
                mask_controller_input(input);
            }
        }
    }
}

impl<D: CompositionDevice> Drop for OverlayEngine<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Copy the window's latest capture into its next swapchain image.
///
/// Returns the swapchain whose image was acquired, if any.
fn present_window<D: CompositionDevice>(
    window: &mut Window<D::Texture>,
    session: &mut ActiveSession<D>,
) -> OverlayResult<Option<SwapchainId>> {
    let Some(surface) = window.capture.latest_surface()? else {
        return Ok(None);
    };

    let device = session.compositor.device();
    let desc = device.texture_desc(&surface)?;
    let region = window.capture.content_region().clamped_to(desc.extent);
    if region.extent.is_empty() {
        return Ok(None);
    }

    ensure_swapchain(window, session.runtime.as_mut(), device, desc)?;
    let Some(swapchain) = window.swapchain.as_ref() else {
        return Ok(None);
    };

    let index = session.runtime.acquire_image(swapchain.id)?;
    let image = swapchain.images.get(index).ok_or_else(|| {
        OverlayError::Runtime(format!(
            "Swapchain image {} out of range ({} images)",
            index,
            swapchain.images.len()
        ))
    })?;
    session
        .compositor
        .composite(image, &surface, region, window.opacity)?;

    window.quad.viewport = Region::full(region.extent);
    Ok(Some(swapchain.id))
}

/// Create the cursor swapchain and paint it opaque white.
fn create_cursor<D: CompositionDevice>(
    compositor: &mut Compositor<D>,
    runtime: &mut dyn VrRuntime,
    config: &CompositionConfig,
) -> OverlayResult<CursorSwapchain> {
    let extent = Extent::new(config.cursor_pixels, config.cursor_pixels);
    let id = runtime.create_swapchain(&SwapchainDesc {
        extent,
        format: TextureFormat::Rgba8Unorm,
        unordered_access: false,
        static_image: true,
    })?;

    if let Err(e) = paint_cursor(compositor, runtime, id) {
        runtime.destroy_swapchain(id);
        return Err(e);
    }
    Ok(CursorSwapchain { id, extent })
}

fn paint_cursor<D: CompositionDevice>(
    compositor: &mut Compositor<D>,
    runtime: &mut dyn VrRuntime,
    id: SwapchainId,
) -> OverlayResult<()> {
    let images = share_images(runtime, compositor.device(), id)?;
    let index = runtime.acquire_image(id)?;
    let image = images
        .get(index)
        .ok_or_else(|| OverlayError::Runtime(format!("Cursor image {} out of range", index)))?;
    compositor.device().fill(image, [255; 4])?;
    compositor.commit_frame()?;
    runtime.release_image(id)
}
