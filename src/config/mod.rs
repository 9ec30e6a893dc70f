//! Engine configuration.
//!
//! Tuning values for interaction and composition, loaded from a JSON file next
//! to the host or taken from defaults. Unlike a process-wide settings store the
//! configuration is handed to the engine explicitly, so several engines (or
//! tests) can run with different values side by side.
//!
//! ## Layout
//!
//! - `InteractionConfig`: drag/click/rotate/resize tuning and hand priority
//! - `CompositionConfig`: opacity threshold, color key, icon and cursor sizes

pub mod composition;
pub mod interaction;

pub use composition::CompositionConfig;
pub use interaction::InteractionConfig;

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{OverlayError, OverlayResult, ResultExt};

/// Default name of the shared overlay state mapping.
pub const DEFAULT_SHARED_STATE_NAME: &str = "WindowDeck.OverlayState";

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Name of the memory mapping shared with the configuration tool.
    pub shared_state_name: String,
    pub interaction: InteractionConfig,
    pub composition: CompositionConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            shared_state_name: DEFAULT_SHARED_STATE_NAME.to_string(),
            interaction: InteractionConfig::default(),
            composition: CompositionConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Read a JSON configuration file. Missing fields take their defaults and
    /// out-of-range values are clamped.
    pub fn load(path: &Path) -> OverlayResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        let mut config: EngineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        log::debug!("[CONFIG] Loaded {:?}", path);
        Ok(config)
    }

    /// Load `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> OverlayResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            log::debug!("[CONFIG] {:?} not found, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Clamp tuning values into usable ranges.
    ///
    /// Only an unusable shared state name is rejected outright.
    pub fn validate(&mut self) -> OverlayResult<()> {
        if self.shared_state_name.trim().is_empty() {
            return Err(OverlayError::Config(
                "sharedStateName must not be empty".to_string(),
            ));
        }
        self.interaction.validate();
        self.composition.validate();
        Ok(())
    }
}

/// Clamp `value` into `[min, max]`, logging when it changes.
pub(crate) fn clamp_logged(name: &str, value: &mut f32, min: f32, max: f32) {
    let clamped = if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    };
    if clamped != *value {
        log::warn!("[CONFIG] {} = {} out of range, using {}", name, value, clamped);
        *value = clamped;
    }
}
