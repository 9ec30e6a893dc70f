//! Central error types for the overlay engine.
//!
//! Errors fall into two severities. Fatal errors (GPU device, cross-device
//! sharing, VR runtime swapchain calls) abort the current `update` and are
//! returned to the host. Slot-scoped errors (capture session setup) close only
//! the affected overlay slot. A missing shared state region is not an error at
//! the engine level at all: the engine becomes a no-op.

use thiserror::Error;

/// Main error type for overlay engine operations.
#[derive(Error, Debug)]
pub enum OverlayError {
    /// The shared overlay state region could not be opened or mapped
    #[error("Shared state unavailable: {0}")]
    SharedStateUnavailable(String),

    /// The shared overlay state region has an unexpected layout
    #[error("Shared state layout mismatch: expected {expected}, found {found}")]
    SharedStateLayout { expected: String, found: String },

    /// A stable copy of a slot could not be taken because a writer held it
    #[error("Shared state slot {slot} is being written")]
    SlotContention { slot: usize },

    /// Slot index outside of the shared state slot array
    #[error("Slot {slot} is out of range")]
    InvalidSlot { slot: usize },

    /// Capture session setup or frame acquisition failed
    #[error("Capture failed: {0}")]
    Capture(String),

    /// GPU device, resource sharing or fence failure
    #[error("GPU error: {0}")]
    Gpu(String),

    /// VR runtime swapchain call failed
    #[error("VR runtime error: {0}")]
    Runtime(String),

    /// An operation needing a session ran before `initialize`
    #[error("Engine has no active session")]
    NotInitialized,

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl OverlayError {
    /// Errors that only invalidate a single overlay slot.
    pub fn is_slot_scoped(&self) -> bool {
        matches!(self, OverlayError::Capture(_))
    }

    /// Errors after which the engine cannot safely keep compositing.
    pub fn is_fatal(&self) -> bool {
        matches!(self, OverlayError::Gpu(_) | OverlayError::Runtime(_))
    }
}

#[cfg(windows)]
impl From<windows::core::Error> for OverlayError {
    fn from(err: windows::core::Error) -> Self {
        OverlayError::Gpu(format!("{} (HRESULT {:#010x})", err.message(), err.code().0))
    }
}

/// Extension trait for adding context to Results.
///
/// Similar to anyhow's `Context` trait, this allows chaining context
/// information onto errors for better debugging.
pub trait ResultExt<T> {
    /// Add context to an error, converting it to OverlayError::Other.
    fn context(self, msg: &str) -> OverlayResult<T>;

    /// Add context lazily (only evaluated on error).
    fn with_context<F: FnOnce() -> String>(self, f: F) -> OverlayResult<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn context(self, msg: &str) -> OverlayResult<T> {
        self.map_err(|e| OverlayError::Other(format!("{}: {}", msg, e)))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> OverlayResult<T> {
        self.map_err(|e| OverlayError::Other(format!("{}: {}", f(), e)))
    }
}

/// Type alias for Results using OverlayError.
pub type OverlayResult<T> = Result<T, OverlayError>;
