//! Cross-process overlay state.
//!
//! A small fixed-layout region shared with the configuration tool: a header
//! followed by [`SLOT_COUNT`] overlay records. The tool owns identity, opacity,
//! placement and the interactable/frozen flags; the engine owns pose, scale and
//! the minimized flag.
//!
//! Each record is guarded by a sequence word. A writer moves the word from an
//! even value to the next odd value with a compare-and-swap, writes the record
//! and publishes the following even value. A reader copies the record and
//! accepts the copy only if the same even value was observed before and after.

mod record;
mod region;

pub use record::{OverlayRecord, Placement, SharedPose};
pub use region::{RegionHeader, REGION_MAGIC, REGION_SIZE, REGION_VERSION, SLOT_COUNT};

use std::ptr::addr_of_mut;
use std::sync::atomic::{fence, AtomicU32, Ordering};
use std::sync::Arc;

use crate::error::{OverlayError, OverlayResult};
use region::{Backing, RegionLayout};

/// How many times a reader or writer retries a busy slot before giving up.
const MAX_ATTEMPTS: u32 = 64;

/// Handle to the shared overlay region. Cloning shares the same region.
#[derive(Clone)]
pub struct SharedOverlayState {
    backing: Arc<Backing>,
}

impl std::fmt::Debug for SharedOverlayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedOverlayState")
            .field("slots", &SLOT_COUNT)
            .finish()
    }
}

impl SharedOverlayState {
    /// Open the region published by the configuration tool.
    ///
    /// Fails with `SharedStateUnavailable` when no such mapping exists and
    /// `SharedStateLayout` when its header does not match this build.
    #[cfg(windows)]
    pub fn open(name: &str) -> OverlayResult<Self> {
        let state = Self::from_backing(Backing::Mapped(region::win::MappedView::open(name)?));
        state.header().check()?;
        log::info!("[SHARED] Opened overlay state '{}'", name);
        Ok(state)
    }

    #[cfg(not(windows))]
    pub fn open(name: &str) -> OverlayResult<Self> {
        Err(OverlayError::SharedStateUnavailable(format!(
            "named shared memory '{}' is only available on Windows",
            name
        )))
    }

    /// Create the named region, as the configuration tool does.
    #[cfg(windows)]
    pub fn create(name: &str) -> OverlayResult<Self> {
        let state = Self::from_backing(Backing::Mapped(region::win::MappedView::create(name)?));
        state.header().check()?;
        Ok(state)
    }

    /// A region private to this process, with every slot empty.
    pub fn in_process() -> Self {
        Self::from_backing(Backing::heap())
    }

    fn from_backing(backing: Backing) -> Self {
        Self {
            backing: Arc::new(backing),
        }
    }

    pub fn slot_count(&self) -> usize {
        SLOT_COUNT
    }

    pub fn header(&self) -> RegionHeader {
        // SAFETY: the backing keeps the region alive and large enough.
        unsafe { addr_of_mut!((*self.layout()).header).read_volatile() }
    }

    fn layout(&self) -> *mut RegionLayout {
        self.backing.as_ptr()
    }

    fn slot(&self, slot: usize) -> OverlayResult<(&AtomicU32, *mut OverlayRecord)> {
        if slot >= SLOT_COUNT {
            return Err(OverlayError::InvalidSlot { slot });
        }
        // SAFETY: index checked above; the sequence word is only accessed
        // atomically and the record only through volatile copies.
        unsafe {
            let cell = addr_of_mut!((*self.layout()).slots[slot]);
            Ok((&(*cell).sequence, addr_of_mut!((*cell).record)))
        }
    }

    /// Current sequence word of a slot.
    #[cfg(test)]
    pub(crate) fn sequence(&self, slot: usize) -> OverlayResult<u32> {
        let (sequence, _) = self.slot(slot)?;
        Ok(sequence.load(Ordering::Acquire))
    }

    /// Take a consistent copy of a slot.
    pub fn read(&self, slot: usize) -> OverlayResult<OverlayRecord> {
        let (sequence, record) = self.slot(slot)?;

        for _ in 0..MAX_ATTEMPTS {
            let before = sequence.load(Ordering::Acquire);
            if before & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }

            // SAFETY: OverlayRecord is Pod, a torn copy is still a valid value
            // and is discarded below.
            let copy = unsafe { record.read_volatile() };
            fence(Ordering::Acquire);

            if sequence.load(Ordering::Relaxed) == before {
                return Ok(copy);
            }
            std::hint::spin_loop();
        }

        Err(OverlayError::SlotContention { slot })
    }

    /// Replace a slot.
    pub fn write(&self, slot: usize, value: &OverlayRecord) -> OverlayResult<()> {
        self.modify(slot, |record| *record = *value)
    }

    /// Read-modify-write a slot while holding it. Returns what `f` returns.
    pub fn modify<R>(
        &self,
        slot: usize,
        f: impl FnOnce(&mut OverlayRecord) -> R,
    ) -> OverlayResult<R> {
        let (sequence, record) = self.slot(slot)?;
        let start = acquire(sequence).ok_or(OverlayError::SlotContention { slot })?;

        // SAFETY: the odd sequence value excludes other cooperating writers.
        let result = unsafe {
            let mut value = record.read_volatile();
            let result = f(&mut value);
            record.write_volatile(value);
            result
        };

        sequence.store(start.wrapping_add(2), Ordering::Release);
        Ok(result)
    }
}

/// Move the sequence from even to odd. Returns the even value taken.
fn acquire(sequence: &AtomicU32) -> Option<u32> {
    for _ in 0..MAX_ATTEMPTS {
        let current = sequence.load(Ordering::Relaxed);
        if current & 1 == 0
            && sequence
                .compare_exchange_weak(
                    current,
                    current.wrapping_add(1),
                    Ordering::Acquire,
                    Ordering::Relaxed,
                )
                .is_ok()
        {
            fence(Ordering::Release);
            return Some(current);
        }
        std::hint::spin_loop();
    }
    None
}
