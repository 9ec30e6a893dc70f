//! Backing memory for the shared overlay state.

use bytemuck::{Pod, Zeroable};
use std::sync::atomic::AtomicU32;

use super::record::OverlayRecord;
use crate::error::{OverlayError, OverlayResult};

/// Number of overlay slots in the region.
pub const SLOT_COUNT: usize = 4;

/// `"WDCK"` little-endian.
pub const REGION_MAGIC: u32 = u32::from_le_bytes(*b"WDCK");
pub const REGION_VERSION: u32 = 1;

/// Start of the region.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct RegionHeader {
    pub magic: u32,
    pub version: u32,
    pub slot_count: u32,
    pub _reserved: u32,
}

impl RegionHeader {
    pub fn current() -> Self {
        Self {
            magic: REGION_MAGIC,
            version: REGION_VERSION,
            slot_count: SLOT_COUNT as u32,
            _reserved: 0,
        }
    }

    pub fn check(&self) -> OverlayResult<()> {
        let expected = Self::current();
        if self.magic != expected.magic
            || self.version != expected.version
            || self.slot_count != expected.slot_count
        {
            return Err(OverlayError::SharedStateLayout {
                expected: describe(&expected),
                found: describe(self),
            });
        }
        Ok(())
    }
}

fn describe(header: &RegionHeader) -> String {
    format!(
        "magic {:#010x} v{} with {} slots",
        header.magic, header.version, header.slot_count
    )
}

/// A record guarded by its sequence word. Odd sequence values mean a writer
/// holds the slot.
#[repr(C)]
pub struct SlotCell {
    pub sequence: AtomicU32,
    pub _reserved: u32,
    pub record: OverlayRecord,
}

#[repr(C)]
pub struct RegionLayout {
    pub header: RegionHeader,
    pub slots: [SlotCell; SLOT_COUNT],
}

pub const REGION_SIZE: usize = std::mem::size_of::<RegionLayout>();

/// Owner of the mapped bytes.
pub(crate) enum Backing {
    /// Private to this process. Used when no configuration tool is involved.
    Heap(*mut RegionLayout),
    #[cfg(windows)]
    Mapped(win::MappedView),
}

// SAFETY: the region is only touched through atomics and volatile copies.
unsafe impl Send for Backing {}
unsafe impl Sync for Backing {}

impl Backing {
    pub(crate) fn heap() -> Self {
        let layout: Box<RegionLayout> = Box::new(RegionLayout {
            header: RegionHeader::current(),
            slots: std::array::from_fn(|_| SlotCell {
                sequence: AtomicU32::new(0),
                _reserved: 0,
                record: OverlayRecord::zeroed(),
            }),
        });
        Backing::Heap(Box::into_raw(layout))
    }

    pub(crate) fn as_ptr(&self) -> *mut RegionLayout {
        match self {
            Backing::Heap(ptr) => *ptr,
            #[cfg(windows)]
            Backing::Mapped(view) => view.as_ptr(),
        }
    }
}

impl Drop for Backing {
    fn drop(&mut self) {
        if let Backing::Heap(ptr) = *self {
            // SAFETY: produced by Box::into_raw in `heap` and freed only here.
            drop(unsafe { Box::from_raw(ptr) });
        }
    }
}

#[cfg(windows)]
pub(crate) mod win {
    use windows::core::HSTRING;
    use windows::Win32::Foundation::{CloseHandle, HANDLE, INVALID_HANDLE_VALUE};
    use windows::Win32::System::Memory::{
        CreateFileMappingW, MapViewOfFile, OpenFileMappingW, UnmapViewOfFile,
        FILE_MAP_ALL_ACCESS, MEMORY_MAPPED_VIEW_ADDRESS, PAGE_READWRITE,
    };

    use super::{RegionHeader, RegionLayout, REGION_SIZE};
    use crate::error::{OverlayError, OverlayResult};

    /// A named file mapping view.
    pub(crate) struct MappedView {
        mapping: HANDLE,
        view: MEMORY_MAPPED_VIEW_ADDRESS,
    }

    impl MappedView {
        /// Open an existing mapping created by the configuration tool.
        pub(crate) fn open(name: &str) -> OverlayResult<Self> {
            let mapping = unsafe {
                OpenFileMappingW(FILE_MAP_ALL_ACCESS.0, false, &HSTRING::from(name))
            }
            .map_err(|e| {
                OverlayError::SharedStateUnavailable(format!("OpenFileMappingW({}): {}", name, e))
            })?;
            Self::map(mapping, name)
        }

        /// Create (or open) the mapping and stamp the header.
        pub(crate) fn create(name: &str) -> OverlayResult<Self> {
            let mapping = unsafe {
                CreateFileMappingW(
                    INVALID_HANDLE_VALUE,
                    None,
                    PAGE_READWRITE,
                    0,
                    REGION_SIZE as u32,
                    &HSTRING::from(name),
                )
            }
            .map_err(|e| {
                OverlayError::SharedStateUnavailable(format!(
                    "CreateFileMappingW({}): {}",
                    name, e
                ))
            })?;
            let view = Self::map(mapping, name)?;

            let header = unsafe { std::ptr::addr_of_mut!((*view.as_ptr()).header) };
            // SAFETY: the view spans REGION_SIZE bytes.
            unsafe {
                if header.read_volatile().magic == 0 {
                    header.write_volatile(RegionHeader::current());
                }
            }
            Ok(view)
        }

        fn map(mapping: HANDLE, name: &str) -> OverlayResult<Self> {
            let view = unsafe { MapViewOfFile(mapping, FILE_MAP_ALL_ACCESS, 0, 0, REGION_SIZE) };
            if view.Value.is_null() {
                let err = windows::core::Error::from_win32();
                unsafe {
                    let _ = CloseHandle(mapping);
                }
                return Err(OverlayError::SharedStateUnavailable(format!(
                    "MapViewOfFile({}): {}",
                    name, err
                )));
            }
            Ok(Self { mapping, view })
        }

        pub(crate) fn as_ptr(&self) -> *mut RegionLayout {
            self.view.Value as *mut RegionLayout
        }
    }

    impl Drop for MappedView {
        fn drop(&mut self) {
            unsafe {
                let _ = UnmapViewOfFile(self.view);
                let _ = CloseHandle(self.mapping);
            }
        }
    }
}
