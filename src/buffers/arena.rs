//! Contiguous buffer arena - fixed-size slots addressed by index

use std::ptr::NonNull;

use memmap2::{MmapMut, MmapOptions};

use crate::error::{PoolBridgeError, Result};

use super::header::{BufferHeader, BUFFER_HEADER_SIZE, PRE_DATA_SIZE};

/// Slot alignment; every header lands on a cache line boundary
pub const SLOT_ALIGN: usize = 64;

/// Byte layout of one buffer slot.
///
/// ```text
/// | external header | BufferHeader | pre-data | data |
/// ^ slot start      ^ header_offset           ^ data_offset
/// ```
///
/// The external header area belongs to whoever registered it through
/// `ext_header_size`; the arena never interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotLayout {
    ext_header_size: usize,
    ext_header_space: usize,
    data_size: usize,
    stride: usize,
}

impl SlotLayout {
    /// Compute the layout for the given external header and data sizes
    pub fn new(ext_header_size: usize, data_size: usize) -> Self {
        let ext_header_space = align_up(ext_header_size, SLOT_ALIGN);
        let stride = align_up(
            ext_header_space + BUFFER_HEADER_SIZE + PRE_DATA_SIZE + data_size,
            SLOT_ALIGN,
        );
        Self {
            ext_header_size,
            ext_header_space,
            data_size,
            stride,
        }
    }

    /// Distance between two consecutive slots
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Bytes reserved in front of the header for the external header
    pub fn ext_header_size(&self) -> usize {
        self.ext_header_size
    }

    /// Offset of the buffer header within a slot
    pub fn header_offset(&self) -> usize {
        self.ext_header_space
    }

    /// Offset of the external header within a slot
    pub fn ext_header_offset(&self) -> usize {
        self.ext_header_space - self.ext_header_size
    }

    /// Offset of the data area within a slot
    pub fn data_offset(&self) -> usize {
        self.ext_header_space + BUFFER_HEADER_SIZE + PRE_DATA_SIZE
    }

    /// Usable data bytes per buffer
    pub fn data_size(&self) -> usize {
        self.data_size
    }
}

/// One anonymous mapping carved into `count` slots
#[derive(Debug)]
pub struct BufferArena {
    /// Backing mapping, kept alive for `base`
    _mmap: MmapMut,
    base: NonNull<u8>,
    size: usize,
    count: u32,
    layout: SlotLayout,
}

impl BufferArena {
    /// Map a zeroed region large enough for `count` slots, rounded up to
    /// whole pages of `1 << log2_page_size` bytes
    pub fn new(count: u32, layout: SlotLayout, log2_page_size: u32) -> Result<Self> {
        if count == 0 {
            return Err(PoolBridgeError::invalid_parameter(
                "count",
                "Arena must hold at least one buffer",
            ));
        }

        let page_size = 1usize << log2_page_size;
        let raw = (count as usize)
            .checked_mul(layout.stride())
            .ok_or_else(|| PoolBridgeError::invalid_parameter("count", "Arena size overflows"))?;
        let size = align_up(raw, page_size);

        let mut options = MmapOptions::new();
        options.len(size);
        #[cfg(target_os = "linux")]
        {
            options.populate();
            if page_size > base_page_size() {
                options.huge(Some(log2_page_size as u8));
            }
        }

        let mut mmap = options
            .map_anon()
            .map_err(|e| PoolBridgeError::from_io(e, "Failed to map buffer arena"))?;

        let base = NonNull::new(mmap.as_mut_ptr())
            .ok_or_else(|| PoolBridgeError::platform("Buffer arena mapped at null"))?;

        Ok(Self {
            _mmap: mmap,
            base,
            size,
            count,
            layout,
        })
    }

    /// Number of slots
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Start address of the mapping
    pub fn base_address(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Total mapped bytes, including page round-up
    pub fn size(&self) -> usize {
        self.size
    }

    /// Slot layout
    pub fn layout(&self) -> &SlotLayout {
        &self.layout
    }

    /// Check that `[address, address + len)` lies inside the mapping
    pub fn contains(&self, address: usize, len: usize) -> bool {
        let base = self.base_address();
        address >= base && address.saturating_add(len) <= base + self.size
    }

    /// Address of the buffer header of slot `index`
    pub fn header_address(&self, index: u32) -> Option<usize> {
        (index < self.count)
            .then(|| self.base_address() + self.slot_offset(index) + self.layout.header_offset())
    }

    /// Inverse of `header_address`: the slot whose header starts at `address`
    pub fn index_of_header(&self, address: usize) -> Option<u32> {
        let first = self.base_address() + self.layout.header_offset();
        let offset = address.checked_sub(first)?;
        if offset % self.layout.stride() != 0 {
            return None;
        }
        let index = offset / self.layout.stride();
        (index < self.count as usize).then_some(index as u32)
    }

    /// Buffer header of slot `index`
    pub fn header(&self, index: u32) -> Option<&BufferHeader> {
        let address = self.header_address(index)?;
        // SAFETY: in bounds, aligned to SLOT_ALIGN, and the mapping was
        // zero-filled which is a valid BufferHeader
        Some(unsafe { &*(address as *const BufferHeader) })
    }

    /// Mutable buffer header of slot `index`
    ///
    /// # Safety
    /// The caller must hold the buffer exclusively: no other reference to
    /// this slot's header may be live for the returned lifetime.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn header_mut(&self, index: u32) -> Option<&mut BufferHeader> {
        let address = self.header_address(index)?;
        Some(&mut *(address as *mut BufferHeader))
    }

    /// Start of the external header area of slot `index`
    pub fn ext_header_ptr(&self, index: u32) -> Option<NonNull<u8>> {
        if index >= self.count || self.layout.ext_header_size() == 0 {
            return None;
        }
        let offset = self.slot_offset(index) + self.layout.ext_header_offset();
        // SAFETY: offset is inside the mapping
        NonNull::new(unsafe { self.base.as_ptr().add(offset) })
    }

    /// Data area of slot `index`
    pub fn data(&self, index: u32) -> Option<&[u8]> {
        if index >= self.count {
            return None;
        }
        let offset = self.slot_offset(index) + self.layout.data_offset();
        // SAFETY: data area is inside the slot and the mapping
        Some(unsafe {
            std::slice::from_raw_parts(self.base.as_ptr().add(offset), self.layout.data_size())
        })
    }

    fn slot_offset(&self, index: u32) -> usize {
        index as usize * self.layout.stride()
    }
}

// The arena hands out references into memory it owns for its whole lifetime;
// cross-thread access to slot contents is governed by buffer ownership.
unsafe impl Send for BufferArena {}
unsafe impl Sync for BufferArena {}

/// Align a value up to the given power-of-two alignment
pub(crate) fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Size of a regular (non-huge) page
pub(crate) fn base_page_size() -> usize {
    // SAFETY: sysconf has no memory-safety preconditions
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        4096
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_offsets() {
        let layout = SlotLayout::new(192, 2048);
        assert_eq!(layout.header_offset(), 192);
        assert_eq!(layout.ext_header_offset(), 0);
        assert_eq!(layout.data_offset(), 192 + 128 + 128);
        assert_eq!(layout.stride() % SLOT_ALIGN, 0);

        let layout = SlotLayout::new(40, 100);
        assert_eq!(layout.header_offset(), 64);
        assert_eq!(layout.ext_header_offset(), 24);
    }

    #[test]
    fn test_index_round_trip() {
        let arena = BufferArena::new(16, SlotLayout::new(192, 512), 12).unwrap();
        for index in 0..16 {
            let address = arena.header_address(index).unwrap();
            assert_eq!(address % SLOT_ALIGN, 0);
            assert_eq!(arena.index_of_header(address), Some(index));
        }
        assert!(arena.header_address(16).is_none());
    }

    #[test]
    fn test_index_of_rejects_foreign_addresses() {
        let arena = BufferArena::new(4, SlotLayout::new(192, 512), 12).unwrap();
        let first = arena.header_address(0).unwrap();
        assert_eq!(arena.index_of_header(first + 8), None);
        assert_eq!(arena.index_of_header(first - 64), None);
        assert_eq!(arena.index_of_header(first + 4 * arena.layout().stride()), None);
    }

    #[test]
    fn test_headers_start_zeroed() {
        let arena = BufferArena::new(2, SlotLayout::new(0, 256), 12).unwrap();
        assert_eq!(arena.header(1).unwrap().ref_count(), 0);
        assert!(arena.ext_header_ptr(0).is_none());
        assert!(arena.data(1).unwrap().iter().all(|&b| b == 0));
        assert!(arena.size() % 4096 == 0);
    }
}
