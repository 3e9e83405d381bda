//! Per-buffer header and the template restored on every free

use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// Bytes reserved in front of the packet data for prepending headers
pub const PRE_DATA_SIZE: usize = 128;

/// Size of the application header that precedes the pre-data area
pub const BUFFER_HEADER_SIZE: usize = std::mem::size_of::<BufferHeader>();

/// Application header co-located with every buffer's data.
///
/// The first cache line holds the templated fields; everything after it is
/// opaque metadata owned by whoever currently holds the buffer and is never
/// touched by the pool.
#[repr(C, align(64))]
#[derive(Debug)]
pub struct BufferHeader {
    /// Signed offset of the first valid byte relative to the data area
    pub current_data: i16,
    /// Number of valid bytes starting at `current_data`
    pub current_length: u16,
    pub flags: u32,
    pub flow_id: u32,
    /// Outstanding views of this buffer; 1 while exclusively owned
    pub ref_count: AtomicU8,
    /// Partition the buffer belongs to
    pub buffer_pool_index: u8,
    pub error: u16,
    /// Index of the next buffer in a chain
    pub next_buffer: u32,
    pub total_length_not_including_first_buffer: u32,
    pub opaque: [u32; 10],
    pub trace_handle: u32,
    pub opaque2: [u32; 14],
}

impl BufferHeader {
    /// Current reference count
    pub fn ref_count(&self) -> u8 {
        self.ref_count.load(Ordering::Acquire)
    }

    /// Register `n` additional views of this buffer, returns the new count
    pub fn add_ref(&self, n: u8) -> u8 {
        let previous = self.ref_count.fetch_add(n, Ordering::AcqRel);
        debug_assert!(previous.checked_add(n).is_some(), "buffer ref_count overflow");
        previous.wrapping_add(n)
    }

    /// Drop one view. Returns true for exactly one caller: the one whose
    /// decrement took the count from 1 to 0.
    pub fn release_ref(&self) -> bool {
        let previous = self.ref_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert_ne!(previous, 0, "buffer ref_count underflow");
        previous == 1
    }
}

/// Default header fields of a partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferTemplate {
    pub current_data: i16,
    pub current_length: u16,
    pub flags: u32,
    pub flow_id: u32,
    pub ref_count: u8,
    pub buffer_pool_index: u8,
    pub error: u16,
    pub next_buffer: u32,
    pub total_length_not_including_first_buffer: u32,
}

impl BufferTemplate {
    /// Template for buffers of the given partition
    pub fn for_partition(buffer_pool_index: u8) -> Self {
        Self {
            current_data: 0,
            current_length: 0,
            flags: 0,
            flow_id: 0,
            ref_count: 1,
            buffer_pool_index,
            error: 0,
            next_buffer: 0,
            total_length_not_including_first_buffer: 0,
        }
    }

    /// Overwrite the templated fields of `header`
    #[inline]
    pub fn apply(&self, header: &mut BufferHeader) {
        header.current_data = self.current_data;
        header.current_length = self.current_length;
        header.flags = self.flags;
        header.flow_id = self.flow_id;
        *header.ref_count.get_mut() = self.ref_count;
        header.buffer_pool_index = self.buffer_pool_index;
        header.error = self.error;
        header.next_buffer = self.next_buffer;
        header.total_length_not_including_first_buffer =
            self.total_length_not_including_first_buffer;
    }

    /// Check whether every templated field of `header` equals the template
    pub fn matches(&self, header: &BufferHeader) -> bool {
        header.current_data == self.current_data
            && header.current_length == self.current_length
            && header.flags == self.flags
            && header.flow_id == self.flow_id
            && header.ref_count() == self.ref_count
            && header.buffer_pool_index == self.buffer_pool_index
            && header.error == self.error
            && header.next_buffer == self.next_buffer
            && header.total_length_not_including_first_buffer
                == self.total_length_not_including_first_buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zeroed_header() -> BufferHeader {
        // SAFETY: every field is an integer or an atomic integer
        unsafe { std::mem::zeroed() }
    }

    #[test]
    fn test_header_size_is_two_cache_lines() {
        assert_eq!(BUFFER_HEADER_SIZE, 128);
        assert_eq!(std::mem::align_of::<BufferHeader>(), 64);
    }

    #[test]
    fn test_template_apply_and_match() {
        let template = BufferTemplate::for_partition(3);
        let mut header = zeroed_header();
        header.current_length = 60;
        header.flags = 0x10;
        header.opaque[0] = 42;
        assert!(!template.matches(&header));

        template.apply(&mut header);
        assert!(template.matches(&header));
        assert_eq!(header.ref_count(), 1);
        assert_eq!(header.buffer_pool_index, 3);
        // opaque metadata is outside the template
        assert_eq!(header.opaque[0], 42);
    }

    #[test]
    fn test_release_ref_fires_once() {
        let mut header = zeroed_header();
        BufferTemplate::for_partition(0).apply(&mut header);
        assert_eq!(header.add_ref(2), 3);

        assert!(!header.release_ref());
        assert!(!header.release_ref());
        assert!(header.release_ref());
        assert_eq!(header.ref_count(), 0);
    }
}
