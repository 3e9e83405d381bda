//! Per-object engine metadata and memory chunk records

use std::fmt;

use super::handle::HandleId;

/// Opaque reference to a pool object, as passed through bulk enqueue and
/// dequeue. The value is the address of the object's `NativeObject`.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ObjectRef(usize);

impl ObjectRef {
    /// Placeholder for not-yet-filled table entries
    pub const NULL: ObjectRef = ObjectRef(0);

    /// Wrap a raw object address
    pub const fn from_address(address: usize) -> Self {
        Self(address)
    }

    /// Raw object address
    pub const fn address(self) -> usize {
        self.0
    }

    /// Whether this is the placeholder value
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({:#x})", self.0)
    }
}

/// Header stored immediately in front of each pool object
#[repr(C, align(64))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHeader {
    /// Handle that owns the object
    pub owner: HandleId,
    /// DMA address of the object
    pub iova: u64,
}

/// Bytes reserved for an `ObjectHeader` in front of each object
pub const OBJECT_HEADER_SPACE: usize = std::mem::size_of::<ObjectHeader>();

/// A physically contiguous span backing pool objects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryChunk {
    /// Handle the chunk is registered on
    pub owner: HandleId,
    /// Virtual start address
    pub addr: usize,
    /// DMA address of `addr`
    pub iova: u64,
    /// Length in bytes
    pub len: usize,
}

impl MemoryChunk {
    /// Whether `address` falls inside this chunk
    pub fn contains(&self, address: usize) -> bool {
        address >= self.addr && address - self.addr < self.len
    }
}
