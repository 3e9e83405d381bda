//! Engine-object view of partition slots
//!
//! Each slot's external header area holds an `ObjectHeader` followed by the
//! `NativeObject`; the buffer header comes right after. An `ObjectRef` is the
//! address of the `NativeObject`, so it sits `NATIVE_OBJECT_SIZE` bytes in
//! front of the buffer header. All translation goes through the arena's
//! bounds-checked lookups.

use crate::{
    buffers::{BufferArena, BufferHeader, BufferPoolPartition},
    engine::{NativeObject, ObjectHeader, ObjectRef, NATIVE_OBJECT_SIZE, OBJECT_HEADER_SPACE},
    error::{PoolBridgeError, Result},
};

/// External header bytes the bridge reserves in every buffer slot
pub const EXT_HEADER_SIZE: usize = OBJECT_HEADER_SPACE + NATIVE_OBJECT_SIZE;

/// Typed accessors over one started partition
#[derive(Debug, Clone, Copy)]
pub struct ObjectView<'a> {
    partition: &'a BufferPoolPartition,
    arena: &'a BufferArena,
}

impl<'a> ObjectView<'a> {
    /// View of `partition`; it must be started and laid out with the
    /// bridge's external header
    pub fn new(partition: &'a BufferPoolPartition) -> Result<Self> {
        let arena = partition.arena().ok_or_else(|| {
            PoolBridgeError::invalid_parameter(
                "partition",
                format!("Partition {} is not started", partition.index()),
            )
        })?;
        if arena.layout().ext_header_size() != EXT_HEADER_SIZE {
            return Err(PoolBridgeError::invalid_parameter(
                "ext_header_size",
                format!(
                    "Partition {} reserves {} external header bytes, need {}",
                    partition.index(),
                    arena.layout().ext_header_size(),
                    EXT_HEADER_SIZE
                ),
            ));
        }
        Ok(Self { partition, arena })
    }

    /// Underlying partition
    pub fn partition(&self) -> &'a BufferPoolPartition {
        self.partition
    }

    /// Pool object of buffer `index`
    #[inline]
    pub fn object_ref(&self, index: u32) -> Option<ObjectRef> {
        self.arena
            .header_address(index)
            .map(|address| ObjectRef::from_address(address - NATIVE_OBJECT_SIZE))
    }

    /// Buffer index of pool object `obj`
    #[inline]
    pub fn index_of(&self, obj: ObjectRef) -> Result<u32> {
        obj.address()
            .checked_add(NATIVE_OBJECT_SIZE)
            .and_then(|header| self.arena.index_of_header(header))
            .ok_or_else(|| PoolBridgeError::invalid_object(self.partition.index(), obj.address()))
    }

    /// Buffer header of buffer `index`
    #[inline]
    pub fn buffer_header(&self, index: u32) -> Option<&'a BufferHeader> {
        self.arena.header(index)
    }

    /// Mutable buffer header of buffer `index`
    ///
    /// # Safety
    /// The caller must hold the buffer exclusively.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn buffer_header_mut(&self, index: u32) -> Option<&'a mut BufferHeader> {
        self.arena.header_mut(index)
    }

    /// Object header of buffer `index`
    pub fn object_header(&self, index: u32) -> Option<&'a ObjectHeader> {
        let ptr = self.arena.ext_header_ptr(index)?;
        // SAFETY: the external area is EXT_HEADER_SIZE bytes, 64-byte aligned,
        // and starts with the object header
        Some(unsafe { &*ptr.as_ptr().cast::<ObjectHeader>() })
    }

    /// Mutable object header of buffer `index`
    ///
    /// # Safety
    /// No other reference to this object header may be live.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn object_header_mut(&self, index: u32) -> Option<&'a mut ObjectHeader> {
        let ptr = self.arena.ext_header_ptr(index)?;
        Some(&mut *ptr.as_ptr().cast::<ObjectHeader>())
    }

    /// Native object of buffer `index`
    pub fn native(&self, index: u32) -> Option<&'a NativeObject> {
        let ptr = self.arena.ext_header_ptr(index)?;
        // SAFETY: the native object follows the object header inside the
        // external area
        Some(unsafe { &*ptr.as_ptr().add(OBJECT_HEADER_SPACE).cast::<NativeObject>() })
    }

    /// Mutable native object of buffer `index`
    ///
    /// # Safety
    /// The caller must hold the buffer exclusively.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn native_mut(&self, index: u32) -> Option<&'a mut NativeObject> {
        let ptr = self.arena.ext_header_ptr(index)?;
        Some(&mut *ptr.as_ptr().add(OBJECT_HEADER_SPACE).cast::<NativeObject>())
    }
}
