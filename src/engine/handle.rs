//! Pool handles registered with the engine

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    bridge::PoolBridge,
    error::{PoolBridgeError, Result},
};

use super::{
    native::NATIVE_OBJECT_SIZE,
    object::{MemoryChunk, ObjectRef},
    ops::{OpsTable, PoolOps},
};

/// Maximum pool name length in bytes
pub const POOL_NAMESIZE: usize = 32;

/// Largest per-core cache a handle may request
pub const CACHE_MAX_SIZE: usize = 512;

/// Flush threshold for a per-core cache of `cache_size` objects
pub const fn cache_flush_threshold(cache_size: usize) -> usize {
    cache_size * 3 / 2
}

/// Which of the two handles of a partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolVariant {
    /// Allocation and exclusive release, with a per-core cache
    Cached,
    /// Shared release only, no cache
    NonCached,
}

impl PoolVariant {
    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            PoolVariant::Cached => "cached",
            PoolVariant::NonCached => "non-cached",
        }
    }
}

/// Compact identity of a handle: partition tag plus variant
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(u32);

impl HandleId {
    /// Identity of the `variant` handle of partition `tag`
    pub const fn new(tag: u8, variant: PoolVariant) -> Self {
        let bit = match variant {
            PoolVariant::Cached => 0,
            PoolVariant::NonCached => 1,
        };
        Self(((tag as u32) << 1) | bit)
    }

    /// Partition tag
    pub const fn tag(self) -> u8 {
        (self.0 >> 1) as u8
    }

    /// Handle variant
    pub const fn variant(self) -> PoolVariant {
        if self.0 & 1 == 0 {
            PoolVariant::Cached
        } else {
            PoolVariant::NonCached
        }
    }
}

impl fmt::Debug for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandleId({}, {})", self.tag(), self.variant().name())
    }
}

/// Element layout shared by both handles of a partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PoolPrivate {
    /// Headroom plus data bytes of each element
    pub data_room_size: u16,
    /// Application header bytes between the native object and the data room
    pub priv_size: u16,
}

/// Registration of one pool with the engine
pub struct PoolHandle {
    id: HandleId,
    name: String,
    size: u32,
    elt_size: usize,
    cache_size: usize,
    private_data_size: usize,
    socket_id: u32,
    private: PoolPrivate,
    elt_list: Vec<ObjectRef>,
    mem_list: Vec<MemoryChunk>,
    populated_size: u32,
    ops: Option<Arc<dyn PoolOps>>,
}

impl PoolHandle {
    /// Create a handle with no elements and no operation set attached
    #[allow(clippy::too_many_arguments)]
    pub fn create_empty(
        name: impl Into<String>,
        tag: u8,
        variant: PoolVariant,
        size: u32,
        elt_size: usize,
        cache_size: usize,
        private_data_size: usize,
        socket_id: u32,
    ) -> Result<Self> {
        let name = name.into();

        if name.is_empty() || name.len() > POOL_NAMESIZE {
            return Err(PoolBridgeError::invalid_parameter(
                "name",
                format!("Pool name must be 1..={} bytes", POOL_NAMESIZE),
            ));
        }

        if size == 0 {
            return Err(PoolBridgeError::invalid_parameter(
                "size",
                "Pool must hold at least one element",
            ));
        }

        if elt_size == 0 {
            return Err(PoolBridgeError::invalid_parameter(
                "elt_size",
                "Element size cannot be zero",
            ));
        }

        if cache_size > CACHE_MAX_SIZE || cache_flush_threshold(cache_size) > size as usize {
            return Err(PoolBridgeError::invalid_parameter(
                "cache_size",
                format!(
                    "Cache of {} does not fit a pool of {} (max {})",
                    cache_size, size, CACHE_MAX_SIZE
                ),
            ));
        }

        if private_data_size < std::mem::size_of::<PoolPrivate>() {
            return Err(PoolBridgeError::invalid_parameter(
                "private_data_size",
                "Private area too small for the element layout",
            ));
        }

        Ok(Self {
            id: HandleId::new(tag, variant),
            name,
            size,
            elt_size,
            cache_size,
            private_data_size,
            socket_id,
            private: PoolPrivate::default(),
            elt_list: Vec::with_capacity(size as usize),
            mem_list: Vec::new(),
            populated_size: 0,
            ops: None,
        })
    }

    /// Attach the operation set registered under `name`
    pub fn set_ops_byname(&mut self, table: &OpsTable, name: &str) -> Result<()> {
        let ops = table.find(name).ok_or_else(|| PoolBridgeError::UnknownOps {
            name: name.to_string(),
        })?;
        self.ops = Some(Arc::clone(ops));
        Ok(())
    }

    /// Element-layout initializer: record data room and header sizes and
    /// check they fit the element size
    pub fn pktmbuf_pool_init(&mut self, private: PoolPrivate) -> Result<()> {
        let needed =
            NATIVE_OBJECT_SIZE + private.priv_size as usize + private.data_room_size as usize;
        if needed > self.elt_size {
            return Err(PoolBridgeError::invalid_parameter(
                "data_room_size",
                format!(
                    "Element of {} bytes cannot hold {} bytes of object, header and data",
                    self.elt_size, needed
                ),
            ));
        }
        self.private = private;
        Ok(())
    }

    /// Register one more element
    pub fn push_element(&mut self, obj: ObjectRef) -> Result<()> {
        if self.populated_size >= self.size {
            return Err(PoolBridgeError::invalid_parameter(
                "populated_size",
                format!("Pool '{}' is already fully populated", self.name),
            ));
        }
        self.elt_list.push(obj);
        self.populated_size += 1;
        Ok(())
    }

    /// Register a memory chunk
    pub fn push_memory_chunk(&mut self, chunk: MemoryChunk) {
        self.mem_list.push(chunk);
    }

    /// Call `f` on every registered element, returns the number visited
    pub fn obj_iter(&self, mut f: impl FnMut(&PoolHandle, ObjectRef, usize)) -> usize {
        for (i, &obj) in self.elt_list.iter().enumerate() {
            f(self, obj, i);
        }
        self.elt_list.len()
    }

    /// Handle identity
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Partition tag
    pub fn tag(&self) -> u8 {
        self.id.tag()
    }

    /// Handle variant
    pub fn variant(&self) -> PoolVariant {
        self.id.variant()
    }

    /// Pool name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Capacity in elements
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Bytes per element
    pub fn elt_size(&self) -> usize {
        self.elt_size
    }

    /// Per-core cache size
    pub fn cache_size(&self) -> usize {
        self.cache_size
    }

    /// Bytes of pool-private area
    pub fn private_data_size(&self) -> usize {
        self.private_data_size
    }

    /// NUMA socket
    pub fn socket_id(&self) -> u32 {
        self.socket_id
    }

    /// Element layout
    pub fn private(&self) -> PoolPrivate {
        self.private
    }

    /// Registered elements
    pub fn elements(&self) -> &[ObjectRef] {
        &self.elt_list
    }

    /// Registered memory chunks
    pub fn memory_chunks(&self) -> &[MemoryChunk] {
        &self.mem_list
    }

    /// Number of registered memory chunks
    pub fn nb_mem_chunks(&self) -> usize {
        self.mem_list.len()
    }

    /// Number of registered elements
    pub fn populated_size(&self) -> u32 {
        self.populated_size
    }

    /// Name of the attached operation set
    pub fn ops_name(&self) -> Option<&'static str> {
        self.ops.as_ref().map(|ops| ops.name())
    }

    fn ops(&self) -> Result<&Arc<dyn PoolOps>> {
        self.ops.as_ref().ok_or_else(|| PoolBridgeError::UnknownOps {
            name: format!("<none attached to {}>", self.name),
        })
    }

    /// Construct hook of the attached operation set
    pub fn alloc(&self) -> Result<()> {
        self.ops()?.alloc(self)
    }

    /// Destruct hook of the attached operation set
    pub fn free(&self) -> Result<()> {
        self.ops()?.free(self);
        Ok(())
    }

    /// Available-object count as reported by the operation set
    pub fn count(&self, ctx: &PoolBridge) -> Result<usize> {
        Ok(self.ops()?.get_count(ctx, self))
    }

    /// Return objects to the pool
    pub fn enqueue_bulk(&self, ctx: &PoolBridge, objs: &[ObjectRef]) -> Result<()> {
        self.ops()?.enqueue(ctx, self, objs)
    }

    /// Fill `objs` with objects from the pool, all or nothing
    pub fn dequeue_bulk(&self, ctx: &PoolBridge, objs: &mut [ObjectRef]) -> Result<()> {
        self.ops()?.dequeue(ctx, self, objs)
    }
}

impl fmt::Debug for PoolHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("size", &self.size)
            .field("elt_size", &self.elt_size)
            .field("cache_size", &self.cache_size)
            .field("socket_id", &self.socket_id)
            .field("private", &self.private)
            .field("populated_size", &self.populated_size)
            .field("nb_mem_chunks", &self.mem_list.len())
            .field("ops", &self.ops_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(size: u32, cache_size: usize) -> Result<PoolHandle> {
        PoolHandle::create_empty("test pool", 4, PoolVariant::Cached, size, 2432, cache_size, 64, 0)
    }

    #[test]
    fn test_handle_id_encoding() {
        for tag in [0u8, 1, 127, 255] {
            for variant in [PoolVariant::Cached, PoolVariant::NonCached] {
                let id = HandleId::new(tag, variant);
                assert_eq!(id.tag(), tag);
                assert_eq!(id.variant(), variant);
            }
        }
        assert_ne!(
            HandleId::new(3, PoolVariant::Cached),
            HandleId::new(3, PoolVariant::NonCached)
        );
    }

    #[test]
    fn test_create_empty_validation() {
        assert!(handle(1024, 512).is_ok());
        assert!(handle(0, 0).is_err());
        // cache flush threshold exceeds pool size
        assert!(handle(8, 512).is_err());
        assert!(handle(8, 5).is_ok());
        assert!(handle(8, 6).is_err());
        assert!(handle(4096, 513).is_err());

        let long = "x".repeat(POOL_NAMESIZE + 1);
        assert!(
            PoolHandle::create_empty(long, 0, PoolVariant::Cached, 8, 64, 0, 64, 0).is_err()
        );
    }

    #[test]
    fn test_populate_limit() {
        let mut h = handle(2, 0).unwrap();
        assert!(h.push_element(ObjectRef::from_address(0x40)).is_ok());
        assert!(h.push_element(ObjectRef::from_address(0x80)).is_ok());
        assert!(h.push_element(ObjectRef::from_address(0xc0)).is_err());
        assert_eq!(h.populated_size(), 2);
        assert_eq!(h.obj_iter(|_, _, _| {}), 2);
    }

    #[test]
    fn test_pool_init_checks_element_size() {
        let mut h = handle(8, 0).unwrap();
        let fits = PoolPrivate {
            data_room_size: 2176,
            priv_size: 128,
        };
        assert!(h.pktmbuf_pool_init(fits).is_ok());
        assert_eq!(h.private(), fits);

        let too_big = PoolPrivate {
            data_room_size: 4096,
            priv_size: 128,
        };
        assert!(h.pktmbuf_pool_init(too_big).is_err());
    }

    #[test]
    fn test_no_ops_attached() {
        let h = handle(8, 0).unwrap();
        assert!(h.ops_name().is_none());
        assert!(matches!(h.alloc(), Err(PoolBridgeError::UnknownOps { .. })));
    }
}
