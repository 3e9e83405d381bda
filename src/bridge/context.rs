//! Bridge context: the registry of every partition's pool handles

use std::sync::Arc;

use log::{debug, info};

use crate::{
    buffers::{BufferHeader, BufferMain, BufferPoolPartition},
    config::BridgeConfig,
    dma::{self, DmaMapper, IovaMode},
    engine::{
        HandleId, NativeObject, ObjectHeader, ObjectRef, OpsTable, PoolHandle, PoolVariant,
        PKTMBUF_HEADROOM,
    },
    error::{PoolBridgeError, Result},
};

use super::{
    cached::CachedOps,
    init::{init_partition, InitContext},
    non_cached::NonCachedOps,
    objects::{ObjectView, EXT_HEADER_SIZE},
    stats::{AtomicBridgeStats, BridgeStats},
};

/// The two handles registered for one partition
#[derive(Debug)]
pub struct PoolPair {
    cached: PoolHandle,
    non_cached: PoolHandle,
    stats: AtomicBridgeStats,
}

impl PoolPair {
    pub(super) fn new(cached: PoolHandle, non_cached: PoolHandle) -> Self {
        Self {
            cached,
            non_cached,
            stats: AtomicBridgeStats::new(),
        }
    }

    /// Handle used for allocation and exclusive release
    pub fn cached(&self) -> &PoolHandle {
        &self.cached
    }

    /// Handle used for shared release
    pub fn non_cached(&self) -> &PoolHandle {
        &self.non_cached
    }

    /// Handle of the given variant
    pub fn handle(&self, variant: PoolVariant) -> &PoolHandle {
        match variant {
            PoolVariant::Cached => &self.cached,
            PoolVariant::NonCached => &self.non_cached,
        }
    }

    /// Live counters of this partition
    pub fn stats(&self) -> &AtomicBridgeStats {
        &self.stats
    }
}

/// Adapter between the buffer subsystem and the pool engine.
///
/// Built once, before any worker runs, then shared by reference. Every
/// bulk operation receives the bridge so the operation sets can reach the
/// partition behind a handle's tag.
#[derive(Debug)]
pub struct PoolBridge {
    buffer_main: Arc<BufferMain>,
    config: BridgeConfig,
    iova_mode: IovaMode,
    ops: OpsTable,
    /// Indexed by partition; `None` for unstarted partitions
    pools: Vec<Option<PoolPair>>,
}

impl PoolBridge {
    /// Register a cached and a non-cached handle for every started partition
    pub fn new(
        buffer_main: Arc<BufferMain>,
        config: BridgeConfig,
        dma: &dyn DmaMapper,
    ) -> Result<Self> {
        config.validate()?;

        if buffer_main.ext_header_size() != EXT_HEADER_SIZE {
            return Err(PoolBridgeError::invalid_parameter(
                "ext_header_size",
                format!(
                    "Buffer subsystem reserves {} external header bytes, the bridge needs {}",
                    buffer_main.ext_header_size(),
                    EXT_HEADER_SIZE
                ),
            ));
        }

        if buffer_main.pre_data_size() != PKTMBUF_HEADROOM as usize {
            return Err(PoolBridgeError::invalid_parameter(
                "pre_data_size",
                format!(
                    "Pre-data area of {} bytes does not match the engine headroom of {}",
                    buffer_main.pre_data_size(),
                    PKTMBUF_HEADROOM
                ),
            ));
        }

        let iova_mode = config.iova_mode.unwrap_or_else(IovaMode::detect);

        let mut ops = OpsTable::new();
        ops.register(Arc::new(CachedOps))?;
        ops.register(Arc::new(NonCachedOps))?;

        let init = InitContext {
            buffer_main: &buffer_main,
            config: &config,
            ops: &ops,
            iova_mode,
            dma,
        };

        let mut pools = Vec::with_capacity(buffer_main.partitions().len());
        for partition in buffer_main.partitions() {
            if !partition.is_started() {
                debug!(
                    "partition {} '{}' not started, no pool handles",
                    partition.index(),
                    partition.name()
                );
                pools.push(None);
                continue;
            }
            pools.push(Some(init_partition(&init, partition)?));
        }

        info!(
            "pool bridge up: {} of {} partitions registered, IOVA mode {}",
            pools.iter().filter(|pair| pair.is_some()).count(),
            pools.len(),
            iova_mode.name()
        );

        Ok(Self {
            buffer_main,
            config,
            iova_mode,
            ops,
            pools,
        })
    }

    /// Bridge with default configuration and the best available DMA mapper
    pub fn with_defaults(buffer_main: Arc<BufferMain>) -> Result<Self> {
        let mapper = dma::probe();
        Self::new(buffer_main, BridgeConfig::default(), mapper.as_ref())
    }

    /// Buffer subsystem behind the bridge
    pub fn buffer_main(&self) -> &Arc<BufferMain> {
        &self.buffer_main
    }

    /// Configuration the bridge was built with
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// IOVA mode used for object headers and memory chunks
    pub fn iova_mode(&self) -> IovaMode {
        self.iova_mode
    }

    /// Registered operation sets
    pub fn ops_table(&self) -> &OpsTable {
        &self.ops
    }

    /// Partition by tag
    pub fn partition(&self, tag: u8) -> Result<&BufferPoolPartition> {
        self.buffer_main.partition(tag)
    }

    /// Handles of partition `tag`
    pub fn pool_pair(&self, tag: u8) -> Result<&PoolPair> {
        self.pools
            .get(tag as usize)
            .and_then(Option::as_ref)
            .ok_or(PoolBridgeError::UnknownPool {
                index: tag as usize,
            })
    }

    /// Every registered pair with its partition tag
    pub fn pool_pairs(&self) -> impl Iterator<Item = (u8, &PoolPair)> {
        self.pools
            .iter()
            .enumerate()
            .filter_map(|(tag, pair)| pair.as_ref().map(|pair| (tag as u8, pair)))
    }

    /// Cached handle of partition `tag`
    pub fn cached(&self, tag: u8) -> Result<&PoolHandle> {
        self.pool_pair(tag).map(PoolPair::cached)
    }

    /// Non-cached handle of partition `tag`
    pub fn non_cached(&self, tag: u8) -> Result<&PoolHandle> {
        self.pool_pair(tag).map(PoolPair::non_cached)
    }

    /// Handle by identity
    pub fn handle(&self, id: HandleId) -> Result<&PoolHandle> {
        self.pool_pair(id.tag()).map(|pair| pair.handle(id.variant()))
    }

    /// Fill `objs` from the pool behind `id`, all or nothing
    pub fn dequeue(&self, id: HandleId, objs: &mut [ObjectRef]) -> Result<()> {
        self.handle(id)?.dequeue_bulk(self, objs)
    }

    /// Return `objs` through the pool behind `id`
    pub fn enqueue(&self, id: HandleId, objs: &[ObjectRef]) -> Result<()> {
        self.handle(id)?.enqueue_bulk(self, objs)
    }

    /// Available-object count reported by the pool behind `id`
    pub fn count(&self, id: HandleId) -> Result<usize> {
        self.handle(id)?.count(self)
    }

    /// Object view of a registered partition
    pub fn objects(&self, tag: u8) -> Result<ObjectView<'_>> {
        self.pool_pair(tag)?;
        ObjectView::new(self.partition(tag)?)
    }

    /// Buffer header behind `obj`
    pub fn buffer_header(&self, tag: u8, obj: ObjectRef) -> Result<&BufferHeader> {
        let view = self.objects(tag)?;
        let index = view.index_of(obj)?;
        view.buffer_header(index)
            .ok_or_else(|| PoolBridgeError::invalid_object(tag, obj.address()))
    }

    /// Object header in front of `obj`
    pub fn object_header(&self, tag: u8, obj: ObjectRef) -> Result<&ObjectHeader> {
        let view = self.objects(tag)?;
        let index = view.index_of(obj)?;
        view.object_header(index)
            .ok_or_else(|| PoolBridgeError::invalid_object(tag, obj.address()))
    }

    /// Native object `obj` refers to
    pub fn native_object(&self, tag: u8, obj: ObjectRef) -> Result<&NativeObject> {
        let view = self.objects(tag)?;
        let index = view.index_of(obj)?;
        view.native(index)
            .ok_or_else(|| PoolBridgeError::invalid_object(tag, obj.address()))
    }

    /// Counter snapshot of partition `tag`
    pub fn stats(&self, tag: u8) -> Result<BridgeStats> {
        self.pool_pair(tag).map(|pair| pair.stats().snapshot())
    }
}
