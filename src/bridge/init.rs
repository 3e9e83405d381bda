//! Per-partition bring-up of the two pool handles

use log::{debug, info, warn};

use crate::{
    buffers::{BufferMain, BufferPoolPartition, BUFFER_HEADER_SIZE},
    config::BridgeConfig,
    dma::{DmaMapper, IovaMode},
    engine::{
        MemoryChunk, ObjectHeader, OpsTable, PoolHandle, PoolPrivate, PoolVariant,
        NATIVE_OBJECT_SIZE,
    },
    error::{PoolBridgeError, Result},
};

use super::{
    cached::CACHED_OPS_NAME,
    context::PoolPair,
    non_cached::NON_CACHED_OPS_NAME,
    objects::ObjectView,
};

/// Everything partition bring-up reads from the bridge under construction
pub(super) struct InitContext<'a> {
    pub buffer_main: &'a BufferMain,
    pub config: &'a BridgeConfig,
    pub ops: &'a OpsTable,
    pub iova_mode: IovaMode,
    pub dma: &'a dyn DmaMapper,
}

/// Build both handles of a started partition. Any failure is fatal for the
/// whole bridge.
pub(super) fn init_partition(
    ctx: &InitContext<'_>,
    partition: &BufferPoolPartition,
) -> Result<PoolPair> {
    let tag = partition.index();
    let fatal = |e: PoolBridgeError| match e {
        PoolBridgeError::FatalInit { .. } => e,
        other => PoolBridgeError::fatal_init(tag, other.to_string()),
    };

    let view = ObjectView::new(partition).map_err(fatal)?;
    let capacity = partition.buffer_count() as u32;
    let data_room = ctx.buffer_main.pre_data_size() + partition.data_size();
    let elt_size = NATIVE_OBJECT_SIZE + BUFFER_HEADER_SIZE + data_room;
    let private = PoolPrivate {
        data_room_size: u16::try_from(data_room).map_err(|_| {
            PoolBridgeError::fatal_init(
                tag,
                format!("Data room of {} bytes does not fit the engine", data_room),
            )
        })?,
        priv_size: BUFFER_HEADER_SIZE as u16,
    };

    let mut cached = new_handle(
        ctx,
        partition,
        format!("{} {}", ctx.config.name_prefix, tag),
        PoolVariant::Cached,
        elt_size,
        ctx.config.cache_size_for(capacity as usize),
        CACHED_OPS_NAME,
        private,
    )
    .map_err(fatal)?;

    let mut non_cached = new_handle(
        ctx,
        partition,
        format!("{} {} (no cache)", ctx.config.name_prefix, tag),
        PoolVariant::NonCached,
        elt_size,
        0,
        NON_CACHED_OPS_NAME,
        private,
    )
    .map_err(fatal)?;

    // Object headers: every object is owned by the cached handle
    for &bi in partition.buffers() {
        let obj = view
            .object_ref(bi)
            .ok_or_else(|| PoolBridgeError::fatal_init(tag, format!("No slot for buffer {}", bi)))?;
        let iova = match ctx.iova_mode {
            IovaMode::Va => obj.address() as u64,
            IovaMode::Pa => ctx
                .buffer_main
                .physmem_get_pa(tag, obj.address())
                .map_err(fatal)?,
        };

        // SAFETY: bring-up has exclusive access; nothing has been handed out yet
        let header = unsafe { view.object_header_mut(bi) }
            .ok_or_else(|| PoolBridgeError::invalid_object(tag, obj.address()))
            .map_err(fatal)?;
        *header = ObjectHeader {
            owner: cached.id(),
            iova,
        };

        cached.push_element(obj).map_err(fatal)?;
        non_cached.push_element(obj).map_err(fatal)?;
    }

    // Native objects, initialised against the cached handle only
    cached.obj_iter(|pool, obj, _| {
        let Ok(bi) = view.index_of(obj) else {
            return;
        };
        let iova = view
            .object_header(bi)
            .map(|header| header.iova)
            .unwrap_or(obj.address() as u64);
        // SAFETY: as above
        if let Some(native) = unsafe { view.native_mut(bi) } {
            native.init(pool, obj.address(), iova);
        }
    });

    for &bi in partition.buffers() {
        // SAFETY: as above
        unsafe {
            partition.copy_template(bi);
        }
    }

    if ctx.config.dma_map && ctx.dma.device_count() > 0 {
        register_memory_chunks(ctx, partition, &mut cached).map_err(fatal)?;
    }

    info!(
        "partition {} '{}': pools '{}' and '{}', {} objects of {} bytes, cache {}, {} memory chunks",
        tag,
        partition.name(),
        cached.name(),
        non_cached.name(),
        cached.populated_size(),
        elt_size,
        cached.cache_size(),
        cached.nb_mem_chunks()
    );

    Ok(PoolPair::new(cached, non_cached))
}

#[allow(clippy::too_many_arguments)]
fn new_handle(
    ctx: &InitContext<'_>,
    partition: &BufferPoolPartition,
    name: String,
    variant: PoolVariant,
    elt_size: usize,
    cache_size: usize,
    ops_name: &str,
    private: PoolPrivate,
) -> Result<PoolHandle> {
    let mut handle = PoolHandle::create_empty(
        name,
        partition.index(),
        variant,
        partition.buffer_count() as u32,
        elt_size,
        cache_size,
        std::mem::size_of::<PoolPrivate>(),
        partition.numa_node(),
    )?;
    handle.set_ops_byname(ctx.ops, ops_name)?;
    handle.pktmbuf_pool_init(private)?;
    handle.alloc()?;
    debug!("created {:?}", handle);
    Ok(handle)
}

/// Map every page of the partition for DMA and record it as a memory chunk
/// of the cached handle. Mapping stops for the partition after the first
/// failure; chunks are still recorded.
fn register_memory_chunks(
    ctx: &InitContext<'_>,
    partition: &BufferPoolPartition,
    cached: &mut PoolHandle,
) -> Result<()> {
    let map = ctx.buffer_main.partition_physmem_map(partition.index())?;
    let page_size = map.page_size();
    let owner = cached.id();
    let mut do_map = true;

    for page in 0..map.n_pages() {
        let (Some(va), Some(pa)) = (map.page_va(page), map.page_pa(page)) else {
            continue;
        };
        let iova = match ctx.iova_mode {
            IovaMode::Va => va as u64,
            IovaMode::Pa => pa,
        };

        if do_map {
            if let Err(e) = ctx.dma.map(va, iova, page_size) {
                warn!(
                    "partition {}: DMA mapping failed ({}), assuming no IOMMU support",
                    partition.index(),
                    e
                );
                do_map = false;
            }
        }

        cached.push_memory_chunk(MemoryChunk {
            owner,
            addr: va,
            iova,
            len: page_size,
        });
    }

    Ok(())
}
