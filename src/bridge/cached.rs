//! Operation set of the cached handle: allocation and exclusive release

use log::{debug, error, trace};

use crate::{
    buffers::BufferTemplate,
    engine::{ObjectRef, PoolHandle, PoolOps},
    error::{PoolBridgeError, Result},
};

use super::{context::PoolBridge, objects::ObjectView};

/// Name the cached operation set is registered under
pub const CACHED_OPS_NAME: &str = "bridge";

/// Buffers moved between a partition and its handle per free-list call
pub const BATCH_SIZE: usize = 32;

/// Allocation and exclusive release against the partition free list
#[derive(Debug, Default, Clone, Copy)]
pub struct CachedOps;

impl PoolOps for CachedOps {
    fn name(&self) -> &'static str {
        CACHED_OPS_NAME
    }

    fn alloc(&self, pool: &PoolHandle) -> Result<()> {
        debug!("{}: construct, memory provided by the buffer subsystem", pool.name());
        Ok(())
    }

    fn free(&self, pool: &PoolHandle) {
        debug!("{}: destruct, nothing to release", pool.name());
    }

    fn get_count(&self, _ctx: &PoolBridge, pool: &PoolHandle) -> usize {
        // Per-core cache occupancy is not tracked here
        trace!("{}: count query answered with 0", pool.name());
        0
    }

    fn enqueue(&self, ctx: &PoolBridge, pool: &PoolHandle, objs: &[ObjectRef]) -> Result<()> {
        let pair = ctx.pool_pair(pool.tag())?;
        let view = ObjectView::new(ctx.partition(pool.tag())?)?;
        release_exclusive(&view, objs)?;
        pair.stats().record_enqueue(objs.len());
        Ok(())
    }

    fn dequeue(&self, ctx: &PoolBridge, pool: &PoolHandle, objs: &mut [ObjectRef]) -> Result<()> {
        if objs.is_empty() {
            return Ok(());
        }

        let pair = ctx.pool_pair(pool.tag())?;
        let view = ObjectView::new(ctx.partition(pool.tag())?)?;
        let partition = view.partition();
        let mut indices = [0u32; BATCH_SIZE];
        let mut done = 0;

        while done < objs.len() {
            let n = (objs.len() - done).min(BATCH_SIZE);
            let got = partition.alloc(&mut indices[..n]);

            let chunk = &mut objs[done..done + n];
            let translated = got == n
                && chunk
                    .iter_mut()
                    .zip(&indices[..n])
                    .all(|(slot, &bi)| match view.object_ref(bi) {
                        Some(obj) => {
                            *slot = obj;
                            true
                        }
                        None => false,
                    });

            if !translated {
                partition.release(&indices[..got]);
                let rolled_back = got + rollback(&view, &objs[..done]);
                pair.stats().record_dequeue_failure(rolled_back);
                debug!(
                    "{}: dequeue of {} failed after {}, {} buffers rolled back",
                    pool.name(),
                    objs.len(),
                    done,
                    rolled_back
                );
                return Err(PoolBridgeError::no_buffers(partition.index(), objs.len()));
            }

            done += n;
        }

        pair.stats().record_dequeue(objs.len());
        Ok(())
    }
}

/// Reset `objs` to the partition template and put them back on the free
/// list. Every object must be exclusively owned. Nothing is released unless
/// every object belongs to the partition.
pub(super) fn release_exclusive(view: &ObjectView<'_>, objs: &[ObjectRef]) -> Result<()> {
    let partition = view.partition();
    let template = partition.template();
    let indices = objs
        .iter()
        .map(|&obj| view.index_of(obj))
        .collect::<Result<Vec<u32>>>()?;

    let mut quads = indices.chunks_exact(4);
    for quad in &mut quads {
        reset_exclusive(view, template, quad[0]);
        reset_exclusive(view, template, quad[1]);
        reset_exclusive(view, template, quad[2]);
        reset_exclusive(view, template, quad[3]);
    }
    for &bi in quads.remainder() {
        reset_exclusive(view, template, bi);
    }

    for chunk in indices.chunks(BATCH_SIZE) {
        partition.release(chunk);
    }

    Ok(())
}

#[inline(always)]
fn reset_exclusive(view: &ObjectView<'_>, template: &BufferTemplate, bi: u32) {
    // SAFETY: exclusive release means the caller holds the only reference
    if let Some(header) = unsafe { view.buffer_header_mut(bi) } {
        debug_assert_eq!(
            header.buffer_pool_index,
            view.partition().index(),
            "buffer {} released to the wrong partition",
            bi
        );
        debug_assert_eq!(
            header.ref_count(),
            1,
            "buffer {} released while shared",
            bi
        );
        template.apply(header);
    }
}

/// Return the buffers of an aborted dequeue, returns how many went back
fn rollback(view: &ObjectView<'_>, objs: &[ObjectRef]) -> usize {
    let partition = view.partition();
    let mut indices = [0u32; BATCH_SIZE];
    let mut returned = 0;

    for chunk in objs.chunks(BATCH_SIZE) {
        let mut n = 0;
        for &obj in chunk {
            match view.index_of(obj) {
                Ok(bi) => {
                    indices[n] = bi;
                    n += 1;
                }
                Err(e) => error!("rollback skipped {:?}: {}", obj, e),
            }
        }
        partition.release(&indices[..n]);
        returned += n;
    }

    returned
}
