//! Operation set of the non-cached handle: shared release

use log::{debug, error};

use crate::{
    buffers::BufferTemplate,
    engine::{HandleId, ObjectRef, PoolHandle, PoolOps, PoolVariant},
    error::{PoolBridgeError, Result},
};

use super::{context::PoolBridge, objects::ObjectView};

/// Name the non-cached operation set is registered under
pub const NON_CACHED_OPS_NAME: &str = "bridge-no-cache";

/// Release of buffers that may still be referenced elsewhere. A buffer goes
/// back to its partition only when the last reference is dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct NonCachedOps;

impl PoolOps for NonCachedOps {
    fn name(&self) -> &'static str {
        NON_CACHED_OPS_NAME
    }

    fn alloc(&self, pool: &PoolHandle) -> Result<()> {
        debug!("{}: construct, memory provided by the buffer subsystem", pool.name());
        Ok(())
    }

    fn free(&self, pool: &PoolHandle) {
        debug!("{}: destruct, nothing to release", pool.name());
    }

    fn get_count(&self, ctx: &PoolBridge, pool: &PoolHandle) -> usize {
        ctx.cached(pool.tag())
            .and_then(|cached| cached.count(ctx))
            .unwrap_or(0)
    }

    fn enqueue(&self, ctx: &PoolBridge, pool: &PoolHandle, objs: &[ObjectRef]) -> Result<()> {
        let pair = ctx.pool_pair(pool.tag())?;
        let view = ObjectView::new(ctx.partition(pool.tag())?)?;
        let template = view.partition().template();
        let owner = HandleId::new(pool.tag(), PoolVariant::Cached);
        let indices = objs
            .iter()
            .map(|&obj| view.index_of(obj))
            .collect::<Result<Vec<u32>>>()?;
        let mut freed = 0;

        let mut quads = indices.chunks_exact(4);
        for quad in &mut quads {
            freed += release_shared(&view, template, owner, quad[0]) as usize;
            freed += release_shared(&view, template, owner, quad[1]) as usize;
            freed += release_shared(&view, template, owner, quad[2]) as usize;
            freed += release_shared(&view, template, owner, quad[3]) as usize;
        }
        for &bi in quads.remainder() {
            freed += release_shared(&view, template, owner, bi) as usize;
        }

        pair.stats().record_shared_release(objs.len(), freed);
        Ok(())
    }

    fn dequeue(&self, _ctx: &PoolBridge, pool: &PoolHandle, objs: &mut [ObjectRef]) -> Result<()> {
        error!(
            "{}: dequeue of {} objects on a release-only pool",
            pool.name(),
            objs.len()
        );
        Err(PoolBridgeError::unsupported("dequeue", pool.name()))
    }
}

/// Drop one reference to buffer `bi`. The caller that drops the last one
/// resets the buffer, hands its native object back to `owner` and frees it.
#[inline(always)]
fn release_shared(
    view: &ObjectView<'_>,
    template: &BufferTemplate,
    owner: HandleId,
    bi: u32,
) -> bool {
    let Some(header) = view.buffer_header(bi) else {
        return false;
    };
    if !header.release_ref() {
        return false;
    }

    // SAFETY: the 1 -> 0 transition leaves this caller as the only holder
    unsafe {
        if let Some(native) = view.native_mut(bi) {
            native.pool = owner;
        }
        if let Some(header) = view.buffer_header_mut(bi) {
            template.apply(header);
        }
    }
    view.partition().release(&[bi]);
    true
}
