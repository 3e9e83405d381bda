//! Pool bridge
//!
//! Registers two engine pool handles per started buffer partition: a cached
//! handle that allocates and exclusively releases, and a non-cached handle
//! that releases shared buffers once their last reference is dropped. Both
//! handles describe the same objects; every object is owned by the cached
//! handle.

pub mod cached;
pub mod context;
mod init;
pub mod non_cached;
pub mod objects;
pub mod stats;

pub use cached::{CachedOps, BATCH_SIZE, CACHED_OPS_NAME};
pub use context::{PoolBridge, PoolPair};
pub use non_cached::{NonCachedOps, NON_CACHED_OPS_NAME};
pub use objects::{ObjectView, EXT_HEADER_SIZE};
pub use stats::{AtomicBridgeStats, BridgeStats};
