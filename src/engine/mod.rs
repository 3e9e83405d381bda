//! Pool engine model
//!
//! Handles, per-object headers, memory chunks and the named operation sets
//! a handle dispatches its bulk calls to.

pub mod handle;
pub mod native;
pub mod object;
pub mod ops;

pub use handle::{HandleId, PoolHandle, PoolPrivate, PoolVariant, CACHE_MAX_SIZE, POOL_NAMESIZE};
pub use native::{NativeObject, NATIVE_OBJECT_SIZE, PKTMBUF_HEADROOM};
pub use object::{MemoryChunk, ObjectHeader, ObjectRef, OBJECT_HEADER_SPACE};
pub use ops::{OpsTable, PoolOps};
