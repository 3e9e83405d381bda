//! # poolbridge - packet buffer pools behind a pool engine
//!
//! poolbridge lets an object-pool engine draw its objects from an existing
//! packet-buffer subsystem. Each buffer partition is registered with the
//! engine as two pool handles over the same memory: a cached handle for
//! allocation and exclusive release, and a non-cached handle for releasing
//! buffers whose reference count may be above one.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                  Pool engine                     │
//! │   PoolHandle "<prefix> N"   "<prefix> N (no cache)"
//! │        │ CachedOps                │ NonCachedOps │
//! ├────────┼──────────────────────────┼──────────────┤
//! │        ▼        PoolBridge        ▼              │
//! │   batch dequeue / enqueue    shared release      │
//! ├──────────────────────────────────────────────────┤
//! │  BufferMain: partitions, free lists, templates,  │
//! │  physmem maps                                    │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! Every buffer slot is laid out as
//! `| ObjectHeader | NativeObject | BufferHeader | pre-data | data |`.

// Core modules
pub mod error;
pub mod config;
pub mod buffers;
pub mod engine;
pub mod dma;
pub mod bridge;

// Main API re-exports
pub use bridge::{
    AtomicBridgeStats, BridgeStats, CachedOps, NonCachedOps, ObjectView, PoolBridge, PoolPair,
    BATCH_SIZE, EXT_HEADER_SIZE,
};
pub use buffers::{
    BufferHeader, BufferMain, BufferMainConfig, BufferMainConfigBuilder, BufferPoolPartition,
    BufferTemplate, PartitionConfig,
};
pub use config::BridgeConfig;
pub use dma::{DmaMapper, IovaMode, NoDevices, VfioContainer};
pub use engine::{
    HandleId, MemoryChunk, NativeObject, ObjectHeader, ObjectRef, OpsTable, PoolHandle, PoolOps,
    PoolVariant,
};
pub use error::{PoolBridgeError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
