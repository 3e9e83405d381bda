//! Packet buffer subsystem
//!
//! Fixed-capacity partitions of same-size buffers, each backed by one
//! memory-mapped arena with a physical memory map. Every buffer carries a
//! header whose templated fields are restored whenever it is freed.

pub mod arena;
pub mod buffer_main;
pub mod config;
pub mod header;
pub mod partition;
pub mod physmem;

// Re-export main types
pub use arena::{BufferArena, SlotLayout};
pub use buffer_main::BufferMain;
pub use config::{BufferMainConfig, BufferMainConfigBuilder, PartitionConfig};
pub use header::{BufferHeader, BufferTemplate, BUFFER_HEADER_SIZE, PRE_DATA_SIZE};
pub use partition::BufferPoolPartition;
pub use physmem::PhysmemMap;
