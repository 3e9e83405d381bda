//! Buffer partition: a fixed set of same-size buffers and their free list

use std::sync::{Mutex, MutexGuard};

use log::debug;

use crate::error::Result;

use super::{
    arena::{BufferArena, SlotLayout},
    config::PartitionConfig,
    header::{BufferHeader, BufferTemplate},
};

/// A fixed-capacity group of same-size buffers
#[derive(Debug)]
pub struct BufferPoolPartition {
    /// Partition index, stamped into every buffer header
    index: u8,
    /// Partition name
    name: String,
    /// NUMA node of the backing memory
    numa_node: u32,
    /// Every buffer index owned by the partition
    buffers: Vec<u32>,
    /// Buffers currently free
    free: Mutex<Vec<u32>>,
    /// Header defaults
    template: BufferTemplate,
    /// Physical memory map backing the arena; `None` while unstarted
    physmem_map_index: Option<u32>,
    /// Slot storage; absent for unstarted partitions
    arena: Option<BufferArena>,
}

impl BufferPoolPartition {
    /// Create a partition and map its arena. A partition with zero buffers
    /// is created unstarted, maps nothing and claims no physmem map.
    pub fn new(
        index: u8,
        config: &PartitionConfig,
        ext_header_size: usize,
        log2_page_size: u32,
        physmem_map_index: u32,
    ) -> Result<Self> {
        let arena = if config.buffer_count > 0 {
            let layout = SlotLayout::new(ext_header_size, config.data_size);
            Some(BufferArena::new(config.buffer_count, layout, log2_page_size)?)
        } else {
            None
        };

        let buffers: Vec<u32> = (0..config.buffer_count).collect();
        // Hand out low indices first
        let free: Vec<u32> = buffers.iter().rev().copied().collect();

        debug!(
            "partition {} '{}': {} buffers of {} bytes on node {}",
            index, config.name, config.buffer_count, config.data_size, config.numa_node
        );

        Ok(Self {
            index,
            name: config.name.clone(),
            numa_node: config.numa_node,
            buffers,
            free: Mutex::new(free),
            template: BufferTemplate::for_partition(index),
            physmem_map_index: arena.is_some().then_some(physmem_map_index),
            arena,
        })
    }

    /// Partition index
    pub fn index(&self) -> u8 {
        self.index
    }

    /// Partition name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// NUMA node
    pub fn numa_node(&self) -> u32 {
        self.numa_node
    }

    /// Whether the partition has any buffers at all
    pub fn is_started(&self) -> bool {
        self.arena.is_some()
    }

    /// All buffer indices owned by this partition
    pub fn buffers(&self) -> &[u32] {
        &self.buffers
    }

    /// Number of buffers owned by this partition
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Data bytes per buffer
    pub fn data_size(&self) -> usize {
        self.arena
            .as_ref()
            .map(|arena| arena.layout().data_size())
            .unwrap_or(0)
    }

    /// Header template of this partition
    pub fn template(&self) -> &BufferTemplate {
        &self.template
    }

    /// Index of the physical memory map backing this partition
    pub fn physmem_map_index(&self) -> Option<u32> {
        self.physmem_map_index
    }

    /// Slot storage, if started
    pub fn arena(&self) -> Option<&BufferArena> {
        self.arena.as_ref()
    }

    /// Number of buffers currently free
    pub fn available(&self) -> usize {
        self.free_list().len()
    }

    /// Take up to `indices.len()` free buffers, writing their indices into
    /// the front of `indices`. Returns how many were taken; may be fewer
    /// than requested.
    pub fn alloc(&self, indices: &mut [u32]) -> usize {
        let mut free = self.free_list();
        let n = indices.len().min(free.len());
        let start = free.len() - n;
        indices[..n].copy_from_slice(&free[start..]);
        free.truncate(start);
        n
    }

    /// Return buffers to the free list
    pub fn release(&self, indices: &[u32]) {
        debug_assert!(
            indices.iter().all(|&bi| (bi as usize) < self.buffers.len()),
            "releasing buffer outside partition {}",
            self.index
        );
        let mut free = self.free_list();
        debug_assert!(
            free.len() + indices.len() <= self.buffers.len(),
            "partition {} free list overflow",
            self.index
        );
        free.extend_from_slice(indices);
    }

    /// Buffer header of buffer `index`
    pub fn header(&self, index: u32) -> Option<&BufferHeader> {
        self.arena.as_ref()?.header(index)
    }

    /// Copy the template onto buffer `index`
    ///
    /// # Safety
    /// The caller must hold the buffer exclusively.
    pub unsafe fn copy_template(&self, index: u32) -> bool {
        match self.arena.as_ref().and_then(|arena| arena.header_mut(index)) {
            Some(header) => {
                self.template.apply(header);
                true
            }
            None => false,
        }
    }

    fn free_list(&self) -> MutexGuard<'_, Vec<u32>> {
        // The list is always left consistent, so a poisoned lock is still usable
        self.free.lock().unwrap_or_else(|e| e.into_inner())
    }
}
