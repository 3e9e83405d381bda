//! Buffer subsystem root: every partition and its physical memory map

use log::info;

use crate::error::{PoolBridgeError, Result};

use super::{
    config::BufferMainConfig,
    header::BufferTemplate,
    partition::BufferPoolPartition,
    physmem::PhysmemMap,
};

/// Owner of all buffer partitions
#[derive(Debug)]
pub struct BufferMain {
    config: BufferMainConfig,
    partitions: Vec<BufferPoolPartition>,
    physmem_maps: Vec<PhysmemMap>,
}

impl BufferMain {
    /// Create every configured partition and resolve its physical memory map
    pub fn new(config: BufferMainConfig) -> Result<Self> {
        config.validate()?;

        let mut partitions = Vec::with_capacity(config.partitions.len());
        let mut physmem_maps = Vec::new();

        for (index, partition_config) in config.partitions.iter().enumerate() {
            let map_index = physmem_maps.len() as u32;
            let partition = BufferPoolPartition::new(
                index as u8,
                partition_config,
                config.ext_header_size,
                config.log2_page_size,
                map_index,
            )?;

            if let Some(arena) = partition.arena() {
                physmem_maps.push(PhysmemMap::from_region(
                    map_index,
                    arena.base_address(),
                    arena.size(),
                    config.log2_page_size,
                ));
            }

            partitions.push(partition);
        }

        info!(
            "buffer subsystem ready: {} partitions, {} physmem maps",
            partitions.len(),
            physmem_maps.len()
        );

        Ok(Self {
            config,
            partitions,
            physmem_maps,
        })
    }

    /// Configuration the subsystem was built from
    pub fn config(&self) -> &BufferMainConfig {
        &self.config
    }

    /// Bytes reserved in front of each buffer header
    pub fn ext_header_size(&self) -> usize {
        self.config.ext_header_size
    }

    /// Headroom in front of the packet data
    pub fn pre_data_size(&self) -> usize {
        self.config.pre_data_size
    }

    /// Default data size of a buffer
    pub fn default_data_size(&self) -> usize {
        self.config.default_data_size
    }

    /// All partitions
    pub fn partitions(&self) -> &[BufferPoolPartition] {
        &self.partitions
    }

    /// Partition by index
    pub fn partition(&self, index: u8) -> Result<&BufferPoolPartition> {
        self.partitions
            .get(index as usize)
            .ok_or(PoolBridgeError::UnknownPool {
                index: index as usize,
            })
    }

    /// Header template of a partition
    pub fn template(&self, index: u8) -> Result<&BufferTemplate> {
        self.partition(index).map(BufferPoolPartition::template)
    }

    /// Physical memory map by index
    pub fn physmem_map(&self, map_index: u32) -> Result<&PhysmemMap> {
        self.physmem_maps.get(map_index as usize).ok_or_else(|| {
            PoolBridgeError::invalid_parameter(
                "physmem_map_index",
                format!("No physmem map {}", map_index),
            )
        })
    }

    /// Physical memory map backing partition `index`
    pub fn partition_physmem_map(&self, index: u8) -> Result<&PhysmemMap> {
        let map_index = self.partition(index)?.physmem_map_index().ok_or_else(|| {
            PoolBridgeError::invalid_parameter(
                "partition",
                format!("Partition {} is not started and has no physmem map", index),
            )
        })?;
        self.physmem_map(map_index)
    }

    /// Physical address of `address` within the memory of partition `index`
    pub fn physmem_get_pa(&self, index: u8, address: usize) -> Result<u64> {
        self.partition_physmem_map(index)?
            .get_pa(address)
            .ok_or_else(|| PoolBridgeError::invalid_object(index, address))
    }
}
