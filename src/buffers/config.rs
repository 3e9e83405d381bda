//! Buffer subsystem configuration

use serde::{Deserialize, Serialize};

use crate::error::{PoolBridgeError, Result};

use super::header::PRE_DATA_SIZE;

/// Default data bytes per buffer
pub const DEFAULT_DATA_SIZE: usize = 2048;

/// Partitions are indexed by a `u8` in every buffer header
pub const MAX_PARTITIONS: usize = 256;

/// Configuration of a single buffer partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionConfig {
    /// Name of the partition
    pub name: String,
    /// NUMA node the partition memory is placed on
    pub numa_node: u32,
    /// Number of buffers; zero leaves the partition unstarted
    pub buffer_count: u32,
    /// Data bytes per buffer
    pub data_size: usize,
}

impl PartitionConfig {
    /// Create a partition configuration with default data size on node 0
    pub fn new(name: impl Into<String>, buffer_count: u32) -> Self {
        Self {
            name: name.into(),
            numa_node: 0,
            buffer_count,
            data_size: DEFAULT_DATA_SIZE,
        }
    }

    /// Set NUMA node
    pub fn with_numa_node(mut self, numa_node: u32) -> Self {
        self.numa_node = numa_node;
        self
    }

    /// Set data size
    pub fn with_data_size(mut self, data_size: usize) -> Self {
        self.data_size = data_size;
        self
    }
}

/// Configuration for the whole buffer subsystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferMainConfig {
    /// Partitions, indexed by position
    pub partitions: Vec<PartitionConfig>,
    /// Default data size reported to consumers
    pub default_data_size: usize,
    /// Log2 of the page size backing partition memory
    pub log2_page_size: u32,
    /// Bytes reserved in front of each buffer header for a consumer
    pub ext_header_size: usize,
    /// Headroom in front of the packet data
    pub pre_data_size: usize,
}

impl Default for BufferMainConfig {
    fn default() -> Self {
        Self {
            partitions: Vec::new(),
            default_data_size: DEFAULT_DATA_SIZE,
            log2_page_size: 12,
            ext_header_size: 0,
            pre_data_size: PRE_DATA_SIZE,
        }
    }
}

impl BufferMainConfig {
    /// Add a partition
    pub fn with_partition(mut self, partition: PartitionConfig) -> Self {
        self.partitions.push(partition);
        self
    }

    /// Set page size
    pub fn with_log2_page_size(mut self, log2_page_size: u32) -> Self {
        self.log2_page_size = log2_page_size;
        self
    }

    /// Reserve external header bytes in every slot
    pub fn with_ext_header_size(mut self, ext_header_size: usize) -> Self {
        self.ext_header_size = ext_header_size;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.partitions.is_empty() {
            return Err(PoolBridgeError::invalid_parameter(
                "partitions",
                "At least one partition is required",
            ));
        }

        if self.partitions.len() > MAX_PARTITIONS {
            return Err(PoolBridgeError::invalid_parameter(
                "partitions",
                format!("At most {} partitions are supported", MAX_PARTITIONS),
            ));
        }

        if !matches!(self.log2_page_size, 12 | 16 | 21 | 30) {
            return Err(PoolBridgeError::invalid_parameter(
                "log2_page_size",
                "Page size must be 4K, 64K, 2M or 1G",
            ));
        }

        if self.default_data_size == 0 {
            return Err(PoolBridgeError::invalid_parameter(
                "default_data_size",
                "Default data size cannot be zero",
            ));
        }

        if self.pre_data_size != PRE_DATA_SIZE {
            return Err(PoolBridgeError::invalid_parameter(
                "pre_data_size",
                format!("Pre-data size must be {} bytes", PRE_DATA_SIZE),
            ));
        }

        for partition in &self.partitions {
            if partition.name.is_empty() {
                return Err(PoolBridgeError::invalid_parameter(
                    "name",
                    "Partition name cannot be empty",
                ));
            }
            if partition.buffer_count > 0 && partition.data_size == 0 {
                return Err(PoolBridgeError::invalid_parameter(
                    "data_size",
                    format!("Partition '{}' has zero data size", partition.name),
                ));
            }
        }

        Ok(())
    }
}

/// Builder pattern for buffer subsystem configuration
pub struct BufferMainConfigBuilder {
    config: BufferMainConfig,
}

impl BufferMainConfigBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            config: BufferMainConfig::default(),
        }
    }

    /// Add a partition with default data size
    pub fn partition(mut self, name: impl Into<String>, buffer_count: u32) -> Self {
        self.config
            .partitions
            .push(PartitionConfig::new(name, buffer_count));
        self
    }

    /// Add a fully specified partition
    pub fn partition_config(mut self, partition: PartitionConfig) -> Self {
        self.config.partitions.push(partition);
        self
    }

    /// Set default data size
    pub fn default_data_size(mut self, size: usize) -> Self {
        self.config.default_data_size = size;
        self
    }

    /// Set page size
    pub fn log2_page_size(mut self, log2_page_size: u32) -> Self {
        self.config.log2_page_size = log2_page_size;
        self
    }

    /// Reserve external header bytes
    pub fn ext_header_size(mut self, size: usize) -> Self {
        self.config.ext_header_size = size;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<BufferMainConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for BufferMainConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = BufferMainConfigBuilder::new()
            .partition("default", 1024)
            .partition_config(PartitionConfig::new("jumbo", 64).with_data_size(9216))
            .ext_header_size(192)
            .build()
            .unwrap();

        assert_eq!(config.partitions.len(), 2);
        assert_eq!(config.partitions[1].data_size, 9216);
        assert_eq!(config.ext_header_size, 192);
    }

    #[test]
    fn test_validation() {
        let mut config = BufferMainConfig::default();
        // No partitions should fail
        assert!(config.validate().is_err());

        config.partitions.push(PartitionConfig::new("p0", 8));
        assert!(config.validate().is_ok());

        config.log2_page_size = 13;
        assert!(config.validate().is_err());
        config.log2_page_size = 21;
        assert!(config.validate().is_ok());

        config.pre_data_size = 64;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unstarted_partition_may_have_no_data() {
        let config = BufferMainConfig::default()
            .with_partition(PartitionConfig::new("idle", 0).with_data_size(0));
        assert!(config.validate().is_ok());
    }
}
