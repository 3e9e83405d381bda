//! Pool bridge configuration

use serde::{Deserialize, Serialize};

use crate::{
    dma::IovaMode,
    engine::{CACHE_MAX_SIZE, POOL_NAMESIZE},
    error::{PoolBridgeError, Result},
};

/// Default per-core cache of the cached handle
pub const DEFAULT_CACHE_SIZE: usize = 512;

/// Default pool name prefix
pub const DEFAULT_NAME_PREFIX: &str = "bridge pool";

/// Longest suffix appended to the prefix: " 255 (no cache)"
const NAME_SUFFIX_MAX: usize = 15;

/// Configuration of the pool bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Prefix of every pool handle name
    pub name_prefix: String,
    /// Per-core cache requested for the cached handle
    pub cache_size: usize,
    /// Pin the IOVA mode instead of detecting it
    pub iova_mode: Option<IovaMode>,
    /// Attempt DMA mapping of partition memory
    pub dma_map: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
            cache_size: DEFAULT_CACHE_SIZE,
            iova_mode: None,
            dma_map: true,
        }
    }
}

impl BridgeConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the name prefix
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    /// Set the cache size
    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size;
        self
    }

    /// Pin the IOVA mode
    pub fn with_iova_mode(mut self, mode: IovaMode) -> Self {
        self.iova_mode = Some(mode);
        self
    }

    /// Enable or disable DMA mapping
    pub fn with_dma_map(mut self, enable: bool) -> Self {
        self.dma_map = enable;
        self
    }

    /// Cache size for a cached handle of `capacity` elements, clamped so
    /// the cache flush threshold never exceeds the capacity
    pub fn cache_size_for(&self, capacity: usize) -> usize {
        self.cache_size.min(capacity * 2 / 3)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.name_prefix.is_empty() {
            return Err(PoolBridgeError::invalid_parameter(
                "name_prefix",
                "Name prefix cannot be empty",
            ));
        }

        if self.name_prefix.len() + NAME_SUFFIX_MAX > POOL_NAMESIZE {
            return Err(PoolBridgeError::invalid_parameter(
                "name_prefix",
                format!(
                    "Name prefix must be at most {} bytes",
                    POOL_NAMESIZE - NAME_SUFFIX_MAX
                ),
            ));
        }

        if self.cache_size > CACHE_MAX_SIZE {
            return Err(PoolBridgeError::invalid_parameter(
                "cache_size",
                format!("Cache size cannot exceed {}", CACHE_MAX_SIZE),
            ));
        }

        Ok(())
    }
}
