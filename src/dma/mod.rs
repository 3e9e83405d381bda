//! DMA address handling: IOVA mode and IOMMU mappings

pub mod iova;
pub mod vfio;

use std::fmt;

use log::debug;

use crate::error::{PoolBridgeError, Result};

pub use iova::IovaMode;
pub use vfio::VfioContainer;

/// Maps memory for device DMA
pub trait DmaMapper: Send + Sync + fmt::Debug {
    /// Number of physical devices that may DMA into pool memory
    fn device_count(&self) -> usize;

    /// Make `[vaddr, vaddr + len)` reachable by devices at `iova`
    fn map(&self, vaddr: usize, iova: u64, len: usize) -> Result<()>;
}

/// Mapper for systems without DMA-capable devices
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDevices;

impl DmaMapper for NoDevices {
    fn device_count(&self) -> usize {
        0
    }

    fn map(&self, vaddr: usize, _iova: u64, _len: usize) -> Result<()> {
        Err(PoolBridgeError::dma(format!(
            "No DMA devices to map {:#x} for",
            vaddr
        )))
    }
}

/// Best available mapper: the VFIO container if it opens, otherwise none
pub fn probe() -> Box<dyn DmaMapper> {
    match VfioContainer::open() {
        Ok(container) => Box::new(container),
        Err(e) => {
            debug!("no VFIO container ({}), DMA mapping disabled", e);
            Box::new(NoDevices)
        }
    }
}
