//! VFIO container DMA mapping (Linux)

use std::{
    fs::{self, File, OpenOptions},
    os::fd::AsRawFd,
    path::Path,
};

use log::{debug, info};

use crate::error::{PoolBridgeError, Result};

use super::DmaMapper;

const VFIO_TYPE: u8 = b';';
const VFIO_BASE: u8 = 100;
const VFIO_API_VERSION: i32 = 0;
const VFIO_TYPE1_IOMMU: i32 = 1;
const VFIO_DMA_MAP_FLAG_READ: u32 = 1 << 0;
const VFIO_DMA_MAP_FLAG_WRITE: u32 = 1 << 1;

/// Argument of VFIO_IOMMU_MAP_DMA
#[repr(C)]
#[derive(Debug, Default)]
struct VfioIommuType1DmaMap {
    argsz: u32,
    flags: u32,
    vaddr: u64,
    iova: u64,
    size: u64,
}

nix::ioctl_none_bad!(vfio_get_api_version, nix::request_code_none!(VFIO_TYPE, VFIO_BASE));
nix::ioctl_write_int_bad!(
    vfio_check_extension,
    nix::request_code_none!(VFIO_TYPE, VFIO_BASE + 1)
);
nix::ioctl_write_ptr_bad!(
    vfio_iommu_map_dma,
    nix::request_code_none!(VFIO_TYPE, VFIO_BASE + 13),
    VfioIommuType1DmaMap
);

/// An open VFIO container plus the number of device groups bound to VFIO
#[derive(Debug)]
pub struct VfioContainer {
    container: File,
    groups: usize,
}

impl VfioContainer {
    /// Default location of the VFIO device nodes
    pub const DEV_DIR: &'static str = "/dev/vfio";

    /// Open the container under `/dev/vfio`
    pub fn open() -> Result<Self> {
        Self::open_at(Path::new(Self::DEV_DIR))
    }

    /// Open the container under `dev_dir`
    pub fn open_at(dev_dir: &Path) -> Result<Self> {
        let path = dev_dir.join("vfio");
        let container = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| PoolBridgeError::from_io(e, "Failed to open VFIO container"))?;

        // SAFETY: the fd is open for the duration of the call
        let version = unsafe { vfio_get_api_version(container.as_raw_fd()) }?;
        if version != VFIO_API_VERSION {
            return Err(PoolBridgeError::dma(format!(
                "Unsupported VFIO API version {}",
                version
            )));
        }

        // SAFETY: as above
        let type1 = unsafe { vfio_check_extension(container.as_raw_fd(), VFIO_TYPE1_IOMMU) }?;
        if type1 <= 0 {
            debug!("VFIO container lacks type1 IOMMU support");
        }

        let groups = count_groups(dev_dir);
        info!("VFIO container open, {} device groups", groups);

        Ok(Self { container, groups })
    }
}

impl DmaMapper for VfioContainer {
    fn device_count(&self) -> usize {
        self.groups
    }

    fn map(&self, vaddr: usize, iova: u64, len: usize) -> Result<()> {
        let request = VfioIommuType1DmaMap {
            argsz: std::mem::size_of::<VfioIommuType1DmaMap>() as u32,
            flags: VFIO_DMA_MAP_FLAG_READ | VFIO_DMA_MAP_FLAG_WRITE,
            vaddr: vaddr as u64,
            iova,
            size: len as u64,
        };
        // SAFETY: request is a valid, fully initialised argument struct
        unsafe { vfio_iommu_map_dma(self.container.as_raw_fd(), &request) }
            .map(|_| ())
            .map_err(|e| {
                PoolBridgeError::dma(format!(
                    "VFIO_IOMMU_MAP_DMA of {:#x}+{:#x} failed: {}",
                    vaddr, len, e
                ))
            })
    }
}

/// Count numeric (or no-IOMMU) group nodes in the VFIO device directory
fn count_groups(dev_dir: &Path) -> usize {
    let Ok(entries) = fs::read_dir(dev_dir) else {
        return 0;
    };
    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            name.parse::<u32>().is_ok() || name.starts_with("noiommu-")
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_container_fails() {
        let err = VfioContainer::open_at(Path::new("/nonexistent/vfio")).unwrap_err();
        assert!(matches!(err, PoolBridgeError::Io { .. }));
    }

    #[test]
    fn test_count_groups_missing_dir() {
        assert_eq!(count_groups(Path::new("/nonexistent/vfio")), 0);
    }

    #[test]
    fn test_map_request_size() {
        assert_eq!(std::mem::size_of::<VfioIommuType1DmaMap>(), 32);
    }
}
