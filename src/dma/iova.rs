//! IOVA addressing mode

use std::{fs, path::Path, sync::OnceLock};

use log::info;
use serde::{Deserialize, Serialize};

/// How DMA addresses are derived from buffer addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IovaMode {
    /// IOVA equals the virtual address (IOMMU translates)
    Va,
    /// IOVA is the physical address
    Pa,
}

impl IovaMode {
    /// Mode of this process, detected on first call and fixed afterwards
    pub fn detect() -> IovaMode {
        static MODE: OnceLock<IovaMode> = OnceLock::new();
        *MODE.get_or_init(|| {
            let mode = Self::probe(
                Path::new("/sys/kernel/iommu_groups"),
                Path::new("/proc/self/pagemap"),
            );
            info!("IOVA mode: {}", mode.name());
            mode
        })
    }

    /// Pick VA when an IOMMU is present, PA when physical addresses are
    /// readable, VA otherwise
    pub fn probe(iommu_groups: &Path, pagemap: &Path) -> IovaMode {
        let has_iommu = fs::read_dir(iommu_groups)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false);
        if has_iommu {
            return IovaMode::Va;
        }

        if physical_addresses_visible(pagemap) {
            IovaMode::Pa
        } else {
            IovaMode::Va
        }
    }

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            IovaMode::Va => "VA",
            IovaMode::Pa => "PA",
        }
    }
}

/// Whether the kernel exposes page frame numbers to this process
fn physical_addresses_visible(pagemap: &Path) -> bool {
    use std::os::unix::fs::FileExt;

    let Ok(file) = fs::File::open(pagemap) else {
        return false;
    };
    let probe = Box::new(0u64);
    let address = &*probe as *const u64 as usize;
    let page = crate::buffers::arena::base_page_size();
    let mut entry = [0u8; 8];
    if file
        .read_exact_at(&mut entry, (address / page * 8) as u64)
        .is_err()
    {
        return false;
    }
    u64::from_ne_bytes(entry) & ((1 << 55) - 1) != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_is_stable() {
        assert_eq!(IovaMode::detect(), IovaMode::detect());
    }

    #[test]
    fn test_probe_without_iommu_or_pagemap() {
        let missing = Path::new("/nonexistent/poolbridge");
        assert_eq!(IovaMode::probe(missing, missing), IovaMode::Va);
    }

    #[test]
    fn test_probe_prefers_va_with_iommu_groups() {
        // any non-empty directory stands in for populated iommu groups
        let groups = Path::new(env!("CARGO_MANIFEST_DIR"));
        assert_eq!(IovaMode::probe(groups, Path::new("/proc/self/pagemap")), IovaMode::Va);
    }
}
