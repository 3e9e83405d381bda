//! Physical memory maps backing buffer partitions

use std::{fs::File, io, os::unix::fs::FileExt};

use log::{debug, warn};

/// Entry in /proc/self/pagemap is present in RAM
const PAGEMAP_PRESENT: u64 = 1 << 63;
/// Low 55 bits of a pagemap entry hold the page frame number
const PAGEMAP_PFN_MASK: u64 = (1 << 55) - 1;

/// Page-granular virtual to physical translation for one memory region
#[derive(Debug, Clone)]
pub struct PhysmemMap {
    index: u32,
    base: usize,
    log2_page_size: u32,
    page_table: Vec<u64>,
}

impl PhysmemMap {
    /// Build a map from an explicit page table
    pub fn new(index: u32, base: usize, log2_page_size: u32, page_table: Vec<u64>) -> Self {
        Self {
            index,
            base,
            log2_page_size,
            page_table,
        }
    }

    /// Build a map for `[base, base + size)` by resolving every page through
    /// the kernel pagemap. Pages the kernel will not resolve (unprivileged
    /// process, page not resident) fall back to their virtual address.
    pub fn from_region(index: u32, base: usize, size: usize, log2_page_size: u32) -> Self {
        let page_size = 1usize << log2_page_size;
        let n_pages = size.div_ceil(page_size);

        let page_table = match resolve_pages(base, n_pages, page_size) {
            Ok(table) => table,
            Err(e) => {
                debug!("physmem map {}: pagemap unavailable ({}), using virtual addresses", index, e);
                (0..n_pages).map(|i| (base + i * page_size) as u64).collect()
            }
        };

        Self::new(index, base, log2_page_size, page_table)
    }

    /// Map index within the buffer subsystem
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Start of the mapped region
    pub fn base(&self) -> usize {
        self.base
    }

    /// Log2 of the page size
    pub fn log2_page_size(&self) -> u32 {
        self.log2_page_size
    }

    /// Page size in bytes
    pub fn page_size(&self) -> usize {
        1 << self.log2_page_size
    }

    /// Number of pages in the region
    pub fn n_pages(&self) -> usize {
        self.page_table.len()
    }

    /// Virtual address of page `page`
    pub fn page_va(&self, page: usize) -> Option<usize> {
        (page < self.n_pages()).then(|| self.base + page * self.page_size())
    }

    /// Physical address of page `page`
    pub fn page_pa(&self, page: usize) -> Option<u64> {
        self.page_table.get(page).copied()
    }

    /// Physical address of an arbitrary virtual address inside the region
    pub fn get_pa(&self, address: usize) -> Option<u64> {
        let offset = address.checked_sub(self.base)?;
        let page = offset >> self.log2_page_size;
        let within = (offset & (self.page_size() - 1)) as u64;
        self.page_pa(page).map(|pa| pa + within)
    }
}

/// Resolve every page of a region via /proc/self/pagemap
fn resolve_pages(base: usize, n_pages: usize, page_size: usize) -> io::Result<Vec<u64>> {
    let pagemap = File::open("/proc/self/pagemap")?;
    let small_page = crate::buffers::arena::base_page_size();
    let mut table = Vec::with_capacity(n_pages);
    let mut entry = [0u8; 8];

    for page in 0..n_pages {
        let va = base + page * page_size;
        pagemap.read_exact_at(&mut entry, (va / small_page * 8) as u64)?;
        let raw = u64::from_ne_bytes(entry);
        let pfn = raw & PAGEMAP_PFN_MASK;
        if raw & PAGEMAP_PRESENT == 0 || pfn == 0 {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "page frame numbers not exposed",
            ));
        }
        table.push(pfn * small_page as u64);
    }

    if table.windows(2).any(|w| w[0] == w[1]) {
        warn!("pagemap reported duplicate frames, physical addresses may be unreliable");
    }
    Ok(table)
}
