//! The engine's native per-buffer structure

use super::handle::{HandleId, PoolHandle};

/// Headroom the engine leaves in front of packet data
pub const PKTMBUF_HEADROOM: u16 = 128;

/// Port value of an object not bound to any port
pub const PORT_INVALID: u16 = u16::MAX;

/// Size of `NativeObject`
pub const NATIVE_OBJECT_SIZE: usize = std::mem::size_of::<NativeObject>();

/// Engine view of a packet buffer, placed directly before the application
/// header so both describe the same data area
#[repr(C, align(64))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeObject {
    /// Virtual address of the start of the buffer area
    pub buf_addr: usize,
    /// DMA address of `buf_addr`
    pub buf_iova: u64,
    pub data_off: u16,
    pub refcnt: u16,
    pub nb_segs: u16,
    pub port: u16,
    pub ol_flags: u64,
    pub packet_type: u32,
    pub pkt_len: u32,
    pub data_len: u16,
    pub vlan_tci: u16,
    /// Length of the buffer area, headroom included
    pub buf_len: u16,
    /// Bytes of application header between this struct and `buf_addr`
    pub priv_size: u16,
    /// Handle the object is returned to when freed
    pub pool: HandleId,
    pub next: usize,
    pub tx_offload: u64,
    pub hash: u64,
    pub dynfield: [u32; 12],
}

impl NativeObject {
    /// Per-object initializer. `address` and `iova` locate this object;
    /// the buffer area follows the object and the pool's private header.
    pub fn init(&mut self, pool: &PoolHandle, address: usize, iova: u64) {
        let private = pool.private();
        let offset = (NATIVE_OBJECT_SIZE + private.priv_size as usize) as u64;

        *self = Self {
            buf_addr: address + offset as usize,
            buf_iova: iova + offset,
            data_off: PKTMBUF_HEADROOM.min(private.data_room_size),
            refcnt: 1,
            nb_segs: 1,
            port: PORT_INVALID,
            ol_flags: 0,
            packet_type: 0,
            pkt_len: 0,
            data_len: 0,
            vlan_tci: 0,
            buf_len: private.data_room_size,
            priv_size: private.priv_size,
            pool: pool.id(),
            next: 0,
            tx_offload: 0,
            hash: 0,
            dynfield: [0; 12],
        };
    }
}
