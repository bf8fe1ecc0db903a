//! Instrumentation Buffer Contract
//!
//! Warp-granular memory access records produced by the GPU instrumentation
//! layer. One record covers one dynamic instruction for all lanes of a
//! warp; per-lane payloads carry the device address and the raw value
//! bytes.

use bitflags::bitflags;

/// Number of lanes in a warp
pub const WARP_SIZE: usize = 32;

/// Per-lane value payload size in bytes (a 128-bit vector access)
pub const MAX_ACCESS_BYTES: usize = 16;

bitflags! {
    /// Flag word of one warp record
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct RecordFlags: u32 {
        /// Memory read
        const READ = 0x1;
        /// Memory write
        const WRITE = 0x2;
        /// Thread block entry marker
        const BLOCK_ENTER = 0x4;
        /// Thread block exit marker
        const BLOCK_EXIT = 0x8;
        /// Address resides in thread-local memory
        const LOCAL = 0x10;
        /// Address resides in shared memory
        const SHARED = 0x20;
    }
}

/// One warp-level trace record
#[derive(Debug, Clone)]
pub struct WarpRecord {
    /// Runtime PC of the instruction
    pub pc: u64,
    /// Flattened block index
    pub flat_block_id: u32,
    /// Flattened thread index of the warp's first lane context
    pub flat_thread_id: u32,
    /// Bitmask of lanes participating in this record
    pub active_mask: u32,
    /// Bytes accessed per lane; zero marks an empty slot
    pub size: u32,
    /// Record flags
    pub flags: RecordFlags,
    /// Per-lane device addresses
    pub addresses: [u64; WARP_SIZE],
    /// Per-lane raw value bytes, little endian
    pub values: [[u8; MAX_ACCESS_BYTES]; WARP_SIZE],
}

impl Default for WarpRecord {
    fn default() -> Self {
        Self {
            pc: 0,
            flat_block_id: 0,
            flat_thread_id: 0,
            active_mask: 0,
            size: 0,
            flags: RecordFlags::empty(),
            addresses: [0; WARP_SIZE],
            values: [[0; MAX_ACCESS_BYTES]; WARP_SIZE],
        }
    }
}

impl WarpRecord {
    /// Whether lane `lane` participates in this record
    #[must_use]
    pub const fn lane_active(&self, lane: usize) -> bool {
        self.active_mask & (1u32 << lane) != 0
    }

    /// Flattened thread id of lane `lane`, aligned to the warp base
    #[must_use]
    pub const fn lane_thread_id(&self, lane: usize) -> u32 {
        self.flat_thread_id / WARP_SIZE as u32 * WARP_SIZE as u32 + lane as u32
    }
}

/// One instrumentation buffer handed to the analyzer
#[derive(Debug, Clone, Default)]
pub struct TraceBuffer {
    /// Number of valid records at the front of `records`
    pub head_index: usize,
    /// Record storage; only `[0, head_index)` is meaningful
    pub records: Vec<WarpRecord>,
}

impl TraceBuffer {
    /// The valid records of this buffer
    #[must_use]
    pub fn valid_records(&self) -> &[WarpRecord] {
        &self.records[..self.head_index.min(self.records.len())]
    }
}
