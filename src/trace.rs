//! Per-Kernel Trace Accumulators
//!
//! Four structures per kernel and direction: spatial value histograms
//! keyed by allocation and access kind, and temporal last-touch state with
//! the PC-pair counts it feeds. Accumulators are exclusively owned by the
//! analyzing CPU thread; nothing here locks.

use crate::inst::AccessKind;
use std::collections::BTreeMap;

/// A GPU thread identified by flattened block and thread indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ThreadId {
    /// Flattened block index
    pub flat_block_id: u32,
    /// Flattened thread index
    pub flat_thread_id: u32,
}

/// Spatial value histogram: `(memory_op_id, kind) -> pc -> value -> count`
#[derive(Debug, Clone, Default)]
pub struct SpatialTrace {
    buckets: BTreeMap<(u64, AccessKind), BTreeMap<u64, BTreeMap<u64, u64>>>,
}

impl SpatialTrace {
    /// Count one unit access
    pub fn record(&mut self, pc: u64, value: u64, memory_op_id: u64, kind: AccessKind) {
        *self
            .buckets
            .entry((memory_op_id, kind))
            .or_default()
            .entry(pc)
            .or_default()
            .entry(value)
            .or_default() += 1;
    }

    /// Iterate buckets in key order
    pub fn buckets(
        &self,
    ) -> impl Iterator<Item = (&(u64, AccessKind), &BTreeMap<u64, BTreeMap<u64, u64>>)> {
        self.buckets.iter()
    }

    /// Total number of recorded unit accesses
    #[must_use]
    pub fn total_count(&self) -> u64 {
        self.buckets
            .values()
            .flat_map(|pcs| pcs.values())
            .flat_map(|values| values.values())
            .sum()
    }

    /// Whether nothing has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Last `(pc, value)` seen per thread and address
#[derive(Debug, Clone, Default)]
pub struct TemporalTrace {
    last: BTreeMap<ThreadId, BTreeMap<u64, (u64, u64)>>,
}

impl TemporalTrace {
    /// Record a touch of `addr` by `thread`, returning the previous
    /// `(pc, value)` at that address if the thread had one
    pub fn touch(&mut self, thread: ThreadId, addr: u64, pc: u64, value: u64) -> Option<(u64, u64)> {
        self.last.entry(thread).or_default().insert(addr, (pc, value))
    }

    /// Drop all state of `thread`; called when its block exits
    pub fn forget_thread(&mut self, thread: ThreadId) {
        self.last.remove(&thread);
    }

    /// Whether any thread has live state
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }
}

/// Consecutive same-address touch counts:
/// `prev_pc -> curr_pc -> (value, kind) -> count`
#[derive(Debug, Clone, Default)]
pub struct PcPairs {
    pairs: BTreeMap<u64, BTreeMap<u64, BTreeMap<(u64, AccessKind), u64>>>,
}

impl PcPairs {
    /// Count one consecutive touch, keyed by the current value and kind
    pub fn record(&mut self, prev_pc: u64, pc: u64, value: u64, kind: AccessKind) {
        *self
            .pairs
            .entry(prev_pc)
            .or_default()
            .entry(pc)
            .or_default()
            .entry((value, kind))
            .or_default() += 1;
    }

    /// Iterate pair entries in key order
    pub fn pairs(
        &self,
    ) -> impl Iterator<Item = (&u64, &BTreeMap<u64, BTreeMap<(u64, AccessKind), u64>>)> {
        self.pairs.iter()
    }

    /// Total number of recorded consecutive touches
    #[must_use]
    pub fn total_count(&self) -> u64 {
        self.pairs
            .values()
            .flat_map(|to| to.values())
            .flat_map(|vals| vals.values())
            .sum()
    }

    /// Whether no pair has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Record a touch in a temporal trace and fold the consecutive-touch pair
/// into the PC-pair counts
pub fn record_temporal(
    pc: u64,
    thread: ThreadId,
    addr: u64,
    value: u64,
    kind: AccessKind,
    temporal: &mut TemporalTrace,
    pairs: &mut PcPairs,
) {
    if let Some((prev_pc, _prev_value)) = temporal.touch(thread, addr, pc, value) {
        pairs.record(prev_pc, pc, value, kind);
    }
}

/// Per-kernel accumulator state, keyed by `(cpu_thread, kernel_id)`
#[derive(Debug, Clone, Default)]
pub struct KernelTrace {
    /// Kernel launch id
    pub kernel_id: u64,
    /// Cubin executed by this kernel
    pub cubin_id: u32,
    /// Index of the launched function, from the first translated record
    pub func_index: u32,
    /// Runtime entry address of the launched function
    pub func_addr: u64,
    /// Spatial histogram of reads
    pub read_spatial: SpatialTrace,
    /// Spatial histogram of writes
    pub write_spatial: SpatialTrace,
    /// Last-touch state of reads
    pub read_temporal: TemporalTrace,
    /// Consecutive read-touch pairs
    pub read_pc_pairs: PcPairs,
    /// Last-touch state of writes
    pub write_temporal: TemporalTrace,
    /// Consecutive write-touch pairs
    pub write_pc_pairs: PcPairs,
}

impl KernelTrace {
    /// Create an empty accumulator for one kernel launch
    #[must_use]
    pub fn new(kernel_id: u64, cubin_id: u32) -> Self {
        Self {
            kernel_id,
            cubin_id,
            ..Default::default()
        }
    }
}
