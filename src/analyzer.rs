//! Trace Analyzer
//!
//! The per-record loop: resolve each warp record's PC, infer the access
//! kind, split the vector access into units, canonicalize each unit value,
//! attribute it to an allocation, and fold it into the kernel's spatial and
//! temporal accumulators. Per-record faults (untranslatable PC, unmatched
//! address, unknown kind) are recovered locally; the loop never aborts.
//!
//! No lock is taken here: the cubin and snapshot are immutable once
//! captured, and the kernel accumulators are owned by the caller.

use crate::approx::{canonicalize, Precision};
use crate::cubin::Cubin;
use crate::inst::{load_data_type, store_data_type, AccessKind, DataType};
use crate::memory::{find_allocation, MemoryMap, MEMORY_ID_LOCAL, MEMORY_ID_SHARED};
use crate::record::{RecordFlags, TraceBuffer, WarpRecord, MAX_ACCESS_BYTES, WARP_SIZE};
use crate::report::AnalysisType;
use crate::symbol::transform_pc;
use crate::trace::{record_temporal, KernelTrace, ThreadId};
use std::collections::BTreeSet;

/// Unit width chosen when instruction metadata cannot type an access
///
/// The whole access is then treated as float vectors of `size * 8` bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FallbackUnit {
    /// Cap the byte-scaled width at the warp width:
    /// `min(WARP_SIZE, vec_bits * 8)`.
    #[default]
    ByteScaled,
    /// Cap the vector width itself at the warp width:
    /// `min(WARP_SIZE, vec_bits)`.
    VectorWidth,
}

impl FallbackUnit {
    /// Default kind for an untyped access of `size` bytes per lane
    ///
    /// Under `ByteScaled`, an access narrower than 4 bytes gets a unit
    /// wider than its vector and splits into zero units, so it contributes
    /// nothing; `VectorWidth` keeps such accesses as one unit. The two
    /// policies agree for every access of at least 4 bytes.
    #[must_use]
    pub fn default_kind(self, size: u32) -> AccessKind {
        let vec_size = size * 8;
        let unit_size = match self {
            Self::ByteScaled => (WARP_SIZE as u32).min(vec_size * 8),
            Self::VectorWidth => (WARP_SIZE as u32).min(vec_size),
        };
        AccessKind {
            vec_size,
            unit_size,
            data_type: DataType::Float,
        }
    }
}

/// Accepted unit-access counts of one `analyze` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessTally {
    /// Unit reads folded into the accumulators
    pub read_units: u64,
    /// Unit writes folded into the accumulators
    pub write_units: u64,
}

/// Fold one trace buffer into a kernel's accumulators
pub fn trace_analyze(
    kernel: &mut KernelTrace,
    cubin: &Cubin,
    memory_map: &MemoryMap,
    buffer: &TraceBuffer,
    precision: Precision,
    enabled: &BTreeSet<AnalysisType>,
    fallback: FallbackUnit,
) -> AccessTally {
    let mut tally = AccessTally::default();

    for record in buffer.valid_records() {
        if record.size == 0 {
            // no thread active
            continue;
        }

        if record.flags.contains(RecordFlags::BLOCK_ENTER) {
            continue;
        }
        if record.flags.contains(RecordFlags::BLOCK_EXIT) {
            // block exit ends its threads' temporal history
            for lane in 0..WARP_SIZE {
                if record.lane_active(lane) {
                    let thread = ThreadId {
                        flat_block_id: record.flat_block_id,
                        flat_thread_id: record.lane_thread_id(lane),
                    };
                    kernel.read_temporal.forget_thread(thread);
                    kernel.write_temporal.forget_thread(thread);
                }
            }
            continue;
        }

        analyze_access(kernel, cubin, memory_map, record, precision, enabled, fallback, &mut tally);
    }

    tally
}

#[allow(clippy::too_many_arguments)]
fn analyze_access(
    kernel: &mut KernelTrace,
    cubin: &Cubin,
    memory_map: &MemoryMap,
    record: &WarpRecord,
    precision: Precision,
    enabled: &BTreeSet<AnalysisType>,
    fallback: FallbackUnit,
    tally: &mut AccessTally,
) {
    let is_read = record.flags.contains(RecordFlags::READ);
    let real_pc = transform_pc(&cubin.symbols, record.pc).ok();

    if kernel.func_addr == 0 {
        if let Some(real) = real_pc {
            kernel.func_index = real.function_index;
            kernel.func_addr = record.pc - real.pc_offset;
        }
    }

    let mut kind = AccessKind::unknown();
    if !cubin.graph.is_empty() {
        if let Some(real) = real_pc {
            kind = if is_read {
                load_data_type(real.cubin_offset, &cubin.graph)
            } else {
                store_data_type(real.cubin_offset, &cubin.graph)
            };
        }
    }
    if kind.is_unknown() {
        kind = fallback.default_kind(record.size);
    }

    let unit_kind = kind.unit();
    let byte_size = unit_kind.unit_bytes();
    if byte_size == 0 {
        return;
    }

    for lane in 0..WARP_SIZE {
        if !record.lane_active(lane) {
            continue;
        }
        let thread = ThreadId {
            flat_block_id: record.flat_block_id,
            flat_thread_id: record.lane_thread_id(lane),
        };
        let addr = record.addresses[lane];

        let memory_op_id = match find_allocation(memory_map, addr) {
            Some(memory) => memory.memory_op_id,
            None if record.flags.contains(RecordFlags::LOCAL) => MEMORY_ID_LOCAL,
            None if record.flags.contains(RecordFlags::SHARED) => MEMORY_ID_SHARED,
            // unknown allocation, cannot attribute
            None => continue,
        };

        for unit in 0..kind.units() as usize {
            let offset = unit * byte_size;
            if offset + byte_size > MAX_ACCESS_BYTES {
                break;
            }
            let value = read_unit_value(&record.values[lane], offset, byte_size);
            let value = canonicalize(value, unit_kind, precision);

            for analysis in enabled {
                match analysis {
                    AnalysisType::SpatialRedundancy => {
                        if is_read {
                            kernel.read_spatial.record(record.pc, value, memory_op_id, unit_kind);
                        } else {
                            kernel.write_spatial.record(record.pc, value, memory_op_id, unit_kind);
                        }
                    }
                    AnalysisType::TemporalRedundancy => {
                        if is_read {
                            record_temporal(
                                record.pc,
                                thread,
                                addr,
                                value,
                                unit_kind,
                                &mut kernel.read_temporal,
                                &mut kernel.read_pc_pairs,
                            );
                        } else {
                            record_temporal(
                                record.pc,
                                thread,
                                addr,
                                value,
                                unit_kind,
                                &mut kernel.write_temporal,
                                &mut kernel.write_pc_pairs,
                            );
                        }
                    }
                }
            }

            if is_read {
                tally.read_units += 1;
            } else {
                tally.write_units += 1;
            }
        }
    }
}

/// Assemble one little-endian unit value from a lane's byte payload
fn read_unit_value(bytes: &[u8; MAX_ACCESS_BYTES], offset: usize, byte_size: usize) -> u64 {
    let mut value = 0u64;
    for (i, &byte) in bytes[offset..offset + byte_size].iter().enumerate() {
        value |= u64::from(byte) << (8 * i);
    }
    value
}
