//! Redundancy Reports
//!
//! Builds the bounded top-N views handed to the record-data callback:
//! spatial views pick the hottest `(pc, value)` per allocation/kind bucket,
//! temporal views rank PC pairs by their summed consecutive-touch counts.

use crate::inst::AccessKind;
use crate::symbol::{transform_pc, Symbol};
use crate::trace::{PcPairs, SpatialTrace};
use serde::{Deserialize, Serialize};

/// Analyses the engine can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AnalysisType {
    /// Same value observed across different addresses of one allocation
    SpatialRedundancy,
    /// Same thread re-observing a value at the same address
    TemporalRedundancy,
}

/// Direction of the accesses a report covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessDirection {
    /// Memory reads
    Read,
    /// Memory writes
    Write,
}

/// The earlier end of a temporal PC pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrevAccess {
    /// Function index of the earlier PC
    pub function_index: u32,
    /// Offset of the earlier PC from its function entry
    pub pc_offset: u64,
}

/// One ranked redundancy observation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordView {
    /// Function index of the (current) PC
    pub function_index: u32,
    /// Offset of the (current) PC from its function entry
    pub pc_offset: u64,
    /// Earlier end of the PC pair; temporal views only
    pub prev: Option<PrevAccess>,
    /// Allocation the accesses hit; zero for temporal views
    pub memory_op_id: u64,
    /// Canonicalized value (representative value for temporal views)
    pub value: u64,
    /// Shape of the access
    pub access_kind: AccessKind,
    /// Number of contributing accesses
    pub count: u64,
}

/// One callback payload: all views of one analysis/direction slot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordData {
    /// Which analysis produced the views
    pub analysis: AnalysisType,
    /// Which access direction the views cover
    pub direction: AccessDirection,
    /// Ranked views, hottest first
    pub views: Vec<RecordView>,
}

/// Hottest `(pc, value)` per spatial bucket, in bucket order
///
/// PCs are still raw runtime PCs; [`translate_views`] rewrites them.
#[must_use]
pub(crate) fn spatial_views(trace: &SpatialTrace) -> Vec<RecordView> {
    let mut views = Vec::new();
    for ((memory_op_id, kind), pcs) in trace.buckets() {
        let mut best: Option<(u64, u64, u64)> = None;
        for (&pc, values) in pcs {
            for (&value, &count) in values {
                if best.map_or(true, |(_, _, best_count)| count > best_count) {
                    best = Some((pc, value, count));
                }
            }
        }
        if let Some((pc, value, count)) = best {
            views.push(RecordView {
                function_index: 0,
                pc_offset: pc,
                prev: None,
                memory_op_id: *memory_op_id,
                value,
                access_kind: *kind,
                count,
            });
        }
    }
    views
}

/// One view per PC pair with its summed count and the dominant value
///
/// PCs are still raw runtime PCs; [`translate_views`] rewrites them.
#[must_use]
pub(crate) fn temporal_views(pairs: &PcPairs) -> Vec<RecordView> {
    let mut views = Vec::new();
    for (&prev_pc, to_pcs) in pairs.pairs() {
        for (&pc, values) in to_pcs {
            let mut total = 0u64;
            let mut best: Option<(u64, AccessKind, u64)> = None;
            for (&(value, kind), &count) in values {
                total += count;
                if best.map_or(true, |(_, _, best_count)| count > best_count) {
                    best = Some((value, kind, count));
                }
            }
            let Some((value, kind, _)) = best else {
                continue;
            };
            views.push(RecordView {
                function_index: 0,
                pc_offset: pc,
                prev: Some(PrevAccess {
                    function_index: 0,
                    pc_offset: prev_pc,
                }),
                memory_op_id: 0,
                value,
                access_kind: kind,
                count: total,
            });
        }
    }
    views
}

/// Keep the `limit` highest-count views; ties keep insertion order
pub(crate) fn select_top_views(mut views: Vec<RecordView>, limit: usize) -> Vec<RecordView> {
    views.sort_by(|a, b| b.count.cmp(&a.count));
    views.truncate(limit);
    views
}

/// Rewrite raw runtime PCs into `(function_index, pc_offset)` pairs
///
/// Views whose PC no symbol covers are left untouched.
pub(crate) fn translate_views(views: &mut [RecordView], symbols: &[Symbol]) {
    for view in views {
        if let Ok(real) = transform_pc(symbols, view.pc_offset) {
            view.function_index = real.function_index;
            view.pc_offset = real.pc_offset;
        }
        if let Some(prev) = &mut view.prev {
            if let Ok(real) = transform_pc(symbols, prev.pc_offset) {
                prev.function_index = real.function_index;
                prev.pc_offset = real.pc_offset;
            }
        }
    }
}
