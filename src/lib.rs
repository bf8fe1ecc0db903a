//! # redunda: GPU Kernel Redundancy Analyzer
//!
//! Detects wasted work in GPU kernels from per-warp memory-access traces
//! captured by an external instrumentation layer:
//!
//! - **Spatial redundancy** - threads or program points reading/writing the
//!   same value to different addresses of one allocation
//! - **Temporal redundancy** - one thread repeatedly touching the same
//!   address with the same value
//!
//! Observed values are canonicalized (low float mantissa bits zeroed per
//! the configured approximation level) so numerically-close values count as
//! one class. Summaries attribute redundancy back to
//! `(function_index, pc_offset)` pairs; source-line mapping is left to the
//! caller.
//!
//! # Modules
//!
//! - [`engine`] - the [`AnalysisEngine`] with the stable operations
//! - [`analyzer`] - the per-record trace loop
//! - [`inst`] - instruction graph, `.inst` parser, type inference
//! - [`cubin`] / [`memory`] - cubin and memory-snapshot registries
//! - [`trace`] / [`report`] - per-kernel accumulators and top-N views
//! - [`approx`] - float value canonicalization
//!
//! # Example
//!
//! ```rust
//! use redunda::{AnalysisEngine, AnalysisType, RecordFlags, TraceBuffer, WarpRecord};
//! use std::path::Path;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let engine = AnalysisEngine::new();
//! engine.analysis_enable(AnalysisType::SpatialRedundancy);
//!
//! // no instruction dump on disk: the cubin still registers degenerately
//! let _ = engine.cubin_register(1, &[0x1000], Path::new("m/cubins/k.cubin"));
//! engine.memory_register(0x1000, 0x2000, 10, 42).unwrap();
//!
//! engine.log_data_callback_register(Box::new(|_kernel_id, _buffer| {}));
//! let views = Arc::new(AtomicUsize::new(0));
//! let sink = Arc::clone(&views);
//! engine.record_data_callback_register(
//!     Box::new(move |_cubin, _kernel, data| {
//!         sink.fetch_add(data.views.len(), Ordering::Relaxed);
//!     }),
//!     10,
//!     10,
//! );
//!
//! let mut record = WarpRecord {
//!     pc: 0x1010,
//!     active_mask: 0x1,
//!     size: 4,
//!     flags: RecordFlags::READ,
//!     ..Default::default()
//! };
//! record.addresses[0] = 0x1100;
//! record.values[0][..4].copy_from_slice(&1.0f32.to_le_bytes());
//! let buffer = TraceBuffer { head_index: 1, records: vec![record] };
//!
//! engine.analyze(0, 1, 1, 10, &buffer).unwrap();
//! engine.flush(0).unwrap();
//! assert_eq!(views.load(Ordering::Relaxed), 1);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
// Constant regexes cannot fail to compile
#![allow(clippy::unwrap_used)]

pub mod analyzer;
pub mod approx;
pub mod cubin;
pub mod engine;
pub mod error;
pub mod inst;
pub mod memory;
pub mod record;
pub mod report;
pub mod symbol;
pub mod trace;

pub use analyzer::{AccessTally, FallbackUnit};
pub use approx::{canonicalize, ApproxLevel, Precision};
pub use cubin::{Cubin, CubinRegistry};
pub use engine::{AnalysisEngine, LogDataCallback, RecordDataCallback};
pub use error::{AnalysisError, Result};
pub use inst::{AccessKind, DataType, Instruction, InstructionGraph};
pub use memory::{MemoryRange, SnapshotRegistry, MEMORY_ID_LOCAL, MEMORY_ID_SHARED};
pub use record::{RecordFlags, TraceBuffer, WarpRecord, MAX_ACCESS_BYTES, WARP_SIZE};
pub use report::{AccessDirection, AnalysisType, PrevAccess, RecordData, RecordView};
pub use symbol::{transform_pc, RealPc, Symbol};
pub use trace::{KernelTrace, ThreadId};
