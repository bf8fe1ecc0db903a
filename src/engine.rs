//! Analysis Engine
//!
//! Owns the process-wide registries (cubins, memory snapshots, per-thread
//! kernel accumulators), the enabled-analysis set, and the output
//! callbacks, and exposes the stable library operations. Each registry
//! keeps its own lock with short critical sections: lookups capture an
//! `Arc` reference, inserts and erases swap whole entries. The per-record
//! loop itself runs without any engine lock.

use crate::analyzer::{trace_analyze, AccessTally, FallbackUnit};
use crate::approx::{ApproxLevel, Precision};
use crate::cubin::CubinRegistry;
use crate::error::{AnalysisError, Result};
use crate::memory::SnapshotRegistry;
use crate::record::TraceBuffer;
use crate::report::{
    select_top_views, spatial_views, temporal_views, translate_views, AccessDirection,
    AnalysisType, RecordData,
};
use crate::trace::KernelTrace;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::debug;

/// Sink for raw trace buffers, called once per analyzed buffer
pub type LogDataCallback = Box<dyn Fn(u64, &TraceBuffer) + Send + Sync>;

/// Sink for redundancy summaries, called once per analysis/direction slot
pub type RecordDataCallback = Box<dyn Fn(u32, u64, &RecordData) + Send + Sync>;

struct RecordSink {
    callback: RecordDataCallback,
    pc_views_limit: usize,
    #[allow(dead_code)] // consumed by the external memory-view writer
    mem_views_limit: usize,
}

/// GPU kernel redundancy analysis engine
#[derive(Default)]
pub struct AnalysisEngine {
    cubins: CubinRegistry,
    snapshots: SnapshotRegistry,
    kernels: Mutex<HashMap<u32, BTreeMap<u64, KernelTrace>>>,
    enabled: Mutex<BTreeSet<AnalysisType>>,
    precision: Mutex<Precision>,
    fallback: Mutex<FallbackUnit>,
    log_callback: Mutex<Option<LogDataCallback>>,
    record_sink: Mutex<Option<RecordSink>>,
    // smallest host op analyzed this session; zero means none yet
    min_host_op_id: AtomicU64,
}

impl AnalysisEngine {
    /// Create an engine with no analyses enabled and exact value matching
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `analysis` to the enabled set
    pub fn analysis_enable(&self, analysis: AnalysisType) {
        debug!(?analysis, "enable analysis");
        self.enabled.lock().expect("analysis set poisoned").insert(analysis);
    }

    /// Remove `analysis` from the enabled set
    pub fn analysis_disable(&self, analysis: AnalysisType) {
        debug!(?analysis, "disable analysis");
        self.enabled.lock().expect("analysis set poisoned").remove(&analysis);
    }

    /// Configure the float canonicalization level
    pub fn approx_level_config(&self, level: ApproxLevel) {
        debug!(?level, "configure approximation level");
        *self.precision.lock().expect("precision poisoned") = level.precision();
    }

    /// Configure the unit-width fallback for untyped accesses
    pub fn fallback_unit_config(&self, fallback: FallbackUnit) {
        *self.fallback.lock().expect("fallback poisoned") = fallback;
    }

    /// Register a cubin; see [`CubinRegistry::register`]
    ///
    /// # Errors
    ///
    /// `DuplicateEntry`, `FailedAnalyzeCubin`, or `NoSuchFile` (the last
    /// still leaves a usable entry without instruction metadata).
    pub fn cubin_register(&self, cubin_id: u32, symbol_pcs: &[u64], path: &Path) -> Result<()> {
        self.cubins.register(cubin_id, symbol_pcs, path)
    }

    /// Cache cubin metadata for lazy promotion
    ///
    /// # Errors
    ///
    /// `DuplicateEntry` on repeated registration.
    pub fn cubin_cache_register(
        &self,
        cubin_id: u32,
        symbol_pcs: &[u64],
        path: &Path,
    ) -> Result<()> {
        self.cubins.cache_register(cubin_id, symbol_pcs, path)
    }

    /// Remove an active cubin
    ///
    /// # Errors
    ///
    /// `NotExistEntry` when the id is not active.
    pub fn cubin_unregister(&self, cubin_id: u32) -> Result<()> {
        self.cubins.unregister(cubin_id)
    }

    /// Publish a snapshot with `[start, end)` added
    ///
    /// # Errors
    ///
    /// See [`SnapshotRegistry::register`].
    pub fn memory_register(&self, start: u64, end: u64, host_op_id: u64, memory_id: u64) -> Result<()> {
        debug!(start, end, host_op_id, memory_id, "register memory");
        self.snapshots.register(start, end, host_op_id, memory_id)
    }

    /// Publish a snapshot with `[start, end)` removed
    ///
    /// # Errors
    ///
    /// See [`SnapshotRegistry::unregister`].
    pub fn memory_unregister(&self, start: u64, end: u64, host_op_id: u64) -> Result<()> {
        debug!(start, end, host_op_id, "unregister memory");
        self.snapshots.unregister(start, end, host_op_id)
    }

    /// Install the raw trace-buffer sink; always succeeds
    pub fn log_data_callback_register(&self, callback: LogDataCallback) {
        *self.log_callback.lock().expect("log callback poisoned") = Some(callback);
    }

    /// Install the summary sink and the top-N view limits; always succeeds
    pub fn record_data_callback_register(
        &self,
        callback: RecordDataCallback,
        pc_views_limit: usize,
        mem_views_limit: usize,
    ) {
        *self.record_sink.lock().expect("record sink poisoned") = Some(RecordSink {
            callback,
            pc_views_limit,
            mem_views_limit,
        });
    }

    /// Ingest one trace buffer for `(cpu_thread, kernel_id)`
    ///
    /// Resolves the cubin (promoting cached metadata once if needed),
    /// selects the memory snapshot applicable to `host_op_id`, folds every
    /// record into the kernel's accumulators, and hands the raw buffer to
    /// the log sink. Returns the accepted unit-access tally.
    ///
    /// # Errors
    ///
    /// `NotExistEntry` when the cubin is unknown or no snapshot is at or
    /// below `host_op_id`; `NotRegisterCallback` when no log sink is
    /// installed (the buffer is still analyzed).
    pub fn analyze(
        &self,
        cpu_thread: u32,
        cubin_id: u32,
        kernel_id: u64,
        host_op_id: u64,
        buffer: &TraceBuffer,
    ) -> Result<AccessTally> {
        debug!(cpu_thread, cubin_id, kernel_id, host_op_id, "analyze trace buffer");

        let cubin = self.cubins.resolve(cubin_id)?;
        let memory_map = self.snapshots.snapshot_at(host_op_id).ok_or_else(|| {
            AnalysisError::NotExistEntry(format!("no snapshot at or below host op {host_op_id}"))
        })?;

        // single-writer per cpu_thread: take the accumulator out, fold the
        // buffer without holding the map lock, put it back
        let mut kernel = {
            let mut kernels = self.kernels.lock().expect("kernel map poisoned");
            kernels
                .entry(cpu_thread)
                .or_default()
                .remove(&kernel_id)
                .unwrap_or_else(|| KernelTrace::new(kernel_id, cubin_id))
        };
        kernel.cubin_id = cubin_id;

        let precision = *self.precision.lock().expect("precision poisoned");
        let fallback = *self.fallback.lock().expect("fallback poisoned");
        let enabled = self.enabled.lock().expect("analysis set poisoned").clone();

        let tally = trace_analyze(
            &mut kernel,
            &cubin,
            &memory_map,
            buffer,
            precision,
            &enabled,
            fallback,
        );

        {
            let mut kernels = self.kernels.lock().expect("kernel map poisoned");
            kernels
                .entry(cpu_thread)
                .or_default()
                .insert(kernel_id, kernel);
        }

        let log_callback = self.log_callback.lock().expect("log callback poisoned");
        let Some(callback) = log_callback.as_ref() else {
            return Err(AnalysisError::NotRegisterCallback);
        };
        callback(kernel_id, buffer);

        self.note_host_op(host_op_id);
        Ok(tally)
    }

    /// Begin a session: forget the smallest analyzed host op
    pub fn analysis_begin(&self) {
        debug!("analysis begin");
        self.min_host_op_id.store(0, Ordering::Relaxed);
    }

    /// End a session: prune snapshots below the smallest analyzed host op,
    /// keeping the newest pruned snapshot as a base for in-flight work
    ///
    /// # Errors
    ///
    /// `FailedAnalyzeCubin` when no trace buffer was analyzed this session.
    pub fn analysis_end(&self) -> Result<()> {
        debug!("analysis end");
        let min_host_op_id = self.min_host_op_id.load(Ordering::Relaxed);
        if min_host_op_id == 0 {
            return Err(AnalysisError::FailedAnalyzeCubin(
                "no trace buffers analyzed this session".to_string(),
            ));
        }
        self.snapshots.prune_before(min_host_op_id);
        Ok(())
    }

    /// Emit top-N summaries for every kernel owned by `cpu_thread` and
    /// erase that thread's kernel state
    ///
    /// The record sink is called once per `(analysis, direction)` slot per
    /// kernel, with PCs translated to `(function_index, pc_offset)`.
    ///
    /// # Errors
    ///
    /// `NotRegisterCallback` when no record sink is installed; nothing is
    /// emitted and the kernel state is retained.
    pub fn flush(&self, cpu_thread: u32) -> Result<()> {
        debug!(cpu_thread, "flush");

        let sink = self.record_sink.lock().expect("record sink poisoned");
        let Some(sink) = sink.as_ref() else {
            return Err(AnalysisError::NotRegisterCallback);
        };

        let thread_kernels = {
            let mut kernels = self.kernels.lock().expect("kernel map poisoned");
            kernels.remove(&cpu_thread).unwrap_or_default()
        };
        let enabled = self.enabled.lock().expect("analysis set poisoned").clone();

        for (kernel_id, kernel) in thread_kernels {
            let symbols = self
                .cubins
                .lookup(kernel.cubin_id)
                .map(|cubin| cubin.symbols.clone())
                .unwrap_or_default();

            for analysis in &enabled {
                let slots = match analysis {
                    AnalysisType::SpatialRedundancy => [
                        (AccessDirection::Read, spatial_views(&kernel.read_spatial)),
                        (AccessDirection::Write, spatial_views(&kernel.write_spatial)),
                    ],
                    AnalysisType::TemporalRedundancy => [
                        (AccessDirection::Read, temporal_views(&kernel.read_pc_pairs)),
                        (AccessDirection::Write, temporal_views(&kernel.write_pc_pairs)),
                    ],
                };
                for (direction, views) in slots {
                    let mut views = select_top_views(views, sink.pc_views_limit);
                    translate_views(&mut views, &symbols);
                    let data = RecordData {
                        analysis: *analysis,
                        direction,
                        views,
                    };
                    (sink.callback)(kernel.cubin_id, kernel_id, &data);
                }
            }
        }
        Ok(())
    }

    fn note_host_op(&self, host_op_id: u64) {
        let _ = self
            .min_host_op_id
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                if current == 0 || host_op_id < current {
                    Some(host_op_id)
                } else {
                    None
                }
            });
    }
}
