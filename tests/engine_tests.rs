//! End-to-end scenarios for the analysis engine
//!
//! Each test drives the full pipeline: registries, trace ingestion,
//! canonicalization, accumulation, and the flush callback.

use redunda::{
    AccessDirection, AnalysisEngine, AnalysisType, ApproxLevel, RecordData, RecordFlags,
    TraceBuffer, WarpRecord,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Captures every record-data callback invocation
#[derive(Default)]
struct Collector {
    emitted: Mutex<Vec<(u32, u64, RecordData)>>,
}

impl Collector {
    fn install(engine: &AnalysisEngine, pc_views: usize) -> Arc<Self> {
        let collector = Arc::new(Self::default());
        let sink = Arc::clone(&collector);
        engine.record_data_callback_register(
            Box::new(move |cubin_id, kernel_id, data| {
                sink.emitted
                    .lock()
                    .unwrap()
                    .push((cubin_id, kernel_id, data.clone()));
            }),
            pc_views,
            pc_views,
        );
        collector
    }

    fn slot(&self, analysis: AnalysisType, direction: AccessDirection) -> Vec<RecordData> {
        self.emitted
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, data)| data.clone())
            .filter(|data| data.analysis == analysis && data.direction == direction)
            .collect()
    }
}

fn read_record(pc: u64, addr: u64, value: u32) -> WarpRecord {
    let mut record = WarpRecord {
        pc,
        active_mask: 0x1,
        size: 4,
        flags: RecordFlags::READ,
        ..Default::default()
    };
    record.addresses[0] = addr;
    record.values[0][..4].copy_from_slice(&value.to_le_bytes());
    record
}

fn buffer_of(records: Vec<WarpRecord>) -> TraceBuffer {
    TraceBuffer {
        head_index: records.len(),
        records,
    }
}

/// Engine with a log sink, one cubin (no instruction dump), and one
/// allocation `[0x1000, 0x2000)` registered at host op 10
fn basic_engine() -> AnalysisEngine {
    let engine = AnalysisEngine::new();
    engine.log_data_callback_register(Box::new(|_, _| {}));
    let _ = engine.cubin_register(1, &[0x1000], Path::new("m/cubins/k.cubin"));
    engine.memory_register(0x1000, 0x2000, 10, 42).unwrap();
    engine
}

/// spatial redundancy for a single kernel without instruction metadata
#[test]
fn spatial_single_kernel_without_dump() {
    let engine = basic_engine();
    engine.analysis_enable(AnalysisType::SpatialRedundancy);
    engine.approx_level_config(ApproxLevel::None);
    let collector = Collector::install(&engine, 10);

    engine
        .analyze(0, 1, 1, 10, &buffer_of(vec![read_record(0x1010, 0x1100, 0xBF80_0000)]))
        .unwrap();
    engine.flush(0).unwrap();

    let reads = collector.slot(AnalysisType::SpatialRedundancy, AccessDirection::Read);
    assert_eq!(reads.len(), 1);
    assert_eq!(reads[0].views.len(), 1);
    let view = &reads[0].views[0];
    assert_eq!(view.function_index, 0);
    assert_eq!(view.pc_offset, 0x10);
    assert_eq!(view.count, 1);
    assert_eq!(view.value, 0xBF80_0000);
    assert_eq!(view.memory_op_id, 10);

    let writes = collector.slot(AnalysisType::SpatialRedundancy, AccessDirection::Write);
    assert_eq!(writes.len(), 1);
    assert!(writes[0].views.is_empty());
}

/// canonicalization collapses nearby float values into one class
#[test]
fn canonicalization_collapses_values() {
    let engine = basic_engine();
    engine.analysis_enable(AnalysisType::SpatialRedundancy);
    engine.approx_level_config(ApproxLevel::High);
    let collector = Collector::install(&engine, 10);

    engine
        .analyze(
            0,
            1,
            1,
            10,
            &buffer_of(vec![
                read_record(0x1010, 0x1100, 0x3F80_0001),
                read_record(0x1010, 0x1104, 0x3F80_0002),
            ]),
        )
        .unwrap();
    engine.flush(0).unwrap();

    let reads = collector.slot(AnalysisType::SpatialRedundancy, AccessDirection::Read);
    assert_eq!(reads[0].views.len(), 1);
    assert_eq!(reads[0].views[0].count, 2);
    assert_eq!(reads[0].views[0].value, 0x3F80_0000);
}

/// consecutive same-address touches by one thread form a temporal pair
#[test]
fn temporal_pair_reported() {
    let engine = basic_engine();
    engine.analysis_enable(AnalysisType::TemporalRedundancy);
    let collector = Collector::install(&engine, 10);

    engine
        .analyze(
            0,
            1,
            1,
            10,
            &buffer_of(vec![
                read_record(0x1010, 0x1100, 7),
                read_record(0x1020, 0x1100, 7),
            ]),
        )
        .unwrap();
    engine.flush(0).unwrap();

    let reads = collector.slot(AnalysisType::TemporalRedundancy, AccessDirection::Read);
    assert_eq!(reads.len(), 1);
    assert_eq!(reads[0].views.len(), 1);
    let view = &reads[0].views[0];
    assert_eq!(view.pc_offset, 0x20);
    assert_eq!(view.prev.unwrap().pc_offset, 0x10);
    assert_eq!(view.count, 1);

    let writes = collector.slot(AnalysisType::TemporalRedundancy, AccessDirection::Write);
    assert!(writes[0].views.is_empty());
}

/// a block exit terminates its threads' temporal history
#[test]
fn block_exit_clears_temporal_history() {
    let engine = basic_engine();
    engine.analysis_enable(AnalysisType::TemporalRedundancy);
    let collector = Collector::install(&engine, 10);

    let exit = WarpRecord {
        active_mask: 0x1,
        size: 1,
        flags: RecordFlags::BLOCK_EXIT,
        ..Default::default()
    };
    engine
        .analyze(
            0,
            1,
            1,
            10,
            &buffer_of(vec![
                read_record(0x1010, 0x1100, 7),
                exit,
                read_record(0x1020, 0x1100, 7),
            ]),
        )
        .unwrap();
    engine.flush(0).unwrap();

    let reads = collector.slot(AnalysisType::TemporalRedundancy, AccessDirection::Read);
    assert!(reads[0].views.is_empty(), "history was cleared at block exit");
}

/// accesses resolve against the snapshot at or below their host op
#[test]
fn snapshot_selection_by_host_op() {
    let engine = AnalysisEngine::new();
    engine.log_data_callback_register(Box::new(|_, _| {}));
    engine.analysis_enable(AnalysisType::SpatialRedundancy);
    let _ = engine.cubin_register(1, &[0x1000], Path::new("m/cubins/k.cubin"));
    engine.memory_register(0x1000, 0x2000, 5, 1).unwrap();
    engine.memory_register(0x3000, 0x4000, 15, 2).unwrap();
    let collector = Collector::install(&engine, 10);

    // at host op 10 the second allocation does not exist yet
    engine
        .analyze(0, 1, 1, 10, &buffer_of(vec![read_record(0x1010, 0x3800, 7)]))
        .unwrap();
    engine.flush(0).unwrap();
    let reads = collector.slot(AnalysisType::SpatialRedundancy, AccessDirection::Read);
    assert!(reads[0].views.is_empty(), "unmatched access contributes nothing");

    // at host op 20 it does
    engine
        .analyze(0, 1, 2, 20, &buffer_of(vec![read_record(0x1010, 0x3800, 7)]))
        .unwrap();
    engine.flush(0).unwrap();
    let reads = collector.slot(AnalysisType::SpatialRedundancy, AccessDirection::Read);
    assert_eq!(reads[1].views.len(), 1);
    assert_eq!(reads[1].views[0].memory_op_id, 15);
}

fn write_dump(dir: &Path, cubin_name: &str) -> PathBuf {
    let inst_dir = dir.join("structs").join("nvidia");
    fs::create_dir_all(&inst_dir).unwrap();
    fs::write(
        inst_dir.join(format!("{cubin_name}.inst")),
        "function 0 0x0\n\
         0x0000: MOV R2 ; ;\n\
         0x0008: LDG.E.32 R4 ; R2 ; R2=0x0\n\
         0x0010: FADD R8 ; R4 R5 ; R4=0x8\n",
    )
    .unwrap();
    let cubin_dir = dir.join("cubins");
    fs::create_dir_all(&cubin_dir).unwrap();
    cubin_dir.join(cubin_name)
}

/// a cached cubin is promoted on first use and analysis proceeds
#[test]
fn cache_promotion_on_first_analyze() {
    let dir = tempfile::tempdir().unwrap();
    let cubin_path = write_dump(dir.path(), "k.cubin");

    let engine = AnalysisEngine::new();
    engine.log_data_callback_register(Box::new(|_, _| {}));
    engine.analysis_enable(AnalysisType::SpatialRedundancy);
    engine.cubin_cache_register(7, &[0x1000], &cubin_path).unwrap();
    engine.memory_register(0x1000, 0x2000, 10, 42).unwrap();
    let collector = Collector::install(&engine, 10);

    // pc 0x1008 resolves to the typed load at cubin offset 0x8
    engine
        .analyze(3, 7, 9, 10, &buffer_of(vec![read_record(0x1008, 0x1100, 7)]))
        .unwrap();
    engine.flush(3).unwrap();

    let reads = collector.slot(AnalysisType::SpatialRedundancy, AccessDirection::Read);
    assert_eq!(reads[0].views.len(), 1);
    let view = &reads[0].views[0];
    assert_eq!(view.pc_offset, 0x8);
    assert_eq!(view.access_kind.unit_size, 32);
    assert_eq!(view.count, 1);

    let emitted = collector.emitted.lock().unwrap();
    assert!(emitted.iter().all(|(cubin_id, kernel_id, _)| {
        *cubin_id == 7 && *kernel_id == 9
    }));
}

/// an empty buffer analyzes fine and produces no views
#[test]
fn empty_buffer_yields_no_views() {
    let engine = basic_engine();
    engine.analysis_enable(AnalysisType::SpatialRedundancy);
    engine.analysis_enable(AnalysisType::TemporalRedundancy);
    let collector = Collector::install(&engine, 10);

    engine.analyze(0, 1, 1, 10, &TraceBuffer::default()).unwrap();
    engine.flush(0).unwrap();

    let emitted = collector.emitted.lock().unwrap();
    assert_eq!(emitted.len(), 4, "one callback per analysis/direction slot");
    assert!(emitted.iter().all(|(_, _, data)| data.views.is_empty()));
}

/// both analyses across reads and writes in one kernel
#[test]
fn combined_analyses_read_and_write() {
    let engine = basic_engine();
    engine.analysis_enable(AnalysisType::SpatialRedundancy);
    engine.analysis_enable(AnalysisType::TemporalRedundancy);
    let collector = Collector::install(&engine, 10);

    let mut writes: Vec<WarpRecord> = vec![
        read_record(0x1030, 0x1200, 5),
        read_record(0x1030, 0x1204, 5),
        read_record(0x1040, 0x1200, 5),
    ];
    for write in &mut writes {
        write.flags = RecordFlags::WRITE;
    }

    let mut records = vec![
        read_record(0x1010, 0x1100, 7),
        read_record(0x1010, 0x1104, 7),
        read_record(0x1020, 0x1100, 7),
    ];
    records.extend(writes);
    engine.analyze(0, 1, 1, 10, &buffer_of(records)).unwrap();
    engine.flush(0).unwrap();

    let spatial_reads = collector.slot(AnalysisType::SpatialRedundancy, AccessDirection::Read);
    assert_eq!(spatial_reads[0].views[0].count, 2);
    let spatial_writes = collector.slot(AnalysisType::SpatialRedundancy, AccessDirection::Write);
    assert_eq!(spatial_writes[0].views[0].count, 2);
    let temporal_reads = collector.slot(AnalysisType::TemporalRedundancy, AccessDirection::Read);
    assert_eq!(temporal_reads[0].views[0].count, 1);
    let temporal_writes = collector.slot(AnalysisType::TemporalRedundancy, AccessDirection::Write);
    assert_eq!(temporal_writes[0].views[0].count, 1);
    assert_eq!(temporal_writes[0].views[0].prev.unwrap().pc_offset, 0x30);
    assert_eq!(temporal_writes[0].views[0].pc_offset, 0x40);
}

/// the top-N limit bounds emitted views, ranked by count
#[test]
fn pc_views_limit_bounds_output() {
    let engine = AnalysisEngine::new();
    engine.log_data_callback_register(Box::new(|_, _| {}));
    engine.analysis_enable(AnalysisType::SpatialRedundancy);
    let _ = engine.cubin_register(1, &[0x1000], Path::new("m/cubins/k.cubin"));
    // three allocations, three buckets
    engine.memory_register(0x1000, 0x2000, 5, 1).unwrap();
    engine.memory_register(0x3000, 0x4000, 6, 2).unwrap();
    engine.memory_register(0x5000, 0x6000, 7, 3).unwrap();
    let collector = Collector::install(&engine, 2);

    let records = vec![
        read_record(0x1010, 0x1100, 7),
        read_record(0x1010, 0x3100, 7),
        read_record(0x1010, 0x3104, 7),
        read_record(0x1010, 0x5100, 7),
        read_record(0x1010, 0x5104, 7),
        read_record(0x1010, 0x5108, 7),
    ];
    engine.analyze(0, 1, 1, 10, &buffer_of(records)).unwrap();
    engine.flush(0).unwrap();

    let reads = collector.slot(AnalysisType::SpatialRedundancy, AccessDirection::Read);
    let views = &reads[0].views;
    assert_eq!(views.len(), 2, "bounded by the pc_views limit");
    assert_eq!(views[0].count, 3);
    assert_eq!(views[0].memory_op_id, 7);
    assert_eq!(views[1].count, 2);
    assert_eq!(views[1].memory_op_id, 6);
}

/// parallel CPU threads feed disjoint kernel sub-maps
#[test]
fn parallel_threads_disjoint_state() {
    let engine = Arc::new(basic_engine());
    engine.analysis_enable(AnalysisType::SpatialRedundancy);
    let collector = Collector::install(&engine, 10);

    std::thread::scope(|scope| {
        for cpu_thread in 0..4u32 {
            let engine = Arc::clone(&engine);
            scope.spawn(move || {
                for i in 0..8 {
                    let addr = 0x1100 + u64::from(cpu_thread) * 0x100 + i * 4;
                    engine
                        .analyze(
                            cpu_thread,
                            1,
                            u64::from(cpu_thread),
                            10,
                            &buffer_of(vec![read_record(0x1010, addr, 7)]),
                        )
                        .unwrap();
                }
            });
        }
    });

    for cpu_thread in 0..4 {
        engine.flush(cpu_thread).unwrap();
    }

    let reads = collector.slot(AnalysisType::SpatialRedundancy, AccessDirection::Read);
    assert_eq!(reads.len(), 4);
    for data in reads {
        assert_eq!(data.views.len(), 1);
        assert_eq!(data.views[0].count, 8);
    }
}
