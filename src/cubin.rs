//! Cubin Registry
//!
//! Tracks active cubins (fully parsed, symbol PCs assigned) and cached
//! cubin metadata registered before an instruction dump may exist. Cached
//! entries are promoted to active cubins lazily when the analyzer first
//! needs them.

use crate::error::{AnalysisError, Result};
use crate::inst::{parse_instructions, InstructionGraph};
use crate::symbol::Symbol;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// An active, fully parsed cubin
#[derive(Debug, Default)]
pub struct Cubin {
    /// Registry id of the cubin
    pub cubin_id: u32,
    /// Path the cubin was registered under
    pub path: PathBuf,
    /// Function symbols, sorted by runtime PC
    pub symbols: Vec<Symbol>,
    /// Def-use instruction graph; empty when no dump was found
    pub graph: InstructionGraph,
}

/// Minimal metadata held before an instruction dump may exist
#[derive(Debug, Clone)]
struct CubinCache {
    path: PathBuf,
    symbol_pcs: Vec<u64>,
}

/// Registry of active and cached cubins
#[derive(Debug, Default)]
pub struct CubinRegistry {
    active: Mutex<BTreeMap<u32, Arc<Cubin>>>,
    cache: Mutex<BTreeMap<u32, CubinCache>>,
}

impl CubinRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cubin and parse its instruction dump
    ///
    /// The dump is looked up at
    /// `<grandparent(path)>/structs/nvidia/<file_name(path)>.inst`.
    /// `symbol_pcs[i]` is assigned to the symbol with index `i`, then
    /// symbols are sorted by PC.
    ///
    /// When the dump is missing the cubin is still inserted with pc-only
    /// symbols and an empty graph, and the call reports `NoSuchFile`; PC
    /// attribution keeps working, type inference falls back to defaults.
    ///
    /// # Errors
    ///
    /// `DuplicateEntry` when the id is already active (nothing replaced),
    /// `FailedAnalyzeCubin` when the dump exists but does not parse (not
    /// inserted), `NoSuchFile` as described above.
    pub fn register(&self, cubin_id: u32, symbol_pcs: &[u64], path: &Path) -> Result<()> {
        debug!(cubin_id, path = %path.display(), "register cubin");

        let inst_path = instruction_path(path);
        let parsed = match &inst_path {
            Some(p) if p.exists() => Some(parse_instructions(p)?),
            _ => None,
        };
        let found_dump = parsed.is_some();

        let mut symbols: Vec<Symbol> = symbol_pcs
            .iter()
            .enumerate()
            .map(|(i, _)| Symbol::new(i as u32, 0, 0))
            .collect();
        let graph = match parsed {
            Some((parsed_symbols, graph)) => {
                for parsed_symbol in parsed_symbols {
                    if let Some(slot) = symbols.get_mut(parsed_symbol.index as usize) {
                        slot.cubin_offset = parsed_symbol.cubin_offset;
                    }
                }
                graph
            }
            None => InstructionGraph::new(),
        };
        for (symbol, &pc) in symbols.iter_mut().zip(symbol_pcs) {
            symbol.pc = pc;
        }
        symbols.sort_by_key(|s| s.pc);

        let cubin = Arc::new(Cubin {
            cubin_id,
            path: path.to_path_buf(),
            symbols,
            graph,
        });

        let mut active = self.active.lock().expect("cubin registry poisoned");
        if active.contains_key(&cubin_id) {
            return Err(AnalysisError::DuplicateEntry(format!("cubin {cubin_id}")));
        }
        active.insert(cubin_id, cubin);
        drop(active);

        if found_dump {
            Ok(())
        } else {
            let missing = inst_path.unwrap_or_else(|| path.to_path_buf());
            Err(AnalysisError::NoSuchFile(missing.display().to_string()))
        }
    }

    /// Cache cubin metadata for later lazy promotion
    ///
    /// # Errors
    ///
    /// `DuplicateEntry` when the id is already cached.
    pub fn cache_register(&self, cubin_id: u32, symbol_pcs: &[u64], path: &Path) -> Result<()> {
        debug!(cubin_id, path = %path.display(), "cache cubin");

        let mut cache = self.cache.lock().expect("cubin cache poisoned");
        if cache.contains_key(&cubin_id) {
            return Err(AnalysisError::DuplicateEntry(format!(
                "cubin cache {cubin_id}"
            )));
        }
        cache.insert(
            cubin_id,
            CubinCache {
                path: path.to_path_buf(),
                symbol_pcs: symbol_pcs.to_vec(),
            },
        );
        Ok(())
    }

    /// Remove an active cubin; cached metadata is left in place
    ///
    /// # Errors
    ///
    /// `NotExistEntry` when the id is not active.
    pub fn unregister(&self, cubin_id: u32) -> Result<()> {
        debug!(cubin_id, "unregister cubin");

        let mut active = self.active.lock().expect("cubin registry poisoned");
        active
            .remove(&cubin_id)
            .map(|_| ())
            .ok_or_else(|| AnalysisError::NotExistEntry(format!("cubin {cubin_id}")))
    }

    /// Fetch an active cubin
    #[must_use]
    pub fn lookup(&self, cubin_id: u32) -> Option<Arc<Cubin>> {
        let active = self.active.lock().expect("cubin registry poisoned");
        active.get(&cubin_id).map(Arc::clone)
    }

    /// Fetch an active cubin, promoting cached metadata once if needed
    ///
    /// A missing dump (`NoSuchFile`) and a registration race
    /// (`DuplicateEntry`) both leave a usable active entry behind, so the
    /// active map is retried once for either.
    ///
    /// # Errors
    ///
    /// `NotExistEntry` when the id is neither active nor cached; other
    /// promotion failures propagate.
    pub fn resolve(&self, cubin_id: u32) -> Result<Arc<Cubin>> {
        if let Some(cubin) = self.lookup(cubin_id) {
            return Ok(cubin);
        }

        let cached = {
            let cache = self.cache.lock().expect("cubin cache poisoned");
            cache.get(&cubin_id).cloned()
        }
        .ok_or_else(|| AnalysisError::NotExistEntry(format!("cubin {cubin_id}")))?;

        debug!(cubin_id, "promote cached cubin");
        match self.register(cubin_id, &cached.symbol_pcs, &cached.path) {
            Ok(())
            | Err(AnalysisError::NoSuchFile(_))
            | Err(AnalysisError::DuplicateEntry(_)) => {}
            Err(err) => return Err(err),
        }

        self.lookup(cubin_id)
            .ok_or_else(|| AnalysisError::NotExistEntry(format!("cubin {cubin_id}")))
    }
}

/// Instruction dump location for a cubin path: two directories up, under
/// `structs/nvidia/`, with `.inst` appended to the file name
fn instruction_path(path: &Path) -> Option<PathBuf> {
    let file_name = path.file_name()?;
    let base = path.parent()?.parent()?;
    let mut inst_name = file_name.to_os_string();
    inst_name.push(".inst");
    Some(base.join("structs").join("nvidia").join(inst_name))
}
