//! Symbol Table and PC Translation
//!
//! Maps a runtime PC observed in a trace back to the function it belongs to
//! and its offsets inside the cubin.

use crate::error::{AnalysisError, Result};
use serde::{Deserialize, Serialize};

/// A function entry of a cubin
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    /// Function index within the cubin
    pub index: u32,
    /// Offset of the function inside the cubin image
    pub cubin_offset: u64,
    /// Runtime PC of the function entry, assigned at registration
    pub pc: u64,
}

impl Symbol {
    /// Create a symbol
    #[must_use]
    pub const fn new(index: u32, cubin_offset: u64, pc: u64) -> Self {
        Self {
            index,
            cubin_offset,
            pc,
        }
    }
}

/// A runtime PC resolved against a symbol table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealPc {
    /// Index of the owning function
    pub function_index: u32,
    /// Offset inside the cubin image
    pub cubin_offset: u64,
    /// Offset from the function entry
    pub pc_offset: u64,
}

/// Resolve a runtime PC to `(function_index, cubin_offset, pc_offset)`
///
/// `symbols` must be sorted by `pc`; the match is the greatest symbol with
/// `symbol.pc <= pc`.
///
/// # Errors
///
/// Returns `NotExistEntry` when no symbol covers `pc`.
pub fn transform_pc(symbols: &[Symbol], pc: u64) -> Result<RealPc> {
    let idx = symbols.partition_point(|s| s.pc <= pc);
    if idx == 0 {
        return Err(AnalysisError::NotExistEntry(format!(
            "no symbol covers pc {pc:#x}"
        )));
    }
    let symbol = &symbols[idx - 1];
    let pc_offset = pc - symbol.pc;
    Ok(RealPc {
        function_index: symbol.index,
        cubin_offset: pc_offset + symbol.cubin_offset,
        pc_offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols() -> Vec<Symbol> {
        vec![
            Symbol::new(0, 0x0, 0x1000),
            Symbol::new(1, 0x400, 0x2000),
            Symbol::new(2, 0x900, 0x4000),
        ]
    }

    #[test]
    fn test_transform_within_function() {
        let real = transform_pc(&symbols(), 0x2010).unwrap();
        assert_eq!(real.function_index, 1);
        assert_eq!(real.pc_offset, 0x10);
        assert_eq!(real.cubin_offset, 0x410);
    }

    #[test]
    fn test_transform_at_entry() {
        let real = transform_pc(&symbols(), 0x4000).unwrap();
        assert_eq!(real.function_index, 2);
        assert_eq!(real.pc_offset, 0);
        assert_eq!(real.cubin_offset, 0x900);
    }

    #[test]
    fn test_transform_past_last_symbol() {
        let real = transform_pc(&symbols(), 0x9999).unwrap();
        assert_eq!(real.function_index, 2);
        assert_eq!(real.pc_offset, 0x9999 - 0x4000);
    }

    #[test]
    fn test_transform_below_first_symbol_fails() {
        let err = transform_pc(&symbols(), 0xfff).unwrap_err();
        assert!(matches!(err, AnalysisError::NotExistEntry(_)));
    }

    #[test]
    fn test_transform_empty_table_fails() {
        assert!(transform_pc(&[], 0x1000).is_err());
    }

    /// round trip: every pc inside a function maps back to that function
    #[test]
    fn test_round_trip_offsets() {
        let table = symbols();
        for k in 0..0x20 {
            let real = transform_pc(&table, table[1].pc + k).unwrap();
            assert_eq!(real.function_index, 1);
            assert_eq!(real.pc_offset, k);
            assert_eq!(real.cubin_offset, table[1].cubin_offset + k);
        }
    }
}
