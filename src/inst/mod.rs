//! Instruction Model
//!
//! Symbols, access kinds, the per-cubin def-use instruction graph, the
//! `.inst` dump parser, and load/store type inference.

pub mod datatype;
pub mod graph;
pub mod parser;
pub mod types;

pub use datatype::{load_data_type, opcode_access_kind, store_data_type};
pub use graph::{Instruction, InstructionGraph};
pub use parser::parse_instructions;
pub use types::{AccessKind, DataType};
