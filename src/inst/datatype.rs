//! Memory Access Type Inference
//!
//! Derives the primitive type handled by a load or store from the def-use
//! graph. Resolution order: the memory opcode itself when it is typed, then
//! the immediate consumers of a load's destination (or producers of a
//! store's value register), where the first arithmetic or conversion op
//! that discloses a type wins. Anything else stays `UNKNOWN` and callers
//! fall back to a default shape.

use super::graph::InstructionGraph;
use super::types::{AccessKind, DataType};

/// Derive the access kind of the load at `pc`
///
/// Returns [`AccessKind::unknown`] when `pc` is not a load or nothing in
/// the neighborhood discloses a type.
#[must_use]
pub fn load_data_type(pc: u64, graph: &InstructionGraph) -> AccessKind {
    let Some(inst) = graph.node(pc) else {
        return AccessKind::unknown();
    };
    if !inst.is_load() {
        return AccessKind::unknown();
    }
    if let Some(kind) = inst.access_kind {
        return kind;
    }

    let vec_size = memory_width_bits(&inst.op);
    for consumer_pc in graph.outgoing_pcs(pc) {
        let Some(consumer) = graph.node(consumer_pc) else {
            continue;
        };
        let disclosed = conversion_io(&consumer.op)
            .map(|(input, _)| input)
            .or_else(|| arithmetic_kind(&consumer.op));
        if let Some((data_type, unit_size)) = disclosed {
            return AccessKind::new(unit_size, vec_size.max(unit_size), data_type);
        }
    }

    AccessKind::unknown()
}

/// Derive the access kind of the store at `pc`
///
/// Walks the producers of the stored-value register (the first source) via
/// `assign_pcs`, falling back to all incoming def-use edges.
#[must_use]
pub fn store_data_type(pc: u64, graph: &InstructionGraph) -> AccessKind {
    let Some(inst) = graph.node(pc) else {
        return AccessKind::unknown();
    };
    if !inst.is_store() {
        return AccessKind::unknown();
    }
    if let Some(kind) = inst.access_kind {
        return kind;
    }

    let vec_size = memory_width_bits(&inst.op);
    let mut producers: Vec<u64> = inst
        .srcs
        .first()
        .and_then(|reg| inst.assign_pcs.get(reg))
        .cloned()
        .unwrap_or_default();
    if producers.is_empty() {
        producers = graph.incoming_pcs(pc).collect();
    }

    for producer_pc in producers {
        let Some(producer) = graph.node(producer_pc) else {
            continue;
        };
        let disclosed = conversion_io(&producer.op)
            .map(|(_, output)| output)
            .or_else(|| arithmetic_kind(&producer.op));
        if let Some((data_type, unit_size)) = disclosed {
            return AccessKind::new(unit_size, vec_size.max(unit_size), data_type);
        }
    }

    AccessKind::unknown()
}

/// Access kind statically encoded by a typed memory opcode, e.g. `LDG.E.F32`
///
/// Untyped memory ops (width suffix only) disclose nothing.
#[must_use]
pub fn opcode_access_kind(op: &str) -> Option<AccessKind> {
    let mut tokens = op.split('.');
    let base = tokens.next()?;
    if !is_memory_base(base) {
        return None;
    }

    let mut vec_size = None;
    let mut typed = None;
    for token in tokens {
        if let Some(width) = width_token(token) {
            vec_size = Some(width);
        } else if let Some(kind) = type_token(token) {
            typed = Some(kind);
        }
    }

    let (data_type, unit_size) = typed?;
    let vec_size = vec_size.unwrap_or(unit_size).max(unit_size);
    Some(AccessKind::new(unit_size, vec_size, data_type))
}

/// Total width in bits of a memory opcode, from its width suffix
fn memory_width_bits(op: &str) -> u32 {
    op.split('.').skip(1).find_map(width_token).unwrap_or(32)
}

fn is_memory_base(base: &str) -> bool {
    matches!(
        base,
        "LD" | "LDG" | "LDL" | "LDS" | "LDC" | "ST" | "STG" | "STL" | "STS"
    )
}

/// The operand type of a plain arithmetic/logic opcode
fn arithmetic_kind(op: &str) -> Option<(DataType, u32)> {
    let base = op.split('.').next()?;
    match base {
        "FADD" | "FMUL" | "FFMA" | "FMNMX" | "FSET" | "FSETP" | "FSEL" | "FCHK" | "FSWZADD"
        | "MUFU" | "RRO" => Some((DataType::Float, 32)),
        "DADD" | "DMUL" | "DFMA" | "DSETP" | "DMNMX" => Some((DataType::Float, 64)),
        "HADD2" | "HMUL2" | "HFMA2" | "HSET2" | "HSETP2" => Some((DataType::Float, 16)),
        "IADD" | "IADD3" | "IMAD" | "IMUL" | "IMNMX" | "ISETP" | "ISCADD" | "IABS" | "IDP"
        | "LEA" | "LOP" | "LOP3" | "PLOP3" | "SHL" | "SHR" | "SHF" | "POPC" | "FLO" | "BREV"
        | "VABSDIFF" => Some((DataType::Integer, 32)),
        _ => None,
    }
}

/// Input and output kinds of a conversion opcode
///
/// Suffix type tokens are ordered destination-then-source, e.g.
/// `I2F.F32.S16` converts a 16-bit integer into a 32-bit float.
fn conversion_io(op: &str) -> Option<((DataType, u32), (DataType, u32))> {
    let mut tokens = op.split('.');
    let base = tokens.next()?;
    let (input_type, output_type) = match base {
        "I2F" => (DataType::Integer, DataType::Float),
        "F2I" => (DataType::Float, DataType::Integer),
        "F2F" | "FRND" => (DataType::Float, DataType::Float),
        "I2I" => (DataType::Integer, DataType::Integer),
        _ => return None,
    };

    let typed: Vec<u32> = tokens.filter_map(|t| type_token(t).map(|(_, w)| w)).collect();
    let (output_width, input_width) = match typed.as_slice() {
        [dst, src, ..] => (*dst, *src),
        [only] => (*only, *only),
        [] => (32, 32),
    };

    Some(((input_type, input_width), (output_type, output_width)))
}

fn type_token(token: &str) -> Option<(DataType, u32)> {
    match token {
        "F16" => Some((DataType::Float, 16)),
        "F32" => Some((DataType::Float, 32)),
        "F64" => Some((DataType::Float, 64)),
        "U8" | "S8" => Some((DataType::Integer, 8)),
        "U16" | "S16" => Some((DataType::Integer, 16)),
        "U32" | "S32" => Some((DataType::Integer, 32)),
        "U64" | "S64" => Some((DataType::Integer, 64)),
        _ => None,
    }
}

fn width_token(token: &str) -> Option<u32> {
    match token {
        "8" => Some(8),
        "16" => Some(16),
        "32" => Some(32),
        "64" => Some(64),
        "128" => Some(128),
        _ => None,
    }
}
