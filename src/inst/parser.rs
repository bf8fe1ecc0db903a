//! Instruction Dump Parser
//!
//! Parses the `.inst` text dump produced by the external disassembler into
//! symbols and a def-use [`InstructionGraph`].
//!
//! # Format
//!
//! Line oriented; `#` comments and blank lines are skipped:
//!
//! ```text
//! function <index> <cubin_offset>
//! <pc>: [@[!]P<k>] <OPCODE> [R..]* ; [R..]* ; [R<n>=<pc>[|<pc>]*]*
//! ```
//!
//! - `function` lines declare symbols in index order; the runtime PC of
//!   each symbol is assigned later by the cubin registry.
//! - Instruction operand fields are destinations, sources, and per-source
//!   producing PCs (`assign_pcs`), separated by `;`. Store instructions
//!   list the stored-value register first among sources.
//! - Numbers accept decimal or `0x` hex.
//!
//! Def-use edges are added producer -> consumer from the assignment lists
//! here and nowhere else; the graph is read-only afterwards.

use super::datatype::opcode_access_kind;
use super::graph::{Instruction, InstructionGraph};
use crate::error::{AnalysisError, Result};
use crate::symbol::Symbol;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Parse an instruction dump into symbols and a def-use graph
///
/// Symbols carry `(index, cubin_offset)` only; their runtime PCs are filled
/// in by the registry.
///
/// # Errors
///
/// Returns `FailedAnalyzeCubin` on any malformed line and `Io` if the file
/// cannot be read.
pub fn parse_instructions(path: &Path) -> Result<(Vec<Symbol>, InstructionGraph)> {
    let text = fs::read_to_string(path)?;
    parse_instruction_text(&text)
}

fn parse_instruction_text(text: &str) -> Result<(Vec<Symbol>, InstructionGraph)> {
    let function_re = Regex::new(r"^function\s+(\d+)\s+(0x[0-9a-fA-F]+|\d+)$").unwrap();
    let inst_re =
        Regex::new(r"^(0x[0-9a-fA-F]+|\d+):\s*(?:@(!?)P(\d+)\s+)?(\S+)([^;]*);([^;]*);(.*)$")
            .unwrap();
    let reg_re = Regex::new(r"^R(\d+)$").unwrap();
    let assign_re = Regex::new(r"^R(\d+)=((?:0x[0-9a-fA-F]+|\d+)(?:\|(?:0x[0-9a-fA-F]+|\d+))*)$")
        .unwrap();

    let mut symbols = Vec::new();
    let mut graph = InstructionGraph::new();

    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(caps) = function_re.captures(line) {
            let index = parse_u64(&caps[1], lineno)? as u32;
            let cubin_offset = parse_u64(&caps[2], lineno)?;
            symbols.push(Symbol::new(index, cubin_offset, 0));
            continue;
        }

        let caps = inst_re.captures(line).ok_or_else(|| malformed(lineno, line))?;

        let pc = parse_u64(&caps[1], lineno)?;
        let predicate = match caps.get(3) {
            Some(p) => Some(parse_u64(p.as_str(), lineno)? as u32),
            None => None,
        };
        let op = caps[4].to_string();

        let dsts = parse_registers(&caps[5], &reg_re, lineno)?;
        let srcs = parse_registers(&caps[6], &reg_re, lineno)?;

        let mut assign_pcs: BTreeMap<u32, Vec<u64>> = BTreeMap::new();
        for token in caps[7].split_whitespace() {
            let acaps = assign_re
                .captures(token)
                .ok_or_else(|| malformed(lineno, token))?;
            let reg = parse_u64(&acaps[1], lineno)? as u32;
            let mut pcs = Vec::new();
            for p in acaps[2].split('|') {
                pcs.push(parse_u64(p, lineno)?);
            }
            assign_pcs.insert(reg, pcs);
        }

        for pcs in assign_pcs.values() {
            for &producer in pcs {
                graph.add_edge(producer, pc);
            }
        }

        let access_kind = opcode_access_kind(&op);
        graph.add_node(Instruction {
            op,
            pc,
            predicate,
            dsts,
            srcs,
            assign_pcs,
            access_kind,
        });
    }

    Ok((symbols, graph))
}

fn parse_registers(field: &str, reg_re: &Regex, lineno: usize) -> Result<Vec<u32>> {
    let mut regs = Vec::new();
    for token in field.split_whitespace() {
        let caps = reg_re
            .captures(token)
            .ok_or_else(|| malformed(lineno, token))?;
        regs.push(parse_u64(&caps[1], lineno)? as u32);
    }
    Ok(regs)
}

fn parse_u64(token: &str, lineno: usize) -> Result<u64> {
    let parsed = if let Some(hex) = token.strip_prefix("0x") {
        u64::from_str_radix(hex, 16)
    } else {
        token.parse()
    };
    parsed.map_err(|_| malformed(lineno, token))
}

fn malformed(lineno: usize, what: &str) -> AnalysisError {
    AnalysisError::FailedAnalyzeCubin(format!("line {}: malformed `{}`", lineno + 1, what))
}
