//! Program tooling for the LS-8.
//!
//! This module provides:
//! - The `.ls8` program file loader/writer
//! - A simple two-pass assembler (mnemonics → bytes)
//! - A disassembler (bytes → readable text)

pub mod assembler;
pub mod disasm;
pub mod loader;

pub use assembler::{assemble, AssemblerError};
pub use disasm::disassemble;
pub use loader::{load_program_file, parse_program, save_program, LoadError, ProgramFile};

use crate::cpu::decode::Opcode;
use crate::cpu::dispatch::Entry;

/// How an operand byte is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// A register index, written `R0`-`R7`.
    Register,
    /// A literal byte.
    Immediate,
}

/// Operand kinds for an instruction, one per operand byte.
pub fn operand_kinds(entry: &Entry) -> Vec<OperandKind> {
    let count = entry.arity().count();
    (0..count)
        .map(|i| {
            if entry.opcode == Opcode::LDI && i == 1 {
                OperandKind::Immediate
            } else {
                OperandKind::Register
            }
        })
        .collect()
}
