//! Disassembler for LS-8 programs.
//!
//! Converts memory bytes back to readable assembly using the dispatch table
//! for mnemonics and operand counts.

use super::{operand_kinds, OperandKind};
use crate::cpu::dispatch::DispatchTable;
use crate::cpu::execute::Executed;

/// Disassemble the instruction starting at `addr`.
///
/// Returns the text and the number of bytes consumed. Bytes that do not
/// start a known instruction render as `DB` data.
pub fn disassemble_at(bytes: &[u8], addr: usize) -> (String, usize) {
    let Some(&opcode) = bytes.get(addr) else {
        return ("DB ??".to_string(), 1);
    };

    let table = DispatchTable::standard();
    let Some(entry) = table.get(opcode) else {
        return (format!("DB {:#04X}", opcode), 1);
    };

    let len = 1 + entry.arity().count();
    match bytes.get(addr + 1..addr + len) {
        Some(operands) => (format_instruction(opcode, operands), len),
        None => (format!("DB {:#04X}", opcode), 1),
    }
}

/// Format an opcode and its operand bytes.
pub fn format_instruction(opcode: u8, operands: &[u8]) -> String {
    let Some(entry) = DispatchTable::standard().get(opcode) else {
        return format!("DB {:#04X}", opcode);
    };

    let parts: Vec<String> = operand_kinds(entry)
        .into_iter()
        .zip(operands)
        .map(|(kind, byte)| match kind {
            OperandKind::Register => format!("R{}", byte),
            OperandKind::Immediate => format!("{:#04X}", byte),
        })
        .collect();

    if parts.is_empty() {
        entry.mnemonic.to_string()
    } else {
        format!("{} {}", entry.mnemonic, parts.join(", "))
    }
}

/// Format an instruction the engine just executed.
pub fn format_executed(executed: &Executed) -> String {
    let count = executed.decoded.arity.count();
    format_instruction(executed.decoded.opcode, &executed.operands[..count])
}

/// Disassemble a whole memory image.
pub fn disassemble(bytes: &[u8]) -> String {
    let mut output = String::new();
    output.push_str("; LS-8 Disassembly\n");
    output.push_str("; -----------------\n\n");

    let mut addr = 0;
    while addr < bytes.len() {
        let (line, len) = disassemble_at(bytes, addr);
        let raw: Vec<String> = bytes[addr..addr + len]
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect();
        output.push_str(&format!("{:02X}: {:<16} ; {}\n", addr, line, raw.join(" ")));
        addr += len;
    }

    output
}
