//! Simple assembler for LS-8 programs.
//!
//! Syntax:
//! ```text
//! ; Comment
//! START:              ; Define a label
//!     LDI R0, 8       ; Register and immediate operands
//!     LDI R1, SUB     ; Labels resolve to their address
//!     CALL R1
//!     PRN R0
//!     HLT
//! SUB:
//!     INC R0
//!     RET
//!
//!     ORG 0x80        ; Move to an address (zero-filled)
//!     DB 42           ; Define a data byte
//! ```

use super::{operand_kinds, OperandKind};
use crate::cpu::dispatch::DispatchTable;
use crate::cpu::memory::MEMORY_SIZE;
use crate::cpu::registers::REGISTER_COUNT;
use std::collections::HashMap;
use thiserror::Error;

/// Assemble source code to a memory image starting at address 0.
pub fn assemble(source: &str) -> Result<Vec<u8>, AssemblerError> {
    let mut asm = Assembler::new();
    asm.assemble(source)
}

/// The assembler state.
struct Assembler {
    /// Symbol table (label -> address).
    symbols: HashMap<String, usize>,
    /// Pending references: (output index, label, source line).
    pending: Vec<(usize, String, usize)>,
    /// Output bytes; the current address is `output.len()`.
    output: Vec<u8>,
}

impl Assembler {
    fn new() -> Self {
        Self {
            symbols: HashMap::new(),
            pending: Vec::new(),
            output: Vec::new(),
        }
    }

    fn assemble(&mut self, source: &str) -> Result<Vec<u8>, AssemblerError> {
        // Pass 1: collect labels and generate code
        for (line_num, line) in source.lines().enumerate() {
            self.process_line(line, line_num + 1)?;
        }

        // Pass 2: resolve forward references
        self.resolve_references()?;

        Ok(std::mem::take(&mut self.output))
    }

    fn process_line(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        let line = match line.find(';') {
            Some(idx) => &line[..idx],
            None => line,
        }
        .trim();

        if line.is_empty() {
            return Ok(());
        }

        if let Some(colon_idx) = line.find(':') {
            let label = line[..colon_idx].trim().to_uppercase();
            if label.is_empty() || label.contains(char::is_whitespace) {
                return Err(AssemblerError::SyntaxError {
                    line: line_num,
                    message: format!("invalid label '{}'", &line[..colon_idx]),
                });
            }
            if self.symbols.insert(label.clone(), self.output.len()).is_some() {
                return Err(AssemblerError::DuplicateLabel { line: line_num, label });
            }

            let rest = line[colon_idx + 1..].trim();
            if !rest.is_empty() {
                return self.process_instruction(rest, line_num);
            }
            return Ok(());
        }

        self.process_instruction(line, line_num)
    }

    fn process_instruction(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        let (mnemonic, rest) = match line.split_once(char::is_whitespace) {
            Some((m, r)) => (m, r.trim()),
            None => (line, ""),
        };
        let mnemonic = mnemonic.to_uppercase();
        let operands: Vec<&str> = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split(',').map(str::trim).collect()
        };

        match mnemonic.as_str() {
            // Directives
            "ORG" => {
                let [operand] = operands[..] else {
                    return Err(wrong_count(line_num, &mnemonic, 1, operands.len()));
                };
                let addr = parse_number(operand).ok_or_else(|| AssemblerError::SyntaxError {
                    line: line_num,
                    message: "ORG requires a numeric address".into(),
                })?;
                if addr < self.output.len() as i64 || addr > MEMORY_SIZE as i64 {
                    return Err(AssemblerError::ValueOutOfRange { line: line_num, value: addr });
                }
                self.output.resize(addr as usize, 0);
            }

            "DB" | "DATA" => {
                if operands.is_empty() {
                    return Err(wrong_count(line_num, &mnemonic, 1, 0));
                }
                for operand in operands {
                    self.emit_immediate(operand, line_num)?;
                }
            }

            // Instructions
            _ => {
                let entry = DispatchTable::standard()
                    .by_mnemonic(&mnemonic)
                    .ok_or_else(|| AssemblerError::UnknownMnemonic {
                        line: line_num,
                        mnemonic: mnemonic.clone(),
                    })?;

                let kinds = operand_kinds(entry);
                if kinds.len() != operands.len() {
                    return Err(wrong_count(line_num, &mnemonic, kinds.len(), operands.len()));
                }

                self.emit(entry.opcode);
                for (kind, operand) in kinds.into_iter().zip(operands) {
                    match kind {
                        OperandKind::Register => {
                            let reg = parse_register(operand).ok_or_else(|| {
                                AssemblerError::SyntaxError {
                                    line: line_num,
                                    message: format!("expected register R0-R7, found '{}'", operand),
                                }
                            })?;
                            self.emit(reg);
                        }
                        OperandKind::Immediate => self.emit_immediate(operand, line_num)?,
                    }
                }
            }
        }

        if self.output.len() > MEMORY_SIZE {
            return Err(AssemblerError::ProgramTooLarge { line: line_num });
        }

        Ok(())
    }

    /// Emit a literal byte or a placeholder for a label.
    fn emit_immediate(&mut self, operand: &str, line_num: usize) -> Result<(), AssemblerError> {
        match parse_number(operand) {
            Some(value) => {
                let byte = u8::try_from(value)
                    .map_err(|_| AssemblerError::ValueOutOfRange { line: line_num, value })?;
                self.emit(byte);
            }
            None => {
                if !is_identifier(operand) {
                    return Err(AssemblerError::SyntaxError {
                        line: line_num,
                        message: format!("invalid operand '{}'", operand),
                    });
                }
                self.pending.push((self.output.len(), operand.to_uppercase(), line_num));
                self.emit(0); // Placeholder, resolved in pass 2
            }
        }
        Ok(())
    }

    fn emit(&mut self, byte: u8) {
        self.output.push(byte);
    }

    fn resolve_references(&mut self) -> Result<(), AssemblerError> {
        for (out_idx, label, line_num) in &self.pending {
            let addr = self.symbols.get(label).ok_or_else(|| AssemblerError::UndefinedLabel {
                line: *line_num,
                label: label.clone(),
            })?;

            // A label at the very end of a full memory image is address 256.
            self.output[*out_idx] = u8::try_from(*addr).map_err(|_| AssemblerError::ValueOutOfRange {
                line: *line_num,
                value: *addr as i64,
            })?;
        }
        Ok(())
    }
}

fn wrong_count(line: usize, mnemonic: &str, expected: usize, found: usize) -> AssemblerError {
    AssemblerError::WrongOperandCount {
        line,
        mnemonic: mnemonic.to_string(),
        expected,
        found,
    }
}

/// Parse `R0`-`R7` (also `SP` for R7).
fn parse_register(operand: &str) -> Option<u8> {
    let upper = operand.to_uppercase();
    if upper == "SP" {
        return Some(7);
    }
    let index: u8 = upper.strip_prefix('R')?.parse().ok()?;
    (usize::from(index) < REGISTER_COUNT).then_some(index)
}

/// Parse a decimal, `0x` hex or `0b` binary number.
fn parse_number(operand: &str) -> Option<i64> {
    let lower = operand.to_lowercase();
    if let Some(hex) = lower.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(bin) = lower.strip_prefix("0b") {
        i64::from_str_radix(bin, 2).ok()
    } else {
        lower.parse().ok()
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Errors that can occur during assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblerError {
    #[error("syntax error on line {line}: {message}")]
    SyntaxError { line: usize, message: String },

    #[error("unknown mnemonic on line {line}: {mnemonic}")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("undefined label on line {line}: {label}")]
    UndefinedLabel { line: usize, label: String },

    #[error("label defined twice on line {line}: {label}")]
    DuplicateLabel { line: usize, label: String },

    #[error("value out of range on line {line}: {value}")]
    ValueOutOfRange { line: usize, value: i64 },

    #[error("{mnemonic} on line {line} takes {expected} operand(s), found {found}")]
    WrongOperandCount {
        line: usize,
        mnemonic: String,
        expected: usize,
        found: usize,
    },

    #[error("program exceeds memory on line {line}")]
    ProgramTooLarge { line: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::Opcode;
    use crate::cpu::{Cpu, Output};

    #[test]
    fn test_assemble_simple() {
        let source = r#"
            ; print8
            LDI R0, 8
            PRN R0
            HLT
        "#;

        let result = assemble(source).unwrap();
        assert_eq!(result, vec![Opcode::LDI, 0, 8, Opcode::PRN, 0, Opcode::HLT]);
    }

    #[test]
    fn test_assemble_with_labels() {
        let source = r#"
        START:
            LDI R1, SUB
            CALL R1
            PRN R0
            HLT
        SUB:
            LDI R0, 0x2A
            RET
        "#;

        let program = assemble(source).unwrap();
        assert_eq!(program[2], 8);

        let mut cpu = Cpu::new();
        cpu.load_program(&program).unwrap();
        cpu.run().unwrap();
        assert_eq!(cpu.take_output(), vec![Output::Number(42)]);
    }

    #[test]
    fn test_assemble_data_and_org() {
        let source = r#"
            DB 42, 0b101, 0xFF
            ORG 8
            DB 1
        "#;

        let result = assemble(source).unwrap();
        assert_eq!(result, vec![42, 5, 255, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(assemble("ldi r2, 1\nhlt").unwrap(), vec![Opcode::LDI, 2, 1, Opcode::HLT]);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            assemble("JMP R0"),
            Err(AssemblerError::UnknownMnemonic { line: 1, .. })
        ));
        assert!(matches!(
            assemble("LDI R8, 1"),
            Err(AssemblerError::SyntaxError { line: 1, .. })
        ));
        assert_eq!(
            assemble("LDI R0, 256"),
            Err(AssemblerError::ValueOutOfRange { line: 1, value: 256 })
        );
        assert!(matches!(
            assemble("\nPRN R0, R1"),
            Err(AssemblerError::WrongOperandCount { line: 2, expected: 1, found: 2, .. })
        ));
        assert!(matches!(
            assemble("LDI R0, NOWHERE"),
            Err(AssemblerError::UndefinedLabel { line: 1, .. })
        ));
        assert!(matches!(
            assemble("A:\nA:"),
            Err(AssemblerError::DuplicateLabel { line: 2, .. })
        ));
    }

    #[test]
    fn test_program_too_large() {
        let source = "ORG 255\nLDI R0, 1";
        assert_eq!(assemble(source), Err(AssemblerError::ProgramTooLarge { line: 2 }));
    }
}
