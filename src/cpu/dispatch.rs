//! Opcode dispatch table.
//!
//! One immutable table maps every implemented opcode to its handler. It is
//! built once per process and checked against the decoder at build time, so
//! the engine can call a handler with exactly the operands it fetched.

use crate::cpu::alu;
use crate::cpu::decode::{decode, Arity, InstrClass, Opcode};
use crate::cpu::execute::{Cpu, CpuError, Output};
use crate::cpu::memory::MemoryError;
use std::sync::OnceLock;
use thiserror::Error;

/// What the engine does with PC after a handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Move PC past the instruction and its operands.
    Advance,
    /// Leave PC alone; the handler set it (or halted on it).
    Stay,
}

pub type NullaryFn = fn(&mut Cpu) -> Result<Flow, CpuError>;
pub type UnaryFn = fn(&mut Cpu, u8) -> Result<Flow, CpuError>;
pub type BinaryFn = fn(&mut Cpu, u8, u8) -> Result<Flow, CpuError>;

/// A handler, tagged by how many operand bytes it consumes.
#[derive(Clone, Copy)]
pub enum Handler {
    Nullary(NullaryFn),
    Unary(UnaryFn),
    Binary(BinaryFn),
}

impl Handler {
    pub fn arity(&self) -> Arity {
        match self {
            Handler::Nullary(_) => Arity::Zero,
            Handler::Unary(_) => Arity::One,
            Handler::Binary(_) => Arity::Two,
        }
    }

    /// Call the handler with the operand bytes the engine fetched.
    ///
    /// Bytes beyond the handler's arity are ignored.
    pub fn invoke(self, cpu: &mut Cpu, operands: [u8; 2]) -> Result<Flow, CpuError> {
        match self {
            Handler::Nullary(f) => f(cpu),
            Handler::Unary(f) => f(cpu, operands[0]),
            Handler::Binary(f) => f(cpu, operands[0], operands[1]),
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handler::{:?}", self.arity())
    }
}

/// One instruction: mnemonic, opcode byte and handler.
#[derive(Debug, Clone, Copy)]
pub struct Entry {
    pub mnemonic: &'static str,
    pub opcode: u8,
    pub handler: Handler,
}

impl Entry {
    pub const fn new(mnemonic: &'static str, opcode: u8, handler: Handler) -> Self {
        Self { mnemonic, opcode, handler }
    }

    pub fn arity(&self) -> Arity {
        self.handler.arity()
    }
}

/// The LS-8 instruction set.
pub const INSTRUCTIONS: &[Entry] = &[
    Entry::new("NOP", Opcode::NOP, Handler::Nullary(nop)),
    Entry::new("HLT", Opcode::HLT, Handler::Nullary(hlt)),
    Entry::new("RET", Opcode::RET, Handler::Nullary(ret)),
    Entry::new("PUSH", Opcode::PUSH, Handler::Unary(push)),
    Entry::new("POP", Opcode::POP, Handler::Unary(pop)),
    Entry::new("PRN", Opcode::PRN, Handler::Unary(prn)),
    Entry::new("PRA", Opcode::PRA, Handler::Unary(pra)),
    Entry::new("CALL", Opcode::CALL, Handler::Unary(call)),
    Entry::new("LDI", Opcode::LDI, Handler::Binary(ldi)),
    Entry::new("LD", Opcode::LD, Handler::Binary(ld)),
    Entry::new("ST", Opcode::ST, Handler::Binary(st)),
    Entry::new("ADD", Opcode::ADD, Handler::Binary(add)),
    Entry::new("SUB", Opcode::SUB, Handler::Binary(sub)),
    Entry::new("MUL", Opcode::MUL, Handler::Binary(mul)),
    Entry::new("DIV", Opcode::DIV, Handler::Binary(div)),
    Entry::new("MOD", Opcode::MOD, Handler::Binary(modulo)),
    Entry::new("INC", Opcode::INC, Handler::Unary(inc)),
    Entry::new("DEC", Opcode::DEC, Handler::Unary(dec)),
    Entry::new("CMP", Opcode::CMP, Handler::Binary(cmp)),
    Entry::new("AND", Opcode::AND, Handler::Binary(and)),
    Entry::new("NOT", Opcode::NOT, Handler::Unary(not)),
    Entry::new("OR", Opcode::OR, Handler::Binary(or)),
    Entry::new("XOR", Opcode::XOR, Handler::Binary(xor)),
    Entry::new("SHL", Opcode::SHL, Handler::Binary(shl)),
    Entry::new("SHR", Opcode::SHR, Handler::Binary(shr)),
];

/// Opcode-keyed handler table.
#[derive(Debug)]
pub struct DispatchTable {
    slots: Vec<Option<Entry>>,
}

impl DispatchTable {
    /// Build a table, rejecting entries that disagree with the decoder.
    pub fn build(entries: &[Entry]) -> Result<Self, TableError> {
        let mut slots: Vec<Option<Entry>> = vec![None; 256];

        for entry in entries {
            let decoded = decode(entry.opcode).map_err(|_| TableError::Undecodable {
                mnemonic: entry.mnemonic,
                opcode: entry.opcode,
            })?;

            if decoded.arity != entry.arity() {
                return Err(TableError::ArityMismatch {
                    mnemonic: entry.mnemonic,
                    opcode: entry.opcode,
                    decoded: decoded.arity,
                    handler: entry.arity(),
                });
            }

            let slot = &mut slots[entry.opcode as usize];
            if let Some(existing) = slot {
                return Err(TableError::DuplicateOpcode {
                    opcode: entry.opcode,
                    first: existing.mnemonic,
                    second: entry.mnemonic,
                });
            }
            *slot = Some(*entry);
        }

        let table = Self { slots };

        let mut seen = std::collections::HashSet::new();
        for entry in table.iter() {
            if !seen.insert(entry.mnemonic) {
                return Err(TableError::DuplicateMnemonic(entry.mnemonic));
            }
        }

        Ok(table)
    }

    /// The shared LS-8 table.
    pub fn standard() -> &'static DispatchTable {
        static TABLE: OnceLock<DispatchTable> = OnceLock::new();
        TABLE.get_or_init(|| match DispatchTable::build(INSTRUCTIONS) {
            Ok(table) => table,
            Err(e) => panic!("built-in instruction set is inconsistent: {}", e),
        })
    }

    /// Look up the entry for an opcode.
    #[inline]
    pub fn get(&self, opcode: u8) -> Option<&Entry> {
        self.slots[opcode as usize].as_ref()
    }

    /// Look up an entry by mnemonic (case-insensitive).
    pub fn by_mnemonic(&self, mnemonic: &str) -> Option<&Entry> {
        self.iter().find(|e| e.mnemonic.eq_ignore_ascii_case(mnemonic))
    }

    /// All entries in opcode order.
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Errors from building a dispatch table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("{mnemonic} ({opcode:#04X}): opcode does not decode")]
    Undecodable { mnemonic: &'static str, opcode: u8 },

    #[error("{mnemonic} ({opcode:#04X}): opcode encodes {decoded:?} operands but handler takes {handler:?}")]
    ArityMismatch {
        mnemonic: &'static str,
        opcode: u8,
        decoded: Arity,
        handler: Arity,
    },

    #[error("opcode {opcode:#04X} assigned to both {first} and {second}")]
    DuplicateOpcode {
        opcode: u8,
        first: &'static str,
        second: &'static str,
    },

    #[error("mnemonic {0} defined twice")]
    DuplicateMnemonic(&'static str),
}

// ==================== Handlers ====================

fn nop(_cpu: &mut Cpu) -> Result<Flow, CpuError> {
    Ok(Flow::Advance)
}

fn hlt(cpu: &mut Cpu) -> Result<Flow, CpuError> {
    cpu.halt();
    Ok(Flow::Stay)
}

fn ldi(cpu: &mut Cpu, reg: u8, value: u8) -> Result<Flow, CpuError> {
    cpu.regs.write(reg, value)?;
    Ok(Flow::Advance)
}

fn ld(cpu: &mut Cpu, dst: u8, addr_reg: u8) -> Result<Flow, CpuError> {
    let addr = cpu.regs.read(addr_reg)?;
    let value = cpu.mem.read(addr as usize)?;
    cpu.regs.write(dst, value)?;
    Ok(Flow::Advance)
}

fn st(cpu: &mut Cpu, addr_reg: u8, src: u8) -> Result<Flow, CpuError> {
    let addr = cpu.regs.read(addr_reg)?;
    let value = cpu.regs.read(src)?;
    cpu.mem.write(addr as usize, value)?;
    Ok(Flow::Advance)
}

fn prn(cpu: &mut Cpu, reg: u8) -> Result<Flow, CpuError> {
    let value = cpu.regs.read(reg)?;
    cpu.emit(Output::Number(value));
    Ok(Flow::Advance)
}

fn pra(cpu: &mut Cpu, reg: u8) -> Result<Flow, CpuError> {
    let value = cpu.regs.read(reg)?;
    cpu.emit(Output::Char(value));
    Ok(Flow::Advance)
}

fn push(cpu: &mut Cpu, reg: u8) -> Result<Flow, CpuError> {
    let value = cpu.regs.read(reg)?;
    cpu.push(value)?;
    Ok(Flow::Advance)
}

fn pop(cpu: &mut Cpu, reg: u8) -> Result<Flow, CpuError> {
    // Reject a bad register before SP moves.
    cpu.regs.read(reg)?;
    let value = cpu.pop()?;
    cpu.regs.write(reg, value)?;
    Ok(Flow::Advance)
}

fn call(cpu: &mut Cpu, reg: u8) -> Result<Flow, CpuError> {
    let target = cpu.regs.read(reg)?;
    let ret = cpu.regs.pc as usize + 2;
    let ret = u8::try_from(ret).map_err(|_| MemoryError::AddressOutOfRange(ret))?;
    cpu.push(ret)?;
    cpu.regs.jump(target);
    Ok(Flow::Stay)
}

fn ret(cpu: &mut Cpu) -> Result<Flow, CpuError> {
    let addr = cpu.pop()?;
    cpu.regs.jump(addr);
    Ok(Flow::Stay)
}

/// Forward an ALU-class instruction to the ALU.
fn alu_op(cpu: &mut Cpu, opcode: u8, a: u8, b: u8) -> Result<Flow, CpuError> {
    debug_assert_eq!(decode(opcode).map(|d| d.class), Ok(InstrClass::Alu));
    alu::apply(opcode, &mut cpu.regs, a, b)?;
    Ok(Flow::Advance)
}

macro_rules! alu_binary {
    ($($name:ident => $opcode:expr),* $(,)?) => {
        $(
            fn $name(cpu: &mut Cpu, a: u8, b: u8) -> Result<Flow, CpuError> {
                alu_op(cpu, $opcode, a, b)
            }
        )*
    };
}

macro_rules! alu_unary {
    ($($name:ident => $opcode:expr),* $(,)?) => {
        $(
            fn $name(cpu: &mut Cpu, a: u8) -> Result<Flow, CpuError> {
                alu_op(cpu, $opcode, a, 0)
            }
        )*
    };
}

alu_binary! {
    add => Opcode::ADD,
    sub => Opcode::SUB,
    mul => Opcode::MUL,
    div => Opcode::DIV,
    modulo => Opcode::MOD,
    cmp => Opcode::CMP,
    and => Opcode::AND,
    or => Opcode::OR,
    xor => Opcode::XOR,
    shl => Opcode::SHL,
    shr => Opcode::SHR,
}

alu_unary! {
    inc => Opcode::INC,
    dec => Opcode::DEC,
    not => Opcode::NOT,
}
