//! Arithmetic/logic unit.
//!
//! Every operation reads register `a` (and `b` for binary operations) and
//! writes its result back into register `a`. Arithmetic is 8-bit and wraps
//! modulo 256. CMP is the exception: it only updates FL.

use crate::cpu::decode::Opcode;
use crate::cpu::execute::CpuError;
use crate::cpu::registers::{Flags, Registers};
use serde::{Serialize, Deserialize};

/// Operations the ALU implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AluOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Inc,
    Dec,
    Cmp,
    And,
    Not,
    Or,
    Xor,
    Shl,
    Shr,
}

impl AluOp {
    /// All operations, in opcode order.
    pub const ALL: [AluOp; 14] = [
        AluOp::Add, AluOp::Sub, AluOp::Mul, AluOp::Div, AluOp::Mod,
        AluOp::Inc, AluOp::Dec, AluOp::Cmp, AluOp::And, AluOp::Not,
        AluOp::Or, AluOp::Xor, AluOp::Shl, AluOp::Shr,
    ];

    /// Map an opcode to its ALU operation.
    pub fn from_opcode(opcode: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.opcode() == opcode)
    }

    /// The opcode that selects this operation.
    pub fn opcode(self) -> u8 {
        match self {
            AluOp::Add => Opcode::ADD,
            AluOp::Sub => Opcode::SUB,
            AluOp::Mul => Opcode::MUL,
            AluOp::Div => Opcode::DIV,
            AluOp::Mod => Opcode::MOD,
            AluOp::Inc => Opcode::INC,
            AluOp::Dec => Opcode::DEC,
            AluOp::Cmp => Opcode::CMP,
            AluOp::And => Opcode::AND,
            AluOp::Not => Opcode::NOT,
            AluOp::Or => Opcode::OR,
            AluOp::Xor => Opcode::XOR,
            AluOp::Shl => Opcode::SHL,
            AluOp::Shr => Opcode::SHR,
        }
    }

    /// True for operations that take a single register.
    pub fn is_unary(self) -> bool {
        matches!(self, AluOp::Inc | AluOp::Dec | AluOp::Not)
    }
}

/// Run the ALU operation selected by `opcode` on registers `a` and `b`.
///
/// `b` is ignored by unary operations. On failure no register is modified.
pub fn apply(opcode: u8, regs: &mut Registers, a: u8, b: u8) -> Result<(), CpuError> {
    let op = AluOp::from_opcode(opcode).ok_or(CpuError::UnsupportedAluOperation(opcode))?;

    let x = regs.read(a)?;
    let y = if op.is_unary() { 0 } else { regs.read(b)? };

    let result = match op {
        AluOp::Add => x.wrapping_add(y),
        AluOp::Sub => x.wrapping_sub(y),
        AluOp::Mul => x.wrapping_mul(y),
        AluOp::Div => x.checked_div(y).ok_or(CpuError::DivisionByZero { opcode })?,
        AluOp::Mod => x.checked_rem(y).ok_or(CpuError::DivisionByZero { opcode })?,
        AluOp::Inc => x.wrapping_add(1),
        AluOp::Dec => x.wrapping_sub(1),
        AluOp::And => x & y,
        AluOp::Not => !x,
        AluOp::Or => x | y,
        AluOp::Xor => x ^ y,
        // Shifting out every bit leaves zero.
        AluOp::Shl => x.checked_shl(y as u32).unwrap_or(0),
        AluOp::Shr => x.checked_shr(y as u32).unwrap_or(0),
        AluOp::Cmp => {
            regs.fl = Flags::from_ordering(x.cmp(&y));
            return Ok(());
        }
    };

    regs.write(a, result)?;
    Ok(())
}
