//! Instruction decoder for the LS-8.
//!
//! An opcode byte describes itself:
//!
//! ```text
//! AABCDDDD
//! AA   number of operand bytes that follow (0-2)
//! B    1 if routed through the ALU
//! C    1 if the instruction sets PC itself
//! DDDD instruction identifier
//! ```

use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Opcode values.
pub struct Opcode;

impl Opcode {
    // ==================== Core ====================
    pub const NOP: u8 = 0b0000_0000;
    pub const HLT: u8 = 0b0000_0001;
    pub const RET: u8 = 0b0001_0001;
    pub const PUSH: u8 = 0b0100_0101;
    pub const POP: u8 = 0b0100_0110;
    pub const PRN: u8 = 0b0100_0111;
    pub const PRA: u8 = 0b0100_1000;
    pub const CALL: u8 = 0b0101_0000;
    pub const LDI: u8 = 0b1000_0010;
    pub const LD: u8 = 0b1000_0011;
    pub const ST: u8 = 0b1000_0100;

    // ==================== ALU ====================
    pub const ADD: u8 = 0b1010_0000;
    pub const SUB: u8 = 0b1010_0001;
    pub const MUL: u8 = 0b1010_0010;
    pub const DIV: u8 = 0b1010_0011;
    pub const MOD: u8 = 0b1010_0100;
    pub const INC: u8 = 0b0110_0101;
    pub const DEC: u8 = 0b0110_0110;
    pub const CMP: u8 = 0b1010_0111;
    pub const AND: u8 = 0b1010_1000;
    pub const NOT: u8 = 0b0110_1001;
    pub const OR: u8 = 0b1010_1010;
    pub const XOR: u8 = 0b1010_1011;
    pub const SHL: u8 = 0b1010_1100;
    pub const SHR: u8 = 0b1010_1101;

    const ALU_BIT: u8 = 0b0010_0000;
    const SETS_PC_BIT: u8 = 0b0001_0000;
}

/// Number of operand bytes following an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Arity {
    Zero,
    One,
    Two,
}

impl Arity {
    /// Operand byte count as a number.
    pub fn count(self) -> usize {
        match self {
            Arity::Zero => 0,
            Arity::One => 1,
            Arity::Two => 2,
        }
    }
}

/// Broad instruction class encoded in bits 5 and 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstrClass {
    /// Routed through the ALU.
    Alu,
    /// Moves PC itself (CALL, RET).
    ControlTransfer,
    /// Everything else.
    General,
}

/// What the opcode byte says about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decoded {
    pub opcode: u8,
    pub arity: Arity,
    pub class: InstrClass,
}

impl Decoded {
    /// Total instruction length in bytes, opcode included.
    pub fn len(&self) -> usize {
        1 + self.arity.count()
    }
}

/// Decode an opcode byte.
///
/// This is the only place operand arity is derived from an opcode.
pub fn decode(opcode: u8) -> Result<Decoded, DecodeError> {
    let arity = match opcode >> 6 {
        0 => Arity::Zero,
        1 => Arity::One,
        2 => Arity::Two,
        _ => return Err(DecodeError::InvalidArity(opcode)),
    };

    let class = if opcode & Opcode::ALU_BIT != 0 {
        InstrClass::Alu
    } else if opcode & Opcode::SETS_PC_BIT != 0 {
        InstrClass::ControlTransfer
    } else {
        InstrClass::General
    };

    Ok(Decoded { opcode, arity, class })
}

/// Errors that can occur during instruction decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("opcode {0:#010b} encodes an operand count of 3")]
    InvalidArity(u8),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decode_hlt() {
        let d = decode(Opcode::HLT).unwrap();
        assert_eq!(d.arity, Arity::Zero);
        assert_eq!(d.class, InstrClass::General);
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn test_decode_ldi() {
        let d = decode(Opcode::LDI).unwrap();
        assert_eq!(d.arity, Arity::Two);
        assert_eq!(d.len(), 3);
    }

    #[test]
    fn test_decode_classes() {
        assert_eq!(decode(Opcode::ADD).unwrap().class, InstrClass::Alu);
        assert_eq!(decode(Opcode::NOT).unwrap().class, InstrClass::Alu);
        assert_eq!(decode(Opcode::CALL).unwrap().class, InstrClass::ControlTransfer);
        assert_eq!(decode(Opcode::RET).unwrap().class, InstrClass::ControlTransfer);
        assert_eq!(decode(Opcode::PUSH).unwrap().class, InstrClass::General);
    }

    #[test]
    fn test_decode_rejects_three_operands() {
        assert_eq!(decode(0xFF), Err(DecodeError::InvalidArity(0xFF)));
        assert_eq!(decode(0b1100_0000), Err(DecodeError::InvalidArity(0xC0)));
    }

    proptest! {
        #[test]
        fn arity_matches_high_bits(op in any::<u8>()) {
            match decode(op) {
                Ok(d) => {
                    prop_assert!(d.arity.count() <= 2);
                    prop_assert_eq!(d.arity.count(), (op >> 6) as usize);
                    prop_assert_eq!(decode(op), Ok(d));
                }
                Err(DecodeError::InvalidArity(b)) => {
                    prop_assert_eq!(b, op);
                    prop_assert_eq!(op >> 6, 3);
                }
            }
        }

        #[test]
        fn alu_class_follows_bit_five(op in 0u8..0xC0) {
            let d = decode(op).unwrap();
            prop_assert_eq!(d.class == InstrClass::Alu, op & 0b0010_0000 != 0);
        }
    }
}
