//! LS-8 CPU registers.
//!
//! The LS-8 has:
//! - R0-R7: eight 8-bit general-purpose registers
//! - R7 doubles as the stack pointer (SP)
//! - PC: 8-bit program counter
//! - FL: flags register, `00000LGE`, written by CMP

use serde::{Serialize, Deserialize};
use std::cmp::Ordering;
use thiserror::Error;

/// Number of general-purpose registers.
pub const REGISTER_COUNT: usize = 8;

/// Index of the register reserved as stack pointer.
pub const SP: u8 = 7;

/// Initial value of the stack pointer.
pub const STACK_START: u8 = 0xF4;

/// Result of the last CMP instruction.
///
/// Bit layout: `00000LGE`.
/// - L: first operand was less than the second
/// - G: first operand was greater than the second
/// - E: operands were equal
#[derive(Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Flags(u8);

impl Flags {
    pub const LESS: u8 = 0b0000_0100;
    pub const GREATER: u8 = 0b0000_0010;
    pub const EQUAL: u8 = 0b0000_0001;

    /// Flags with no bit set (no comparison has run yet).
    pub const fn clear() -> Self {
        Self(0)
    }

    /// Flags encoding a comparison result.
    pub fn from_ordering(ordering: Ordering) -> Self {
        match ordering {
            Ordering::Less => Self(Self::LESS),
            Ordering::Greater => Self(Self::GREATER),
            Ordering::Equal => Self(Self::EQUAL),
        }
    }

    /// Decode the tri-state comparison result, if any.
    pub fn ordering(self) -> Option<Ordering> {
        if self.less() {
            Some(Ordering::Less)
        } else if self.greater() {
            Some(Ordering::Greater)
        } else if self.equal() {
            Some(Ordering::Equal)
        } else {
            None
        }
    }

    pub fn less(self) -> bool {
        self.0 & Self::LESS != 0
    }

    pub fn greater(self) -> bool {
        self.0 & Self::GREATER != 0
    }

    pub fn equal(self) -> bool {
        self.0 & Self::EQUAL != 0
    }

    /// Raw `00000LGE` byte.
    pub fn bits(self) -> u8 {
        self.0
    }
}

impl std::fmt::Debug for Flags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "FL={}{}{}",
            if self.less() { 'L' } else { '-' },
            if self.greater() { 'G' } else { '-' },
            if self.equal() { 'E' } else { '-' },
        )
    }
}

/// The LS-8 register file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    /// R0-R7. R7 is the stack pointer.
    pub r: [u8; REGISTER_COUNT],

    /// PC: address of the next instruction
    pub pc: u8,

    /// FL: comparison flags
    pub fl: Flags,
}

impl Registers {
    /// Create a register file in its power-on state.
    pub fn new() -> Self {
        let mut r = [0; REGISTER_COUNT];
        r[SP as usize] = STACK_START;
        Self {
            r,
            pc: 0,
            fl: Flags::clear(),
        }
    }

    /// Reset all registers to their power-on state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Read register `index` (0-7).
    #[inline]
    pub fn read(&self, index: u8) -> Result<u8, RegisterError> {
        self.r
            .get(index as usize)
            .copied()
            .ok_or(RegisterError::IndexOutOfRange(index))
    }

    /// Write register `index` (0-7).
    #[inline]
    pub fn write(&mut self, index: u8, value: u8) -> Result<(), RegisterError> {
        let slot = self.r
            .get_mut(index as usize)
            .ok_or(RegisterError::IndexOutOfRange(index))?;
        *slot = value;
        Ok(())
    }

    /// Current stack pointer.
    pub fn sp(&self) -> u8 {
        self.r[SP as usize]
    }

    /// Set the stack pointer.
    pub fn set_sp(&mut self, value: u8) {
        self.r[SP as usize] = value;
    }

    /// Set the program counter to an absolute address.
    pub fn jump(&mut self, addr: u8) {
        self.pc = addr;
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors from register access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterError {
    #[error("register index {0} out of range (R0-R7)")]
    IndexOutOfRange(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_on_state() {
        let regs = Registers::new();
        assert_eq!(regs.r, [0, 0, 0, 0, 0, 0, 0, 0xF4]);
        assert_eq!(regs.sp(), STACK_START);
        assert_eq!(regs.pc, 0);
        assert_eq!(regs.fl.ordering(), None);
    }

    #[test]
    fn test_read_write() {
        let mut regs = Registers::new();
        regs.write(3, 99).unwrap();
        assert_eq!(regs.read(3).unwrap(), 99);
    }

    #[test]
    fn test_index_out_of_range() {
        let mut regs = Registers::new();
        assert_eq!(regs.read(8), Err(RegisterError::IndexOutOfRange(8)));
        assert_eq!(regs.write(200, 1), Err(RegisterError::IndexOutOfRange(200)));
    }

    #[test]
    fn test_flags_from_ordering() {
        let lt = Flags::from_ordering(Ordering::Less);
        assert_eq!(lt.bits(), 0b100);
        assert_eq!(lt.ordering(), Some(Ordering::Less));

        let gt = Flags::from_ordering(Ordering::Greater);
        assert_eq!(gt.bits(), 0b010);
        assert!(gt.greater() && !gt.less() && !gt.equal());

        let eq = Flags::from_ordering(Ordering::Equal);
        assert_eq!(eq.bits(), 0b001);
        assert_eq!(format!("{:?}", eq), "FL=--E");
    }

    #[test]
    fn test_reset_restores_stack_pointer() {
        let mut regs = Registers::new();
        regs.set_sp(0x10);
        regs.pc = 42;
        regs.reset();
        assert_eq!(regs, Registers::new());
    }
}
