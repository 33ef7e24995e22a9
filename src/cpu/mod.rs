//! CPU emulation for the LS-8.
//!
//! This module implements the complete machine:
//! - 256 bytes of memory shared by program and stack
//! - 8 general-purpose registers, R7 doubling as stack pointer
//! - PC and a CMP flags register
//! - an opcode-keyed dispatch table driving the fetch-decode-execute loop

pub mod memory;
pub mod registers;
pub mod decode;
pub mod alu;
pub mod dispatch;
pub mod execute;

pub use memory::{Memory, MemoryError};
pub use registers::{Flags, Registers, RegisterError};
pub use decode::{decode, Arity, Decoded, DecodeError, InstrClass, Opcode};
pub use dispatch::{DispatchTable, Entry, Flow, Handler, TableError};
pub use execute::{Cpu, CpuError, CpuState, Executed, Output};
