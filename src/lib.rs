//! # LS-8 Emulator
//!
//! An emulator for the LS-8, a small 8-bit register machine with 256 bytes
//! of memory, eight registers and a stack that grows down from `0xF4`.
//!
//! Programs are loaded from `.ls8` files (one binary byte per line) or
//! assembled from mnemonic source, then run by a fetch-decode-execute loop
//! that dispatches every opcode through a single table.

pub mod cpu;
pub mod asm;

#[cfg(feature = "tui")]
pub mod tui;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export commonly used types
pub use cpu::{Cpu, CpuState, CpuError, Memory, Registers, Opcode, Output, DispatchTable};
pub use asm::{assemble, disassemble, AssemblerError, LoadError, ProgramFile, load_program_file, parse_program, save_program};

#[cfg(feature = "tui")]
pub use tui::run_debugger;
