//! TUI debugger for the LS-8 emulator.
//!
//! Provides an interactive terminal-based debugger with:
//! - Register, flag and stack pointer view
//! - Hex memory view
//! - Step/run/breakpoint controls
//! - Disassembly and program output views

mod app;
mod ui;

pub use app::{DebuggerApp, run_debugger};
