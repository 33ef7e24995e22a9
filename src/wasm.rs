//! WebAssembly bindings for the LS-8 emulator.
//!
//! This module provides JavaScript-friendly wrappers around the core emulator.

use wasm_bindgen::prelude::*;
use crate::{Cpu, CpuState};
use crate::asm::{assemble, parse_program};
use crate::asm::disasm::{disassemble_at, format_executed};

/// Initialize panic hook for better error messages in console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// WebAssembly-friendly CPU wrapper.
#[wasm_bindgen]
pub struct WasmCpu {
    cpu: Cpu,
    program: Vec<u8>,
    console: String,
}

#[wasm_bindgen]
impl WasmCpu {
    /// Create a new CPU instance.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self {
            cpu: Cpu::new(),
            program: Vec::new(),
            console: String::new(),
        }
    }

    /// Load a program from assembly source code.
    #[wasm_bindgen]
    pub fn load_asm(&mut self, source: &str) -> Result<usize, JsError> {
        let bytes = assemble(source)
            .map_err(|e| JsError::new(&format!("{}", e)))?;
        self.load_bytes(bytes)
    }

    /// Load a program from `.ls8` text.
    #[wasm_bindgen]
    pub fn load_ls8(&mut self, source: &str) -> Result<usize, JsError> {
        let program = parse_program(source)
            .map_err(|e| JsError::new(&format!("{}", e)))?;
        self.load_bytes(program.bytes)
    }

    fn load_bytes(&mut self, bytes: Vec<u8>) -> Result<usize, JsError> {
        let len = bytes.len();
        let mut cpu = Cpu::new();
        cpu.load_program(&bytes)
            .map_err(|e| JsError::new(&format!("{}", e)))?;

        self.cpu = cpu;
        self.program = bytes;
        self.console.clear();
        Ok(len)
    }

    /// Step one instruction. Returns the disassembled instruction.
    #[wasm_bindgen]
    pub fn step(&mut self) -> Result<String, JsError> {
        if !self.cpu.is_running() {
            return Err(JsError::new("CPU is halted"));
        }

        let result = self.cpu.step();
        self.collect_output();

        let executed = result.map_err(|e| JsError::new(&format!("{}", e)))?;
        Ok(format_executed(&executed))
    }

    /// Run until halt, fault or `max_cycles`. Returns total cycles.
    #[wasm_bindgen]
    pub fn run(&mut self, max_cycles: u32) -> Result<u64, JsError> {
        let result = self.cpu.run_limited(max_cycles as u64);
        self.collect_output();

        result.map_err(|e| JsError::new(&format!("{}", e)))?;
        Ok(self.cpu.cycles)
    }

    fn collect_output(&mut self) {
        for out in self.cpu.take_output() {
            self.console.push_str(&out.to_string());
        }
    }

    /// Reset CPU to initial state with loaded program.
    #[wasm_bindgen]
    pub fn reset(&mut self) -> Result<(), JsError> {
        self.cpu = Cpu::new();
        self.console.clear();
        self.cpu.load_program(&self.program)
            .map_err(|e| JsError::new(&format!("{}", e)))
    }

    /// Check if CPU is running.
    #[wasm_bindgen]
    pub fn is_running(&self) -> bool {
        self.cpu.is_running()
    }

    /// Check if CPU is halted.
    #[wasm_bindgen]
    pub fn is_halted(&self) -> bool {
        self.cpu.state == CpuState::Halted
    }

    /// Get cycle count.
    #[wasm_bindgen]
    pub fn cycles(&self) -> u64 {
        self.cpu.cycles
    }

    /// Get program counter.
    #[wasm_bindgen]
    pub fn pc(&self) -> u8 {
        self.cpu.regs.pc
    }

    /// Get stack pointer.
    #[wasm_bindgen]
    pub fn sp(&self) -> u8 {
        self.cpu.regs.sp()
    }

    /// Get the raw `00000LGE` flags byte.
    #[wasm_bindgen]
    pub fn flags(&self) -> u8 {
        self.cpu.regs.fl.bits()
    }

    /// Get R0-R7.
    #[wasm_bindgen]
    pub fn registers(&self) -> Vec<u8> {
        self.cpu.regs.r.to_vec()
    }

    /// Get the whole memory image as a typed array.
    #[wasm_bindgen]
    pub fn memory_all(&self) -> js_sys::Uint8Array {
        js_sys::Uint8Array::from(self.cpu.mem.as_slice())
    }

    /// Get a single memory byte; 0 past the end of memory.
    #[wasm_bindgen]
    pub fn memory_at(&self, addr: usize) -> u8 {
        self.cpu.mem.peek(addr).unwrap_or(0)
    }

    /// Everything the program has printed.
    #[wasm_bindgen]
    pub fn output(&self) -> String {
        self.console.clone()
    }

    /// Current TRACE line.
    #[wasm_bindgen]
    pub fn trace(&self) -> String {
        self.cpu.trace()
    }

    /// Get state as string.
    #[wasm_bindgen]
    pub fn state(&self) -> String {
        format!("{:?}", self.cpu.state)
    }

    /// Get the machine snapshot as JSON.
    #[wasm_bindgen]
    pub fn state_json(&self) -> Result<String, JsError> {
        serde_json::to_string(&self.cpu)
            .map_err(|e| JsError::new(&format!("{}", e)))
    }
}

impl Default for WasmCpu {
    fn default() -> Self {
        Self::new()
    }
}

/// Assemble source code and return the byte count.
#[wasm_bindgen]
pub fn wasm_assemble(source: &str) -> Result<usize, JsError> {
    let bytes = assemble(source)
        .map_err(|e| JsError::new(&format!("{}", e)))?;
    Ok(bytes.len())
}

/// Disassemble the instruction at `addr` in `bytes`.
#[wasm_bindgen]
pub fn wasm_disassemble(bytes: &[u8], addr: usize) -> String {
    disassemble_at(bytes, addr).0
}
