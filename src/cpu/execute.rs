//! CPU execution engine for the LS-8.
//!
//! Implements the fetch-decode-execute cycle. Instruction behaviour lives in
//! the dispatch table; this module owns machine state, operand fetching, the
//! stack discipline and PC advancement.

use crate::cpu::{Memory, Registers};
use crate::cpu::decode::{self, Decoded};
use crate::cpu::dispatch::{DispatchTable, Flow};
use crate::cpu::memory::MemoryError;
use crate::cpu::registers::{RegisterError, REGISTER_COUNT};
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// CPU execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// CPU is fetching and executing instructions.
    Running,
    /// CPU has stopped, either by HLT or by a fault.
    Halted,
}

/// A value emitted by a print instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Output {
    /// PRN: a register printed as a decimal number on its own line.
    Number(u8),
    /// PRA: a register printed as an ASCII character.
    Char(u8),
}

impl std::fmt::Display for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Output::Number(n) => writeln!(f, "{}", n),
            Output::Char(c) => write!(f, "{}", *c as char),
        }
    }
}

/// One executed instruction, as reported by [`Cpu::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Executed {
    /// Address the instruction was fetched from.
    pub pc: u8,
    pub decoded: Decoded,
    /// Operand bytes; only the first `decoded.arity.count()` are meaningful.
    pub operands: [u8; 2],
}

/// The LS-8 CPU.
#[derive(Clone, Serialize, Deserialize)]
pub struct Cpu {
    /// CPU registers.
    pub regs: Registers,
    /// Main memory.
    pub mem: Memory,
    /// Current execution state.
    pub state: CpuState,
    /// Instruction count (for profiling).
    pub cycles: u64,
    /// Values printed so far and not yet taken.
    pub output: Vec<Output>,
    /// Last executed instruction (for debugging).
    last_instr: Option<Executed>,
    #[serde(skip, default = "DispatchTable::standard")]
    table: &'static DispatchTable,
}

impl Cpu {
    /// Create a new CPU in its power-on state.
    pub fn new() -> Self {
        Self {
            regs: Registers::new(),
            mem: Memory::new(),
            state: CpuState::Running,
            cycles: 0,
            output: Vec::new(),
            last_instr: None,
            table: DispatchTable::standard(),
        }
    }

    /// Reset the CPU to its power-on state.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.mem.clear();
        self.state = CpuState::Running;
        self.cycles = 0;
        self.output.clear();
        self.last_instr = None;
    }

    /// Load a program into memory at address 0.
    ///
    /// Must happen before the first [`step`](Self::step).
    pub fn load_program(&mut self, program: &[u8]) -> Result<(), MemoryError> {
        self.mem.load_program(program)
    }

    /// The dispatch table this CPU executes with.
    pub fn table(&self) -> &'static DispatchTable {
        self.table
    }

    /// Execute a single instruction.
    ///
    /// Any fault halts the CPU and is returned; the CPU never panics on a
    /// bad program.
    pub fn step(&mut self) -> Result<Executed, CpuError> {
        if self.state != CpuState::Running {
            return Err(CpuError::NotRunning(self.state));
        }

        match self.execute() {
            Ok(executed) => {
                self.cycles += 1;
                self.last_instr = Some(executed);
                Ok(executed)
            }
            Err(e) => {
                self.state = CpuState::Halted;
                Err(e)
            }
        }
    }

    fn execute(&mut self) -> Result<Executed, CpuError> {
        let pc = self.regs.pc;

        // Fetch
        let opcode = self.mem.read(pc as usize)?;

        // Decode
        let decoded = decode::decode(opcode)
            .map_err(|_| CpuError::InvalidOpcode { opcode, pc })?;
        let table = self.table;
        let entry = table
            .get(opcode)
            .ok_or(CpuError::InvalidOpcode { opcode, pc })?;

        let mut operands = [0u8; 2];
        for (i, slot) in operands.iter_mut().take(decoded.arity.count()).enumerate() {
            *slot = self.mem.read(pc as usize + 1 + i)?;
        }

        // Execute
        let flow = entry.handler.invoke(self, operands)?;

        if flow == Flow::Advance {
            let next = pc as usize + decoded.len();
            self.regs.pc = u8::try_from(next)
                .map_err(|_| MemoryError::AddressOutOfRange(next))?;
        }

        Ok(Executed { pc, decoded, operands })
    }

    /// Run until halt or fault.
    ///
    /// Returns the number of instructions executed.
    pub fn run(&mut self) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;

        while self.state == CpuState::Running {
            self.step()?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Run for at most `max_cycles` instructions.
    pub fn run_limited(&mut self, max_cycles: u64) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;
        let limit = self.cycles.saturating_add(max_cycles);

        while self.state == CpuState::Running && self.cycles < limit {
            self.step()?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Stop the machine. The host process is unaffected.
    pub fn halt(&mut self) {
        self.state = CpuState::Halted;
    }

    /// Push a byte onto the stack: SP -= 1, then mem[SP] = value.
    pub fn push(&mut self, value: u8) -> Result<(), CpuError> {
        let sp = self.regs.sp();
        let new_sp = sp.checked_sub(1).ok_or(CpuError::StackOverflow { sp })?;
        self.mem.write(new_sp as usize, value)?;
        self.regs.set_sp(new_sp);
        Ok(())
    }

    /// Pop a byte off the stack: value = mem[SP], then SP += 1.
    pub fn pop(&mut self) -> Result<u8, CpuError> {
        let sp = self.regs.sp();
        let new_sp = sp.checked_add(1).ok_or(CpuError::StackUnderflow { sp })?;
        let value = self.mem.read(sp as usize)?;
        self.regs.set_sp(new_sp);
        Ok(value)
    }

    /// Record printed output.
    pub fn emit(&mut self, out: Output) {
        self.output.push(out);
    }

    /// Drain everything printed since the last call.
    pub fn take_output(&mut self) -> Vec<Output> {
        std::mem::take(&mut self.output)
    }

    /// One-line dump of PC, the next three bytes and all registers.
    ///
    /// Format: `TRACE: PC | B0 B1 B2 | R0 R1 R2 R3 R4 R5 R6 R7`, in hex.
    /// Bytes past the end of memory show as `00`.
    pub fn trace(&self) -> String {
        let pc = self.regs.pc as usize;
        let byte = |offset: usize| self.mem.peek(pc + offset).unwrap_or(0);

        let mut line = format!(
            "TRACE: {:02X} | {:02X} {:02X} {:02X} |",
            pc,
            byte(0),
            byte(1),
            byte(2)
        );
        for i in 0..REGISTER_COUNT {
            line.push_str(&format!(" {:02X}", self.regs.r[i]));
        }
        line
    }

    /// Get the last executed instruction.
    pub fn last_instruction(&self) -> Option<Executed> {
        self.last_instr
    }

    /// Check if the CPU is halted.
    pub fn is_halted(&self) -> bool {
        self.state == CpuState::Halted
    }

    /// Check if the CPU is running.
    pub fn is_running(&self) -> bool {
        self.state == CpuState::Running
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("state", &self.state)
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .finish()
    }
}

/// Errors that can occur during CPU execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("CPU not running: {0:?}")]
    NotRunning(CpuState),

    #[error("invalid opcode {opcode:#04X} at address {pc:#04X}")]
    InvalidOpcode { opcode: u8, pc: u8 },

    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("register error: {0}")]
    Register(#[from] RegisterError),

    #[error("division by zero (opcode {opcode:#04X})")]
    DivisionByZero { opcode: u8 },

    #[error("unsupported ALU operation {0:#04X}")]
    UnsupportedAluOperation(u8),

    #[error("stack overflow: push with SP={sp:#04X}")]
    StackOverflow { sp: u8 },

    #[error("stack underflow: pop with SP={sp:#04X}")]
    StackUnderflow { sp: u8 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::Opcode;
    use crate::cpu::registers::STACK_START;
    use proptest::prelude::*;

    fn cpu_with(program: &[u8]) -> Cpu {
        let mut cpu = Cpu::new();
        cpu.load_program(program).unwrap();
        cpu
    }

    #[test]
    fn test_cpu_halt() {
        let mut cpu = cpu_with(&[Opcode::HLT]);

        let executed = cpu.run().unwrap();

        assert_eq!(executed, 1);
        assert!(cpu.is_halted());
        assert_eq!(cpu.regs, Registers::new());
    }

    #[test]
    fn test_step_after_halt_fails() {
        let mut cpu = cpu_with(&[Opcode::HLT]);
        cpu.run().unwrap();

        assert_eq!(cpu.step(), Err(CpuError::NotRunning(CpuState::Halted)));
    }

    #[test]
    fn test_ldi_prn() {
        let mut cpu = cpu_with(&[
            Opcode::LDI, 0, 8,
            Opcode::PRN, 0,
            Opcode::HLT,
        ]);

        assert_eq!(cpu.run().unwrap(), 3);
        assert_eq!(cpu.take_output(), vec![Output::Number(8)]);
        assert!(cpu.output.is_empty());
    }

    #[test]
    fn test_nop_then_halt() {
        let mut cpu = cpu_with(&[Opcode::NOP, Opcode::NOP, Opcode::HLT]);
        assert_eq!(cpu.run().unwrap(), 3);
        assert_eq!(cpu.regs.pc, 2);
    }

    #[test]
    fn test_mult_program() {
        let mut cpu = cpu_with(&[
            Opcode::LDI, 0, 8,
            Opcode::LDI, 1, 9,
            Opcode::MUL, 0, 1,
            Opcode::PRN, 0,
            Opcode::HLT,
        ]);

        cpu.run().unwrap();
        assert_eq!(cpu.take_output(), vec![Output::Number(72)]);
    }

    #[test]
    fn test_push_pop_roundtrip() {
        let mut cpu = cpu_with(&[
            Opcode::LDI, 0, 5,
            Opcode::PUSH, 0,
            Opcode::POP, 1,
            Opcode::HLT,
        ]);

        cpu.run().unwrap();

        assert_eq!(cpu.regs.read(1).unwrap(), 5);
        assert_eq!(cpu.regs.sp(), STACK_START);
        assert_eq!(cpu.mem.read(STACK_START as usize - 1).unwrap(), 5);
    }

    #[test]
    fn test_stack_is_lifo() {
        let mut cpu = cpu_with(&[
            Opcode::LDI, 0, 1,
            Opcode::LDI, 1, 2,
            Opcode::PUSH, 0,
            Opcode::PUSH, 1,
            Opcode::POP, 2,
            Opcode::POP, 3,
            Opcode::HLT,
        ]);

        cpu.run().unwrap();
        assert_eq!(cpu.regs.read(2).unwrap(), 2);
        assert_eq!(cpu.regs.read(3).unwrap(), 1);
    }

    #[test]
    fn test_stack_overflow() {
        let mut cpu = cpu_with(&[Opcode::LDI, 7, 0, Opcode::PUSH, 0, Opcode::HLT]);

        assert_eq!(cpu.run(), Err(CpuError::StackOverflow { sp: 0 }));
        assert!(cpu.is_halted());
        assert_eq!(cpu.regs.sp(), 0);
    }

    #[test]
    fn test_stack_underflow() {
        let mut cpu = cpu_with(&[Opcode::LDI, 7, 0xFF, Opcode::POP, 0, Opcode::HLT]);

        assert_eq!(cpu.run(), Err(CpuError::StackUnderflow { sp: 0xFF }));
        assert_eq!(cpu.regs.read(0).unwrap(), 0);
    }

    #[test]
    fn test_alu_add() {
        let mut cpu = cpu_with(&[
            Opcode::LDI, 0, 2,
            Opcode::LDI, 1, 3,
            Opcode::ADD, 0, 1,
            Opcode::HLT,
        ]);

        cpu.run().unwrap();
        assert_eq!(cpu.regs.read(0).unwrap(), 5);
    }

    #[test]
    fn test_div_by_zero_halts_without_mutation() {
        let mut cpu = cpu_with(&[
            Opcode::LDI, 0, 10,
            Opcode::DIV, 0, 1,
            Opcode::HLT,
        ]);

        let err = cpu.run().unwrap_err();

        assert_eq!(err, CpuError::DivisionByZero { opcode: Opcode::DIV });
        assert!(cpu.is_halted());
        assert_eq!(cpu.regs.read(0).unwrap(), 10);
        assert_eq!(cpu.regs.read(1).unwrap(), 0);
        // PC stays on the faulting instruction.
        assert_eq!(cpu.regs.pc, 3);
    }

    #[test]
    fn test_invalid_opcode() {
        let mut cpu = cpu_with(&[0xFF]);

        let err = cpu.run().unwrap_err();

        assert_eq!(err, CpuError::InvalidOpcode { opcode: 0xFF, pc: 0 });
        assert!(cpu.is_halted());
        assert_eq!(cpu.regs, Registers::new());
        assert_eq!(cpu.cycles, 0);
    }

    #[test]
    fn test_unassigned_but_decodable_opcode() {
        // JMP is not part of this instruction set.
        let mut cpu = cpu_with(&[Opcode::NOP, 0b0101_0100, 0]);

        assert_eq!(
            cpu.run(),
            Err(CpuError::InvalidOpcode { opcode: 0b0101_0100, pc: 1 })
        );
    }

    #[test]
    fn test_register_out_of_range() {
        let mut cpu = cpu_with(&[Opcode::LDI, 8, 1, Opcode::HLT]);

        assert_eq!(
            cpu.run(),
            Err(CpuError::Register(RegisterError::IndexOutOfRange(8)))
        );
    }

    #[test]
    fn test_operand_fetch_past_end_of_memory() {
        let mut cpu = Cpu::new();
        cpu.mem.write(255, Opcode::LDI).unwrap();
        cpu.regs.pc = 255;

        assert_eq!(
            cpu.step(),
            Err(CpuError::Memory(MemoryError::AddressOutOfRange(256)))
        );
        assert!(cpu.is_halted());
    }

    #[test]
    fn test_running_off_the_end() {
        let mut cpu = Cpu::new();
        cpu.regs.pc = 255;

        // NOP at 0xFF would move PC to 0x100.
        assert_eq!(
            cpu.step(),
            Err(CpuError::Memory(MemoryError::AddressOutOfRange(256)))
        );
    }

    #[test]
    fn test_halt_at_last_address() {
        let mut cpu = Cpu::new();
        cpu.mem.write(255, Opcode::HLT).unwrap();
        cpu.regs.pc = 255;

        assert_eq!(cpu.run(), Ok(1));
        assert!(cpu.is_halted());
        assert_eq!(cpu.regs.pc, 255);
    }

    #[test]
    fn test_call_and_ret() {
        // 0: LDI R1, 10
        // 3: CALL R1
        // 5: PRN R0
        // 7: HLT
        // 10: LDI R0, 42
        // 13: RET
        let mut program = vec![
            Opcode::LDI, 1, 10,
            Opcode::CALL, 1,
            Opcode::PRN, 0,
            Opcode::HLT,
            0, 0,
        ];
        program.extend_from_slice(&[Opcode::LDI, 0, 42, Opcode::RET]);
        let mut cpu = cpu_with(&program);

        cpu.step().unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.regs.pc, 10);
        assert_eq!(cpu.regs.sp(), STACK_START - 1);
        assert_eq!(cpu.mem.read(STACK_START as usize - 1).unwrap(), 5);

        cpu.run().unwrap();
        assert_eq!(cpu.take_output(), vec![Output::Number(42)]);
        assert_eq!(cpu.regs.sp(), STACK_START);
        assert_eq!(cpu.regs.pc, 7);
    }

    #[test]
    fn test_ld_st() {
        let mut cpu = cpu_with(&[
            Opcode::LDI, 0, 0x80,
            Opcode::LDI, 1, 99,
            Opcode::ST, 0, 1,
            Opcode::LD, 2, 0,
            Opcode::HLT,
        ]);

        cpu.run().unwrap();
        assert_eq!(cpu.mem.read(0x80).unwrap(), 99);
        assert_eq!(cpu.regs.read(2).unwrap(), 99);
    }

    #[test]
    fn test_pra_output() {
        let mut cpu = cpu_with(&[
            Opcode::LDI, 0, b'H',
            Opcode::PRA, 0,
            Opcode::LDI, 0, b'i',
            Opcode::PRA, 0,
            Opcode::HLT,
        ]);

        cpu.run().unwrap();
        let text: String = cpu.take_output().iter().map(|o| o.to_string()).collect();
        assert_eq!(text, "Hi");
    }

    #[test]
    fn test_cmp_flags() {
        let mut cpu = cpu_with(&[
            Opcode::LDI, 0, 3,
            Opcode::LDI, 1, 7,
            Opcode::CMP, 0, 1,
            Opcode::HLT,
        ]);

        cpu.run().unwrap();
        assert_eq!(cpu.regs.fl.ordering(), Some(std::cmp::Ordering::Less));
    }

    #[test]
    fn test_run_limited() {
        let mut cpu = cpu_with(&[Opcode::NOP, Opcode::NOP, Opcode::HLT]);
        assert_eq!(cpu.run_limited(2).unwrap(), 2);
        assert!(cpu.is_running());
        assert_eq!(cpu.run_limited(10).unwrap(), 1);
        assert!(cpu.is_halted());
    }

    #[test]
    fn test_trace_format() {
        let mut cpu = cpu_with(&[Opcode::LDI, 0, 8, Opcode::HLT]);
        assert_eq!(cpu.trace(), "TRACE: 00 | 82 00 08 | 00 00 00 00 00 00 00 F4");

        cpu.step().unwrap();
        assert_eq!(cpu.trace(), "TRACE: 03 | 01 00 00 | 08 00 00 00 00 00 00 F4");
    }

    #[test]
    fn test_last_instruction() {
        let mut cpu = cpu_with(&[Opcode::LDI, 2, 7, Opcode::HLT]);
        cpu.step().unwrap();

        let last = cpu.last_instruction().unwrap();
        assert_eq!(last.pc, 0);
        assert_eq!(last.decoded.opcode, Opcode::LDI);
        assert_eq!(last.operands, [2, 7]);
    }

    #[test]
    fn test_reset() {
        let mut cpu = cpu_with(&[Opcode::LDI, 0, 8, Opcode::PRN, 0, Opcode::HLT]);
        cpu.run().unwrap();
        cpu.reset();

        assert!(cpu.is_running());
        assert_eq!(cpu.regs, Registers::new());
        assert!(cpu.output.is_empty());
        assert_eq!(cpu.mem.read(0).unwrap(), 0);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let mut cpu = cpu_with(&[Opcode::LDI, 0, 8, Opcode::PRN, 0, Opcode::HLT]);
        cpu.step().unwrap();

        let json = serde_json::to_string(&cpu).unwrap();
        let mut restored: Cpu = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.regs, cpu.regs);
        assert_eq!(restored.mem, cpu.mem);
        restored.run().unwrap();
        assert_eq!(restored.take_output(), vec![Output::Number(8)]);
    }

    proptest! {
        #[test]
        fn fresh_machines_are_deterministic(program in proptest::collection::vec(any::<u8>(), 0..64)) {
            let run = |bytes: &[u8]| {
                let mut cpu = Cpu::new();
                cpu.load_program(bytes).unwrap();
                let result = cpu.run_limited(500);
                (result, cpu.take_output(), cpu.regs.clone(), cpu.state)
            };

            prop_assert_eq!(run(&program), run(&program));
        }
    }
}
