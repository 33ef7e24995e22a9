//! Debugger application state and logic.

use crate::asm::disasm::{disassemble_at, format_executed};
use crate::cpu::memory::MEMORY_SIZE;
use crate::Cpu;
use std::collections::HashSet;

/// Debugger application state.
pub struct DebuggerApp {
    /// The CPU being debugged.
    pub cpu: Cpu,
    /// Original program for reference.
    pub program: Vec<u8>,
    /// Breakpoints (by address).
    pub breakpoints: HashSet<u8>,
    /// Is the debugger running continuously?
    pub running: bool,
    /// Should we quit?
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
    /// Everything the program has printed.
    pub console: String,
    /// Memory view scroll offset, in 8-byte rows.
    pub mem_scroll: usize,
}

impl DebuggerApp {
    /// Bytes shown per memory row.
    pub const ROW_BYTES: usize = 8;

    /// Create a new debugger with a loaded program.
    pub fn new(program: Vec<u8>) -> Self {
        let mut cpu = Cpu::new();
        let status = match cpu.load_program(&program) {
            Ok(()) => "Ready. Press 's' to step, 'r' to run, 'q' to quit.".to_string(),
            Err(e) => format!("Load failed: {}", e),
        };

        Self {
            cpu,
            program,
            breakpoints: HashSet::new(),
            running: false,
            should_quit: false,
            status,
            console: String::new(),
            mem_scroll: 0,
        }
    }

    /// Step one instruction.
    pub fn step(&mut self) {
        if !self.cpu.is_running() {
            self.status = format!("CPU halted: {:?}", self.cpu.state);
            self.running = false;
            return;
        }

        let pc = self.cpu.regs.pc;
        let result = self.cpu.step();
        self.collect_output();

        match result {
            Ok(executed) => {
                self.status = format!("PC={:02X}: {}", pc, format_executed(&executed));
            }
            Err(e) => {
                self.status = format!("Error: {}", e);
                self.running = false;
            }
        }
    }

    fn collect_output(&mut self) {
        for out in self.cpu.take_output() {
            self.console.push_str(&out.to_string());
        }
    }

    /// Run until halt, breakpoint, or error.
    pub fn run(&mut self) {
        self.running = true;
        self.status = "Running...".into();

        // Leave the breakpoint we are parked on.
        if self.breakpoints.contains(&self.cpu.regs.pc) {
            self.step();
        }
    }

    /// Run one iteration of continuous execution.
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }

        if !self.cpu.is_running() {
            self.running = false;
            self.status = format!("Halted after {} cycles", self.cpu.cycles);
            return;
        }

        // Check for breakpoint
        let pc = self.cpu.regs.pc;
        if self.breakpoints.contains(&pc) {
            self.running = false;
            self.status = format!("Breakpoint at PC={:02X}", pc);
            return;
        }

        self.step();
    }

    /// Toggle breakpoint at current PC.
    pub fn toggle_breakpoint(&mut self) {
        let pc = self.cpu.regs.pc;
        if self.breakpoints.remove(&pc) {
            self.status = format!("Removed breakpoint at PC={:02X}", pc);
        } else {
            self.breakpoints.insert(pc);
            self.status = format!("Set breakpoint at PC={:02X}", pc);
        }
    }

    /// Reset CPU to initial state with the program reloaded.
    pub fn reset(&mut self) {
        self.cpu = Cpu::new();
        self.console.clear();
        self.running = false;
        self.status = match self.cpu.load_program(&self.program) {
            Ok(()) => "Reset. Ready.".into(),
            Err(e) => format!("Load failed: {}", e),
        };
    }

    /// Scroll the memory view, clamped to the address space.
    pub fn scroll_memory(&mut self, delta: isize) {
        let max = MEMORY_SIZE / Self::ROW_BYTES - 1;
        self.mem_scroll = self.mem_scroll.saturating_add_signed(delta).min(max);
    }

    /// Disassembly from the start of the program, decoded linearly, windowed
    /// around the current PC. Entries are (address, text, is_current).
    pub fn get_disassembly(&self, lines: usize) -> Vec<(u8, String, bool)> {
        let bytes = self.cpu.mem.as_slice();
        let pc = self.cpu.regs.pc as usize;

        let mut listing = Vec::new();
        let mut addr = 0;
        while addr < MEMORY_SIZE {
            // Resynchronise on PC in case a jump landed mid-instruction.
            if addr < pc && addr + disassemble_at(bytes, addr).1 > pc {
                addr = pc;
            }
            let (text, len) = disassemble_at(bytes, addr);
            listing.push((addr as u8, text, addr == pc));
            addr += len;
        }

        let current = listing.iter().position(|(_, _, cur)| *cur).unwrap_or(0);
        let start = current.saturating_sub(lines / 2);
        listing.into_iter().skip(start).take(lines).collect()
    }
}

/// Run the debugger with a program.
pub fn run_debugger(program: Vec<u8>) -> std::io::Result<()> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;
    use std::time::Duration;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut app = DebuggerApp::new(program);

    loop {
        terminal.draw(|frame| {
            super::ui::draw(frame, &app);
        })?;

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') => app.should_quit = true,
                        KeyCode::Char('s') => {
                            app.running = false;
                            app.step();
                        }
                        KeyCode::Char('r') => app.run(),
                        KeyCode::Char('p') => {
                            app.running = false;
                            app.status = "Paused.".into();
                        }
                        KeyCode::Char('b') => app.toggle_breakpoint(),
                        KeyCode::Char('x') => app.reset(),
                        KeyCode::Up => app.scroll_memory(-1),
                        KeyCode::Down => app.scroll_memory(1),
                        _ => {}
                    }
                }
            }
        }

        if app.running {
            app.tick();
        }

        if app.should_quit {
            break;
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Opcode;

    fn app() -> DebuggerApp {
        DebuggerApp::new(vec![Opcode::LDI, 0, 8, Opcode::PRN, 0, Opcode::HLT])
    }

    #[test]
    fn test_step_collects_output() {
        let mut app = app();
        app.step();
        assert_eq!(app.status, "PC=00: LDI R0, 0x08");
        app.step();
        assert_eq!(app.console, "8\n");
    }

    #[test]
    fn test_reset_reports_load_failure() {
        let mut app = DebuggerApp::new(vec![0; MEMORY_SIZE + 1]);
        assert!(app.status.starts_with("Load failed"));

        app.reset();
        assert!(app.status.starts_with("Load failed"), "{}", app.status);
    }

    #[test]
    fn test_reset_reloads_program() {
        let mut app = app();
        app.step();
        app.reset();
        assert_eq!(app.status, "Reset. Ready.");
        assert_eq!(app.cpu.mem.peek(0), Some(Opcode::LDI));
        assert_eq!(app.cpu.regs.pc, 0);
    }

    #[test]
    fn test_breakpoint_stops_run() {
        let mut app = app();
        app.step();
        app.toggle_breakpoint();
        app.reset();
        app.breakpoints.insert(3);

        app.run();
        for _ in 0..10 {
            app.tick();
        }
        assert!(!app.running);
        assert_eq!(app.cpu.regs.pc, 3);
    }

    #[test]
    fn test_run_to_halt() {
        let mut app = app();
        app.run();
        for _ in 0..10 {
            app.tick();
        }
        assert!(app.cpu.is_halted());
        assert!(app.status.starts_with("Halted"));
    }

    #[test]
    fn test_disassembly_marks_pc() {
        let mut app = app();
        app.step();
        let lines = app.get_disassembly(4);
        let current: Vec<_> = lines.iter().filter(|(_, _, cur)| *cur).collect();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].0, 3);
        assert_eq!(current[0].1, "PRN R0");
    }

    #[test]
    fn test_scroll_is_clamped() {
        let mut app = app();
        app.scroll_memory(-5);
        assert_eq!(app.mem_scroll, 0);
        app.scroll_memory(1000);
        assert_eq!(app.mem_scroll, MEMORY_SIZE / DebuggerApp::ROW_BYTES - 1);
    }
}
