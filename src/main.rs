//! LS-8 Emulator - CLI Entry Point
//!
//! `ls8 <program>` loads a `.ls8` (or `.asm`) file and runs it until HLT.
//! Program output goes to stdout; diagnostics go to stderr.

use clap::error::ErrorKind;
use clap::Parser;
use std::io::Write;

const EXIT_OK: i32 = 0;
const EXIT_USAGE: i32 = 1;
const EXIT_NOT_FOUND: i32 = 2;
const EXIT_BAD_PROGRAM: i32 = 3;
const EXIT_FAULT: i32 = 4;
const EXIT_CYCLE_LIMIT: i32 = 5;

#[derive(Parser, Debug)]
#[command(name = "ls8")]
#[command(author = "Yigit")]
#[command(version = "0.1.0")]
#[command(about = "An emulator for the LS-8 8-bit register machine")]
struct Cli {
    /// Path to the .ls8 or .asm program
    program: String,
    /// Stop after this many instructions
    #[arg(short, long)]
    max_cycles: Option<u64>,
    /// Print a TRACE line before every instruction
    #[arg(short, long)]
    trace: bool,
    /// Print a disassembly listing instead of running
    #[arg(long)]
    disasm: bool,
    /// Write the program as .ls8 to this path instead of running
    #[arg(long, value_name = "PATH")]
    emit: Option<String>,
    /// Print the machine state as JSON when execution stops
    #[arg(long)]
    dump_state: bool,
    /// Open the interactive debugger
    #[arg(short, long)]
    debug: bool,
    /// Report loading and execution summary on stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => std::process::exit(usage_failure(e)),
    };

    std::process::exit(run(&cli));
}

/// Help and version exit through clap; anything else is a usage error.
fn usage_failure(e: clap::Error) -> i32 {
    match e.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
        _ => {
            eprintln!("usage: ls8 <filename>.ls8");
            eprintln!("{}", e);
            EXIT_USAGE
        }
    }
}

fn run(cli: &Cli) -> i32 {
    let program = match load(&cli.program) {
        Ok(bytes) => bytes,
        Err(code) => return code,
    };

    if cli.verbose {
        eprintln!("📂 Loaded {} bytes from {}", program.len(), cli.program);
    }

    if cli.disasm {
        print!("{}", ls8::disassemble(&program));
        return EXIT_OK;
    }

    if let Some(out_path) = &cli.emit {
        return match ls8::save_program(out_path, &program) {
            Ok(()) => {
                eprintln!("✓ Saved to {}", out_path);
                EXIT_OK
            }
            Err(e) => {
                eprintln!("❌ Failed to save program: {}", e);
                EXIT_BAD_PROGRAM
            }
        };
    }

    if cli.debug {
        return debug_program(program);
    }

    run_program(cli, &program)
}

/// Read a program, assembling `.asm` sources first.
fn load(path: &str) -> Result<Vec<u8>, i32> {
    use ls8::{assemble, load_program_file, LoadError};

    if path.ends_with(".asm") {
        let source = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                eprintln!("❌ File not found: {}", path);
                return Err(EXIT_NOT_FOUND);
            }
            Err(e) => {
                eprintln!("❌ Failed to read file: {}", e);
                return Err(EXIT_BAD_PROGRAM);
            }
        };

        return assemble(&source).map_err(|e| {
            eprintln!("❌ Assembly error: {}", e);
            EXIT_BAD_PROGRAM
        });
    }

    match load_program_file(path) {
        Ok(program) => Ok(program.bytes),
        Err(LoadError::NotFound(p)) => {
            eprintln!("❌ File not found: {}", p);
            Err(EXIT_NOT_FOUND)
        }
        Err(e) => {
            eprintln!("❌ Failed to load program: {}", e);
            Err(EXIT_BAD_PROGRAM)
        }
    }
}

fn run_program(cli: &Cli, program: &[u8]) -> i32 {
    use ls8::Cpu;

    let mut cpu = Cpu::new();
    if let Err(e) = cpu.load_program(program) {
        eprintln!("❌ Failed to load program: {}", e);
        return EXIT_BAD_PROGRAM;
    }

    let mut stdout = std::io::stdout().lock();
    let mut cycles = 0u64;
    let mut code = EXIT_OK;

    while cpu.is_running() {
        if cli.max_cycles.is_some_and(|max| cycles >= max) {
            eprintln!("⚠️  Reached max cycles limit ({}).", cycles);
            code = EXIT_CYCLE_LIMIT;
            break;
        }

        if cli.trace {
            let _ = writeln!(stdout, "{}", cpu.trace());
        }

        let pc = cpu.regs.pc;
        let result = cpu.step();

        for out in cpu.take_output() {
            let _ = write!(stdout, "{}", out);
        }
        let _ = stdout.flush();

        match result {
            Ok(_) => cycles += 1,
            Err(e) => {
                eprintln!("❌ CPU error at PC={:#04X}: {}", pc, e);
                code = EXIT_FAULT;
                break;
            }
        }
    }

    if cli.verbose {
        eprintln!();
        eprintln!("━━━ Result ━━━");
        eprintln!("Cycles: {}", cycles);
        eprintln!("State:  {:?}", cpu.state);
        eprintln!("{}", cpu.trace());
        eprintln!("{:?}", cpu.regs.fl);
    }

    if cli.dump_state {
        match serde_json::to_string_pretty(&cpu) {
            Ok(json) => {
                let _ = writeln!(stdout, "{}", json);
            }
            Err(e) => eprintln!("❌ Failed to serialize state: {}", e),
        }
    }

    code
}

#[cfg(feature = "tui")]
fn debug_program(program: Vec<u8>) -> i32 {
    eprintln!("🚀 Launching debugger...");

    match ls8::run_debugger(program) {
        Ok(()) => EXIT_OK,
        Err(e) => {
            eprintln!("❌ Debugger error: {}", e);
            EXIT_FAULT
        }
    }
}

#[cfg(not(feature = "tui"))]
fn debug_program(_program: Vec<u8>) -> i32 {
    eprintln!("❌ This build does not include the debugger (enable the `tui` feature)");
    EXIT_USAGE
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_program(name: &str, text: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("ls8-cli-{}-{}", std::process::id(), name));
        std::fs::write(&path, text).unwrap();
        path
    }

    fn cli_for(program: &str) -> Cli {
        Cli {
            program: program.to_string(),
            max_cycles: None,
            trace: false,
            disasm: false,
            emit: None,
            dump_state: false,
            debug: false,
            verbose: false,
        }
    }

    fn run_file(name: &str, text: &str, max_cycles: Option<u64>) -> i32 {
        let path = temp_program(name, text);
        let mut cli = cli_for(&path.to_string_lossy());
        cli.max_cycles = max_cycles;

        let code = run(&cli);
        std::fs::remove_file(&path).unwrap();
        code
    }

    #[test]
    fn test_halt_exits_ok() {
        let code = run_file("print8.ls8", "10000010\n00000000\n00001000\n01000111\n00000000\n00000001\n", None);
        assert_eq!(code, EXIT_OK);
    }

    #[test]
    fn test_missing_argument_is_usage_error() {
        let err = Cli::try_parse_from(["ls8"]).unwrap_err();
        assert_eq!(usage_failure(err), EXIT_USAGE);
    }

    #[test]
    fn test_missing_file() {
        assert_eq!(run(&cli_for("/definitely/not/here.ls8")), EXIT_NOT_FOUND);
        assert_eq!(run(&cli_for("/definitely/not/here.asm")), EXIT_NOT_FOUND);
    }

    #[test]
    fn test_bad_binary_digit() {
        assert_eq!(run_file("bad.ls8", "00000002\n", None), EXIT_BAD_PROGRAM);
    }

    #[test]
    fn test_bad_assembly() {
        assert_eq!(run_file("bad.asm", "JMP R0\n", None), EXIT_BAD_PROGRAM);
    }

    #[test]
    fn test_invalid_opcode_is_fault() {
        assert_eq!(run_file("fault.ls8", "11111111\n", None), EXIT_FAULT);
    }

    #[test]
    fn test_cycle_limit() {
        assert_eq!(run_file("limit.ls8", "00000001\n", Some(0)), EXIT_CYCLE_LIMIT);
        assert_eq!(run_file("enough.ls8", "00000001\n", Some(1)), EXIT_OK);
    }
}
