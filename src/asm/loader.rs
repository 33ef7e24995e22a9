//! `.ls8` program file format.
//!
//! A simple text format:
//! - One memory byte per line, written in binary (`10000010`)
//! - `#` starts a comment that runs to the end of the line
//! - Blank and comment-only lines are ignored

use crate::cpu::memory::MEMORY_SIZE;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use thiserror::Error;

/// A parsed program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramFile {
    /// Memory image, starting at address 0.
    pub bytes: Vec<u8>,
}

impl ProgramFile {
    /// Create a new empty program.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a byte.
    pub fn push(&mut self, byte: u8) {
        self.bytes.push(byte);
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Parse `.ls8` text.
pub fn parse_program(source: &str) -> Result<ProgramFile, LoadError> {
    let mut program = ProgramFile::new();

    for (line_num, line) in source.lines().enumerate() {
        parse_line(&mut program, line, line_num + 1)?;
    }

    Ok(program)
}

/// Load a `.ls8` file from disk.
pub fn load_program_file<P: AsRef<Path>>(path: P) -> Result<ProgramFile, LoadError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => LoadError::NotFound(path.display().to_string()),
        _ => LoadError::IoError(e.to_string()),
    })?;
    let reader = BufReader::new(file);

    let mut program = ProgramFile::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result.map_err(|e| LoadError::IoError(e.to_string()))?;
        parse_line(&mut program, &line, line_num + 1)?;
    }

    Ok(program)
}

fn parse_line(program: &mut ProgramFile, line: &str, line_num: usize) -> Result<(), LoadError> {
    let code = line.split('#').next().unwrap_or("").trim();
    if code.is_empty() {
        return Ok(());
    }

    let digits = code.strip_prefix("0b").unwrap_or(code);
    let byte = u8::from_str_radix(digits, 2).map_err(|e| LoadError::ParseError {
        line: line_num,
        message: format!("invalid binary byte '{}': {}", code, e),
    })?;

    if program.len() == MEMORY_SIZE {
        return Err(LoadError::TooLarge { line: line_num });
    }

    program.push(byte);
    Ok(())
}

/// Save a program to disk in `.ls8` format.
pub fn save_program<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<(), LoadError> {
    let mut file = std::fs::File::create(path.as_ref())
        .map_err(|e| LoadError::IoError(e.to_string()))?;

    file.write_all(format_program(bytes).as_bytes())
        .map_err(|e| LoadError::IoError(e.to_string()))
}

/// Render bytes as `.ls8` text, one byte per line with its address.
pub fn format_program(bytes: &[u8]) -> String {
    let mut out = String::new();
    out.push_str("# LS-8 program\n");
    out.push_str(&format!("# {} bytes\n\n", bytes.len()));

    for (addr, byte) in bytes.iter().enumerate() {
        out.push_str(&format!("{:08b} # {:02X}\n", byte, addr));
    }

    out
}

/// Errors that can occur while loading or saving programs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("parse error on line {line}: {message}")]
    ParseError { line: usize, message: String },

    #[error("program does not fit in memory (overflow at line {line})")]
    TooLarge { line: usize },
}
