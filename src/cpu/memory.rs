//! LS-8 memory subsystem.
//!
//! A single flat array of 256 bytes holds both the program and the stack.

use serde::{Deserialize, Deserializer, Serialize};

/// The number of addressable bytes.
pub const MEMORY_SIZE: usize = 256;

/// LS-8 memory: 256 byte cells.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memory {
    #[serde(deserialize_with = "deserialize_cells")]
    cells: Vec<u8>,
}

/// Snapshots must carry exactly one value per address.
fn deserialize_cells<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let cells = Vec::<u8>::deserialize(deserializer)?;
    if cells.len() != MEMORY_SIZE {
        return Err(serde::de::Error::invalid_length(
            cells.len(),
            &"256 memory cells",
        ));
    }
    Ok(cells)
}

impl Memory {
    /// Create a new memory with all cells zeroed.
    pub fn new() -> Self {
        Self {
            cells: vec![0; MEMORY_SIZE],
        }
    }

    /// Read the byte at `addr`.
    #[inline]
    pub fn read(&self, addr: usize) -> Result<u8, MemoryError> {
        self.cells
            .get(addr)
            .copied()
            .ok_or(MemoryError::AddressOutOfRange(addr))
    }

    /// Write `value` to `addr`.
    #[inline]
    pub fn write(&mut self, addr: usize, value: u8) -> Result<(), MemoryError> {
        let cell = self.cells
            .get_mut(addr)
            .ok_or(MemoryError::AddressOutOfRange(addr))?;
        *cell = value;
        Ok(())
    }

    /// Read without failing; out-of-range addresses yield `None`.
    pub fn peek(&self, addr: usize) -> Option<u8> {
        self.cells.get(addr).copied()
    }

    /// Clear all memory to zeros.
    pub fn clear(&mut self) {
        self.cells.fill(0);
    }

    /// Copy a program into memory starting at address 0.
    pub fn load_program(&mut self, program: &[u8]) -> Result<(), MemoryError> {
        if program.len() > MEMORY_SIZE {
            return Err(MemoryError::ProgramTooLarge {
                size: program.len(),
                available: MEMORY_SIZE,
            });
        }

        self.cells[..program.len()].copy_from_slice(program);
        Ok(())
    }

    /// The whole address space as a slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.cells
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only count non-zero cells
        let non_zero = self.cells.iter().filter(|&&b| b != 0).count();

        f.debug_struct("Memory")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &MEMORY_SIZE)
            .finish()
    }
}

/// Errors that can occur during memory operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// Address is outside valid memory range.
    AddressOutOfRange(usize),
    /// Program is too large to fit in memory.
    ProgramTooLarge { size: usize, available: usize },
}

impl std::fmt::Display for MemoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryError::AddressOutOfRange(addr) => {
                write!(f, "memory address {:#04X} out of range (0x00 to 0xFF)", addr)
            }
            MemoryError::ProgramTooLarge { size, available } => {
                write!(f, "program size {} exceeds available space {}", size, available)
            }
        }
    }
}

impl std::error::Error for MemoryError {}
