//! Per-lane register file.
//!
//! 32 × 32-bit registers (R0-R31):
//!
//! - **R0-R27**: general purpose
//! - **R28** `%blockIdx`: id of the lane's block
//! - **R29** `%blockDim`: threads per block
//! - **R30** `%threadIdx`: thread index within the block
//! - **R31** `%zero`: always 0
//!
//! R28-R31 are re-derived on every wave dispatch and never written by
//! instructions. Writes to them are dropped without error.

use std::fmt;

use crate::isa::{FIRST_READ_ONLY_REG, NUM_REGS, REG_BLOCK_DIM, REG_BLOCK_IDX, REG_THREAD_IDX, REG_ZERO};

/// Where a lane sits in the launch, used to derive the read-only registers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThreadCoords {
    /// Block id.
    pub block_id: u32,
    /// Threads per block.
    pub block_dim: u32,
    /// Wave id within the block.
    pub wave_id: u32,
    /// Wave cycle the lane is executed in.
    pub wave_cycle: u32,
    /// Physical lane.
    pub lane_id: u32,
    /// Threads per wave.
    pub wave_size: u32,
    /// Physical lanes per SIMD engine.
    pub lane_width: u32,
}

impl ThreadCoords {
    /// `wave_id * wave_size + wave_cycle * lane_width + lane_id`
    #[inline]
    pub fn thread_idx(&self) -> u32 {
        self.wave_id * self.wave_size + self.wave_cycle * self.lane_width + self.lane_id
    }
}

/// Register file for one execution context (one thread).
#[derive(Clone)]
pub struct RegisterFile {
    regs: [u32; NUM_REGS],
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterFile {
    /// Create a zeroed register file.
    pub const fn new() -> Self {
        Self { regs: [0; NUM_REGS] }
    }

    /// Zero the general registers and derive R28-R31 for a new wave.
    pub fn reset(&mut self, coords: &ThreadCoords) {
        self.regs = [0; NUM_REGS];
        self.regs[REG_BLOCK_IDX as usize] = coords.block_id;
        self.regs[REG_BLOCK_DIM as usize] = coords.block_dim;
        self.regs[REG_THREAD_IDX as usize] = coords.thread_idx();
        self.regs[REG_ZERO as usize] = 0;
    }

    /// Read a register (0-31).
    #[inline]
    pub fn read(&self, index: u8) -> u32 {
        self.regs[(index & 0x1F) as usize]
    }

    /// Write a register if `enabled`.
    ///
    /// Returns whether the write landed. Read-only registers never change.
    #[inline]
    pub fn write(&mut self, index: u8, value: u32, enabled: bool) -> bool {
        let index = index & 0x1F;
        if !enabled || Self::is_read_only(index) {
            return false;
        }
        self.regs[index as usize] = value;
        true
    }

    /// Is `index` one of the kernel-derived registers?
    #[inline]
    pub fn is_read_only(index: u8) -> bool {
        index >= FIRST_READ_ONLY_REG
    }

    /// All registers (for debugging/display).
    pub fn as_slice(&self) -> &[u32; NUM_REGS] {
        &self.regs
    }
}

impl fmt::Debug for RegisterFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Only show non-zero registers
        let non_zero: Vec<_> = self.regs.iter().enumerate().filter(|(_, v)| **v != 0).collect();

        if non_zero.is_empty() {
            write!(f, "RegisterFile {{ all zero }}")
        } else {
            write!(f, "RegisterFile {{ ")?;
            for (i, (reg, val)) in non_zero.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "R{}: {}", reg, val)?;
            }
            write!(f, " }}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coords() -> ThreadCoords {
        ThreadCoords {
            block_id: 7,
            block_dim: 64,
            wave_id: 2,
            wave_cycle: 1,
            lane_id: 3,
            wave_size: 32,
            lane_width: 16,
        }
    }

    #[test]
    fn test_read_only_after_reset() {
        let mut rf = RegisterFile::new();
        rf.reset(&coords());

        assert_eq!(rf.read(28), 7);
        assert_eq!(rf.read(29), 64);
        assert_eq!(rf.read(30), 2 * 32 + (16 + 3));
        assert_eq!(rf.read(30), 83);
        assert_eq!(rf.read(31), 0);
    }

    #[test]
    fn test_general_purpose_write() {
        let mut rf = RegisterFile::new();
        rf.reset(&coords());

        assert!(rf.write(4, 12345, true));
        assert_eq!(rf.read(4), 12345);
        assert_eq!(rf.read(5), 0);
    }

    #[test]
    fn test_disabled_write_is_dropped() {
        let mut rf = RegisterFile::new();
        assert!(!rf.write(4, 1, false));
        assert_eq!(rf.read(4), 0);
    }

    #[test]
    fn test_read_only_writes_ignored() {
        let mut rf = RegisterFile::new();
        rf.reset(&coords());

        assert!(!rf.write(28, 99999, true));
        assert!(!rf.write(31, 55555, true));
        assert!(!rf.write(30, 1, true));
        assert_eq!(rf.read(28), 7);
        assert_eq!(rf.read(31), 0);
        assert_eq!(rf.read(30), 83);
    }

    #[test]
    fn test_reset_clears_general_registers() {
        let mut rf = RegisterFile::new();
        rf.reset(&coords());
        rf.write(10, 42, true);

        let next = ThreadCoords { block_id: 1, wave_id: 0, wave_cycle: 0, lane_id: 5, ..coords() };
        rf.reset(&next);
        assert_eq!(rf.read(10), 0);
        assert_eq!(rf.read(28), 1);
        assert_eq!(rf.read(30), 5);
    }

    #[test]
    fn test_debug_shows_non_zero() {
        let mut rf = RegisterFile::new();
        assert_eq!(format!("{:?}", rf), "RegisterFile { all zero }");
        rf.write(2, 9, true);
        assert_eq!(format!("{:?}", rf), "RegisterFile { R2: 9 }");
    }
}
