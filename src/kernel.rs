//! Kernel launches and the built-in kernel library.
//!
//! A launch is `num_threads` threads cut into blocks of `block_dim`. The last
//! block may be partial; its thread count is what the wave dispatcher uses to
//! size the block and mask lanes.

use thiserror::Error;

/// Sentinel block id shown by an idle compute unit.
pub const INVALID_BLOCK_ID: u32 = u32::MAX;

/// Sentinel wave id shown by an idle SIMD engine.
pub const INVALID_WAVE_ID: u32 = u32::MAX;

/// Rejected launch parameters.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LaunchError {
    #[error("block_dim must be greater than zero")]
    ZeroBlockDim,
}

/// Launch parameters, fixed for the duration of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelLaunch {
    num_threads: u32,
    block_dim: u32,
}

/// One block of a launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub block_id: u32,
    /// Threads per block of the launch (what `%blockDim` reads).
    pub block_dim: u32,
    /// Threads this block actually runs (`<= block_dim`).
    pub thread_count: u32,
}

impl BlockInfo {
    /// Waves needed to cover the block.
    pub fn num_waves(&self, wave_size: u32) -> u32 {
        self.thread_count.div_ceil(wave_size.max(1))
    }
}

impl KernelLaunch {
    pub fn new(num_threads: u32, block_dim: u32) -> Result<Self, LaunchError> {
        if block_dim == 0 {
            return Err(LaunchError::ZeroBlockDim);
        }
        Ok(Self { num_threads, block_dim })
    }

    pub fn num_threads(&self) -> u32 {
        self.num_threads
    }

    pub fn block_dim(&self) -> u32 {
        self.block_dim
    }

    /// `ceil(num_threads / block_dim)`
    pub fn num_blocks(&self) -> u32 {
        self.num_threads.div_ceil(self.block_dim)
    }

    /// Block `block_id`, or None past the end of the launch.
    pub fn block(&self, block_id: u32) -> Option<BlockInfo> {
        if block_id >= self.num_blocks() {
            return None;
        }
        let first = block_id as u64 * self.block_dim as u64;
        let thread_count = (self.num_threads as u64 - first).min(self.block_dim as u64) as u32;
        Some(BlockInfo { block_id, block_dim: self.block_dim, thread_count })
    }
}

/// Built-in kernels, parameterised by buffer base addresses.
///
/// Each kernel computes its global index as
/// `%blockIdx * %blockDim + %threadIdx` and touches one element per thread.
pub mod builtin {
    use crate::isa::Instruction as Ins;
    use crate::isa::{Instruction, REG_BLOCK_DIM, REG_BLOCK_IDX, REG_THREAD_IDX};

    /// Global thread index into R4.
    fn global_index() -> [Ins; 2] {
        [
            Ins::Mul { rd: 4, rn: REG_BLOCK_IDX, rm: REG_BLOCK_DIM },
            Ins::Add { rd: 4, rn: 4, rm: REG_THREAD_IDX },
        ]
    }

    /// `C[i] = A[i] + B[i]`, 13 instructions.
    pub fn vector_add(base_a: u16, base_b: u16, base_c: u16) -> Vec<Instruction> {
        let mut program = global_index().to_vec();
        program.extend([
            Ins::Const { rd: 5, imm: base_a },
            Ins::Const { rd: 6, imm: base_b },
            Ins::Const { rd: 7, imm: base_c },
            Ins::Add { rd: 8, rn: 5, rm: 4 },
            Ins::Ldur { rd: 8, rn: 8, offset: 0 },
            Ins::Add { rd: 9, rn: 6, rm: 4 },
            Ins::Ldur { rd: 9, rn: 9, offset: 0 },
            Ins::Add { rd: 10, rn: 8, rm: 9 },
            Ins::Add { rd: 11, rn: 7, rm: 4 },
            Ins::Stur { rt: 10, rn: 11, offset: 0 },
            Ins::Ret,
        ]);
        program
    }

    /// `D[i] = A[i] + B[i] + C[i]`
    pub fn vector_add3(base_a: u16, base_b: u16, base_c: u16, base_d: u16) -> Vec<Instruction> {
        let mut program = global_index().to_vec();
        program.extend([
            Ins::Const { rd: 5, imm: base_a },
            Ins::Const { rd: 6, imm: base_b },
            Ins::Const { rd: 7, imm: base_c },
            Ins::Const { rd: 12, imm: base_d },
            Ins::Add { rd: 8, rn: 5, rm: 4 },
            Ins::Ldur { rd: 8, rn: 8, offset: 0 },
            Ins::Add { rd: 9, rn: 6, rm: 4 },
            Ins::Ldur { rd: 9, rn: 9, offset: 0 },
            Ins::Add { rd: 10, rn: 7, rm: 4 },
            Ins::Ldur { rd: 10, rn: 10, offset: 0 },
            Ins::Add { rd: 13, rn: 8, rm: 9 },
            Ins::Add { rd: 13, rn: 13, rm: 10 },
            Ins::Add { rd: 14, rn: 12, rm: 4 },
            Ins::Stur { rt: 13, rn: 14, offset: 0 },
            Ins::Ret,
        ]);
        program
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_block_dim_rejected() {
        assert_eq!(KernelLaunch::new(64, 0), Err(LaunchError::ZeroBlockDim));
    }

    #[test]
    fn test_block_split() {
        let launch = KernelLaunch::new(320, 64).unwrap();
        assert_eq!(launch.num_blocks(), 5);
        assert_eq!(launch.block(4).unwrap().thread_count, 64);
        assert_eq!(launch.block(5), None);
    }

    #[test]
    fn test_partial_last_block() {
        let launch = KernelLaunch::new(100, 64).unwrap();
        assert_eq!(launch.num_blocks(), 2);

        let last = launch.block(1).unwrap();
        assert_eq!(last, BlockInfo { block_id: 1, block_dim: 64, thread_count: 36 });
        assert_eq!(last.num_waves(32), 2);
        assert_eq!(launch.block(0).unwrap().num_waves(32), 2);
    }

    #[test]
    fn test_empty_launch() {
        let launch = KernelLaunch::new(0, 32).unwrap();
        assert_eq!(launch.num_blocks(), 0);
        assert_eq!(launch.block(0), None);
    }

    #[test]
    fn test_builtin_shapes() {
        let vadd = builtin::vector_add(0, 32, 64);
        assert_eq!(vadd.len(), 13);
        assert!(vadd.last().unwrap().is_ret());
        assert_eq!(vadd.iter().filter(|i| i.is_memory()).count(), 3);

        let vadd3 = builtin::vector_add3(0, 32, 64, 96);
        assert!(vadd3.last().unwrap().is_ret());
        assert_eq!(vadd3.iter().filter(|i| i.is_memory()).count(), 4);
    }
}
