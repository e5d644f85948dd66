//! Instruction set of the SIMD core.
//!
//! Every instruction is a single 32-bit word. The opcode sits in the top six
//! bits; operand fields depend on the opcode class:
//!
//! ```text
//! 31      26 25   21 20   16 15   11 10          0
//! | opcode  |  rd   |  rn   |  rm   |  reserved   |   ADD, MUL
//! | opcode  |  rd   | 00000 |      imm16          |   CONST
//! | opcode  | rd/rt |  rn   |   signed off16      |   LDUR, STUR
//! | opcode  |            zero                     |   RET
//! ```
//!
//! - [`instruction`]: opcode table, encoder and decoder
//! - [`asm`]: text assembler for the mnemonics above
//! - [`image`]: little-endian program images

pub mod instruction;
pub mod asm;
pub mod image;

pub use instruction::{DecodeError, Instruction, Opcode};
pub use asm::{assemble, AsmError, AsmErrorKind};

/// Number of architectural registers per lane.
pub const NUM_REGS: usize = 32;

/// First read-only register. Everything at or above this index is kernel-derived.
pub const FIRST_READ_ONLY_REG: u8 = 28;

/// `%blockIdx`: id of the block the lane belongs to.
pub const REG_BLOCK_IDX: u8 = 28;

/// `%blockDim`: threads per block of the launch.
pub const REG_BLOCK_DIM: u8 = 29;

/// `%threadIdx`: thread index of the lane within its block.
pub const REG_THREAD_IDX: u8 = 30;

/// `%zero`: always reads 0.
pub const REG_ZERO: u8 = 31;
