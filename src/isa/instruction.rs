//! Opcode table, encoder and decoder.

use std::fmt;

use thiserror::Error;

const OPCODE_SHIFT: u32 = 26;
const RD_SHIFT: u32 = 21;
const RN_SHIFT: u32 = 16;
const RM_SHIFT: u32 = 11;
const REG_MASK: u32 = 0x1F;
const IMM_MASK: u32 = 0xFFFF;

/// Errors that can occur while decoding an instruction word.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Opcode field does not name a known instruction.
    #[error("unknown opcode 0x{opcode:02X} in word 0x{word:08X}")]
    UnknownOpcode {
        /// The 6-bit opcode field.
        opcode: u8,
        /// The full instruction word.
        word: u32,
    },
}

/// Six-bit opcode values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Load word, register-indirect.
    Ldur = 0x00,
    /// Store word, register-indirect.
    Stur = 0x01,
    /// Integer add.
    Add = 0x02,
    /// Integer multiply (low 32 bits).
    Mul = 0x04,
    /// Load a 16-bit immediate.
    Const = 0x08,
    /// End of kernel.
    Ret = 0x3F,
}

impl Opcode {
    /// Look up an opcode from its 6-bit field.
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0x00 => Some(Opcode::Ldur),
            0x01 => Some(Opcode::Stur),
            0x02 => Some(Opcode::Add),
            0x04 => Some(Opcode::Mul),
            0x08 => Some(Opcode::Const),
            0x3F => Some(Opcode::Ret),
            _ => None,
        }
    }

    /// Assembler mnemonic.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Ldur => "LDUR",
            Opcode::Stur => "STUR",
            Opcode::Add => "ADD",
            Opcode::Mul => "MUL",
            Opcode::Const => "CONST",
            Opcode::Ret => "RET",
        }
    }

    /// Look up an opcode by mnemonic (case-insensitive).
    pub fn from_mnemonic(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "LDUR" | "LDR" => Some(Opcode::Ldur),
            "STUR" | "STR" => Some(Opcode::Stur),
            "ADD" => Some(Opcode::Add),
            "MUL" => Some(Opcode::Mul),
            "CONST" => Some(Opcode::Const),
            "RET" => Some(Opcode::Ret),
            _ => None,
        }
    }
}

/// A decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// `rd = rn + rm`
    Add { rd: u8, rn: u8, rm: u8 },
    /// `rd = rn * rm`
    Mul { rd: u8, rn: u8, rm: u8 },
    /// `rd = imm`
    Const { rd: u8, imm: u16 },
    /// `rd = mem[rn + offset]`
    Ldur { rd: u8, rn: u8, offset: i16 },
    /// `mem[rn + offset] = rt`
    Stur { rt: u8, rn: u8, offset: i16 },
    /// Finish the wave.
    Ret,
}

impl Instruction {
    /// Opcode of this instruction.
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Add { .. } => Opcode::Add,
            Instruction::Mul { .. } => Opcode::Mul,
            Instruction::Const { .. } => Opcode::Const,
            Instruction::Ldur { .. } => Opcode::Ldur,
            Instruction::Stur { .. } => Opcode::Stur,
            Instruction::Ret => Opcode::Ret,
        }
    }

    /// Decode a 32-bit word.
    pub fn decode(word: u32) -> Result<Self, DecodeError> {
        let bits = (word >> OPCODE_SHIFT) as u8;
        let opcode = Opcode::from_bits(bits).ok_or(DecodeError::UnknownOpcode { opcode: bits, word })?;

        let rd = ((word >> RD_SHIFT) & REG_MASK) as u8;
        let rn = ((word >> RN_SHIFT) & REG_MASK) as u8;
        let rm = ((word >> RM_SHIFT) & REG_MASK) as u8;
        let imm = (word & IMM_MASK) as u16;

        Ok(match opcode {
            Opcode::Add => Instruction::Add { rd, rn, rm },
            Opcode::Mul => Instruction::Mul { rd, rn, rm },
            Opcode::Const => Instruction::Const { rd, imm },
            Opcode::Ldur => Instruction::Ldur { rd, rn, offset: imm as i16 },
            Opcode::Stur => Instruction::Stur { rt: rd, rn, offset: imm as i16 },
            Opcode::Ret => Instruction::Ret,
        })
    }

    /// Encode into a 32-bit word.
    pub fn encode(&self) -> u32 {
        let op = (self.opcode() as u32) << OPCODE_SHIFT;
        let reg = |r: u8, shift: u32| ((r as u32) & REG_MASK) << shift;

        match *self {
            Instruction::Add { rd, rn, rm } | Instruction::Mul { rd, rn, rm } => {
                op | reg(rd, RD_SHIFT) | reg(rn, RN_SHIFT) | reg(rm, RM_SHIFT)
            }
            Instruction::Const { rd, imm } => op | reg(rd, RD_SHIFT) | imm as u32,
            Instruction::Ldur { rd, rn, offset } => {
                op | reg(rd, RD_SHIFT) | reg(rn, RN_SHIFT) | (offset as u16) as u32
            }
            Instruction::Stur { rt, rn, offset } => {
                op | reg(rt, RD_SHIFT) | reg(rn, RN_SHIFT) | (offset as u16) as u32
            }
            Instruction::Ret => op,
        }
    }

    /// Registers each lane reads during REQUEST, as `(first, second)`.
    ///
    /// For stores the second operand is the data register.
    pub fn source_registers(&self) -> (Option<u8>, Option<u8>) {
        match *self {
            Instruction::Add { rn, rm, .. } | Instruction::Mul { rn, rm, .. } => (Some(rn), Some(rm)),
            Instruction::Ldur { rn, .. } => (Some(rn), None),
            Instruction::Stur { rt, rn, .. } => (Some(rn), Some(rt)),
            Instruction::Const { .. } | Instruction::Ret => (None, None),
        }
    }

    /// Register written back during UPDATE, if any.
    pub fn destination(&self) -> Option<u8> {
        match *self {
            Instruction::Add { rd, .. }
            | Instruction::Mul { rd, .. }
            | Instruction::Const { rd, .. }
            | Instruction::Ldur { rd, .. } => Some(rd),
            Instruction::Stur { .. } | Instruction::Ret => None,
        }
    }

    /// Does this instruction go through the LSUs?
    pub fn is_memory(&self) -> bool {
        matches!(self, Instruction::Ldur { .. } | Instruction::Stur { .. })
    }

    /// Is this the terminal instruction?
    pub fn is_ret(&self) -> bool {
        matches!(self, Instruction::Ret)
    }
}

/// Formats a register using its alias for the read-only ones.
pub(crate) struct RegName(pub u8);

impl fmt::Display for RegName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            super::REG_BLOCK_IDX => write!(f, "%blockIdx"),
            super::REG_BLOCK_DIM => write!(f, "%blockDim"),
            super::REG_THREAD_IDX => write!(f, "%threadIdx"),
            super::REG_ZERO => write!(f, "%zero"),
            r => write!(f, "R{}", r),
        }
    }
}

fn fmt_mem(f: &mut fmt::Formatter<'_>, rn: u8, offset: i16) -> fmt::Result {
    if offset == 0 {
        write!(f, "[{}]", RegName(rn))
    } else {
        write!(f, "[{}, #{}]", RegName(rn), offset)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Instruction::Add { rd, rn, rm } => {
                write!(f, "ADD {}, {}, {}", RegName(rd), RegName(rn), RegName(rm))
            }
            Instruction::Mul { rd, rn, rm } => {
                write!(f, "MUL {}, {}, {}", RegName(rd), RegName(rn), RegName(rm))
            }
            Instruction::Const { rd, imm } => write!(f, "CONST {}, #{}", RegName(rd), imm),
            Instruction::Ldur { rd, rn, offset } => {
                write!(f, "LDUR {}, ", RegName(rd))?;
                fmt_mem(f, rn, offset)
            }
            Instruction::Stur { rt, rn, offset } => {
                write!(f, "STUR {}, ", RegName(rt))?;
                fmt_mem(f, rn, offset)
            }
            Instruction::Ret => write!(f, "RET"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_field_positions() {
        let word = Instruction::Add { rd: 4, rn: 28, rm: 29 }.encode();
        assert_eq!(word >> 26, Opcode::Add as u32);
        assert_eq!((word >> 21) & 0x1F, 4);
        assert_eq!((word >> 16) & 0x1F, 28);
        assert_eq!((word >> 11) & 0x1F, 29);
        assert_eq!(word & 0x7FF, 0);
    }

    #[test]
    fn test_ret_encoding() {
        assert_eq!(Instruction::Ret.encode(), 0xFC00_0000);
        assert_eq!(Instruction::decode(0xFC00_0000), Ok(Instruction::Ret));
    }

    #[test]
    fn test_const_immediate() {
        let word = Instruction::Const { rd: 6, imm: 32 }.encode();
        assert_eq!(word, 0x20C0_0020);
        assert_eq!(Instruction::decode(word), Ok(Instruction::Const { rd: 6, imm: 32 }));
    }

    #[test]
    fn test_negative_memory_offset() {
        let ins = Instruction::Ldur { rd: 3, rn: 9, offset: -4 };
        let decoded = Instruction::decode(ins.encode()).unwrap();
        assert_eq!(decoded, ins);
    }

    #[test]
    fn test_store_uses_rd_field_for_data() {
        let word = Instruction::Stur { rt: 10, rn: 11, offset: 0 }.encode();
        assert_eq!((word >> 21) & 0x1F, 10);
        assert_eq!((word >> 16) & 0x1F, 11);
    }

    #[test]
    fn test_unknown_opcode() {
        let err = Instruction::decode(0x1C00_0000).unwrap_err();
        assert_eq!(err, DecodeError::UnknownOpcode { opcode: 0x07, word: 0x1C00_0000 });
        assert!(err.to_string().contains("0x07"));
    }

    #[test]
    fn test_operand_selection() {
        let add = Instruction::Add { rd: 1, rn: 2, rm: 3 };
        assert_eq!(add.source_registers(), (Some(2), Some(3)));
        assert_eq!(add.destination(), Some(1));
        assert!(!add.is_memory());

        let st = Instruction::Stur { rt: 10, rn: 11, offset: 0 };
        assert_eq!(st.source_registers(), (Some(11), Some(10)));
        assert_eq!(st.destination(), None);
        assert!(st.is_memory());

        assert_eq!(Instruction::Ret.destination(), None);
        assert!(Instruction::Ret.is_ret());
    }

    #[test]
    fn test_display() {
        assert_eq!(Instruction::Mul { rd: 4, rn: 28, rm: 29 }.to_string(), "MUL R4, %blockIdx, %blockDim");
        assert_eq!(Instruction::Ldur { rd: 8, rn: 8, offset: 0 }.to_string(), "LDUR R8, [R8]");
        assert_eq!(Instruction::Stur { rt: 1, rn: 2, offset: -3 }.to_string(), "STUR R1, [R2, #-3]");
        assert_eq!(Instruction::Const { rd: 5, imm: 64 }.to_string(), "CONST R5, #64");
    }

    #[test]
    fn test_mnemonic_aliases() {
        assert_eq!(Opcode::from_mnemonic("ldr"), Some(Opcode::Ldur));
        assert_eq!(Opcode::from_mnemonic("STR"), Some(Opcode::Stur));
        assert_eq!(Opcode::from_mnemonic("nop"), None);
        assert_eq!(Opcode::from_bits(0x3F), Some(Opcode::Ret));
        assert_eq!(Opcode::from_bits(0x03), None);
    }
}
