//! Text assembler.
//!
//! One instruction per line. `;` and `//` start comments. Registers are
//! `R0`..`R31` or the aliases `%blockIdx`, `%blockDim`, `%threadIdx` and
//! `%zero`. Memory operands may be written `[Rn]`, `[Rn, #off]` or just `Rn`.
//!
//! ```ignore
//! let program = assemble("MUL R4, %blockIdx, %blockDim\nRET")?;
//! assert_eq!(program.len(), 2);
//! ```

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use super::instruction::{Instruction, Opcode};
use super::{REG_BLOCK_DIM, REG_BLOCK_IDX, REG_THREAD_IDX, REG_ZERO};

/// What went wrong on a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsmErrorKind {
    /// Mnemonic not in the opcode table.
    UnknownMnemonic(String),
    /// Operand is not a register.
    BadRegister(String),
    /// Immediate does not parse or does not fit.
    BadImmediate(String),
    /// Wrong number or shape of operands.
    BadOperands { mnemonic: &'static str, expected: &'static str },
}

/// Assembly error with the 1-based source line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("line {line}: {}", describe(.kind))]
pub struct AsmError {
    /// Source line number (1-based).
    pub line: usize,
    /// Error detail.
    pub kind: AsmErrorKind,
}

fn describe(kind: &AsmErrorKind) -> String {
    match kind {
        AsmErrorKind::UnknownMnemonic(m) => format!("unknown mnemonic '{}'", m),
        AsmErrorKind::BadRegister(r) => format!("bad register '{}'", r),
        AsmErrorKind::BadImmediate(i) => format!("bad immediate '{}'", i),
        AsmErrorKind::BadOperands { mnemonic, expected } => {
            format!("{} expects {}", mnemonic, expected)
        }
    }
}

/// Compiled regex patterns for the assembler.
struct Patterns {
    /// Splits `MNEMONIC rest-of-line`.
    line: Regex,
    /// Matches `R7` or an alias such as `%threadIdx`.
    reg: Regex,
    /// Matches `Rt, [Rn]`, `Rt, [Rn, #off]` or `Rt, Rn`.
    mem: Regex,
}

static PATTERNS: LazyLock<Patterns> = LazyLock::new(|| Patterns {
    line: Regex::new(r"^\s*([A-Za-z]+)\s*(.*?)\s*$").unwrap(),
    reg: Regex::new(r"(?i)^(?:R(\d{1,2})|%(blockIdx|blockDim|threadIdx|zero))$").unwrap(),
    mem: Regex::new(r"^([^,\s]+)\s*,\s*(?:\[\s*([^\],\s]+)\s*(?:,\s*([^\]\s]+)\s*)?\]|([^,\s]+))$")
        .unwrap(),
});

/// Assemble a whole program.
pub fn assemble(source: &str) -> Result<Vec<Instruction>, AsmError> {
    let mut program = Vec::new();

    for (idx, raw) in source.lines().enumerate() {
        let line = strip_comment(raw);
        if line.trim().is_empty() {
            continue;
        }
        let ins = assemble_line(line).map_err(|kind| AsmError { line: idx + 1, kind })?;
        program.push(ins);
    }

    Ok(program)
}

/// Assemble a single instruction (no comments).
pub fn assemble_line(line: &str) -> Result<Instruction, AsmErrorKind> {
    let caps = PATTERNS
        .line
        .captures(line)
        .ok_or_else(|| AsmErrorKind::UnknownMnemonic(line.trim().to_string()))?;
    let name = &caps[1];
    let rest = caps.get(2).map(|m| m.as_str()).unwrap_or("");

    let opcode = Opcode::from_mnemonic(name).ok_or_else(|| AsmErrorKind::UnknownMnemonic(name.to_string()))?;

    match opcode {
        Opcode::Add | Opcode::Mul => {
            let ops = split_operands(rest);
            if ops.len() != 3 {
                return Err(bad_operands(opcode, "Rd, Rn, Rm"));
            }
            let (rd, rn, rm) = (parse_reg(ops[0])?, parse_reg(ops[1])?, parse_reg(ops[2])?);
            Ok(if opcode == Opcode::Add {
                Instruction::Add { rd, rn, rm }
            } else {
                Instruction::Mul { rd, rn, rm }
            })
        }
        Opcode::Const => {
            let ops = split_operands(rest);
            if ops.len() != 2 {
                return Err(bad_operands(opcode, "Rd, #imm"));
            }
            let rd = parse_reg(ops[0])?;
            let value = parse_imm(ops[1])?;
            let imm = u16::try_from(value).map_err(|_| AsmErrorKind::BadImmediate(ops[1].to_string()))?;
            Ok(Instruction::Const { rd, imm })
        }
        Opcode::Ldur | Opcode::Stur => {
            let caps = PATTERNS
                .mem
                .captures(rest)
                .ok_or_else(|| bad_operands(opcode, "Rt, [Rn{, #off}]"))?;
            let rt = parse_reg(&caps[1])?;
            let base = caps.get(2).or_else(|| caps.get(4)).map(|m| m.as_str()).unwrap_or("");
            let rn = parse_reg(base)?;
            let offset = match caps.get(3) {
                Some(m) => {
                    let value = parse_imm(m.as_str())?;
                    i16::try_from(value).map_err(|_| AsmErrorKind::BadImmediate(m.as_str().to_string()))?
                }
                None => 0,
            };
            Ok(if opcode == Opcode::Ldur {
                Instruction::Ldur { rd: rt, rn, offset }
            } else {
                Instruction::Stur { rt, rn, offset }
            })
        }
        Opcode::Ret => {
            if !rest.is_empty() {
                return Err(bad_operands(opcode, "no operands"));
            }
            Ok(Instruction::Ret)
        }
    }
}

fn strip_comment(line: &str) -> &str {
    let end = [line.find(';'), line.find("//")].into_iter().flatten().min().unwrap_or(line.len());
    &line[..end]
}

fn split_operands(rest: &str) -> Vec<&str> {
    if rest.is_empty() {
        return Vec::new();
    }
    rest.split(',').map(str::trim).collect()
}

fn bad_operands(opcode: Opcode, expected: &'static str) -> AsmErrorKind {
    AsmErrorKind::BadOperands { mnemonic: opcode.mnemonic(), expected }
}

fn parse_reg(token: &str) -> Result<u8, AsmErrorKind> {
    let caps = PATTERNS
        .reg
        .captures(token)
        .ok_or_else(|| AsmErrorKind::BadRegister(token.to_string()))?;

    if let Some(num) = caps.get(1) {
        let reg: u8 = num.as_str().parse().map_err(|_| AsmErrorKind::BadRegister(token.to_string()))?;
        if reg as usize >= super::NUM_REGS {
            return Err(AsmErrorKind::BadRegister(token.to_string()));
        }
        return Ok(reg);
    }

    let alias = caps.get(2).map(|m| m.as_str().to_ascii_lowercase()).unwrap_or_default();
    match alias.as_str() {
        "blockidx" => Ok(REG_BLOCK_IDX),
        "blockdim" => Ok(REG_BLOCK_DIM),
        "threadidx" => Ok(REG_THREAD_IDX),
        _ => Ok(REG_ZERO),
    }
}

fn parse_imm(token: &str) -> Result<i64, AsmErrorKind> {
    let bad = || AsmErrorKind::BadImmediate(token.to_string());
    let body = token.strip_prefix('#').unwrap_or(token);
    let (negative, digits) = match body.strip_prefix('-') {
        Some(d) => (true, d),
        None => (false, body),
    };

    let magnitude = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).map_err(|_| bad())?
    } else {
        digits.parse::<i64>().map_err(|_| bad())?
    };

    Ok(if negative { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_register_forms() {
        assert_eq!(assemble_line("ADD R8, R5, R4"), Ok(Instruction::Add { rd: 8, rn: 5, rm: 4 }));
        assert_eq!(
            assemble_line("mul r4, %blockIdx, %blockDim"),
            Ok(Instruction::Mul { rd: 4, rn: 28, rm: 29 })
        );
    }

    #[test]
    fn test_const_forms() {
        assert_eq!(assemble_line("CONST R6, #32"), Ok(Instruction::Const { rd: 6, imm: 32 }));
        assert_eq!(assemble_line("CONST R6, 0x40"), Ok(Instruction::Const { rd: 6, imm: 64 }));
        assert_eq!(
            assemble_line("CONST R6, #70000"),
            Err(AsmErrorKind::BadImmediate("#70000".to_string()))
        );
    }

    #[test]
    fn test_memory_forms() {
        assert_eq!(assemble_line("LDUR R8, [R8]"), Ok(Instruction::Ldur { rd: 8, rn: 8, offset: 0 }));
        assert_eq!(assemble_line("LDR R9, R9"), Ok(Instruction::Ldur { rd: 9, rn: 9, offset: 0 }));
        assert_eq!(
            assemble_line("STUR R10, [R11, #-2]"),
            Ok(Instruction::Stur { rt: 10, rn: 11, offset: -2 })
        );
    }

    #[test]
    fn test_comments_and_blank_lines() {
        let src = "; header\n\nCONST R5, #0 ; baseA\n// note\nRET\n";
        let program = assemble(src).unwrap();
        assert_eq!(program, vec![Instruction::Const { rd: 5, imm: 0 }, Instruction::Ret]);
    }

    #[test]
    fn test_error_reports_line() {
        let err = assemble("RET\nFOO R1, R2\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.kind, AsmErrorKind::UnknownMnemonic("FOO".to_string()));
        assert!(err.to_string().starts_with("line 2:"));
    }

    #[test]
    fn test_bad_register() {
        assert_eq!(assemble_line("ADD R32, R1, R2"), Err(AsmErrorKind::BadRegister("R32".to_string())));
        assert!(matches!(assemble_line("ADD R1, R2"), Err(AsmErrorKind::BadOperands { .. })));
        assert!(matches!(assemble_line("RET R1"), Err(AsmErrorKind::BadOperands { .. })));
    }

    #[test]
    fn test_display_reassembles() {
        let src = "MUL R4, %blockIdx, %blockDim\nLDUR R1, [R2, #5]\nSTUR R3, [R4]\nCONST R7, #64\nRET";
        let program = assemble(src).unwrap();
        let text: Vec<String> = program.iter().map(|i| i.to_string()).collect();
        assert_eq!(assemble(&text.join("\n")).unwrap(), program);
    }
}
