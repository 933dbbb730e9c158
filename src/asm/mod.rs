//! The assembler module for SLEDE8.
//!
//! Assembly happens in two explicit passes: [preprocess][assembler::preprocess] classifies
//! every line, assigns byte addresses and collects labels, then
//! [translate][assembler::translate] encodes each tokenized line, resolving label
//! references against the now complete label table.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::plat::{AluOp, CmpOp};

pub mod assembler;
pub mod disasm;
pub mod lexer;

pub use assembler::assemble;

/// The keyword introducing a raw data directive.
pub const DATA_DIRECTIVE: &str = ".DATA";

/// An error for the assembler module of SLEDE8.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AsmError {
    #[error("expected {expected} argument(s) for {opcode}, got {}: [{}]", .args.len(), .args.join(", "))]
    Arity {
        opcode: String,
        expected: usize,
        args: Vec<String>,
    },
    #[error("invalid register: '{0}'")]
    InvalidRegister(String),
    #[error("unexpected token: '{0}'")]
    UnexpectedToken(String),
    #[error("unknown opcode: '{0}'")]
    UnknownOpcode(String),
}

/// Type alias for Result<T, [AsmError]>.
pub type AsmResult<T> = Result<T, AsmError>;

/// An [AsmError] tied to the source line that caused it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("on line {}: {kind} (in `{raw}`)", .line + 1)]
pub struct AssembleError {
    /// 0-based line number.
    pub line: usize,
    pub raw: String,
    pub kind: AsmError,
}

/// Label name to byte address.
pub type Labels = FxHashMap<String, usize>;

/// A line of source that produces bytes in the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    /// 0-based line number in the original text.
    pub line_number: usize,
    /// Address where this line's encoding begins.
    pub address: usize,
    /// The trimmed line text.
    pub raw: String,
}

/// Output of the preprocessing pass.
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    pub instructions: Vec<SourceLine>,
    pub labels: Labels,
}

/// Byte address to the source line that produced the code there.
pub type DebugInfo = BTreeMap<usize, SourceLine>;

/// A successfully assembled program.
#[derive(Debug, Clone)]
pub struct Target {
    /// The binary image, magic tag included.
    pub exe: Vec<u8>,
    pub pdb: DebugInfo,
}

/// A line split into its opcode and arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub opcode: String,
    pub args: Vec<String>,
}

/// Every opcode the assembler understands. The ALU and compare families carry the
/// shared [AluOp] / [CmpOp] so their operation nibble is defined in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mnemonic {
    /// `STOPP`
    Halt,
    /// `SETT`, either from an immediate or from a register.
    Set,
    /// `FINN`
    Locate,
    /// `LAST`
    Load,
    /// `LAGR`
    Store,
    Alu(AluOp),
    /// `LES`
    Read,
    /// `SKRIV`
    Write,
    Cmp(CmpOp),
    /// `HOPP`
    Jump,
    /// `BHOPP`
    CondJump,
    /// `TUR`
    Call,
    /// `RETUR`
    Return,
    /// `NOPE`
    Nop,
    /// `.DATA`, raw bytes rather than an instruction.
    Data,
}

impl Mnemonic {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Halt => "STOPP",
            Self::Set => "SETT",
            Self::Locate => "FINN",
            Self::Load => "LAST",
            Self::Store => "LAGR",
            Self::Alu(op) => op.mnemonic(),
            Self::Read => "LES",
            Self::Write => "SKRIV",
            Self::Cmp(op) => op.mnemonic(),
            Self::Jump => "HOPP",
            Self::CondJump => "BHOPP",
            Self::Call => "TUR",
            Self::Return => "RETUR",
            Self::Nop => "NOPE",
            Self::Data => DATA_DIRECTIVE,
        }
    }
}
