//! Common platform code between SLEDE8's assembler and emulator.
//!
//! Every instruction is a little-endian 16-bit word. The low nibble is the
//! [operation class][OpClass]; the remaining 12 bits are interpreted per class as
//! either an operation nibble plus two register nibbles, a register nibble plus
//! an 8-bit immediate, or a 12-bit address.

use std::fmt;

use thiserror::Error;

/// The tag every SLEDE8 binary image starts with.
pub const MAGIC: &[u8; 7] = b".SLEDE8";

/// Size of the flat address space, in bytes. Also the maximum size of a binary image.
pub const MEMORY_SIZE: usize = 4096;

/// Size of a single instruction word, in bytes.
pub const WORD_SIZE: usize = 2;

/// An error for the core platform of SLEDE8.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformError {
    #[error("invalid register index {0}")]
    InvalidRegister(u8),
    #[error("invalid operation class {0:#x}")]
    InvalidClass(u8),
    #[error("invalid operation {op:#x} for operation class {class:#x}")]
    InvalidOperation { class: u8, op: u8 },
}

/// Type alias for Result<T, [PlatformError]>.
pub type PResult<T> = Result<T, PlatformError>;

/// One of the sixteen 8-bit general purpose registers, `r0` - `r15`.
///
/// `r0` and `r1` double as the low and high half of the address pair used by
/// [`Instruction::Locate`], [`Instruction::Load`] and [`Instruction::Store`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Register(u8);

impl Register {
    /// Number of registers in the machine.
    pub const COUNT: usize = 16;
    /// Low byte of the address pair.
    pub const R0: Self = Self(0);
    /// High nibble of the address pair.
    pub const R1: Self = Self(1);

    /// Builds a register from the low 4 bits of `nibble`. Always valid.
    pub const fn from_nibble(nibble: u8) -> Self {
        Self(nibble & 0xf)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub const fn nibble(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Register {
    type Error = PlatformError;

    fn try_from(value: u8) -> PResult<Self> {
        if (value as usize) < Self::COUNT {
            Ok(Self(value))
        } else {
            Err(PlatformError::InvalidRegister(value))
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// The instruction families selected by the low nibble of an instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpClass {
    /// Stops the machine.
    Halt = 0x0,
    /// `regA <- imm8`
    Set = 0x1,
    /// `regA <- regB`
    Copy = 0x2,
    /// `r1:r0 <- addr12`
    Locate = 0x3,
    /// Load or store through the `r1:r0` address pair.
    Memory = 0x4,
    /// `regA <- regA (op) regB`, see [AluOp].
    Alu = 0x5,
    /// Read one input byte or write one output byte.
    Io = 0x6,
    /// `flag <- regA (op) regB`, see [CmpOp].
    Cmp = 0x7,
    /// `pc <- addr12`
    Jump = 0x8,
    /// `pc <- addr12` if the flag is set.
    CondJump = 0x9,
    /// Push the return address and jump.
    Call = 0xa,
    /// Pop the return address and jump back.
    Return = 0xb,
    /// Does nothing.
    Nop = 0xc,
}

impl TryFrom<u8> for OpClass {
    type Error = PlatformError;

    fn try_from(value: u8) -> PResult<Self> {
        match value {
            0x0 => Ok(Self::Halt),
            0x1 => Ok(Self::Set),
            0x2 => Ok(Self::Copy),
            0x3 => Ok(Self::Locate),
            0x4 => Ok(Self::Memory),
            0x5 => Ok(Self::Alu),
            0x6 => Ok(Self::Io),
            0x7 => Ok(Self::Cmp),
            0x8 => Ok(Self::Jump),
            0x9 => Ok(Self::CondJump),
            0xa => Ok(Self::Call),
            0xb => Ok(Self::Return),
            0xc => Ok(Self::Nop),
            _ => Err(PlatformError::InvalidClass(value)),
        }
    }
}

/// ALU sub-operations. The discriminant is the operation nibble of an [OpClass::Alu] word,
/// shared by the assembler and the emulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AluOp {
    And = 0,
    Or = 1,
    Xor = 2,
    Shl = 3,
    Shr = 4,
    Add = 5,
    Sub = 6,
}

impl AluOp {
    pub const ALL: [Self; 7] = [
        Self::And,
        Self::Or,
        Self::Xor,
        Self::Shl,
        Self::Shr,
        Self::Add,
        Self::Sub,
    ];

    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::And => "OG",
            Self::Or => "ELLER",
            Self::Xor => "XELLER",
            Self::Shl => "VSKIFT",
            Self::Shr => "HSKIFT",
            Self::Add => "PLUSS",
            Self::Sub => "MINUS",
        }
    }
}

impl TryFrom<u8> for AluOp {
    type Error = PlatformError;

    fn try_from(value: u8) -> PResult<Self> {
        Self::ALL
            .get(value as usize)
            .copied()
            .ok_or(PlatformError::InvalidOperation {
                class: OpClass::Alu as u8,
                op: value,
            })
    }
}

/// Compare sub-operations. The discriminant is the operation nibble of an [OpClass::Cmp] word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CmpOp {
    Eq = 0,
    Ne = 1,
    Lt = 2,
    Le = 3,
    Gt = 4,
    Ge = 5,
}

impl CmpOp {
    pub const ALL: [Self; 6] = [Self::Eq, Self::Ne, Self::Lt, Self::Le, Self::Gt, Self::Ge];

    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Eq => "LIK",
            Self::Ne => "ULIK",
            Self::Lt => "ME",
            Self::Le => "MEL",
            Self::Gt => "SE",
            Self::Ge => "SEL",
        }
    }
}

impl TryFrom<u8> for CmpOp {
    type Error = PlatformError;

    fn try_from(value: u8) -> PResult<Self> {
        Self::ALL
            .get(value as usize)
            .copied()
            .ok_or(PlatformError::InvalidOperation {
                class: OpClass::Cmp as u8,
                op: value,
            })
    }
}

/// Splits a 16-bit value into its little-endian byte pair.
pub const fn word(value: u16) -> [u8; 2] {
    value.to_le_bytes()
}

/// Packs four nibbles, lowest first.
pub const fn nibs(n1: u8, n2: u8, n3: u8, n4: u8) -> [u8; 2] {
    word(
        (n1 & 0xf) as u16
            | ((n2 & 0xf) as u16) << 4
            | ((n3 & 0xf) as u16) << 8
            | ((n4 & 0xf) as u16) << 12,
    )
}

/// Packs two nibbles followed by a byte.
pub const fn nibs_byte(n1: u8, n2: u8, byte: u8) -> [u8; 2] {
    word((n1 & 0xf) as u16 | ((n2 & 0xf) as u16) << 4 | (byte as u16) << 8)
}

/// Packs a nibble followed by a 12-bit value.
pub const fn nib_val(n1: u8, val: u16) -> [u8; 2] {
    word((n1 & 0xf) as u16 | (val & 0xfff) << 4)
}

/// The raw fields of an instruction word, before interpretation by class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fields {
    /// Bits 0-3.
    pub class: u8,
    /// Bits 4-7.
    pub operation: u8,
    /// Bits 4-15.
    pub address: u16,
    /// Bits 8-15.
    pub value: u8,
    /// Bits 8-11.
    pub arg1: u8,
    /// Bits 12-15.
    pub arg2: u8,
}

impl Fields {
    pub const fn from_word(word: u16) -> Self {
        Self {
            class: (word & 0xf) as u8,
            operation: ((word >> 4) & 0xf) as u8,
            address: word >> 4,
            value: (word >> 8) as u8,
            arg1: ((word >> 8) & 0xf) as u8,
            arg2: ((word >> 12) & 0xf) as u8,
        }
    }
}

/// A decoded SLEDE8 instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instruction {
    /// `STOPP`
    Halt,
    /// `SETT regA, imm8`
    Set(Register, u8),
    /// `SETT regA, regB`
    Copy(Register, Register),
    /// `FINN addr12`
    Locate(u16),
    /// `LAST regA`: `regA <- mem[r1:r0]`
    Load(Register),
    /// `LAGR regA`: `mem[r1:r0] <- regA`
    Store(Register),
    /// `OG`, `ELLER`, ... `regA, regB`
    Alu(AluOp, Register, Register),
    /// `LES regA`
    Read(Register),
    /// `SKRIV regA`
    Write(Register),
    /// `LIK`, `ULIK`, ... `regA, regB`
    Cmp(CmpOp, Register, Register),
    /// `HOPP addr12`
    Jump(u16),
    /// `BHOPP addr12`
    CondJump(u16),
    /// `TUR addr12`
    Call(u16),
    /// `RETUR`
    Return,
    /// `NOPE`
    Nop,
}

impl Instruction {
    pub const fn class(self) -> OpClass {
        match self {
            Self::Halt => OpClass::Halt,
            Self::Set(..) => OpClass::Set,
            Self::Copy(..) => OpClass::Copy,
            Self::Locate(_) => OpClass::Locate,
            Self::Load(_) | Self::Store(_) => OpClass::Memory,
            Self::Alu(..) => OpClass::Alu,
            Self::Read(_) | Self::Write(_) => OpClass::Io,
            Self::Cmp(..) => OpClass::Cmp,
            Self::Jump(_) => OpClass::Jump,
            Self::CondJump(_) => OpClass::CondJump,
            Self::Call(_) => OpClass::Call,
            Self::Return => OpClass::Return,
            Self::Nop => OpClass::Nop,
        }
    }

    /// Generates the corresponding little-endian machine-code word for this instruction.
    /// Addresses are truncated to 12 bits.
    pub const fn to_bytes(self) -> [u8; 2] {
        let class = self.class() as u8;
        match self {
            Self::Halt | Self::Return | Self::Nop => word(class as u16),
            Self::Set(a, value) => nibs_byte(class, a.nibble(), value),
            Self::Copy(a, b) => nibs_byte(class, a.nibble(), b.nibble()),
            Self::Locate(addr) | Self::Jump(addr) | Self::CondJump(addr) | Self::Call(addr) => {
                nib_val(class, addr)
            }
            Self::Load(a) | Self::Read(a) => nibs(class, 0, a.nibble(), 0),
            Self::Store(a) | Self::Write(a) => nibs(class, 1, a.nibble(), 0),
            Self::Alu(op, a, b) => nibs(class, op as u8, a.nibble(), b.nibble()),
            Self::Cmp(op, a, b) => nibs(class, op as u8, a.nibble(), b.nibble()),
        }
    }

    /// Decodes an instruction word.
    ///
    /// # Errors
    ///
    /// This function will return an error if the operation class is above `0xc`, or if the
    /// operation nibble of a memory, ALU, I/O or compare word is undefined.
    pub fn from_word(word: u16) -> PResult<Self> {
        let f = Fields::from_word(word);
        let a = Register::from_nibble(f.arg1);
        let b = Register::from_nibble(f.arg2);
        let bad_op = |class: OpClass| PlatformError::InvalidOperation {
            class: class as u8,
            op: f.operation,
        };
        let instr = match OpClass::try_from(f.class)? {
            OpClass::Halt => Self::Halt,
            OpClass::Set => Self::Set(Register::from_nibble(f.operation), f.value),
            OpClass::Copy => Self::Copy(Register::from_nibble(f.operation), a),
            OpClass::Locate => Self::Locate(f.address),
            OpClass::Memory => match f.operation {
                0 => Self::Load(a),
                1 => Self::Store(a),
                _ => return Err(bad_op(OpClass::Memory)),
            },
            OpClass::Alu => Self::Alu(AluOp::try_from(f.operation)?, a, b),
            OpClass::Io => match f.operation {
                0 => Self::Read(a),
                1 => Self::Write(a),
                _ => return Err(bad_op(OpClass::Io)),
            },
            OpClass::Cmp => Self::Cmp(CmpOp::try_from(f.operation)?, a, b),
            OpClass::Jump => Self::Jump(f.address),
            OpClass::CondJump => Self::CondJump(f.address),
            OpClass::Call => Self::Call(f.address),
            OpClass::Return => Self::Return,
            OpClass::Nop => Self::Nop,
        };
        Ok(instr)
    }

    /// Decodes a little-endian instruction word.
    ///
    /// # Errors
    ///
    /// See [`Instruction::from_word`].
    pub fn from_bytes(bytes: [u8; 2]) -> PResult<Self> {
        Self::from_word(u16::from_le_bytes(bytes))
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Halt => write!(f, "STOPP"),
            Self::Set(a, value) => write!(f, "SETT {a}, {value}"),
            Self::Copy(a, b) => write!(f, "SETT {a}, {b}"),
            Self::Locate(addr) => write!(f, "FINN {addr:#05x}"),
            Self::Load(a) => write!(f, "LAST {a}"),
            Self::Store(a) => write!(f, "LAGR {a}"),
            Self::Alu(op, a, b) => write!(f, "{} {a}, {b}", op.mnemonic()),
            Self::Read(a) => write!(f, "LES {a}"),
            Self::Write(a) => write!(f, "SKRIV {a}"),
            Self::Cmp(op, a, b) => write!(f, "{} {a}, {b}", op.mnemonic()),
            Self::Jump(addr) => write!(f, "HOPP {addr:#05x}"),
            Self::CondJump(addr) => write!(f, "BHOPP {addr:#05x}"),
            Self::Call(addr) => write!(f, "TUR {addr:#05x}"),
            Self::Return => write!(f, "RETUR"),
            Self::Nop => write!(f, "NOPE"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_boundaries() {
        assert_eq!(word(0x0), [0x00, 0x00]);
        assert_eq!(word(0xf), [0x0f, 0x00]);
        assert_eq!(word(0xff), [0xff, 0x00]);
        assert_eq!(word(0xfff), [0xff, 0x0f]);
        assert_eq!(word(0xffff), [0xff, 0xff]);
    }

    #[test]
    fn test_nibs() {
        assert_eq!(nibs(0, 0, 0, 0), [0x00, 0x00]);
        assert_eq!(nibs(0xf, 0xf, 0xf, 0xf), [0xff, 0xff]);
        assert_eq!(nibs(0x5, 0x6, 0x3, 0xf), [0x65, 0xf3]);
        assert_eq!(nibs(0x1, 0x0, 0x0, 0x0), [0x01, 0x00]);
        assert_eq!(nibs(0x0, 0x0, 0x0, 0x1), [0x00, 0x10]);
    }

    #[test]
    fn test_nibs_round_trip() {
        for a in 0..=0xf {
            for b in 0..=0xf {
                for c in 0..=0xf {
                    for d in 0..=0xf {
                        let f = Fields::from_word(u16::from_le_bytes(nibs(a, b, c, d)));
                        assert_eq!((f.class, f.operation, f.arg1, f.arg2), (a, b, c, d));
                    }
                }
            }
        }
    }

    #[test]
    fn test_nibs_byte() {
        assert_eq!(nibs_byte(0x1, 0x0, 0x00), [0x01, 0x00]);
        assert_eq!(nibs_byte(0x1, 0xf, 0xff), [0xf1, 0xff]);
        assert_eq!(nibs_byte(0x2, 0x3, 0x04), [0x32, 0x04]);
        let f = Fields::from_word(u16::from_le_bytes(nibs_byte(0x1, 0xa, 0xbc)));
        assert_eq!((f.class, f.operation, f.value), (0x1, 0xa, 0xbc));
    }

    #[test]
    fn test_nib_val() {
        assert_eq!(nib_val(0x3, 0x000), [0x03, 0x00]);
        assert_eq!(nib_val(0x8, 0x00f), [0xf8, 0x00]);
        assert_eq!(nib_val(0x9, 0x0ff), [0xf9, 0x0f]);
        assert_eq!(nib_val(0xa, 0xfff), [0xfa, 0xff]);
        // anything above 12 bits is dropped
        assert_eq!(nib_val(0xa, 0x1fff), [0xfa, 0xff]);
        let f = Fields::from_word(u16::from_le_bytes(nib_val(0x8, 0xabc)));
        assert_eq!((f.class, f.address), (0x8, 0xabc));
    }

    #[test]
    fn test_register_range() {
        assert_eq!(Register::try_from(15).unwrap().index(), 15);
        assert_eq!(
            Register::try_from(16),
            Err(PlatformError::InvalidRegister(16))
        );
        assert_eq!(Register::from_nibble(0x11), Register::R1);
    }

    #[test]
    fn test_sub_op_numbering() {
        for (i, op) in AluOp::ALL.iter().enumerate() {
            assert_eq!(*op as usize, i);
            assert_eq!(AluOp::try_from(i as u8), Ok(*op));
        }
        for (i, op) in CmpOp::ALL.iter().enumerate() {
            assert_eq!(*op as usize, i);
            assert_eq!(CmpOp::try_from(i as u8), Ok(*op));
        }
        assert!(AluOp::try_from(7).is_err());
        assert!(CmpOp::try_from(6).is_err());
    }

    #[test]
    fn test_instruction_encode() {
        let r = |n| Register::try_from(n).unwrap();
        assert_eq!(Instruction::Halt.to_bytes(), [0x00, 0x00]);
        assert_eq!(Instruction::Set(r(0), 5).to_bytes(), [0x01, 0x05]);
        assert_eq!(Instruction::Copy(r(3), r(4)).to_bytes(), [0x32, 0x04]);
        assert_eq!(Instruction::Locate(0x123).to_bytes(), [0x33, 0x12]);
        assert_eq!(Instruction::Store(r(2)).to_bytes(), [0x14, 0x02]);
        assert_eq!(
            Instruction::Alu(AluOp::Sub, r(1), r(2)).to_bytes(),
            [0x65, 0x21]
        );
        assert_eq!(Instruction::Write(r(7)).to_bytes(), [0x16, 0x07]);
        assert_eq!(
            Instruction::Cmp(CmpOp::Ge, r(15), r(0)).to_bytes(),
            [0x57, 0x0f]
        );
        assert_eq!(Instruction::Call(0x010).to_bytes(), [0x0a, 0x01]);
        assert_eq!(Instruction::Return.to_bytes(), [0x0b, 0x00]);
        assert_eq!(Instruction::Nop.to_bytes(), [0x0c, 0x00]);
    }

    #[test]
    fn test_instruction_decode() {
        let r = |n| Register::try_from(n).unwrap();
        assert_eq!(
            Instruction::from_bytes([0x65, 0x21]),
            Ok(Instruction::Alu(AluOp::Sub, r(1), r(2)))
        );
        assert_eq!(
            Instruction::from_bytes([0xf9, 0x0f]),
            Ok(Instruction::CondJump(0x0ff))
        );
        assert_eq!(
            Instruction::from_bytes([0x24, 0x00]),
            Err(PlatformError::InvalidOperation { class: 0x4, op: 0x2 })
        );
        assert_eq!(
            Instruction::from_bytes([0x75, 0x00]),
            Err(PlatformError::InvalidOperation { class: 0x5, op: 0x7 })
        );
        assert_eq!(
            Instruction::from_bytes([0x0d, 0x00]),
            Err(PlatformError::InvalidClass(0xd))
        );
    }

    #[test]
    fn test_instruction_display() {
        let r = |n| Register::try_from(n).unwrap();
        assert_eq!(Instruction::Set(r(0), 5).to_string(), "SETT r0, 5");
        assert_eq!(Instruction::Copy(r(1), r(12)).to_string(), "SETT r1, r12");
        assert_eq!(
            Instruction::Alu(AluOp::Xor, r(2), r(3)).to_string(),
            "XELLER r2, r3"
        );
        assert_eq!(Instruction::Jump(0x2a).to_string(), "HOPP 0x02a");
        assert_eq!(Instruction::Halt.to_string(), "STOPP");
    }
}
