//! The emulator/debugger module for SLEDE8.

use thiserror::Error;

use crate::plat::MEMORY_SIZE;

pub mod alu;
pub mod debugger;
pub mod emulator;
pub mod ram;
pub mod registers;

/// Maximum number of return addresses on the call stack.
pub const RECURSION_LIMIT: usize = 1000;

/// Default number of instructions a program may execute.
pub const DEFAULT_MAX_TICKS: usize = 1000;

/// An error raised while loading or executing a program. All of them end the execution.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EmuError {
    #[error("program of {size} bytes does not fit in {} bytes of memory", MEMORY_SIZE)]
    OversizedProgram { size: usize },
    #[error("unsupported binary format (missing .SLEDE8 tag)")]
    UnsupportedFormat,
    #[error("segmentation fault at pc={pc:#05x}")]
    SegmentationFault { pc: usize },
    #[error("more than {limit} nested calls at pc={pc:#05x}")]
    RecursionLimit { limit: usize, pc: usize },
    #[error("read past end of input at pc={pc:#05x}")]
    ReadPastEnd { pc: usize },
    #[error("resources exhausted after {max_ticks} ticks")]
    ResourcesExhausted { max_ticks: usize },
}

/// Type alias for Result<T, [EmuError]>.
pub type EmuResult<T> = Result<T, EmuError>;

impl EmuError {
    /// Address of the instruction that raised the error, if one did.
    pub fn pc(&self) -> Option<usize> {
        match self {
            Self::SegmentationFault { pc }
            | Self::RecursionLimit { pc, .. }
            | Self::ReadPastEnd { pc } => Some(*pc),
            Self::OversizedProgram { .. }
            | Self::UnsupportedFormat
            | Self::ResourcesExhausted { .. } => None,
        }
    }
}
