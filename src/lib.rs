#![cfg_attr(doc, warn(missing_docs))]
//! Assembler, emulator and debugger for SLEDE8, a small 16-bit register machine with
//! 8-bit registers and 4096 bytes of memory.
//!
//! ```
//! use slede8::{asm::assemble, emu::emulator::Emulator};
//!
//! let target = assemble("LES r0\nSKRIV r0\nSTOPP").unwrap();
//! let state = Emulator::new(&target.exe, b"!").unwrap().run_to_end().unwrap();
//! assert_eq!(state.stdout, b"!");
//! ```

pub mod asm;
pub mod emu;
pub mod plat;
