use std::cell::RefCell;

use anyhow::{anyhow, Result};
use easy_repl::{command, repl::LoopStatus, CommandStatus, Repl};

use crate::{
    asm::{lexer::parse_literal, DebugInfo},
    plat::MEMORY_SIZE,
};

use super::emulator::{EmuState, Emulator, MachineState};

/// Interactive single-stepping over an [Emulator].
pub struct Debugger<'b, 'a> {
    pub emu: RefCell<&'b mut Emulator<'a>>,
    pdb: Option<&'b DebugInfo>,
}

impl<'b, 'a> Debugger<'b, 'a> {
    /// Wraps an emulator. With a debug map, instructions are shown next to their source line.
    pub fn new(emu: &'b mut Emulator<'a>, pdb: Option<&'b DebugInfo>) -> Self {
        Self {
            emu: RefCell::new(emu),
            pdb,
        }
    }

    /// One line describing the instruction at the program counter.
    pub fn describe(&self, state: &MachineState) -> String {
        describe(state, self.pdb)
    }

    /// Pulls the next snapshot, reporting how the program ended if it did.
    fn step(&self) -> bool {
        let mut emu = self.emu.borrow_mut();
        match emu.next() {
            Some(Ok(_)) => true,
            Some(Err(e)) => {
                eprintln!("error: {e}");
                if let Some(line) = e.pc().and_then(|pc| self.pdb?.get(&pc)) {
                    eprintln!("  at line {}: {}", line.line_number + 1, line.raw);
                }
                false
            }
            None => {
                let state = emu.machine();
                eprintln!(
                    "program halted at pc={:#05x} after {} ticks",
                    state.pc,
                    emu.ticks()
                );
                false
            }
        }
    }

    pub fn repl(&self) -> Result<()> {
        let mut repl = Repl::builder()
            .description("SLEDE8 Debug REPL")
            .add(
                "s",
                command! {
                    "Step one instruction",
                    () => || {
                        self.step();
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "c",
                command! {
                    "Continue until the program halts or faults",
                    () => || {
                        while self.step() {}
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "pr",
                command! {
                    "Print the value of all registers",
                    () => || {
                        let emu = self.emu.borrow();
                        let state = emu.machine();
                        for (i, value) in state.registers.values().iter().enumerate() {
                            eprintln!("r{:<2}={:#04x} ({})", i, value, value);
                        }
                        eprintln!("pc={:#05x}", state.pc);
                        eprintln!("flag={}", state.flag);
                        eprintln!("ticks={}", emu.ticks());
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "peek",
                command! {
                    "Peek a value from memory",
                    (addr: String) => |addr: String| {
                        let emu = self.emu.borrow();
                        let parsed = parse_literal(&addr)
                            .and_then(|a| usize::try_from(a).ok())
                            .filter(|&a| a < MEMORY_SIZE)
                            .ok_or_else(|| anyhow!("not an address: {}", addr))?;
                        let val = emu.machine().ram.read(parsed);
                        eprintln!("{:#05x}={:#04x}", parsed, val);
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "bt",
                command! {
                    "Print the call stack",
                    () => || {
                        let emu = self.emu.borrow();
                        for (depth, ret) in emu.machine().backtrace.iter().rev().enumerate() {
                            // the call sits right before its return address
                            let site = ret.saturating_sub(2);
                            match self.pdb.and_then(|pdb| pdb.get(&site)) {
                                Some(line) => eprintln!(
                                    "#{depth} {:#05x}  line {}: {}",
                                    site,
                                    line.line_number + 1,
                                    line.raw
                                ),
                                None => eprintln!("#{depth} {:#05x}", site),
                            }
                        }
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "out",
                command! {
                    "Print everything written so far",
                    () => || {
                        let emu = self.emu.borrow();
                        let stdout = &emu.machine().stdout;
                        eprintln!("{:02x?}", stdout);
                        eprintln!("{}", String::from_utf8_lossy(stdout));
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "halt",
                command! {
                    "Stop debugging",
                    () => || {
                        Ok(CommandStatus::Quit)
                    }
                },
            )
            .build()?;

        eprintln!("SLEDE8 Debug REPL");
        // stop on the first instruction
        if !self.step() {
            return Ok(());
        }
        'repl: loop {
            eprintln!();
            {
                let emu = self.emu.borrow();
                if emu.state() != EmuState::Continue {
                    break 'repl;
                }
                eprintln!("Next instruction:\n{}", self.describe(emu.machine()));
            }

            let status = repl.next()?;
            if let LoopStatus::Break = status {
                break 'repl;
            }
        }
        Ok(())
    }
}

/// Formats the instruction at `state.pc`, with its source line when `pdb` knows it.
pub fn describe(state: &MachineState, pdb: Option<&DebugInfo>) -> String {
    let word = state.ram.read_word(state.pc);
    let instr = match state.current_instruction() {
        Some(instr) => instr.to_string(),
        None => "<invalid>".to_owned(),
    };
    let mut out = format!("[pc={:#05x}] {:04x} --> {}", state.pc, word, instr);
    if let Some(line) = pdb.and_then(|pdb| pdb.get(&state.pc)) {
        out.push_str(&format!("    ; line {}: {}", line.line_number + 1, line.raw));
    }
    if state.flag {
        out.push_str("  [flag]");
    }
    out
}
