use crate::plat::{Instruction, MEMORY_SIZE, WORD_SIZE};

use super::{
    ram::Ram, registers::EmuRegisters, EmuError, EmuResult, DEFAULT_MAX_TICKS, RECURSION_LIMIT,
};

/// A full copy of the machine, as observed between two instructions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineState {
    /// Byte offset of the next instruction.
    pub pc: usize,
    /// Set by the compare instructions, read by `BHOPP`.
    pub flag: bool,
    pub registers: EmuRegisters,
    pub ram: Ram,
    /// Every byte written by `SKRIV`, in order.
    pub stdout: Vec<u8>,
    /// Index of the next input byte `LES` will consume.
    pub input_ptr: usize,
    /// Return addresses pushed by `TUR`, innermost last.
    pub backtrace: Vec<usize>,
}

impl MachineState {
    fn new(ram: Ram) -> Self {
        Self {
            pc: 0,
            flag: false,
            registers: EmuRegisters::default(),
            ram,
            stdout: Vec::new(),
            input_ptr: 0,
            backtrace: Vec::new(),
        }
    }

    /// Decodes the instruction at the program counter without executing it.
    pub fn current_instruction(&self) -> Option<Instruction> {
        Instruction::from_word(self.ram.read_word(self.pc)).ok()
    }
}

/// The emulator's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmuState {
    /// The program may execute more instructions.
    Continue,
    /// The program stopped normally, either on `STOPP` or by running off the end of memory.
    Halt,
    /// The program raised an [EmuError]. Nothing more will execute.
    Fault,
}

/// The main emulation context for SLEDE8.
///
/// An [Emulator] is an [Iterator] over [MachineState] snapshots: each item is the state
/// right before an instruction executes, and pulling the next item executes it. Once the
/// iterator is exhausted, [`final_state`][Emulator::final_state] returns the state the
/// program ended in, unless it ended with an error, which is yielded as the last item.
///
/// ```
/// use slede8::{asm::assemble, emu::emulator::Emulator};
///
/// let target = assemble("SETT r0, 5\nSKRIV r0").unwrap();
/// let mut emu = Emulator::new(&target.exe, &[]).unwrap();
/// let steps = emu.by_ref().collect::<Result<Vec<_>, _>>().unwrap();
/// // the two instructions, then the `STOPP` found in zeroed memory
/// assert_eq!(steps.len(), 3);
/// assert_eq!(emu.final_state().unwrap().stdout, [5]);
/// ```
pub struct Emulator<'a> {
    machine: MachineState,
    stdin: &'a [u8],
    max_ticks: usize,
    ticks: usize,
    state: EmuState,
    /// A snapshot has been handed out and its instruction has not executed yet.
    pending: bool,
}

impl<'a> Emulator<'a> {
    /// Loads a binary image into a new [Emulator] instance, reading input from `stdin`.
    ///
    /// # Errors
    ///
    /// This function will return an error if the image is too large for memory or does not
    /// carry the magic tag.
    pub fn new(program: &[u8], stdin: &'a [u8]) -> EmuResult<Self> {
        let ram = Ram::load(program)?;
        log::debug!("loaded {} bytes of program", program.len());
        Ok(Self {
            machine: MachineState::new(ram),
            stdin,
            max_ticks: DEFAULT_MAX_TICKS,
            ticks: 0,
            state: EmuState::Continue,
            pending: false,
        })
    }

    /// Sets the number of instructions the program may execute before it is stopped.
    pub fn max_ticks(mut self, max_ticks: usize) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    pub fn state(&self) -> EmuState {
        self.state
    }

    pub fn ticks(&self) -> usize {
        self.ticks
    }

    /// The live machine. Between two pulls this equals the last yielded snapshot.
    pub fn machine(&self) -> &MachineState {
        &self.machine
    }

    /// The state the program halted in, once it has halted.
    pub fn final_state(&self) -> Option<&MachineState> {
        match self.state {
            EmuState::Halt => Some(&self.machine),
            EmuState::Continue | EmuState::Fault => None,
        }
    }

    /// Runs the program to completion, discarding the intermediate snapshots.
    ///
    /// # Errors
    ///
    /// This function will return the first error raised by the program.
    pub fn run_to_end(mut self) -> EmuResult<MachineState> {
        for step in self.by_ref() {
            step?;
        }
        Ok(self.machine)
    }

    /// Fetches, decodes and executes the instruction at the program counter.
    fn execute(&mut self) -> EmuResult<()> {
        let m = &mut self.machine;
        let pc = m.pc;
        let word = m.ram.read_word(pc);
        m.pc += WORD_SIZE;

        let instr =
            Instruction::from_word(word).map_err(|_| EmuError::SegmentationFault { pc })?;
        log::trace!(">>> {:#05x}: {}", pc, instr);

        match instr {
            Instruction::Halt => {
                self.state = EmuState::Halt;
            }
            Instruction::Set(a, value) => m.registers.set(a, value),
            Instruction::Copy(a, b) => m.registers.set(a, m.registers.get(b)),
            Instruction::Locate(addr) => m.registers.set_address(addr),
            Instruction::Load(a) => {
                let value = m.ram.read(m.registers.address());
                m.registers.set(a, value);
            }
            Instruction::Store(a) => {
                m.ram.write(m.registers.address(), m.registers.get(a));
            }
            Instruction::Alu(op, a, b) => {
                let result = op.apply(m.registers.get(a), m.registers.get(b));
                m.registers.set(a, result);
            }
            Instruction::Read(a) => {
                let value = *self
                    .stdin
                    .get(m.input_ptr)
                    .ok_or(EmuError::ReadPastEnd { pc })?;
                m.input_ptr += 1;
                m.registers.set(a, value);
            }
            Instruction::Write(a) => m.stdout.push(m.registers.get(a)),
            Instruction::Cmp(op, a, b) => {
                m.flag = op.test(m.registers.get(a), m.registers.get(b));
            }
            Instruction::Jump(addr) => m.pc = usize::from(addr),
            Instruction::CondJump(addr) => {
                if m.flag {
                    m.pc = usize::from(addr);
                }
            }
            Instruction::Call(addr) => {
                if m.backtrace.len() >= RECURSION_LIMIT {
                    return Err(EmuError::RecursionLimit {
                        limit: RECURSION_LIMIT,
                        pc,
                    });
                }
                m.backtrace.push(m.pc);
                m.pc = usize::from(addr);
            }
            Instruction::Return => {
                m.pc = m
                    .backtrace
                    .pop()
                    .ok_or(EmuError::SegmentationFault { pc })?;
            }
            Instruction::Nop => {}
        }
        Ok(())
    }
}

impl<'a> Iterator for Emulator<'a> {
    type Item = EmuResult<MachineState>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state != EmuState::Continue {
            return None;
        }
        if self.pending {
            self.pending = false;
            if let Err(e) = self.execute() {
                log::debug!("program faulted after {} ticks: {}", self.ticks, e);
                self.state = EmuState::Fault;
                return Some(Err(e));
            }
            if self.state == EmuState::Halt {
                log::debug!("program halted after {} ticks", self.ticks);
                return None;
            }
        }
        if self.machine.pc >= MEMORY_SIZE {
            log::debug!("program ran off the end of memory after {} ticks", self.ticks);
            self.state = EmuState::Halt;
            return None;
        }

        self.ticks += 1;
        if self.ticks > self.max_ticks {
            self.state = EmuState::Fault;
            return Some(Err(EmuError::ResourcesExhausted {
                max_ticks: self.max_ticks,
            }));
        }
        self.pending = true;
        Some(Ok(self.machine.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::assemble;

    fn load<'a>(source: &str, stdin: &'a [u8]) -> Emulator<'a> {
        let target = assemble(source).unwrap();
        Emulator::new(&target.exe, stdin).unwrap()
    }

    fn run(source: &str, stdin: &[u8]) -> EmuResult<MachineState> {
        load(source, stdin).run_to_end()
    }

    #[test]
    fn test_halt() {
        let mut emu = load("STOPP", &[]);
        let steps = emu.by_ref().collect::<EmuResult<Vec<_>>>().unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].pc, 0);
        assert_eq!(emu.state(), EmuState::Halt);
        assert_eq!(emu.final_state().unwrap().pc, 2);
        assert_eq!(emu.next(), None);
    }

    #[test]
    fn test_set_and_write() {
        let state = run("SETT r0, 5\nSKRIV r0", &[]).unwrap();
        assert_eq!(state.stdout, [5]);
        assert_eq!(state.registers.get(crate::plat::Register::R0), 5);
    }

    #[test]
    fn test_output_order() {
        let program = "
    SETT r3, 3
    SETT r1, 1
    SETT r2, r3   ; copy
    SKRIV r1
    SKRIV r2
    SKRIV r3
    SKRIV r1
    STOPP
";
        assert_eq!(run(program, &[]).unwrap().stdout, [1, 3, 3, 1]);
    }

    #[test]
    fn test_snapshots_are_taken_before_each_instruction() {
        let mut emu = load("SETT r4, 9\nSKRIV r4\nSTOPP", &[]);
        let steps = emu.by_ref().collect::<EmuResult<Vec<_>>>().unwrap();
        let pcs: Vec<_> = steps.iter().map(|s| s.pc).collect();
        assert_eq!(pcs, [0, 2, 4]);
        assert!(steps[0].stdout.is_empty());
        assert_eq!(steps[0].registers.values()[4], 0);
        assert_eq!(steps[1].registers.values()[4], 9);
        assert_eq!(steps[2].stdout, [9]);
        assert_eq!(emu.ticks(), 3);
    }

    #[test]
    fn test_read_input() {
        let program = "
    LES r0
    LES r1
    PLUSS r0, r1
    SKRIV r0
    STOPP
";
        assert_eq!(run(program, &[40, 2]).unwrap().stdout, [42]);
        assert_eq!(run(program, &[40]), Err(EmuError::ReadPastEnd { pc: 2 }));
    }

    #[test]
    fn test_alu_wraps() {
        let program = "
    SETT r0, 200
    SETT r1, 100
    PLUSS r0, r1
    SKRIV r0
    SETT r2, 1
    SETT r3, 2
    MINUS r2, r3
    SKRIV r2
    SETT r4, 0x81
    SETT r5, 1
    VSKIFT r4, r5
    SKRIV r4
    SETT r6, 0xf0
    SETT r7, 4
    HSKIFT r6, r7
    SKRIV r6
";
        assert_eq!(run(program, &[]).unwrap().stdout, [44, 255, 0x02, 0x0f]);
    }

    #[test]
    fn test_compare_and_branch() {
        // writes 0, 1, 2 then stops
        let program = "
    SETT r0, 0
    SETT r1, 1
    SETT r2, 3
løkke:
    SKRIV r0
    PLUSS r0, r1
    ME r0, r2
    BHOPP løkke
    STOPP
";
        let state = run(program, &[]).unwrap();
        assert_eq!(state.stdout, [0, 1, 2]);
        assert!(!state.flag);
    }

    #[test]
    fn test_memory() {
        let program = "
    FINN tabell
    LAST r2
    SETT r3, 1
    PLUSS r0, r3
    LAST r4
    SKRIV r2
    SKRIV r4
    FINN 0x800
    LAGR r4
    LAST r5
    SKRIV r5
    STOPP
tabell:
    .DATA 0x2a, 7
";
        let state = run(program, &[]).unwrap();
        assert_eq!(state.stdout, [0x2a, 7, 7]);
        assert_eq!(state.ram.read(0x800), 7);
        assert_eq!(state.registers.address(), 0x800);
    }

    #[test]
    fn test_call_and_return() {
        let program = "
    TUR skriv_fem
    TUR skriv_fem
    STOPP
skriv_fem:
    SETT r0, 5
    SKRIV r0
    RETUR
";
        let state = run(program, &[]).unwrap();
        assert_eq!(state.stdout, [5, 5]);
        assert!(state.backtrace.is_empty());
        assert_eq!(state.pc, 6);
    }

    #[test]
    fn test_return_without_call() {
        assert_eq!(
            run("NOPE\nRETUR", &[]),
            Err(EmuError::SegmentationFault { pc: 2 })
        );
    }

    fn nested_calls(depth: usize) -> String {
        let mut program: String = (1..=depth).map(|i| format!("TUR {}\n", i * 2)).collect();
        program.push_str("STOPP\n");
        program
    }

    #[test]
    fn test_recursion_limit() {
        let program = nested_calls(RECURSION_LIMIT);
        let state = load(&program, &[]).max_ticks(5000).run_to_end().unwrap();
        assert_eq!(state.backtrace.len(), RECURSION_LIMIT);

        let program = nested_calls(RECURSION_LIMIT + 1);
        assert_eq!(
            load(&program, &[]).max_ticks(5000).run_to_end(),
            Err(EmuError::RecursionLimit {
                limit: RECURSION_LIMIT,
                pc: RECURSION_LIMIT * 2,
            })
        );
    }

    #[test]
    fn test_tick_budget() {
        // exactly as many instructions as the budget allows
        assert!(load("NOPE\nNOPE\nNOPE\nSTOPP", &[]).max_ticks(4).run_to_end().is_ok());

        let mut emu = load("NOPE\nNOPE\nNOPE\nSTOPP", &[]).max_ticks(3);
        for _ in 0..3 {
            assert!(matches!(emu.next(), Some(Ok(_))));
        }
        assert_eq!(
            emu.next(),
            Some(Err(EmuError::ResourcesExhausted { max_ticks: 3 }))
        );
        assert_eq!(emu.state(), EmuState::Fault);
        assert_eq!(emu.next(), None);
        assert!(emu.final_state().is_none());
    }

    #[test]
    fn test_default_tick_budget() {
        let mut emu = load("evig:\nHOPP evig", &[]);
        let steps = emu.by_ref().take_while(Result::is_ok).count();
        assert_eq!(steps, DEFAULT_MAX_TICKS);
        assert_eq!(emu.ticks(), DEFAULT_MAX_TICKS + 1);
    }

    #[test]
    fn test_run_off_end_of_memory() {
        // plant a `NOPE` in the last word, then jump to it
        let program = "
    FINN 0xffe
    SETT r2, 0x0c
    LAGR r2
    HOPP 0xffe
";
        let mut emu = load(program, &[]);
        let steps = emu.by_ref().collect::<EmuResult<Vec<_>>>().unwrap();
        assert_eq!(steps.last().unwrap().pc, 0xffe);
        assert_eq!(emu.final_state().unwrap().pc, MEMORY_SIZE);
    }

    #[test]
    fn test_undefined_operations() {
        let words = [
            ".DATA 0x24, 0", // memory op 2
            ".DATA 0x75, 0", // ALU op 7
            ".DATA 0x26, 0", // I/O op 2
            ".DATA 0x67, 0", // compare op 6
            ".DATA 0x0d, 0", // class 0xd
        ];
        for data in words {
            assert_eq!(
                run(data, &[]),
                Err(EmuError::SegmentationFault { pc: 0 }),
                "{data}"
            );
        }
    }

    #[test]
    fn test_load_errors() {
        assert_eq!(
            Emulator::new(b"\x00\x00", &[]).err(),
            Some(EmuError::UnsupportedFormat)
        );
        let image = vec![0u8; MEMORY_SIZE + 1];
        assert_eq!(
            Emulator::new(&image, &[]).err(),
            Some(EmuError::OversizedProgram {
                size: MEMORY_SIZE + 1
            })
        );
    }
}
