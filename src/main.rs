use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{ensure, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use tokio::{runtime::Builder, time::interval};

use slede8::{
    asm::{assemble, disasm::disassemble, DebugInfo},
    emu::{
        debugger::{describe, Debugger},
        emulator::Emulator,
        EmuError, DEFAULT_MAX_TICKS,
    },
    plat::MAGIC,
};

#[derive(Parser, Debug)]
#[command(
    name = "slede8",
    version,
    about = "Assembler, emulator and debugger for the SLEDE8 machine"
)]
struct Cli {
    /// More logging; repeat for per-instruction tracing.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Only log warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Assemble a source file into a binary image.
    Asm {
        source: PathBuf,
        /// Defaults to the source path with an `s8` extension.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run a program and print what it writes.
    Run {
        #[command(flatten)]
        exec: ExecArgs,
        /// Print the output as hex bytes instead of raw.
        #[arg(long)]
        hex: bool,
    },
    /// Run a program, printing the machine state before every instruction.
    Trace {
        #[command(flatten)]
        exec: ExecArgs,
        /// Execute at most this many instructions per second.
        #[arg(long)]
        hz: Option<f64>,
    },
    /// Step through a program interactively.
    Debug {
        #[command(flatten)]
        exec: ExecArgs,
    },
    /// List the instructions of a program.
    Disasm { program: PathBuf },
}

#[derive(Args, Debug)]
struct ExecArgs {
    /// A source file, or a binary image starting with the `.SLEDE8` tag.
    program: PathBuf,
    /// Input bytes, given as a string.
    #[arg(long, conflicts_with = "input_file")]
    input: Option<String>,
    /// Input bytes, read from a file.
    #[arg(long)]
    input_file: Option<PathBuf>,
    #[arg(long, default_value_t = DEFAULT_MAX_TICKS)]
    max_ticks: usize,
}

impl ExecArgs {
    fn stdin(&self) -> Result<Vec<u8>> {
        match (&self.input, &self.input_file) {
            (Some(input), _) => Ok(input.as_bytes().to_vec()),
            (None, Some(path)) => {
                fs::read(path).with_context(|| format!("failed to read {}", path.display()))
            }
            (None, None) => Ok(vec![]),
        }
    }
}

/// A binary image, with its debug map when it was assembled from source.
struct Program {
    exe: Vec<u8>,
    pdb: Option<DebugInfo>,
}

fn load_program(path: &Path) -> Result<Program> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    if bytes.starts_with(MAGIC) {
        log::debug!("{} is a binary image", path.display());
        return Ok(Program {
            exe: bytes,
            pdb: None,
        });
    }
    let source = String::from_utf8(bytes)
        .with_context(|| format!("{} is neither an image nor UTF-8 source", path.display()))?;
    let target =
        assemble(&source).with_context(|| format!("failed to assemble {}", path.display()))?;
    Ok(Program {
        exe: target.exe,
        pdb: Some(target.pdb),
    })
}

fn init_logger(cli: &Cli) -> Result<()> {
    let level = match (cli.quiet, cli.verbose) {
        (true, _) => simplelog::LevelFilter::Warn,
        (false, 0) => simplelog::LevelFilter::Info,
        (false, 1) => simplelog::LevelFilter::Debug,
        (false, _) => simplelog::LevelFilter::Trace,
    };
    simplelog::TermLogger::init(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    )?;
    Ok(())
}

fn report(err: &EmuError, pdb: Option<&DebugInfo>) {
    if let Some(line) = err.pc().and_then(|pc| pdb?.get(&pc)) {
        log::error!("line {}: {}", line.line_number + 1, line.raw);
    }
}

fn asm(source: &Path, output: Option<PathBuf>) -> Result<()> {
    let text = fs::read_to_string(source)
        .with_context(|| format!("failed to read {}", source.display()))?;
    let target =
        assemble(&text).with_context(|| format!("failed to assemble {}", source.display()))?;
    let output = output.unwrap_or_else(|| source.with_extension("s8"));
    fs::write(&output, &target.exe)
        .with_context(|| format!("failed to write {}", output.display()))?;
    log::info!("wrote {} bytes to {}", target.exe.len(), output.display());
    Ok(())
}

fn run(exec: &ExecArgs, hex: bool) -> Result<()> {
    let program = load_program(&exec.program)?;
    let stdin = exec.stdin()?;
    let emu = Emulator::new(&program.exe, &stdin)?.max_ticks(exec.max_ticks);
    let state = emu.run_to_end().map_err(|e| {
        report(&e, program.pdb.as_ref());
        e
    })?;
    let mut stdout = io::stdout().lock();
    if hex {
        writeln!(stdout, "{:02x?}", state.stdout)?;
    } else {
        stdout.write_all(&state.stdout)?;
    }
    stdout.flush()?;
    log::debug!("halted at pc={:#05x}", state.pc);
    Ok(())
}

/// The time between two instructions at `hz` instructions per second.
fn clock_period(hz: f64) -> Result<Duration> {
    ensure!(hz.is_finite() && hz > 0.0, "clock rate must be positive, got {hz}");
    let period = Duration::try_from_secs_f64(hz.recip())
        .with_context(|| format!("clock rate {hz} is too slow"))?;
    ensure!(!period.is_zero(), "clock rate {hz} is too fast");
    Ok(period)
}

fn trace(exec: &ExecArgs, hz: Option<f64>) -> Result<()> {
    let program = load_program(&exec.program)?;
    let stdin = exec.stdin()?;
    let mut emu = Emulator::new(&program.exe, &stdin)?.max_ticks(exec.max_ticks);

    let rt = Builder::new_current_thread().enable_time().build()?;
    let mut clock = match hz {
        Some(hz) => {
            let period = clock_period(hz)?;
            Some(rt.block_on(async { interval(period) }))
        }
        None => None,
    };

    for step in emu.by_ref() {
        if let Some(clock) = clock.as_mut() {
            // snap!
            rt.block_on(clock.tick());
        }
        let state = step.map_err(|e| {
            report(&e, program.pdb.as_ref());
            e
        })?;
        println!("{}", describe(&state, program.pdb.as_ref()));
        println!(
            "    regs={:02x?} in={} out={:02x?} stack={}",
            state.registers.values(),
            state.input_ptr,
            state.stdout,
            state.backtrace.len()
        );
    }
    if let Some(state) = emu.final_state() {
        println!(
            "halted at pc={:#05x} after {} ticks, output {:02x?}",
            state.pc,
            emu.ticks(),
            state.stdout
        );
    }
    Ok(())
}

fn debug(exec: &ExecArgs) -> Result<()> {
    let program = load_program(&exec.program)?;
    let stdin = exec.stdin()?;
    let mut emu = Emulator::new(&program.exe, &stdin)?.max_ticks(exec.max_ticks);
    Debugger::new(&mut emu, program.pdb.as_ref()).repl()
}

fn disasm(path: &Path) -> Result<()> {
    let program = load_program(path)?;
    let code = program
        .exe
        .strip_prefix(MAGIC.as_slice())
        .ok_or(EmuError::UnsupportedFormat)?;
    for line in disassemble(code, program.pdb.as_ref()) {
        println!("{line}");
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(&cli)?;

    match &cli.command {
        Command::Asm { source, output } => asm(source, output.clone()),
        Command::Run { exec, hex } => run(exec, *hex),
        Command::Trace { exec, hz } => trace(exec, *hz),
        Command::Debug { exec } => debug(exec),
        Command::Disasm { program } => disasm(program),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_period() {
        assert_eq!(clock_period(1.0).unwrap(), Duration::from_secs(1));
        assert_eq!(clock_period(4.0).unwrap(), Duration::from_millis(250));
        assert_eq!(clock_period(1e9).unwrap(), Duration::from_nanos(1));
    }

    #[test]
    fn test_clock_period_out_of_range() {
        for hz in [0.0, -1.0, f64::NAN, f64::INFINITY, 1e300, 1e-30] {
            assert!(clock_period(hz).is_err(), "{hz}");
        }
    }
}
