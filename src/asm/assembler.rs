use crate::plat::{Instruction, Register, MAGIC, WORD_SIZE};

use super::{
    lexer::{classify, parse_literal, parse_register, tokenize, LineKind},
    AsmError, AsmResult, AssembleError, Labels, Mnemonic, SourceLine, SourceMap, Statement,
    Target,
};

/// First pass: classifies every line, assigns byte addresses and collects labels.
///
/// Labels take the address of the next byte emitted after them. Instruction lines
/// advance the address by one word, data directives by one byte per value.
pub fn preprocess(source: &str) -> SourceMap {
    let mut map = SourceMap::default();
    let mut address = 0;
    for (line_number, line) in source.lines().enumerate() {
        let line = line.trim();
        let size = match classify(line) {
            LineKind::Whitespace | LineKind::Comment => continue,
            LineKind::Label(name) => {
                if let Some(old) = map.labels.insert(name.to_owned(), address) {
                    log::warn!(
                        "label {} redefined on line {} ({:#05x} -> {:#05x})",
                        name,
                        line_number + 1,
                        old,
                        address
                    );
                }
                continue;
            }
            LineKind::Data => tokenize(line).args.len(),
            LineKind::Instruction => WORD_SIZE,
        };
        map.instructions.push(SourceLine {
            line_number,
            address,
            raw: line.to_owned(),
        });
        address += size;
    }
    map
}

fn expect_args(mnemonic: Mnemonic, args: &[String], expected: usize) -> AsmResult<&[String]> {
    if args.len() == expected {
        Ok(args)
    } else {
        Err(AsmError::Arity {
            opcode: mnemonic.name().to_owned(),
            expected,
            args: args.to_vec(),
        })
    }
}

fn one_register(mnemonic: Mnemonic, args: &[String]) -> AsmResult<Register> {
    parse_register(&expect_args(mnemonic, args, 1)?[0])
}

fn two_registers(mnemonic: Mnemonic, args: &[String]) -> AsmResult<(Register, Register)> {
    let args = expect_args(mnemonic, args, 2)?;
    Ok((parse_register(&args[0])?, parse_register(&args[1])?))
}

/// Resolves a numeric literal or a label to a 12-bit address.
fn resolve_address(token: &str, labels: &Labels) -> AsmResult<u16> {
    if let Some(value) = parse_literal(token) {
        return Ok(value as u16 & 0xfff);
    }
    labels
        .get(token)
        .map(|&addr| addr as u16 & 0xfff)
        .ok_or_else(|| AsmError::UnexpectedToken(token.to_owned()))
}

fn one_address(mnemonic: Mnemonic, args: &[String], labels: &Labels) -> AsmResult<u16> {
    resolve_address(&expect_args(mnemonic, args, 1)?[0], labels)
}

/// Second pass: encodes a single tokenized line.
///
/// # Errors
///
/// This function will return an error if the opcode is unknown, the argument count is wrong
/// for the opcode, a register argument is invalid, or a value is neither a literal nor a
/// known label.
pub fn translate(stmt: &Statement, labels: &Labels) -> AsmResult<Vec<u8>> {
    let mnemonic = Mnemonic::parse(&stmt.opcode)
        .ok_or_else(|| AsmError::UnknownOpcode(stmt.opcode.clone()))?;
    let args = &stmt.args;
    let instr = match mnemonic {
        Mnemonic::Data => {
            // one byte per value, truncated like any other immediate
            return args
                .iter()
                .map(|arg| {
                    parse_literal(arg)
                        .map(|value| value as u8)
                        .ok_or_else(|| AsmError::UnexpectedToken(arg.clone()))
                })
                .collect();
        }
        Mnemonic::Halt => {
            expect_args(mnemonic, args, 0)?;
            Instruction::Halt
        }
        Mnemonic::Set => {
            let args = expect_args(mnemonic, args, 2)?;
            let reg = parse_register(&args[0])?;
            match parse_literal(&args[1]) {
                Some(value) => Instruction::Set(reg, value as u8),
                None => Instruction::Copy(reg, parse_register(&args[1])?),
            }
        }
        Mnemonic::Locate => Instruction::Locate(one_address(mnemonic, args, labels)?),
        Mnemonic::Load => Instruction::Load(one_register(mnemonic, args)?),
        Mnemonic::Store => Instruction::Store(one_register(mnemonic, args)?),
        Mnemonic::Alu(op) => {
            let (a, b) = two_registers(mnemonic, args)?;
            Instruction::Alu(op, a, b)
        }
        Mnemonic::Read => Instruction::Read(one_register(mnemonic, args)?),
        Mnemonic::Write => Instruction::Write(one_register(mnemonic, args)?),
        Mnemonic::Cmp(op) => {
            let (a, b) = two_registers(mnemonic, args)?;
            Instruction::Cmp(op, a, b)
        }
        Mnemonic::Jump => Instruction::Jump(one_address(mnemonic, args, labels)?),
        Mnemonic::CondJump => Instruction::CondJump(one_address(mnemonic, args, labels)?),
        Mnemonic::Call => Instruction::Call(one_address(mnemonic, args, labels)?),
        Mnemonic::Return => {
            expect_args(mnemonic, args, 0)?;
            Instruction::Return
        }
        Mnemonic::Nop => {
            expect_args(mnemonic, args, 0)?;
            Instruction::Nop
        }
    };
    Ok(instr.to_bytes().to_vec())
}

/// Generates a binary image and its debug map from assembly source code.
///
/// # Errors
///
/// This function will return an error for the first line that fails to translate. No
/// partial output is produced.
pub fn assemble(source: &str) -> Result<Target, AssembleError> {
    let SourceMap {
        instructions,
        labels,
    } = preprocess(source);
    log::debug!(
        "preprocessed {} lines, found {} labels",
        instructions.len(),
        labels.len()
    );

    let mut exe = MAGIC.to_vec();
    for line in &instructions {
        let bytes = translate(&tokenize(&line.raw), &labels).map_err(|kind| AssembleError {
            line: line.line_number,
            raw: line.raw.clone(),
            kind,
        })?;
        log::trace!("{:#05x}: {:02x?}  {}", line.address, bytes, line.raw);
        exe.extend_from_slice(&bytes);
    }
    log::debug!("assembled {} bytes", exe.len());

    let pdb = instructions
        .into_iter()
        .map(|line| (line.address, line))
        .collect();
    Ok(Target { exe, pdb })
}
