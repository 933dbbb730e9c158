use std::fmt;

use crate::plat::{Instruction, WORD_SIZE};

use super::{lexer::tokenize, DebugInfo, SourceLine, DATA_DIRECTIVE};

/// One row of a program listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingLine<'p> {
    pub address: usize,
    pub bytes: Vec<u8>,
    /// The decoded instruction, or a `.DATA` line for raw bytes.
    pub text: String,
    pub source: Option<&'p SourceLine>,
}

impl fmt::Display for ListingLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes: Vec<String> = self.bytes.iter().map(|b| format!("{b:02x}")).collect();
        write!(f, "{:#05x}  {:<11}  {:<16}", self.address, bytes.join(" "), self.text)?;
        if let Some(line) = self.source {
            write!(f, "  ; {:>4}: {}", line.line_number + 1, line.raw)?;
        }
        Ok(())
    }
}

fn data_text(bytes: &[u8]) -> String {
    let values: Vec<String> = bytes.iter().map(|b| format!("{b:#04x}")).collect();
    format!("{} {}", DATA_DIRECTIVE, values.join(", "))
}

/// Decodes the bytes following the magic tag back into assembly.
///
/// Without a debug map every pair of bytes is taken to be an instruction. With one,
/// ranges produced by data directives are listed as raw bytes instead.
pub fn disassemble<'p>(program: &[u8], pdb: Option<&'p DebugInfo>) -> Vec<ListingLine<'p>> {
    let mut out = vec![];
    let mut address = 0;
    while address < program.len() {
        let source = pdb.and_then(|pdb| pdb.get(&address));
        let data_len = source
            .filter(|line| tokenize(&line.raw).opcode == DATA_DIRECTIVE)
            .map(|line| tokenize(&line.raw).args.len())
            // an empty `.DATA` shares its address with whatever follows it
            .filter(|&len| len > 0);

        let (len, text) = match data_len {
            Some(len) => {
                let len = len.min(program.len() - address);
                (len, data_text(&program[address..address + len]))
            }
            None if address + WORD_SIZE <= program.len() => {
                let word = [program[address], program[address + 1]];
                let text = match Instruction::from_bytes(word) {
                    Ok(instr) => instr.to_string(),
                    Err(_) => data_text(&word),
                };
                (WORD_SIZE, text)
            }
            None => (1, data_text(&program[address..=address])),
        };
        out.push(ListingLine {
            address,
            bytes: program[address..address + len].to_vec(),
            text,
            source,
        });
        address += len;
    }
    out
}
