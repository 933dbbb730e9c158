use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, digit1, hex_digit1, one_of},
    combinator::{all_consuming, map, map_opt, map_res, opt, recognize, value},
    sequence::{pair, preceded, terminated},
    IResult,
};

use crate::plat::{AluOp, CmpOp, Register};

use super::{AsmError, AsmResult, Mnemonic, Statement, DATA_DIRECTIVE};

impl AluOp {
    pub fn lex(inp: &str) -> IResult<&str, Self> {
        alt((
            value(Self::And, tag(Self::And.mnemonic())),
            value(Self::Or, tag(Self::Or.mnemonic())),
            value(Self::Xor, tag(Self::Xor.mnemonic())),
            value(Self::Shl, tag(Self::Shl.mnemonic())),
            value(Self::Shr, tag(Self::Shr.mnemonic())),
            value(Self::Add, tag(Self::Add.mnemonic())),
            value(Self::Sub, tag(Self::Sub.mnemonic())),
        ))(inp)
    }
}

impl CmpOp {
    pub fn lex(inp: &str) -> IResult<&str, Self> {
        // longest first: `ME` and `SE` are prefixes of `MEL` and `SEL`
        alt((
            value(Self::Eq, tag(Self::Eq.mnemonic())),
            value(Self::Ne, tag(Self::Ne.mnemonic())),
            value(Self::Le, tag(Self::Le.mnemonic())),
            value(Self::Lt, tag(Self::Lt.mnemonic())),
            value(Self::Ge, tag(Self::Ge.mnemonic())),
            value(Self::Gt, tag(Self::Gt.mnemonic())),
        ))(inp)
    }
}

impl Mnemonic {
    pub fn lex(inp: &str) -> IResult<&str, Self> {
        alt((
            alt((
                value(Self::Halt, tag("STOPP")),
                value(Self::Set, tag("SETT")),
                value(Self::Locate, tag("FINN")),
                value(Self::Load, tag("LAST")),
                value(Self::Store, tag("LAGR")),
                value(Self::Read, tag("LES")),
                value(Self::Write, tag("SKRIV")),
            )),
            alt((
                value(Self::CondJump, tag("BHOPP")),
                value(Self::Jump, tag("HOPP")),
                value(Self::Call, tag("TUR")),
                value(Self::Return, tag("RETUR")),
                value(Self::Nop, tag("NOPE")),
                value(Self::Data, tag(DATA_DIRECTIVE)),
            )),
            map(AluOp::lex, Self::Alu),
            map(CmpOp::lex, Self::Cmp),
        ))(inp)
    }

    /// Looks up an opcode. The whole token must match; opcodes are case-sensitive.
    pub fn parse(token: &str) -> Option<Self> {
        all_consuming(Self::lex)(token).ok().map(|(_, m)| m)
    }
}

/// `0x`/`0X` followed by hex digits, or a decimal integer with an optional sign.
pub fn lex_literal(inp: &str) -> IResult<&str, i64> {
    alt((
        map_res(
            preceded(alt((tag("0x"), tag("0X"))), hex_digit1),
            |x: &str| i64::from_str_radix(x, 16),
        ),
        map_res(recognize(pair(opt(one_of("+-")), digit1)), |x: &str| {
            x.parse::<i64>()
        }),
    ))(inp)
}

/// Returns the value of `token` if the whole token is a numeric literal.
pub fn parse_literal(token: &str) -> Option<i64> {
    all_consuming(lex_literal)(token).ok().map(|(_, v)| v)
}

/// `r0` - `r15`.
pub fn lex_register(inp: &str) -> IResult<&str, Register> {
    preceded(
        char('r'),
        map_opt(digit1, |x: &str| {
            x.parse::<u8>()
                .ok()
                .and_then(|n| Register::try_from(n).ok())
        }),
    )(inp)
}

/// Parses a whole token as a register.
///
/// # Errors
///
/// Returns [AsmError::InvalidRegister] if the token is anything but `r0` - `r15`.
pub fn parse_register(token: &str) -> AsmResult<Register> {
    all_consuming(lex_register)(token)
        .map(|(_, reg)| reg)
        .map_err(|_| AsmError::InvalidRegister(token.to_owned()))
}

fn is_label_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | 'æ' | 'ø' | 'å' | 'Æ' | 'Ø' | 'Å')
}

pub fn lex_label(inp: &str) -> IResult<&str, &str> {
    terminated(take_while1(is_label_char), char(':'))(inp)
}

/// What a trimmed source line is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind<'a> {
    Whitespace,
    Comment,
    /// A label definition, holding the label name without the `:`.
    Label(&'a str),
    Data,
    Instruction,
}

/// Classifies a trimmed line. Anything that is not blank, a comment, a label or a data
/// directive is an instruction.
pub fn classify(line: &str) -> LineKind<'_> {
    if line.is_empty() {
        LineKind::Whitespace
    } else if line.starts_with(';') {
        LineKind::Comment
    } else if let Ok((_, name)) = all_consuming(lex_label)(line) {
        LineKind::Label(name)
    } else if tokenize(line).opcode == DATA_DIRECTIVE {
        LineKind::Data
    } else {
        LineKind::Instruction
    }
}

/// Splits a raw line into its opcode and comma separated arguments.
///
/// Everything from the first `;` on is dropped before splitting, so a comment swallows any
/// arguments that follow it.
pub fn tokenize(raw: &str) -> Statement {
    let code = raw.trim().split(';').next().unwrap_or_default();
    let mut words = code.split_whitespace();
    let opcode = words.next().unwrap_or_default().to_owned();
    let rest: String = words.collect();
    let args = rest
        .split(',')
        .map(str::trim)
        .filter(|arg| !arg.is_empty())
        .map(str::to_owned)
        .collect();
    Statement { opcode, args }
}
