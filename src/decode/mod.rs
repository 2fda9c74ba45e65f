//! Everything needed to turn listing text into a linked [`Program`].
//!
//! Decoding is a strict left-to-right pipeline over a single line:
//! address, machine bytes, mnemonic, then operands (or a branch target).
//! Any stage's failure short-circuits the rest of the line.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use memchr::memchr;

mod constants;
pub mod listing;
pub mod operands;

use constants::*;
use operands::*;
use crate::common::{Function, Instruction, Mnemonic, Operand, Program};

/// Identifies which register of a memory operand failed to resolve.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryPart {
    Base,
    Index,
}
impl fmt::Display for MemoryPart {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            MemoryPart::Base => "base",
            MemoryPart::Index => "index",
        })
    }
}

/// The kinds of errors that can occur while decoding listing text.
/// Each names the offending text so that failures are diagnosable without re-parsing the line.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("missing ':' after address")]
    MissingAddressDelimiter,
    #[error("invalid address '{0}'")]
    InvalidAddress(String),
    #[error("missing mnemonic")]
    MissingMnemonic,
    #[error("unknown mnemonic '{0}'")]
    UnknownMnemonic(String),

    #[error("unrecognized {part} register '{text}'")]
    UnrecognizedRegister { part: MemoryPart, text: String },
    #[error("no pair of parentheses found in '{0}'")]
    MissingParentheses(String),
    #[error("malformed memory operand '{0}'")]
    MalformedMemory(String),
    #[error("invalid number '{text}': {reason}")]
    InvalidNumber { text: String, reason: String },
    #[error("unrecognized scale '{0}' (expected 1, 2, 4, or 8)")]
    InvalidScale(String),

    #[error("{0} instruction has no target")]
    MissingBranchTarget(Mnemonic),
    /// An indirect target was neither a register nor a valid memory reference.
    #[error("indirect target '{target}' is not a register, and not a memory operand: {reason}")]
    InvalidIndirectTarget { target: String, reason: Box<DecodeError> },

    #[error("no angle brackets found in function header '{0}'")]
    MissingFunctionName(String),
    #[error("function body is empty")]
    EmptyFunction,
    /// Wraps a per-line failure with its 1-based line number within the function block.
    #[error("line {line_num}: {inner}")]
    BadLine { line_num: usize, inner: Box<DecodeError> },
}

/// The kinds of errors that can occur while linking functions into a [`Program`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("nothing to link")]
    NothingToLink,
    #[error("multiple instructions at address {0:#x}")]
    DuplicateAddress(u64),
    #[error("function '{0}' was defined more than once")]
    DuplicateSymbol(String),
}

/// Grabs the first whitespace-separated token (skipping leading white space).
/// Returns the found token (or empty string if none) and the index just after it.
fn grab_whitespace_sep_token(raw_line: &str, raw_start: usize, raw_stop: usize) -> (&str, usize) {
    let token_start = match raw_line[raw_start..raw_stop].find(|c: char| !c.is_whitespace()) {
        None => raw_stop,
        Some(p) => raw_start + p,
    };
    let token_stop = match raw_line[token_start..raw_stop].find(char::is_whitespace) {
        None => raw_stop,
        Some(p) => token_start + p,
    };
    (&raw_line[token_start..token_stop], token_stop)
}
#[test]
fn test_grab_ws_sep_token() {
    assert_eq!(grab_whitespace_sep_token("   \t hello world  ", 3, 18), ("hello", 10));
    assert_eq!(grab_whitespace_sep_token("    \t  ", 1, 7), ("", 7));
    assert_eq!(grab_whitespace_sep_token("", 0, 0), ("", 0));
    assert_eq!(grab_whitespace_sep_token("1129:\tf3 0f", 5, 11), ("f3", 8));
    assert_eq!(grab_whitespace_sep_token("mov    %rsp,%rbp", 3, 16), ("%rsp,%rbp", 16));
}

/// Parses the hex address before the first `:`.
/// Returns the address and the index just after the delimiter.
fn parse_address(line: &str) -> Result<(u64, usize), DecodeError> {
    let delim = memchr(ADDRESS_DELIMITER, line.as_bytes()).ok_or(DecodeError::MissingAddressDelimiter)?;
    let text = line[..delim].trim();
    match u64::from_str_radix(text, 16) {
        Ok(address) if !text.starts_with('+') => Ok((address, delim + 1)),
        _ => Err(DecodeError::InvalidAddress(text.into())),
    }
}
#[test]
fn test_parse_address() {
    assert_eq!(parse_address("1129:\tf3"), Ok((0x1129, 5)));
    assert_eq!(parse_address("    112d:\t55"), Ok((0x112d, 9)));
    assert_eq!(parse_address("0000000000001129:"), Ok((0x1129, 17)));
    assert_eq!(parse_address("1129\tf3"), Err(DecodeError::MissingAddressDelimiter));
    assert_eq!(parse_address("11g9:\tf3"), Err(DecodeError::InvalidAddress("11g9".into())));
    assert_eq!(parse_address(":\tf3"), Err(DecodeError::InvalidAddress("".into())));
    assert_eq!(parse_address("+12:\tf3"), Err(DecodeError::InvalidAddress("+12".into())));
}

/// Collects the raw machine bytes that follow the address.
/// Collection stops at the first token that is not a 1-2 digit hex byte.
/// Prefix tokens (e.g. `lock`, `cs`) also end collection, and are consumed.
/// Returns the bytes and the index just after the last consumed token.
fn extract_machine_bytes(line: &str, start: usize) -> (Vec<u8>, usize) {
    let mut bytes = vec![];
    let mut pos = start;
    loop {
        let (token, after) = grab_whitespace_sep_token(line, pos, line.len());
        if token.is_empty() { break; }

        if PREFIXES.contains(token) {
            pos = after;
            loop {
                let (token, after) = grab_whitespace_sep_token(line, pos, line.len());
                if !PREFIXES.contains(token) { break; }
                pos = after;
            }
            break;
        }

        if token.len() > 2 || !token.bytes().all(|c| c.is_ascii_hexdigit()) { break; }
        match u8::from_str_radix(token, 16) {
            Ok(b) => bytes.push(b),
            Err(_) => break,
        }
        pos = after;
    }
    (bytes, pos)
}
#[test]
fn test_extract_machine_bytes() {
    assert_eq!(extract_machine_bytes("1129:\tf3 0f 1e fa          \tendbr64", 5), (vec![0xf3, 0x0f, 0x1e, 0xfa], 17));
    assert_eq!(extract_machine_bytes("112d:\t55                   \tpush   %rbp", 5), (vec![0x55], 8));
    assert_eq!(extract_machine_bytes("1137:\t00 00", 5), (vec![0, 0], 11));
    assert_eq!(extract_machine_bytes("1137:\t", 5), (vec![], 5));
    assert_eq!(extract_machine_bytes("1040:\tf0 lock addl $0x1,(%rax)", 5), (vec![0xf0], 13));
    assert_eq!(extract_machine_bytes("1040:\t2e cs nopw 0x0(%rax,%rax,1)", 5), (vec![0x2e], 11));
    assert_eq!(extract_machine_bytes("1040:\tdata16 cs nopw 0x0(%rax,%rax,1)", 5), (vec![], 15));
    assert_eq!(extract_machine_bytes("1040:\t66 90 xchg %ax,%ax", 5), (vec![0x66, 0x90], 11));
}

/// Reads the mnemonic token at `pos`.
/// Returns the mnemonic and the index just after it.
fn parse_mnemonic(line: &str, pos: usize) -> Result<(Mnemonic, usize), DecodeError> {
    let (token, after) = grab_whitespace_sep_token(line, pos, line.len());
    if token.is_empty() { return Err(DecodeError::MissingMnemonic); }
    match MNEMONICS.get(token) {
        Some(&m) => Ok((m, after)),
        None => Err(DecodeError::UnknownMnemonic(token.into())),
    }
}

/// Reads and resolves the operand token at `pos`.
/// Sub-tokens that resolve to no operand kind are dropped.
/// Returns `None` if there is no operand text.
fn parse_operands(line: &str, pos: usize) -> Option<Vec<Operand>> {
    let (token, _) = grab_whitespace_sep_token(line, pos, line.len());
    if token.is_empty() { return None; }

    let mut res = Vec::with_capacity(2);
    for sub in split_operands(token) {
        match resolve_operand(sub) {
            Ok(op) => res.push(op),
            Err(e) => log::debug!("dropping unresolved operand '{}' in '{}': {}", sub, line.trim(), e),
        }
    }
    Some(res)
}

/// Reads the single target of a call/branch instruction.
/// A `*` prefix marks an indirect target (register, then memory); otherwise the text is an absolute hex address.
fn parse_branch_target(line: &str, pos: usize, mnemonic: Mnemonic) -> Result<Operand, DecodeError> {
    let (token, _) = grab_whitespace_sep_token(line, pos, line.len());
    if token.is_empty() { return Err(DecodeError::MissingBranchTarget(mnemonic)); }

    if let Some(target) = token.strip_prefix(INDIRECT_PREFIX) {
        if let Some(reg) = resolve_register(target) {
            return Ok(Operand::Register(reg));
        }
        return match resolve_memory(target) {
            Ok(mem) => Ok(Operand::Memory(mem)),
            Err(e) => Err(DecodeError::InvalidIndirectTarget { target: target.into(), reason: Box::new(e) }),
        };
    }

    match u64::from_str_radix(token, 16) {
        Ok(address) if !token.starts_with('+') => Ok(Operand::Address(address)),
        _ => Err(DecodeError::InvalidAddress(token.into())),
    }
}

/// Decodes a single listing line of the form `<hex-address>:\t<bytes>\t<mnemonic> [operands]`.
///
/// ```
/// # use disx64::*;
/// let instr = decode::decode_instruction("112d:\t55\tpush %rbp").unwrap();
/// assert_eq!(instr.address, 0x112d);
/// assert_eq!(instr.bytes, vec![0x55]);
/// assert_eq!(instr.mnemonic, Mnemonic::PUSH);
/// assert_eq!(instr.operands, Some(vec![Operand::Register(Register::RBP)]));
/// ```
pub fn decode_instruction(line: &str) -> Result<Instruction, DecodeError> {
    let (address, pos) = parse_address(line)?;
    let (bytes, pos) = extract_machine_bytes(line, pos);

    if !bytes.is_empty() && bytes.iter().all(|&b| b == 0) {
        return Ok(Instruction { address, bytes, mnemonic: Mnemonic::PADDING, operands: None });
    }

    let (mnemonic, pos) = parse_mnemonic(line, pos)?;
    let operands = if mnemonic.is_operandless() {
        None
    } else if mnemonic.is_branch() {
        Some(vec![parse_branch_target(line, pos, mnemonic)?])
    } else {
        parse_operands(line, pos)
    };

    Ok(Instruction { address, bytes, mnemonic, operands })
}

/// Decodes a function block as produced by objdump.
///
/// The first non-empty line is the header holding the function name in angle brackets (e.g. `0000000000001129 <main>:`).
/// Every other non-empty line is decoded independently; the first failure is reported along with its line number.
pub fn decode_function(block: &str) -> Result<Function, DecodeError> {
    let mut lines = block.lines().enumerate().map(|(i, l)| (i + 1, l.trim())).filter(|(_, l)| !l.is_empty());

    let header = match lines.next() {
        Some((_, header)) => header,
        None => return Err(DecodeError::EmptyFunction),
    };
    let name = match (header.find('<'), header.rfind('>')) {
        (Some(open), Some(close)) if open < close => &header[open + 1..close],
        _ => return Err(DecodeError::MissingFunctionName(header.into())),
    };

    let mut instructions = vec![];
    for (line_num, line) in lines {
        match decode_instruction(line) {
            Ok(instr) => instructions.push(instr),
            Err(e) => return Err(DecodeError::BadLine { line_num, inner: Box::new(e) }),
        }
    }

    Ok(Function { name: name.into(), instructions })
}

/// Links one or more functions into a [`Program`] indexed by address.
///
/// Each function's name becomes a symbol for the address of its first instruction.
/// Instruction addresses and function names must be unique across all inputs.
pub fn link(functions: Vec<Function>) -> Result<Program, LinkError> {
    if functions.is_empty() { return Err(LinkError::NothingToLink); }

    let mut instructions = BTreeMap::new();
    let mut symbols = BTreeMap::new();
    let mut names = HashSet::new();

    for func in functions {
        if !names.insert(func.name.clone()) {
            return Err(LinkError::DuplicateSymbol(func.name));
        }
        if let Some(first) = func.instructions.first() {
            symbols.insert(func.name, first.address);
        }
        for instr in func.instructions {
            let address = instr.address;
            if instructions.insert(address, instr).is_some() {
                return Err(LinkError::DuplicateAddress(address));
            }
        }
    }

    Ok(Program { instructions, symbols })
}
