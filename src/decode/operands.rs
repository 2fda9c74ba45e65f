//! Classification of single operand tokens (`%reg`, `$imm`, `disp(base,index,scale)`).

use memchr::{memchr, memchr_iter};

use super::constants::*;
use super::{DecodeError, MemoryPart};
use crate::common::{Memory, Operand, Register};

/// Resolves an exact register name like `%rax` (the sigil is required).
/// Returns `None` if the token is not a register; callers are expected to try other operand kinds.
pub fn resolve_register(token: &str) -> Option<Register> {
    REGISTERS.get(token).copied()
}

/// Resolves a `$`-prefixed immediate.
/// Returns `None` if the token is not an immediate or the numeric text is malformed.
pub fn resolve_immediate(token: &str) -> Option<i64> {
    token.strip_prefix(IMMEDIATE_PREFIX).and_then(|v| parse_integer(v).ok())
}

/// Parses a signed integer with an optional `0x` prefix (otherwise decimal).
/// The entire token must be consumed.
/// Hex magnitudes beyond `i64::MAX` are taken as their 64-bit two's complement pattern.
pub fn parse_displacement(token: &str) -> Result<i64, DecodeError> {
    parse_integer(token).map_err(|reason| DecodeError::InvalidNumber { text: token.into(), reason })
}

fn parse_integer(token: &str) -> Result<i64, String> {
    let (negative, digits) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token.strip_prefix('+').unwrap_or(token)),
    };
    let (digits, radix) = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => (hex, 16),
        None => (digits, 10),
    };
    if digits.starts_with(|c: char| c == '+' || c == '-') {
        return Err("unexpected sign".into());
    }
    let magnitude = u64::from_str_radix(digits, radix).map_err(|e| e.to_string())?;
    if radix == 10 && magnitude > i64::MAX as u64 + negative as u64 {
        return Err("number too large to fit in target type".into());
    }
    Ok(if negative { (magnitude as i64).wrapping_neg() } else { magnitude as i64 })
}
#[test]
fn test_parse_integer() {
    assert_eq!(parse_integer("0"), Ok(0));
    assert_eq!(parse_integer("42"), Ok(42));
    assert_eq!(parse_integer("-42"), Ok(-42));
    assert_eq!(parse_integer("+42"), Ok(42));
    assert_eq!(parse_integer("0x10"), Ok(16));
    assert_eq!(parse_integer("0X1f"), Ok(31));
    assert_eq!(parse_integer("-0x4"), Ok(-4));
    assert_eq!(parse_integer("0xffffffffffffffff"), Ok(-1));
    assert_eq!(parse_integer("0x8000000000000000"), Ok(i64::MIN));
    assert_eq!(parse_integer("-9223372036854775808"), Ok(i64::MIN));
    assert_eq!(parse_integer("9223372036854775807"), Ok(i64::MAX));
    assert!(parse_integer("9223372036854775808").is_err());
    assert!(parse_integer("0x10000000000000000").is_err());
    assert!(parse_integer("").is_err());
    assert!(parse_integer("-").is_err());
    assert!(parse_integer("0x").is_err());
    assert!(parse_integer("0x-4").is_err());
    assert!(parse_integer("--4").is_err());
    assert!(parse_integer("12ab").is_err());
    assert!(parse_integer("4(%rbp)").is_err());
}

/// Resolves a memory reference of the form `[disp](base[,index,scale])`.
///
/// Unlike the other resolvers, failure is an error rather than `None`:
/// memory is the last operand kind that is attempted, so the error explains why the token was rejected.
pub fn resolve_memory(token: &str) -> Result<Memory, DecodeError> {
    let bytes = token.as_bytes();
    let (open, close) = match (memchr(b'(', bytes), memchr(b')', bytes)) {
        (Some(open), Some(close)) => (open, close),
        _ => return Err(DecodeError::MissingParentheses(token.into())),
    };
    if close < open || close != token.len() - 1
        || memchr_iter(b'(', bytes).count() != 1 || memchr_iter(b')', bytes).count() != 1 {
        return Err(DecodeError::MalformedMemory(token.into()));
    }

    let mut res = Memory::default();

    let disp = &token[..open];
    if !disp.is_empty() {
        res.displacement = Some(parse_displacement(disp)?);
    }

    let interior = &token[open + 1..close];
    let parts: Vec<&str> = interior.split(',').collect();
    match parts.as_slice() {
        [base] => {
            res.base = Some(resolve_memory_register(base, MemoryPart::Base)?);
        }
        [base, index, scale] => {
            res.base = Some(resolve_memory_register(base, MemoryPart::Base)?);
            res.index = Some(resolve_memory_register(index, MemoryPart::Index)?);
            res.scale = Some(parse_scale(scale)?);
        }
        _ => return Err(DecodeError::MalformedMemory(token.into())),
    }

    Ok(res)
}

fn resolve_memory_register(text: &str, part: MemoryPart) -> Result<Register, DecodeError> {
    resolve_register(text).ok_or_else(|| DecodeError::UnrecognizedRegister { part, text: text.into() })
}
fn parse_scale(text: &str) -> Result<u8, DecodeError> {
    match parse_displacement(text)? {
        v @ 1 | v @ 2 | v @ 4 | v @ 8 => Ok(v as u8),
        _ => Err(DecodeError::InvalidScale(text.into())),
    }
}

/// Splits a comma-separated operand list, ignoring commas nested inside parentheses.
pub fn split_operands(token: &str) -> Vec<&str> {
    let mut res = vec![];
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in token.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                res.push(&token[start..i]);
                start = i + 1;
            }
            _ => (),
        }
    }
    res.push(&token[start..]);
    res
}
#[test]
fn test_split_operands() {
    assert_eq!(split_operands("%rsp,%rbp"), vec!["%rsp", "%rbp"]);
    assert_eq!(split_operands("%rbp"), vec!["%rbp"]);
    assert_eq!(split_operands("0x0(%rax,%rax,1)"), vec!["0x0(%rax,%rax,1)"]);
    assert_eq!(split_operands("%edi,-0x4(%rbp)"), vec!["%edi", "-0x4(%rbp)"]);
    assert_eq!(split_operands("0x8(%rax,%rdx,4),%eax"), vec!["0x8(%rax,%rdx,4)", "%eax"]);
    assert_eq!(split_operands("$0x0,0x2ed5(%rip)"), vec!["$0x0", "0x2ed5(%rip)"]);
    assert_eq!(split_operands(""), vec![""]);
}

/// Resolves an operand token, trying register, then immediate, then memory.
/// The first kind that succeeds decides the operand.
pub fn resolve_operand(token: &str) -> Result<Operand, DecodeError> {
    if let Some(reg) = resolve_register(token) {
        return Ok(Operand::Register(reg));
    }
    if let Some(imm) = resolve_immediate(token) {
        return Ok(Operand::Immediate(imm));
    }
    resolve_memory(token).map(Operand::Memory)
}
