//! Function extraction from a full `objdump -d` listing.
//!
//! A function starts at a header line like `0000000000001129 <main>:` and runs through the next blank line (or end of input).

use std::io::{self, BufRead};

use super::{decode_function, DecodeError};
use crate::common::Function;

#[derive(thiserror::Error, Debug)]
pub enum ListingError {
    #[error("read error: {0}")]
    Io(#[from] io::Error),
    #[error("function '{0}' not found in listing")]
    FunctionNotFound(String),
    #[error("failed to decode function: {0}")]
    Decode(#[from] DecodeError),
}

/// Gets the function name from a header line, or `None` if the line is not a header.
fn parse_header(line: &str) -> Option<&str> {
    let line = line.trim();
    let (address, rest) = line.split_once(char::is_whitespace)?;
    if address.is_empty() || !address.bytes().all(|c| c.is_ascii_hexdigit()) { return None; }
    if address.trim_start_matches('0').len() > 16 { return None; }

    let name = rest.trim_start().strip_prefix('<')?.strip_suffix(">:")?;
    if name.is_empty() { None } else { Some(name) }
}
#[test]
fn test_parse_header() {
    assert_eq!(parse_header("0000000000001129 <main>:"), Some("main"));
    assert_eq!(parse_header("0000000000001030 <puts@plt>:"), Some("puts@plt"));
    assert_eq!(parse_header("1000 <_init>:   "), Some("_init"));
    assert_eq!(parse_header("00000000000010000000 <x>:"), None);
    assert_eq!(parse_header("    1129:\tf3 0f 1e fa\tendbr64"), None);
    assert_eq!(parse_header("Disassembly of section .text:"), None);
    assert_eq!(parse_header("0000000000001129 <>:"), None);
    assert_eq!(parse_header("0000000000001129 <main>"), None);
    assert_eq!(parse_header(""), None);
}

/// Gets the names of all functions in the listing, in listing order.
pub fn extract_function_names<R: BufRead>(listing: R) -> Result<Vec<String>, ListingError> {
    let mut res = vec![];
    for line in listing.lines() {
        let line = line?;
        if let Some(name) = parse_header(&line) {
            res.push(name.into());
        }
    }
    Ok(res)
}

/// Gets the text block of the named function: its header line and every line up to (but excluding) the next blank line.
pub fn extract_function_block<R: BufRead>(listing: R, name: &str) -> Result<String, ListingError> {
    let mut lines = listing.lines();

    let mut block = loop {
        match lines.next() {
            None => return Err(ListingError::FunctionNotFound(name.into())),
            Some(line) => {
                let line = line?;
                if parse_header(&line) == Some(name) { break line; }
            }
        }
    };

    for line in lines {
        let line = line?;
        if line.trim().is_empty() { break; }
        block.push('\n');
        block.push_str(&line);
    }
    Ok(block)
}

/// Extracts and decodes the named function.
pub fn extract_function<R: BufRead>(listing: R, name: &str) -> Result<Function, ListingError> {
    let block = extract_function_block(listing, name)?;
    Ok(decode_function(&block)?)
}
