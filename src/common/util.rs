use std::fmt;

/// Displays a list of values as an English alternation, e.g. `a, b, or c`.
pub(crate) struct Punctuated<'a, T> {
    vals: &'a [T],
    sep: &'static str,
    sep_special: &'static str,
}
impl<'a, T> Punctuated<'a, T> {
    pub(crate) fn or(vals: &'a [T]) -> Self {
        Self { vals, sep: ", ", sep_special: "or " }
    }
}
impl<'a, T: fmt::Display> fmt::Display for Punctuated<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.vals {
            [] => Ok(()),
            [x] => write!(f, "{}", x),
            [x, y] => write!(f, "{} {}{}", x, self.sep_special, y),
            [prev @ .., last] => {
                for x in prev {
                    write!(f, "{}{}", x, self.sep)?;
                }
                write!(f, "{}{}", self.sep_special, last)
            }
        }
    }
}
#[test]
fn test_punctuated_or() {
    use crate::common::OperandKind::*;
    assert_eq!(Punctuated::or(&[] as &[u8]).to_string(), "");
    assert_eq!(Punctuated::or(&[Register]).to_string(), "register");
    assert_eq!(Punctuated::or(&[Register, Immediate]).to_string(), "register or immediate");
    assert_eq!(Punctuated::or(&[Address, Register, Memory]).to_string(), "address, register, or memory");
}
