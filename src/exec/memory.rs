//! Byte-granular stack and sparse byte-addressed memory.

use std::collections::HashMap;
use std::mem;

use super::ExecError;

macro_rules! impl_stack_primitive {
    ($([ $push:ident, $pop:ident => $t:ty ]),*$(,)?) => {$(
        pub fn $push(&mut self, val: $t) -> Result<(), ExecError> {
            self.push_value(val as u64, mem::size_of::<$t>())
        }
        pub fn $pop(&mut self) -> Result<$t, ExecError> {
            Ok(self.pop_value(mem::size_of::<$t>())? as $t)
        }
    )*}
}

/// A LIFO stack of bytes.
///
/// Multi-byte values are laid out so that their least significant byte ends on top,
/// and are reassembled least-significant-first when popped.
#[derive(Clone, Debug, Default)]
pub struct Stack {
    raw: Vec<u8>,
    limit: Option<usize>,
}
impl Stack {
    /// Creates an empty stack which can hold at most `limit` bytes (if specified).
    pub fn with_limit(limit: Option<usize>) -> Self {
        Self { raw: vec![], limit }
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
    pub fn clear(&mut self) {
        self.raw.clear();
    }
    /// Gets the bytes on the stack, from bottom to top.
    pub fn as_slice(&self) -> &[u8] {
        &self.raw
    }

    fn check_room(&self, count: usize) -> Result<(), ExecError> {
        match self.limit {
            Some(limit) if self.raw.len() + count > limit => Err(ExecError::StackOverflow),
            _ => Ok(()),
        }
    }

    pub fn push_u8(&mut self, val: u8) -> Result<(), ExecError> {
        self.check_room(1)?;
        self.raw.push(val);
        Ok(())
    }
    pub fn pop_u8(&mut self) -> Result<u8, ExecError> {
        self.raw.pop().ok_or(ExecError::StackUnderflow)
    }

    /// Pushes the low `size` bytes of `val` (at most 8).
    /// On failure, the stack is unmodified.
    pub fn push_value(&mut self, val: u64, size: usize) -> Result<(), ExecError> {
        debug_assert!(size <= 8);
        self.check_room(size)?;
        for i in (0..size).rev() {
            self.raw.push((val >> (8 * i)) as u8);
        }
        Ok(())
    }
    /// Pops `size` bytes (at most 8) and reassembles them into a value.
    /// On failure, the stack is unmodified.
    pub fn pop_value(&mut self, size: usize) -> Result<u64, ExecError> {
        debug_assert!(size <= 8);
        if self.raw.len() < size { return Err(ExecError::StackUnderflow); }
        let mut res = 0u64;
        for i in 0..size {
            if let Some(b) = self.raw.pop() {
                res |= (b as u64) << (8 * i);
            }
        }
        Ok(res)
    }

    impl_stack_primitive! {
        [ push_u16, pop_u16 => u16 ],
        [ push_u32, pop_u32 => u32 ],
        [ push_u64, pop_u64 => u64 ],
    }
}

#[test]
fn test_stack_order() {
    let mut s = Stack::default();
    s.push_u32(0x11223344).unwrap();
    assert_eq!(s.as_slice(), &[0x11, 0x22, 0x33, 0x44]); // lsb on top
    assert_eq!(s.pop_u8().unwrap(), 0x44);
    assert_eq!(s.pop_u16().unwrap(), 0x2233);
    assert_eq!(s.len(), 1);

    for &b in &[0, 0, 0, 0, 0, 0, 0xff, 0xff] {
        s.push_u8(b).unwrap();
    }
    assert_eq!(s.pop_u64().unwrap(), 0xffff);
    assert_eq!(s.pop_u8().unwrap(), 0x11);
    assert!(s.is_empty());
}
#[test]
fn test_stack_errors() {
    let mut s = Stack::with_limit(Some(6));
    s.push_u32(0xdeadbeef).unwrap();
    assert_eq!(s.push_u32(0), Err(ExecError::StackOverflow));
    assert_eq!(s.len(), 4);
    s.push_u16(0x1234).unwrap();
    assert_eq!(s.push_u8(0), Err(ExecError::StackOverflow));

    assert_eq!(s.pop_u64(), Err(ExecError::StackUnderflow));
    assert_eq!(s.len(), 6); // no partial pop
    assert_eq!(s.pop_u16().unwrap(), 0x1234);
    assert_eq!(s.pop_u32().unwrap(), 0xdeadbeef);
    assert_eq!(s.pop_u8(), Err(ExecError::StackUnderflow));

    s.clear();
    assert!(s.is_empty());
}

/// A sparse byte-addressed memory map.
/// Only bytes that have been written are present.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Memory {
    raw: HashMap<u64, u8>,
}
impl Memory {
    /// Gets the byte at the given address, or `None` if it was never written.
    pub fn get_u8(&self, address: u64) -> Option<u8> {
        self.raw.get(&address).copied()
    }
    /// Writes a byte, overwriting any previous value at that address.
    pub fn set_u8(&mut self, address: u64, val: u8) {
        self.raw.insert(address, val);
    }
    /// Gets the number of bytes that have been written.
    pub fn len(&self) -> usize {
        self.raw.len()
    }
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
    pub fn clear(&mut self) {
        self.raw.clear();
    }
}

#[test]
fn test_memory() {
    let mut m = Memory::default();
    assert_eq!(m.get_u8(0x1000), None);
    m.set_u8(0x1000, 0x12);
    m.set_u8(u64::MAX, 0x34);
    assert_eq!(m.get_u8(0x1000), Some(0x12));
    assert_eq!(m.get_u8(u64::MAX), Some(0x34));
    m.set_u8(0x1000, 0x56);
    assert_eq!(m.get_u8(0x1000), Some(0x56));
    assert_eq!(m.len(), 2);
    m.clear();
    assert!(m.is_empty());
}
