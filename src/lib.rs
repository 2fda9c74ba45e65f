#![forbid(unsafe_code)]

//! disx64 reads objdump-style x86-64 disassembly listings and executes them on a small virtual CPU.
//! Each listing line (address, raw machine bytes, mnemonic, AT&T operand text) is decoded into a typed [`Instruction`],
//! and the execution engine interprets those instructions against general-purpose registers, condition flags,
//! a byte-granular stack, and a sparse byte-addressed memory map.
//! This crate contains only the library code (no application/cli).
//!
//! # Example of Usage
//!
//! ```
//! # use disx64::*;
//! // a function block as it appears in `objdump -d` output
//! let listing = "
//! 0000000000001129 <main>:
//!     1129:	f3 0f 1e fa          	endbr64
//!     112d:	55                   	push   %rbp
//!     112e:	48 89 e5             	mov    %rsp,%rbp
//!     1131:	b8 05 00 00 00       	mov    $0x5,%eax
//!     1136:	5d                   	pop    %rbp
//!     1137:	c3                   	ret
//! ";
//!
//! // decode the function and link it into an addressable program
//! let main = match decode::decode_function(listing) {
//!     Ok(f) => f,
//!     Err(e) => panic!("{}", e), // decode errors (above listing has no errors)
//! };
//! let program = match decode::link(vec![main]) {
//!     Ok(p) => p,
//!     Err(e) => panic!("{}", e),
//! };
//!
//! // create an emulator, point it at main, and execute until main returns
//! let mut emu = exec::Emulator::new(program);
//! emu.init("main", &Default::default()).unwrap();
//! let (cycles, reason) = emu.execute_cycles(u64::MAX);
//! assert_eq!(cycles, 6);
//! assert_eq!(reason, exec::StopReason::OutsideProgram(0)); // returned to the sentinel address
//! assert_eq!(emu.cpu.get(Register::EAX).unwrap(), 5);
//! ```

#[macro_use] extern crate num_derive;
#[macro_use] extern crate lazy_static;

macro_rules! mask {
    ($src:ident : $($mask:ident)|+) => {
        $($src::$mask)|+
    };
    () => { 0 };
}

pub mod common;
pub mod decode;
pub mod exec;

pub use common::{Function, Instruction, Memory, Mnemonic, Operand, Program, Register};

#[cfg(test)]
mod test;
