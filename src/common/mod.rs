//! Everything that is used by both `decode` and `exec`.

use std::collections::BTreeMap;
use std::fmt;

pub(crate) mod util;

use util::Punctuated;

/// The mnemonics recognized by the decoder.
///
/// Not every mnemonic has an execution handler; see [`CPU::execute`] for the supported subset.
///
/// [`CPU::execute`]: ../exec/struct.CPU.html#method.execute
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, FromPrimitive)]
#[repr(u8)]
pub enum Mnemonic {
    ADD, AND,
    CALL,
    CMP, CMPB, CMPQ,
    ENDBR64,
    HLT,
    JE, JNE, JMP,
    LEA,
    MOV, MOVB,
    /// Synthetic mnemonic for alignment filler (every machine byte is zero).
    /// It never appears in listing text.
    PADDING,
    NOPL, NOPW,
    POP, PUSH,
    RET,
    SUB,
    SAR, SHR,
    TEST,
    XOR,
}
impl Mnemonic {
    /// Gets the canonical listing name of the mnemonic.
    pub const fn name(self) -> &'static str {
        match self {
            Mnemonic::ADD => "add",
            Mnemonic::AND => "and",
            Mnemonic::CALL => "call",
            Mnemonic::CMP => "cmp",
            Mnemonic::CMPB => "cmpb",
            Mnemonic::CMPQ => "cmpq",
            Mnemonic::ENDBR64 => "endbr64",
            Mnemonic::HLT => "hlt",
            Mnemonic::JE => "je",
            Mnemonic::JNE => "jne",
            Mnemonic::JMP => "jmp",
            Mnemonic::LEA => "lea",
            Mnemonic::MOV => "mov",
            Mnemonic::MOVB => "movb",
            Mnemonic::PADDING => "padding",
            Mnemonic::NOPL => "nopl",
            Mnemonic::NOPW => "nopw",
            Mnemonic::POP => "pop",
            Mnemonic::PUSH => "push",
            Mnemonic::RET => "ret",
            Mnemonic::SUB => "sub",
            Mnemonic::SAR => "sar",
            Mnemonic::SHR => "shr",
            Mnemonic::TEST => "test",
            Mnemonic::XOR => "xor",
        }
    }
    /// Checks if this mnemonic takes a single call/branch target instead of a general operand list.
    pub fn is_branch(self) -> bool {
        matches!(self, Mnemonic::CALL | Mnemonic::JE | Mnemonic::JNE | Mnemonic::JMP)
    }
    /// Checks if this mnemonic never carries operands in a listing.
    pub fn is_operandless(self) -> bool {
        matches!(self, Mnemonic::ENDBR64 | Mnemonic::RET | Mnemonic::PADDING)
    }
    /// Checks if executing this mnemonic manages the instruction pointer itself.
    pub fn is_control_flow(self) -> bool {
        self.is_branch() || self == Mnemonic::RET
    }
}
impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The register names recognized by the decoder.
///
/// Only 32-bit and 64-bit registers have a defined width (and therefore a storage slot in the CPU).
/// The narrower names are decoded faithfully but cannot be executed.
/// Width-defined registers are listed first so their discriminant doubles as a storage index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, FromPrimitive)]
#[repr(u8)]
pub enum Register {
    RAX, RBX, RCX, RDX, RSI, RDI, RBP, RSP,
    R8, R9, R10, R11, R12, R13, R14, R15,
    RIP,

    EAX, EBX, ECX, EDX, ESI, EDI, EBP, ESP,
    R8D, R9D, R10D, R11D, R12D, R13D, R14D, R15D,

    AX, BX, CX, DX, SI, DI, BP, SP,
    AL, BL, CL, DL, SIL, DIL, BPL, SPL,
}
impl Register {
    /// Number of registers that have a defined width.
    pub const SIZED_COUNT: usize = Register::R15D as usize + 1;

    /// Gets the listing name of the register (including the `%` sigil).
    pub const fn name(self) -> &'static str {
        match self {
            Register::RAX => "%rax", Register::RBX => "%rbx", Register::RCX => "%rcx", Register::RDX => "%rdx",
            Register::RSI => "%rsi", Register::RDI => "%rdi", Register::RBP => "%rbp", Register::RSP => "%rsp",
            Register::R8 => "%r8", Register::R9 => "%r9", Register::R10 => "%r10", Register::R11 => "%r11",
            Register::R12 => "%r12", Register::R13 => "%r13", Register::R14 => "%r14", Register::R15 => "%r15",
            Register::RIP => "%rip",

            Register::EAX => "%eax", Register::EBX => "%ebx", Register::ECX => "%ecx", Register::EDX => "%edx",
            Register::ESI => "%esi", Register::EDI => "%edi", Register::EBP => "%ebp", Register::ESP => "%esp",
            Register::R8D => "%r8d", Register::R9D => "%r9d", Register::R10D => "%r10d", Register::R11D => "%r11d",
            Register::R12D => "%r12d", Register::R13D => "%r13d", Register::R14D => "%r14d", Register::R15D => "%r15d",

            Register::AX => "%ax", Register::BX => "%bx", Register::CX => "%cx", Register::DX => "%dx",
            Register::SI => "%si", Register::DI => "%di", Register::BP => "%bp", Register::SP => "%sp",
            Register::AL => "%al", Register::BL => "%bl", Register::CL => "%cl", Register::DL => "%dl",
            Register::SIL => "%sil", Register::DIL => "%dil", Register::BPL => "%bpl", Register::SPL => "%spl",
        }
    }
    /// Gets the width of the register in bits, if it has one in this model.
    pub fn width(self) -> Option<u32> {
        if self <= Register::RIP { Some(64) }
        else if self <= Register::R15D { Some(32) }
        else { None }
    }
}
impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[test]
fn test_register_width() {
    assert_eq!(Register::RAX.width(), Some(64));
    assert_eq!(Register::R15.width(), Some(64));
    assert_eq!(Register::RIP.width(), Some(64));
    assert_eq!(Register::EAX.width(), Some(32));
    assert_eq!(Register::R15D.width(), Some(32));
    assert_eq!(Register::AX.width(), None);
    assert_eq!(Register::SPL.width(), None);
    assert_eq!(Register::SIZED_COUNT, 33);
}

/// A memory reference of the form `disp(base,index,scale)`.
///
/// Every field is optional on its own, though the decoder always provides a base.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Memory {
    pub base: Option<Register>,
    pub index: Option<Register>,
    pub scale: Option<u8>,
    pub displacement: Option<i64>,
}
impl fmt::Display for Memory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(disp) = self.displacement {
            if disp < 0 { write!(f, "-{:#x}", (disp as i128).abs())?; }
            else { write!(f, "{:#x}", disp)?; }
        }
        f.write_str("(")?;
        if let Some(base) = self.base { write!(f, "{}", base)?; }
        if let Some(index) = self.index {
            write!(f, ",{},{}", index, self.scale.unwrap_or(1))?;
        }
        f.write_str(")")
    }
}

/// The kinds of [`Operand`], used for shape errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperandKind {
    Register,
    Immediate,
    Memory,
    Address,
}
impl fmt::Display for OperandKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            OperandKind::Register => "register",
            OperandKind::Immediate => "immediate",
            OperandKind::Memory => "memory",
            OperandKind::Address => "address",
        })
    }
}

/// A set of accepted operand kinds, displayed as e.g. `register or immediate`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Expected(pub &'static [OperandKind]);
impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", Punctuated::or(self.0))
    }
}

/// A decoded instruction operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operand {
    Register(Register),
    /// An immediate value (`$` prefix in the listing).
    Immediate(i64),
    Memory(Memory),
    /// An absolute call/branch target.
    Address(u64),
}
impl Operand {
    pub fn kind(&self) -> OperandKind {
        match self {
            Operand::Register(_) => OperandKind::Register,
            Operand::Immediate(_) => OperandKind::Immediate,
            Operand::Memory(_) => OperandKind::Memory,
            Operand::Address(_) => OperandKind::Address,
        }
    }
}
impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Operand::Register(r) => write!(f, "{}", r),
            Operand::Immediate(v) => {
                if *v < 0 { write!(f, "$-{:#x}", (*v as i128).abs()) } else { write!(f, "${:#x}", v) }
            }
            Operand::Memory(m) => write!(f, "{}", m),
            Operand::Address(a) => write!(f, "{:x}", a),
        }
    }
}

/// A single decoded listing line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub address: u64,
    /// The raw machine bytes, in listing order.
    pub bytes: Vec<u8>,
    pub mnemonic: Mnemonic,
    /// Absent for mnemonics that carry no operand text (e.g. `endbr64`, `ret`, padding).
    pub operands: Option<Vec<Operand>>,
}
impl Instruction {
    /// Gets the length of the instruction in bytes.
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
/// Formats the instruction as a listing line, which can be decoded again.
/// Branch targets are written indirectly (`*`) when they are not absolute addresses.
impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:x}:\t", self.address)?;
        for (i, b) in self.bytes.iter().enumerate() {
            if i != 0 { f.write_str(" ")?; }
            write!(f, "{:02x}", b)?;
        }
        if self.mnemonic == Mnemonic::PADDING { return Ok(()); }
        write!(f, "\t{}", self.mnemonic)?;
        if let Some(ops) = &self.operands {
            if !ops.is_empty() { f.write_str(" ")?; }
            for (i, op) in ops.iter().enumerate() {
                if i != 0 { f.write_str(",")?; }
                if self.mnemonic.is_branch() && op.kind() != OperandKind::Address { f.write_str("*")?; }
                write!(f, "{}", op)?;
            }
        }
        Ok(())
    }
}

/// A named function and its instructions in listing order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub instructions: Vec<Instruction>,
}

/// A linked program for use by the [`Emulator`].
///
/// Programs are produced by [`link`] by indexing one or more [`Function`] by address.
///
/// [`Emulator`]: ../exec/struct.Emulator.html
/// [`link`]: ../decode/fn.link.html
#[derive(Clone, Debug, Default)]
pub struct Program {
    pub(crate) instructions: BTreeMap<u64, Instruction>,
    pub(crate) symbols: BTreeMap<String, u64>,
}
impl Program {
    /// Gets the instruction at the given address.
    pub fn get(&self, address: u64) -> Option<&Instruction> {
        self.instructions.get(&address)
    }
    /// Gets the entry address of the named function.
    pub fn symbol(&self, name: &str) -> Option<u64> {
        self.symbols.get(name).copied()
    }
    pub fn len(&self) -> usize {
        self.instructions.len()
    }
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
    /// Iterates over the instructions in address order.
    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.values()
    }
}
