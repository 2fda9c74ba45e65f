//! Everything pertaining to executing decoded instructions.
//!
//! [`CPU`] holds the machine state and has one handler per supported mnemonic.
//! Every handler validates the shape of its operands before it mutates any state,
//! so a failed instruction leaves the CPU exactly as it was.
//! [`Emulator`] drives a CPU through a linked [`Program`](crate::Program).

use std::fmt;

use crate::common::{Expected, Instruction, Memory as MemoryOperand, Mnemonic, Operand, OperandKind, Register};

pub mod registers;
pub mod memory;
mod emulator;

use registers::*;
use memory::*;
pub use emulator::*;

/// Identifies an operand position for error reporting.
/// Single-operand instructions report their operand as the left-hand side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}
impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Side::Left => "left-hand",
            Side::Right => "right-hand",
        })
    }
}

/// Reasons why an error can happen during execution.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    #[error("{0} instruction does not contain any operands")]
    MissingOperands(Mnemonic),
    #[error("{mnemonic} instruction expects {expected} operand(s) but contains {found}")]
    OperandCount { mnemonic: Mnemonic, expected: usize, found: usize },
    #[error("{mnemonic} instruction does not take operands")]
    UnexpectedOperands { mnemonic: Mnemonic },
    #[error("{mnemonic} instruction {side} operand not handled (expected {expected})")]
    WrongOperand { mnemonic: Mnemonic, side: Side, expected: Expected },

    #[error("unsupported register {0}")]
    UnsupportedRegister(Register),
    #[error("register {0} has no defined width")]
    NoRegisterWidth(Register),

    #[error("stack underflow")]
    StackUnderflow,
    #[error("stack overflow")]
    StackOverflow,

    #[error("{0} instruction memory operand has no base register")]
    MemoryMissingBase(Mnemonic),
    #[error("{0} instruction memory operand has no displacement")]
    MemoryMissingDisplacement(Mnemonic),

    #[error("no handler for {0} instruction")]
    UnhandledMnemonic(Mnemonic),
    #[error("unknown entry point '{0}'")]
    UnknownEntryPoint(String),
}

const REGISTER: Expected = Expected(&[OperandKind::Register]);
const IMMEDIATE: Expected = Expected(&[OperandKind::Immediate]);
const MEMORY: Expected = Expected(&[OperandKind::Memory]);
const ADDRESS: Expected = Expected(&[OperandKind::Address]);
const REGISTER_OR_IMMEDIATE: Expected = Expected(&[OperandKind::Register, OperandKind::Immediate]);
const ADDRESS_OR_REGISTER: Expected = Expected(&[OperandKind::Address, OperandKind::Register]);

/// Truncates a value to the given width (in bits), which is then zero extended to 64-bit.
fn truncate(val: u64, width: u32) -> u64 {
    match width {
        8 => val as u8 as u64,
        16 => val as u16 as u64,
        32 => val as u32 as u64,
        _ => val,
    }
}
/// Sign extends a value of the given initial width (in bits) to 64-bit.
/// Bits outside the specified width are ignored.
fn sign_extend(val: u64, width: u32) -> u64 {
    match width {
        8 => val as i8 as u64,
        16 => val as i16 as u64,
        32 => val as i32 as u64,
        _ => val,
    }
}
#[test]
fn test_truncate_sign_extend() {
    assert_eq!(truncate(0x1234_5678_9abc_def0, 8), 0xf0);
    assert_eq!(truncate(0x1234_5678_9abc_def0, 32), 0x9abc_def0);
    assert_eq!(truncate(0x1234_5678_9abc_def0, 64), 0x1234_5678_9abc_def0);
    assert_eq!(sign_extend(0x80, 8), 0xffff_ffff_ffff_ff80);
    assert_eq!(sign_extend(0x7f, 8), 0x7f);
    assert_eq!(sign_extend(0x1_8000_0000, 32), 0xffff_ffff_8000_0000);
    assert_eq!(sign_extend(0x8000_0000_0000_0000, 64), 0x8000_0000_0000_0000);
}

/// Gets the operand list of the instruction, which must hold exactly `count` operands.
fn operands(instr: &Instruction, count: usize) -> Result<&[Operand], ExecError> {
    match instr.operands.as_deref() {
        None | Some([]) => Err(ExecError::MissingOperands(instr.mnemonic)),
        Some(ops) if ops.len() != count => Err(ExecError::OperandCount { mnemonic: instr.mnemonic, expected: count, found: ops.len() }),
        Some(ops) => Ok(ops),
    }
}

macro_rules! expect_operand {
    ($instr:ident, $op:expr, $side:ident => $variant:ident : $expected:ident) => {
        match $op {
            Operand::$variant(v) => v,
            _ => return Err(ExecError::WrongOperand { mnemonic: $instr.mnemonic, side: Side::$side, expected: $expected }),
        }
    }
}

/// The state of the emulated processor.
#[derive(Clone, Debug)]
pub struct CPU {
    regs: [CPURegister; Register::SIZED_COUNT],
    pub flags: Flags,
    pub stack: Stack,
    pub memory: Memory,
}
impl Default for CPU {
    fn default() -> Self {
        Self::new(None)
    }
}
impl CPU {
    /// Creates a new CPU with zeroed registers and flags.
    /// `max_stack`, if provided, limits the number of bytes the stack can hold.
    pub fn new(max_stack: Option<usize>) -> Self {
        Self {
            regs: [CPURegister::default(); Register::SIZED_COUNT], // arrays this large don't impl Default
            flags: Flags::default(),
            stack: Stack::with_limit(max_stack),
            memory: Memory::default(),
        }
    }

    /// Gets the width of the register in bits.
    /// Fails for registers that have no defined width.
    pub fn register_width(reg: Register) -> Result<u32, ExecError> {
        reg.width().ok_or(ExecError::NoRegisterWidth(reg))
    }

    /// Gets the value of a register, masked to its width.
    pub fn get(&self, reg: Register) -> Result<u64, ExecError> {
        let width = reg.width().ok_or(ExecError::UnsupportedRegister(reg))?;
        Ok(self.regs[reg as usize].get_width(width))
    }
    /// Sets the value of a register.
    /// 32-bit registers store the low 32 bits of `value`, zero extended.
    pub fn set(&mut self, reg: Register, value: u64) -> Result<(), ExecError> {
        let width = reg.width().ok_or(ExecError::UnsupportedRegister(reg))?;
        self.regs[reg as usize].set_width(width, value);
        Ok(())
    }

    pub fn get_instruction_pointer(&self) -> u64 {
        self.regs[Register::RIP as usize].get_x64()
    }
    pub fn set_instruction_pointer(&mut self, value: u64) {
        self.regs[Register::RIP as usize].set_x64(value);
    }
    /// Advances the instruction pointer by the given number of bytes.
    pub fn increment_instruction_pointer(&mut self, by: u64) {
        let ip = self.get_instruction_pointer();
        self.set_instruction_pointer(ip.wrapping_add(by));
    }

    /// Resets all registers, flags, stack, and memory to zero/empty.
    pub fn reset(&mut self) {
        for reg in self.regs.iter_mut() {
            reg.0 = 0;
        }
        self.flags = Flags::default();
        self.stack.clear();
        self.memory.clear();
    }

    /// Computes `base + displacement (+ index * scale)`.
    /// Base and displacement are both required.
    fn effective_address(&self, mnemonic: Mnemonic, mem: &MemoryOperand) -> Result<u64, ExecError> {
        let base = mem.base.ok_or(ExecError::MemoryMissingBase(mnemonic))?;
        let disp = mem.displacement.ok_or(ExecError::MemoryMissingDisplacement(mnemonic))?;

        let mut res = self.get(base)?.wrapping_add(disp as u64);
        if let Some(index) = mem.index {
            let scale = mem.scale.unwrap_or(1) as u64;
            res = res.wrapping_add(self.get(index)?.wrapping_mul(scale));
        }
        Ok(res)
    }

    // -------------------------------------------------------------------------------------

    /// Executes a single instruction.
    /// Control flow instructions manage the instruction pointer themselves; the caller is responsible for advancing it otherwise.
    pub fn execute(&mut self, instr: &Instruction) -> Result<(), ExecError> {
        match instr.mnemonic {
            Mnemonic::ADD => self.exec_add(instr),
            Mnemonic::SUB => self.exec_sub(instr),
            Mnemonic::XOR => self.exec_xor(instr),
            Mnemonic::MOV => self.exec_mov(instr),
            Mnemonic::MOVB => self.exec_movb(instr),
            Mnemonic::CMP => self.exec_cmp(instr),
            Mnemonic::TEST => self.exec_test(instr),
            Mnemonic::LEA => self.exec_lea(instr),
            Mnemonic::SAR => self.exec_sar(instr),
            Mnemonic::SHR => self.exec_shr(instr),

            Mnemonic::PUSH => self.exec_push(instr),
            Mnemonic::POP => self.exec_pop(instr),

            Mnemonic::CALL => self.exec_call(instr),
            Mnemonic::RET => self.exec_ret(instr),
            Mnemonic::JMP => self.exec_jmp(instr),
            Mnemonic::JE => self.exec_je(instr),
            Mnemonic::JNE => self.exec_jne(instr),

            Mnemonic::ENDBR64 | Mnemonic::NOPL | Mnemonic::NOPW | Mnemonic::PADDING | Mnemonic::HLT => Ok(()),

            Mnemonic::AND | Mnemonic::CMPB | Mnemonic::CMPQ => Err(ExecError::UnhandledMnemonic(instr.mnemonic)),
        }
    }

    /// `add $imm, %reg`
    pub fn exec_add(&mut self, instr: &Instruction) -> Result<(), ExecError> {
        let ops = operands(instr, 2)?;
        let imm = *expect_operand!(instr, &ops[0], Left => Immediate: IMMEDIATE);
        let reg = *expect_operand!(instr, &ops[1], Right => Register: REGISTER);

        let val = self.get(reg)?;
        self.set(reg, val.wrapping_add(imm as u64))
    }
    /// `sub $imm, %reg`
    pub fn exec_sub(&mut self, instr: &Instruction) -> Result<(), ExecError> {
        let ops = operands(instr, 2)?;
        let imm = *expect_operand!(instr, &ops[0], Left => Immediate: IMMEDIATE);
        let reg = *expect_operand!(instr, &ops[1], Right => Register: REGISTER);

        let val = self.get(reg)?;
        self.set(reg, val.wrapping_sub(imm as u64))
    }
    /// `xor %a, %b` stores `a ^ b` into `a`.
    pub fn exec_xor(&mut self, instr: &Instruction) -> Result<(), ExecError> {
        let ops = operands(instr, 2)?;
        let lhs = *expect_operand!(instr, &ops[0], Left => Register: REGISTER);
        let rhs = *expect_operand!(instr, &ops[1], Right => Register: REGISTER);

        let res = self.get(lhs)? ^ self.get(rhs)?;
        self.set(lhs, res)
    }
    /// `mov %src, %dest` or `mov $imm, %dest`
    pub fn exec_mov(&mut self, instr: &Instruction) -> Result<(), ExecError> {
        let ops = operands(instr, 2)?;
        let dest = *expect_operand!(instr, &ops[1], Right => Register: REGISTER);
        let val = match ops[0] {
            Operand::Register(src) => self.get(src)?,
            Operand::Immediate(imm) => imm as u64,
            _ => return Err(ExecError::WrongOperand { mnemonic: instr.mnemonic, side: Side::Left, expected: REGISTER_OR_IMMEDIATE }),
        };
        self.set(dest, val)
    }
    /// `movb %src, disp(base)` or `movb $imm, disp(base)` stores a single byte into memory.
    pub fn exec_movb(&mut self, instr: &Instruction) -> Result<(), ExecError> {
        let ops = operands(instr, 2)?;
        let mem = expect_operand!(instr, &ops[1], Right => Memory: MEMORY);
        let val = match ops[0] {
            Operand::Register(src) => self.get(src)?,
            Operand::Immediate(imm) => imm as u64,
            _ => return Err(ExecError::WrongOperand { mnemonic: instr.mnemonic, side: Side::Left, expected: REGISTER_OR_IMMEDIATE }),
        };
        let address = self.effective_address(instr.mnemonic, mem)?;
        self.memory.set_u8(address, truncate(val, 8) as u8);
        Ok(())
    }
    /// `cmp %a, %b` sets flags for `a - b`.
    pub fn exec_cmp(&mut self, instr: &Instruction) -> Result<(), ExecError> {
        let ops = operands(instr, 2)?;
        let lhs = *expect_operand!(instr, &ops[0], Left => Register: REGISTER);
        let rhs = *expect_operand!(instr, &ops[1], Right => Register: REGISTER);

        let (lhs, rhs) = (self.get(lhs)?, self.get(rhs)?);
        let diff = lhs.wrapping_sub(rhs);

        self.flags.assign_zf(diff == 0);
        self.flags.assign_sf((diff as i64) < 0);
        self.flags.assign_cf(lhs < rhs);
        self.flags.assign_of(((lhs ^ rhs) & (lhs ^ diff)) >> 63 != 0);
        Ok(())
    }
    /// `test %a, %b` sets flags for `a & b`.
    pub fn exec_test(&mut self, instr: &Instruction) -> Result<(), ExecError> {
        let ops = operands(instr, 2)?;
        let lhs = *expect_operand!(instr, &ops[0], Left => Register: REGISTER);
        let rhs = *expect_operand!(instr, &ops[1], Right => Register: REGISTER);

        let res = self.get(lhs)? & self.get(rhs)?;

        self.flags.assign_zf(res == 0);
        self.flags.assign_sf((res as i64) < 0);
        self.flags.clear_cf();
        self.flags.clear_of();
        Ok(())
    }
    /// `lea disp(base[,index,scale]), %dest` stores the effective address (no memory access).
    pub fn exec_lea(&mut self, instr: &Instruction) -> Result<(), ExecError> {
        let ops = operands(instr, 2)?;
        let mem = expect_operand!(instr, &ops[0], Left => Memory: MEMORY);
        let dest = *expect_operand!(instr, &ops[1], Right => Register: REGISTER);

        let address = self.effective_address(instr.mnemonic, mem)?;
        self.set(dest, address)
    }
    /// `sar $count, %reg` (arithmetic shift, count masked to 6 bits)
    pub fn exec_sar(&mut self, instr: &Instruction) -> Result<(), ExecError> {
        let ops = operands(instr, 2)?;
        let count = *expect_operand!(instr, &ops[0], Left => Immediate: IMMEDIATE);
        let reg = *expect_operand!(instr, &ops[1], Right => Register: REGISTER);

        let width = Self::register_width(reg)?;
        let val = sign_extend(self.get(reg)?, width) as i64;
        self.set(reg, (val >> (count & 63)) as u64)
    }
    /// `shr $count, %reg` (logical shift, count masked to 6 bits)
    pub fn exec_shr(&mut self, instr: &Instruction) -> Result<(), ExecError> {
        let ops = operands(instr, 2)?;
        let count = *expect_operand!(instr, &ops[0], Left => Immediate: IMMEDIATE);
        let reg = *expect_operand!(instr, &ops[1], Right => Register: REGISTER);

        let val = self.get(reg)?;
        self.set(reg, val >> (count & 63))
    }

    /// Pushes the full width of a register.
    pub fn exec_push(&mut self, instr: &Instruction) -> Result<(), ExecError> {
        let ops = operands(instr, 1)?;
        let reg = *expect_operand!(instr, &ops[0], Left => Register: REGISTER);

        let width = Self::register_width(reg)?;
        let val = self.get(reg)?;
        self.stack.push_value(val, width as usize / 8)
    }
    /// Pops the full width of a register.
    pub fn exec_pop(&mut self, instr: &Instruction) -> Result<(), ExecError> {
        let ops = operands(instr, 1)?;
        let reg = *expect_operand!(instr, &ops[0], Left => Register: REGISTER);

        let width = Self::register_width(reg)?;
        let val = self.stack.pop_value(width as usize / 8)?;
        self.set(reg, val)
    }

    /// Gets the target of a jmp/call, which is either an absolute address or the value of a register.
    fn branch_target(&self, instr: &Instruction) -> Result<u64, ExecError> {
        let ops = operands(instr, 1)?;
        match ops[0] {
            Operand::Address(target) => Ok(target),
            Operand::Register(reg) => self.get(reg),
            _ => Err(ExecError::WrongOperand { mnemonic: instr.mnemonic, side: Side::Left, expected: ADDRESS_OR_REGISTER }),
        }
    }
    /// Pushes the address of the next instruction (8 bytes) and jumps to the target.
    pub fn exec_call(&mut self, instr: &Instruction) -> Result<(), ExecError> {
        let target = self.branch_target(instr)?;
        self.stack.push_u64(instr.address.wrapping_add(instr.len()))?;
        self.set_instruction_pointer(target);
        Ok(())
    }
    /// Pops an 8 byte return address into the instruction pointer.
    pub fn exec_ret(&mut self, instr: &Instruction) -> Result<(), ExecError> {
        if let Some(ops) = &instr.operands {
            if !ops.is_empty() { return Err(ExecError::UnexpectedOperands { mnemonic: instr.mnemonic }); }
        }
        let target = self.stack.pop_u64()?;
        self.set_instruction_pointer(target);
        Ok(())
    }
    pub fn exec_jmp(&mut self, instr: &Instruction) -> Result<(), ExecError> {
        let target = self.branch_target(instr)?;
        self.set_instruction_pointer(target);
        Ok(())
    }

    fn exec_jcc(&mut self, instr: &Instruction, condition: bool) -> Result<(), ExecError> {
        let ops = operands(instr, 1)?;
        let target = *expect_operand!(instr, &ops[0], Left => Address: ADDRESS);

        if condition { self.set_instruction_pointer(target); }
        else { self.increment_instruction_pointer(instr.len()); }
        Ok(())
    }
    /// Jumps if the zero flag is set; otherwise advances past the instruction.
    pub fn exec_je(&mut self, instr: &Instruction) -> Result<(), ExecError> {
        self.exec_jcc(instr, self.flags.condition_e())
    }
    /// Jumps if the zero flag is clear; otherwise advances past the instruction.
    pub fn exec_jne(&mut self, instr: &Instruction) -> Result<(), ExecError> {
        self.exec_jcc(instr, self.flags.condition_ne())
    }
}
