use crate::common::*;
use crate::decode::*;
use crate::decode::listing::*;

/// A trimmed-down `objdump -d` listing with several functions.
/// `main` calls `add_five(7)` and returns 1 because the result differs from the argument.
const LISTING: &str = "
a.out:     file format elf64-x86-64


Disassembly of section .init:

0000000000001000 <_init>:
    1000:\tf3 0f 1e fa          \tendbr64
    1004:\t48 83 ec 08          \tsub    $0x8,%rsp
    1008:\t48 8b 05 d9 2f 00 00 \tmov    0x2fd9(%rip),%rax        # 3fe8 <__gmon_start__@Base>
    100f:\t48 85 c0             \ttest   %rax,%rax
    1012:\t74 02                \tje     1016 <_init+0x16>
    1014:\tff d0                \tcall   *%rax
    1016:\t48 83 c4 08          \tadd    $0x8,%rsp
    101a:\tc3                   \tret

Disassembly of section .text:

0000000000001100 <frame_dummy>:
    1100:\tf3 0f 1e fa          \tendbr64
    1104:\te9 77 ff ff ff       \tjmp    1080 <register_tm_clones>
    1109:\t0f 1f 80 00 00 00 00 \tnopl   0x0(%rax)
    1110:\t66 2e 0f 1f 84 00 00 \tcs nopw 0x0(%rax,%rax,1)
    1117:\t00 00 00
    111a:\t66 0f 1f 44 00 00    \tnopw   0x0(%rax,%rax,1)

0000000000001129 <add_five>:
    1129:\tf3 0f 1e fa          \tendbr64
    112d:\t55                   \tpush   %rbp
    112e:\t48 89 e5             \tmov    %rsp,%rbp
    1131:\t48 89 f8             \tmov    %rdi,%rax
    1134:\t48 83 c0 05          \tadd    $0x5,%rax
    1138:\t5d                   \tpop    %rbp
    1139:\tc3                   \tret

000000000000113a <main>:
    113a:\tf3 0f 1e fa          \tendbr64
    113e:\t55                   \tpush   %rbp
    113f:\t48 89 e5             \tmov    %rsp,%rbp
    1142:\t48 c7 c7 07 00 00 00 \tmov    $0x7,%rdi
    1149:\te8 db ff ff ff       \tcall   1129 <add_five>
    114e:\t48 39 c7             \tcmp    %rax,%rdi
    1151:\t75 07                \tjne    115a <main+0x20>
    1153:\tb8 00 00 00 00       \tmov    $0x0,%eax
    1158:\teb 05                \tjmp    115f <main+0x25>
    115a:\tb8 01 00 00 00       \tmov    $0x1,%eax
    115f:\t5d                   \tpop    %rbp
    1160:\tc3                   \tret
";

/// Builds an instruction at address zero.
fn instr(mnemonic: Mnemonic, bytes: &[u8], operands: Option<Vec<Operand>>) -> Instruction {
    Instruction { address: 0, bytes: bytes.to_vec(), mnemonic, operands }
}

fn mem(base: Register, displacement: i64) -> Operand {
    Operand::Memory(Memory { base: Some(base), index: None, scale: None, displacement: Some(displacement) })
}

/// Extracts every named function from the listing and links them.
macro_rules! extract_link {
    ($listing:expr => $($name:expr),+) => {{
        let funcs: Vec<Function> = vec![$(extract_function($listing.as_bytes(), $name).unwrap()),+];
        link(funcs)
    }};
}
macro_rules! extract_link_unwrap {
    ($listing:expr => $($name:expr),+) => { extract_link!($listing => $($name),+).unwrap() };
}

mod listing_tests;
mod emulator_tests;
