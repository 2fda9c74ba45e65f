use super::*;
use crate::exec::*;

fn listing_program() -> Program {
    extract_link_unwrap!(LISTING => "_init", "frame_dummy", "add_five", "main")
}

#[test]
fn test_run_main() {
    let mut emu = Emulator::new(listing_program());
    assert_eq!(emu.get_state(), &State::Uninitialized);
    emu.init("main", &Default::default()).unwrap();
    assert_eq!(emu.get_state(), &State::Running);
    assert_eq!(emu.cpu.get_instruction_pointer(), 0x113a);
    assert_eq!(emu.cpu.stack.len(), 8);

    let (cycles, reason) = emu.execute_cycles(u64::MAX);
    assert_eq!(cycles, 17);
    assert_eq!(reason, StopReason::OutsideProgram(0));
    assert_eq!(emu.get_state(), &State::Exited(0));

    assert_eq!(emu.cpu.get(Register::RAX).unwrap(), 12); // add_five(7)
    assert_eq!(emu.cpu.get(Register::EAX).unwrap(), 1);
    assert!(!emu.cpu.flags.get_zf());
    assert!(emu.cpu.stack.is_empty());

    assert_eq!(emu.execute_cycles(10), (0, StopReason::NotRunning));
}

#[test]
fn test_resume() {
    let mut emu = Emulator::new(listing_program());
    emu.init("main", &Default::default()).unwrap();

    assert_eq!(emu.execute_cycles(5), (5, StopReason::MaxCycles)); // just executed the call
    assert_eq!(emu.cpu.get_instruction_pointer(), 0x1129);
    assert_eq!(emu.cpu.stack.len(), 24);

    assert_eq!(emu.execute_cycles(0), (0, StopReason::MaxCycles));
    assert_eq!(emu.execute_cycles(u64::MAX), (12, StopReason::OutsideProgram(0)));

    // re-initializing starts over with a fresh cpu
    emu.init("add_five", &EmulatorArgs { return_address: Some(0xdead), ..Default::default() }).unwrap();
    emu.cpu.set(Register::RDI, 100).unwrap();
    assert_eq!(emu.cpu.get(Register::EAX).unwrap(), 0);
    assert_eq!(emu.execute_cycles(u64::MAX), (7, StopReason::OutsideProgram(0xdead)));
    assert_eq!(emu.cpu.get(Register::RAX).unwrap(), 105);
}

#[test]
fn test_init_errors() {
    let mut emu = Emulator::new(listing_program());
    assert_eq!(emu.execute_cycles(1), (0, StopReason::NotRunning));
    assert_eq!(emu.init("puts", &Default::default()), Err(ExecError::UnknownEntryPoint("puts".into())));
    assert_eq!(emu.get_state(), &State::Uninitialized);

    assert_eq!(emu.init("main", &EmulatorArgs { max_stack: Some(4), ..Default::default() }), Err(ExecError::StackOverflow));
    assert_eq!(emu.get_state(), &State::Uninitialized);

    // room for the return address and one push
    emu.init("main", &EmulatorArgs { max_stack: Some(16), ..Default::default() }).unwrap();
    let (cycles, reason) = emu.execute_cycles(u64::MAX);
    assert_eq!(cycles, 4);
    assert_eq!(reason, StopReason::Error(ExecError::StackOverflow));
    assert_eq!(emu.get_state(), &State::Error(ExecError::StackOverflow));
    assert_eq!(emu.cpu.get_instruction_pointer(), 0x1149); // stopped on the failing call
}

#[test]
fn test_exec_error_stops() {
    // _init reads memory through %rip, which mov does not support
    let mut emu = Emulator::new(listing_program());
    emu.init("_init", &Default::default()).unwrap();
    let (cycles, reason) = emu.execute_cycles(u64::MAX);
    assert_eq!(cycles, 2);
    match reason {
        StopReason::Error(ExecError::WrongOperand { mnemonic: Mnemonic::MOV, side: Side::Left, .. }) => (),
        x => panic!("{:?}", x),
    }
    assert_eq!(emu.cpu.get_instruction_pointer(), 0x1008);
    assert_eq!(emu.execute_cycles(1), (0, StopReason::NotRunning));

    let program = link(vec![decode_function("
0000000000002000 <f>:
    2000:\t48 83 e0 0f          \tand    $0xf,%rax
").unwrap()]).unwrap();
    let mut emu = Emulator::new(program);
    emu.init("f", &Default::default()).unwrap();
    assert_eq!(emu.execute_cycles(u64::MAX), (0, StopReason::Error(ExecError::UnhandledMnemonic(Mnemonic::AND))));
}

#[test]
fn test_halt_and_padding() {
    let program = link(vec![decode_function("
0000000000002000 <spin>:
    2000:\tf4                   \thlt
    2001:\t00 00 00
    2004:\t0f 1f 40 00          \tnopl   0x0(%rax)
    2008:\tc3                   \tret
").unwrap()]).unwrap();
    let mut emu = Emulator::new(program);
    emu.init("spin", &Default::default()).unwrap();

    assert_eq!(emu.execute_cycles(u64::MAX), (1, StopReason::Halted));
    assert_eq!(emu.get_state(), &State::Running);
    assert_eq!(emu.cpu.get_instruction_pointer(), 0x2001);

    assert_eq!(emu.execute_cycles(u64::MAX), (3, StopReason::OutsideProgram(0)));
}

#[test]
fn test_fall_through() {
    // execution continues past the end of a function into whatever follows
    let program = link(vec![decode_function("
0000000000002000 <f>:
    2000:\t48 83 c0 01          \tadd    $0x1,%rax
    2004:\t48 83 c0 01          \tadd    $0x1,%rax
").unwrap()]).unwrap();
    let mut emu = Emulator::new(program);
    emu.init("f", &Default::default()).unwrap();
    assert_eq!(emu.execute_cycles(u64::MAX), (2, StopReason::OutsideProgram(0x2008)));
    assert_eq!(emu.cpu.get(Register::RAX).unwrap(), 2);
    assert_eq!(emu.program().len(), 2);
}

#[test]
fn test_randomize_registers() {
    let args = EmulatorArgs { randomize_registers: true, seed: Some(0x5eed), ..Default::default() };

    let mut a = Emulator::new(listing_program());
    let mut b = Emulator::new(listing_program());
    a.init("main", &args).unwrap();
    b.init("main", &args).unwrap();

    let regs = [Register::RAX, Register::RBX, Register::R12, Register::EDI, Register::R15D];
    for &r in regs.iter() {
        assert_eq!(a.cpu.get(r).unwrap(), b.cpu.get(r).unwrap());
    }
    assert!(regs.iter().any(|&r| a.cpu.get(r).unwrap() != 0));
    assert_eq!(a.cpu.get_instruction_pointer(), 0x113a);

    // the program result does not depend on the initial register state
    let (_, reason) = a.execute_cycles(u64::MAX);
    assert_eq!(reason, StopReason::OutsideProgram(0));
    assert_eq!(a.cpu.get(Register::EAX).unwrap(), 1);

    let mut c = Emulator::new(listing_program());
    c.init("main", &EmulatorArgs { randomize_registers: true, ..Default::default() }).unwrap();
    assert_eq!(c.cpu.get_instruction_pointer(), 0x113a);
}
