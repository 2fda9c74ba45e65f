use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;

use super::{CPU, ExecError};
use crate::common::{Mnemonic, Program};

/// Default max number of bytes the emulated stack can hold.
pub const DEFAULT_MAX_STACK: usize = 2 * 1024 * 1024;

/// Current state of an emulator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum State {
    /// The emulator has not been initialized with an entry point.
    Uninitialized,
    /// The emulator is still running.
    Running,
    /// Control left the program by transferring to the given address (e.g. the entry function returned).
    Exited(u64),
    /// The emulator terminated due to an error.
    Error(ExecError),
}

/// Reason why execution stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// Emulator was not in the running state.
    NotRunning,
    /// Emulator executed the requested number of cycles.
    MaxCycles,
    /// A `hlt` instruction was executed.
    /// The emulator is still running, and execution resumes after the `hlt`.
    Halted,
    /// The instruction pointer held an address with no instruction in the program.
    OutsideProgram(u64),
    /// An error was encountered during execution.
    /// For convenience, this variant stores the error,
    /// but it can also be accessed by testing the emulator state.
    Error(ExecError),
}

/// Holds options for initializing an emulator.
#[derive(Clone, Debug, Default)]
pub struct EmulatorArgs {
    /// Max number of bytes the stack can hold.
    /// If omitted, defaults to `DEFAULT_MAX_STACK`.
    pub max_stack: Option<usize>,
    /// If set, registers start with random content to simulate undefined state (otherwise zero).
    pub randomize_registers: bool,
    /// Seed for register randomization.
    /// If omitted, the generator is seeded from system entropy.
    pub seed: Option<u64>,
    /// Return address pushed before entry, so that the entry function's final `ret` leaves the program.
    /// If omitted, defaults to zero.
    pub return_address: Option<u64>,
}

/// Program emulator which runs a linked program.
pub struct Emulator {
    pub cpu: CPU,
    program: Program,
    state: State,
}
impl Emulator {
    /// Creates a new emulator for the program in the uninitialized state.
    pub fn new(program: Program) -> Emulator {
        Emulator {
            cpu: CPU::default(),
            program,
            state: State::Uninitialized,
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }
    /// Gets the current state of the emulator.
    pub fn get_state(&self) -> &State {
        &self.state
    }

    /// Initializes the emulator to run from the named function.
    /// The CPU is reset, the return address is pushed, and the instruction pointer is set to the entry.
    /// On failure, the emulator is left unmodified.
    pub fn init(&mut self, entry: &str, args: &EmulatorArgs) -> Result<(), ExecError> {
        let entry_address = self.program.symbol(entry).ok_or_else(|| ExecError::UnknownEntryPoint(entry.into()))?;

        let mut cpu = CPU::new(Some(args.max_stack.unwrap_or(DEFAULT_MAX_STACK)));

        // randomize register contents to simulate undefined content
        if args.randomize_registers {
            let mut rng = match args.seed {
                Some(seed) => XorShiftRng::seed_from_u64(seed),
                None => XorShiftRng::from_entropy(),
            };
            for reg in cpu.regs.iter_mut() {
                reg.0 = rng.gen();
            }
        }

        cpu.stack.push_u64(args.return_address.unwrap_or(0))?;
        cpu.set_instruction_pointer(entry_address);

        self.cpu = cpu;
        self.state = State::Running;
        Ok(())
    }

    /// Resumes execution of the emulator for up to the given number of cycles (instructions).
    /// Returns the number of cycles executed and the reason for stopping.
    pub fn execute_cycles(&mut self, cycles: u64) -> (u64, StopReason) {
        if self.state != State::Running { return (0, StopReason::NotRunning); }

        macro_rules! stop {
            ($self:ident => $state:expr, $reason:expr) => {{
                $self.state = $state;
                let reason = $reason;
                log::debug!("emulation stopped: {:?}", reason);
                reason
            }}
        }

        for cycle in 0..cycles {
            let ip = self.cpu.get_instruction_pointer();
            let instr = match self.program.get(ip) {
                None => return (cycle, stop!(self => State::Exited(ip), StopReason::OutsideProgram(ip))),
                Some(instr) => instr,
            };
            log::trace!("{:#x}: {}", ip, instr.mnemonic);

            if let Err(e) = self.cpu.execute(instr) {
                return (cycle, stop!(self => State::Error(e.clone()), StopReason::Error(e)));
            }
            if !instr.mnemonic.is_control_flow() {
                self.cpu.increment_instruction_pointer(instr.len());
            }
            if instr.mnemonic == Mnemonic::HLT {
                log::debug!("emulation stopped: {:?}", StopReason::Halted);
                return (cycle + 1, StopReason::Halted); // +1 because this cycle succeeded
            }
        }

        (cycles, StopReason::MaxCycles)
    }
}
