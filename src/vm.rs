use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter};
use std::path::Path;
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span, trace, warn};
use uuid::Uuid;

use crate::decode::{self, Mode, Opcode};
use crate::error::Fault;
use crate::memory::MemoryBank;
use crate::port::{BatchPort, Port};
use crate::program::Program;

/// How much of its own activity an instance reports. Each level includes the
/// ones below it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    #[default]
    Quiet,
    Io,
    Instructions,
    Memory,
}

impl Verbosity {
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => Verbosity::Quiet,
            1 => Verbosity::Io,
            2 => Verbosity::Instructions,
            _ => Verbosity::Memory,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    pub verbosity: Verbosity,
    /// Highest number of memory cells an instance may grow to. `None` is unbounded.
    pub memory_limit: Option<usize>,
}

impl VmConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        let config = serde_json::from_reader(BufReader::new(file))?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum State {
    Running,
    AwaitingInput,
    Halted,
    Faulted(Fault),
}

impl State {
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Halted | State::Faulted(_))
    }

    pub fn fault(&self) -> Option<Fault> {
        match self {
            State::Faulted(fault) => Some(*fault),
            _ => None,
        }
    }
}

/// Point-in-time copy of an instance, for dumps and post-mortems.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: Uuid,
    pub pc: usize,
    pub base: i64,
    pub steps: u64,
    pub state: State,
    pub memory: Vec<i64>,
}

impl Snapshot {
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }
}

/// One executor instance. Owns its memory, program counter and relative base;
/// nothing in here is shared with other instances.
pub struct Vm {
    id: Uuid,
    memory: MemoryBank,
    pc: usize,
    base: i64,
    state: State,
    steps: u64,
    config: VmConfig,
}

impl Vm {
    pub fn new(program: &Program, config: VmConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            memory: MemoryBank::new(program.code()).with_limit(config.memory_limit),
            pc: 0,
            base: 0,
            state: State::Running,
            steps: 0,
            config,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn base(&self) -> i64 {
        self.base
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn memory(&self) -> &MemoryBank {
        &self.memory
    }

    pub fn peek(&self, addr: i64) -> Result<i64, Fault> {
        self.memory.peek(addr)
    }

    /// Patches memory before (or between) steps.
    pub fn poke(&mut self, addr: i64, value: i64) -> Result<(), Fault> {
        self.memory.set(addr, value)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            id: self.id,
            pc: self.pc,
            base: self.base,
            steps: self.steps,
            state: self.state,
            memory: self.memory.as_slice().to_vec(),
        }
    }

    /// Runs until `Halted` or `Faulted`. An input the port cannot supply is
    /// fatal here; hosts that feed values between steps use [`Vm::step`].
    pub fn run<P: Port + ?Sized>(&mut self, port: &mut P) -> State {
        let span = debug_span!("vm", id = %self.id);
        let _guard = span.enter();

        loop {
            match self.step(port) {
                State::Running => continue,
                State::AwaitingInput => {
                    let fault = Fault::InputExhausted;
                    warn!(pc = self.pc, %fault, "faulted");
                    self.state = State::Faulted(fault);
                    return self.state;
                }
                terminal => return terminal,
            }
        }
    }

    /// Executes at most one instruction. Returns `AwaitingInput` without
    /// moving `pc` when the port has no value yet; terminal states are sticky.
    pub fn step<P: Port + ?Sized>(&mut self, port: &mut P) -> State {
        if self.state.is_terminal() {
            return self.state;
        }
        self.state = match self.execute_instruction(port) {
            Ok(state) => state,
            Err(fault) => {
                warn!(id = %self.id, pc = self.pc, %fault, "faulted");
                State::Faulted(fault)
            }
        };
        self.state
    }

    /// Moves the instance onto its own thread. The port is dropped when the
    /// run ends, which hangs up on whatever is connected to it.
    pub fn spawn<P: Port + Send + 'static>(mut self, mut port: P) -> JoinHandle<Vm> {
        thread::spawn(move || {
            self.run(&mut port);
            self
        })
    }

    fn execute_instruction<P: Port + ?Sized>(&mut self, port: &mut P) -> Result<State, Fault> {
        let word = self.memory.get(self.pc as i64)?;
        let code = decode::opcode_digits(word);
        let op = Opcode::from_i64(code).ok_or(Fault::UnknownOpcode {
            word,
            opcode: code,
            pc: self.pc,
        })?;

        if self.config.verbosity >= Verbosity::Instructions {
            trace!(
                id = %self.id,
                pc = self.pc,
                base = self.base,
                word,
                op = op.mnemonic(),
                "exec"
            );
        }

        match op {
            Opcode::Add | Opcode::Multiply | Opcode::LessThan | Opcode::Equals => {
                let a = self.param(word, 1)?;
                let b = self.param(word, 2)?;
                let dst = self.dest(word, 3)?;
                let value = match op {
                    Opcode::Add => a.wrapping_add(b),
                    Opcode::Multiply => a.wrapping_mul(b),
                    Opcode::LessThan => (a < b) as i64,
                    _ => (a == b) as i64,
                };
                self.store(dst, value)?;
            }
            Opcode::Input => {
                let dst = self.dest(word, 1)?;
                self.state = State::AwaitingInput;
                port.input_wanted()?;
                let Some(value) = port.input()? else {
                    return Ok(State::AwaitingInput);
                };
                if self.config.verbosity >= Verbosity::Io {
                    debug!(id = %self.id, value, dst, "in");
                }
                self.store(dst, value)?;
            }
            Opcode::Output => {
                let value = self.param(word, 1)?;
                if self.config.verbosity >= Verbosity::Io {
                    debug!(id = %self.id, value, "out");
                }
                port.output(value)?;
            }
            Opcode::JumpIfTrue | Opcode::JumpIfFalse => {
                let test = self.param(word, 1)?;
                let target = self.param(word, 2)?;
                if (test != 0) == (op == Opcode::JumpIfTrue) {
                    self.pc = usize::try_from(target).map_err(|_| Fault::AddressNegative(target))?;
                    self.steps += 1;
                    return Ok(State::Running);
                }
            }
            Opcode::AdjustBase => {
                let offset = self.param(word, 1)?;
                self.base = self.base.wrapping_add(offset);
            }
            Opcode::Halt => {
                self.steps += 1;
                debug!(id = %self.id, pc = self.pc, steps = self.steps, "halted");
                return Ok(State::Halted);
            }
        }

        self.pc += 1 + op.arity();
        self.steps += 1;
        Ok(State::Running)
    }

    /// Value of parameter `position` of the current instruction.
    fn param(&mut self, word: i64, position: u32) -> Result<i64, Fault> {
        let raw = self.memory.get(self.pc as i64 + position as i64)?;
        let value = match decode::mode_of(word, position)? {
            Mode::Position => self.memory.get(raw)?,
            Mode::Immediate => raw,
            Mode::Relative => self.memory.get(self.base.wrapping_add(raw))?,
        };
        Ok(value)
    }

    /// Destination address of parameter `position`. Immediate mode cannot be written through.
    fn dest(&mut self, word: i64, position: u32) -> Result<i64, Fault> {
        let raw = self.memory.get(self.pc as i64 + position as i64)?;
        match decode::mode_of(word, position)? {
            Mode::Position => Ok(raw),
            Mode::Relative => Ok(self.base.wrapping_add(raw)),
            Mode::Immediate => Err(Fault::InvalidWriteMode {
                position,
                pc: self.pc,
            }),
        }
    }

    fn store(&mut self, addr: i64, value: i64) -> Result<(), Fault> {
        if self.config.verbosity >= Verbosity::Memory {
            trace!(id = %self.id, addr, value, "store");
        }
        self.memory.set(addr, value)
    }
}

/// One-shot batch run: feeds `inputs`, returns every output once the program halts.
pub fn execute<I: IntoIterator<Item = i64>>(program: &Program, inputs: I) -> Result<Vec<i64>, Fault> {
    let mut vm = Vm::new(program, VmConfig::default());
    let mut port = BatchPort::new(inputs);
    match vm.run(&mut port).fault() {
        Some(fault) => Err(fault),
        None => Ok(port.into_outputs()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(text: &str) -> Program {
        Program::parse(text).unwrap()
    }

    #[test]
    fn add_then_halt() {
        let mut vm = Vm::new(&program("1,0,0,0,99"), VmConfig::default());
        assert_eq!(vm.run(&mut BatchPort::default()), State::Halted);
        assert_eq!(vm.peek(0), Ok(2));
        assert_eq!(vm.steps(), 2);
        assert_eq!(vm.pc(), 4);
    }

    #[test]
    fn step_waits_for_input_without_moving() {
        let mut vm = Vm::new(&program("3,7,4,7,99"), VmConfig::default());
        let mut port = BatchPort::default();

        assert_eq!(vm.step(&mut port), State::AwaitingInput);
        assert_eq!(vm.step(&mut port), State::AwaitingInput);
        assert_eq!(vm.pc(), 0);

        port.push_input(31);
        assert_eq!(vm.step(&mut port), State::Running);
        assert_eq!(vm.step(&mut port), State::Running);
        assert_eq!(vm.step(&mut port), State::Halted);
        assert_eq!(port.outputs(), &[31]);
    }

    #[test]
    fn run_treats_missing_input_as_fault() {
        let mut vm = Vm::new(&program("3,0,99"), VmConfig::default());
        assert_eq!(
            vm.run(&mut BatchPort::default()),
            State::Faulted(Fault::InputExhausted)
        );
    }

    #[test]
    fn terminal_state_is_sticky() {
        let mut vm = Vm::new(&program("99"), VmConfig::default());
        let mut port = BatchPort::default();
        assert_eq!(vm.step(&mut port), State::Halted);
        assert_eq!(vm.step(&mut port), State::Halted);
        assert_eq!(vm.steps(), 1);
    }

    #[test]
    fn unknown_opcode_faults() {
        let mut vm = Vm::new(&program("1,0,0,0,42"), VmConfig::default());
        assert_eq!(
            vm.run(&mut BatchPort::default()),
            State::Faulted(Fault::UnknownOpcode {
                word: 42,
                opcode: 42,
                pc: 4
            })
        );
    }

    #[test]
    fn running_off_the_end_reads_zero_opcode() {
        let mut vm = Vm::new(&program("1101,1,1,5"), VmConfig::default());
        assert!(matches!(
            vm.run(&mut BatchPort::default()),
            State::Faulted(Fault::UnknownOpcode { opcode: 0, pc: 4, .. })
        ));
    }

    #[test]
    fn immediate_destination_faults() {
        let mut vm = Vm::new(&program("11101,1,1,5,99"), VmConfig::default());
        assert_eq!(
            vm.run(&mut BatchPort::default()),
            State::Faulted(Fault::InvalidWriteMode { position: 3, pc: 0 })
        );
    }

    #[test]
    fn negative_relative_address_faults() {
        // arb -5, then read relative 0
        let mut vm = Vm::new(&program("109,-5,204,0,99"), VmConfig::default());
        assert_eq!(
            vm.run(&mut BatchPort::default()),
            State::Faulted(Fault::AddressNegative(-5))
        );
    }

    #[test]
    fn negative_jump_target_faults() {
        let mut vm = Vm::new(&program("1105,1,-3,99"), VmConfig::default());
        assert_eq!(
            vm.run(&mut BatchPort::default()),
            State::Faulted(Fault::AddressNegative(-3))
        );
    }

    #[test]
    fn memory_limit_from_config() {
        let config = VmConfig {
            memory_limit: Some(64),
            ..VmConfig::default()
        };
        let mut vm = Vm::new(&program("1101,1,1,1000,99"), config);
        assert_eq!(
            vm.run(&mut BatchPort::default()),
            State::Faulted(Fault::MemoryLimit {
                addr: 1000,
                limit: 64
            })
        );
    }

    #[test]
    fn poke_before_run() {
        let mut vm = Vm::new(&program("4,0,99"), VmConfig::default());
        vm.poke(0, 104).unwrap();
        let mut port = BatchPort::default();
        vm.run(&mut port);
        assert_eq!(port.outputs(), &[0]);
    }

    #[test]
    fn snapshot_reflects_state() {
        let mut vm = Vm::new(&program("109,19,99"), VmConfig::default());
        vm.run(&mut BatchPort::default());
        let snap = vm.snapshot();
        assert_eq!(snap.id, vm.id());
        assert_eq!(snap.base, 19);
        assert_eq!(snap.pc, 2);
        assert_eq!(snap.state, State::Halted);
        assert_eq!(snap.memory, vec![109, 19, 99]);
    }

    #[test]
    fn config_json_defaults_missing_fields() {
        let config: VmConfig = serde_json::from_str(r#"{"verbosity":"io"}"#).unwrap();
        assert_eq!(config.verbosity, Verbosity::Io);
        assert_eq!(config.memory_limit, None);
        assert!(Verbosity::Memory > Verbosity::Instructions);
        assert_eq!(Verbosity::from_level(7), Verbosity::Memory);
    }

    #[test]
    fn config_file_round_trip() {
        let path = std::env::temp_dir().join(format!("intcode-config-{}.json", Uuid::new_v4()));
        let config = VmConfig {
            verbosity: Verbosity::Instructions,
            memory_limit: Some(4096),
        };
        config.save_to_file(&path).unwrap();
        let loaded = VmConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn spawned_instance_returns_itself() {
        let vm = Vm::new(&program("104,5,99"), VmConfig::default());
        let handle = vm.spawn(BatchPort::default());
        let vm = handle.join().unwrap();
        assert_eq!(vm.state(), State::Halted);
    }
}
