pub mod error;
pub mod program;
pub mod memory;
pub mod decode;
pub mod port;
pub mod stream;
pub mod vm;
pub mod amplifier;
pub mod arcade;
pub mod drone;

pub use error::{Fault, LoadError, ParseError};
pub use program::Program;
pub use memory::MemoryBank;
pub use decode::{Mode, Opcode};
pub use port::{BatchPort, Port};
pub use stream::{Link, StreamPort};
pub use vm::{execute, Snapshot, State, Verbosity, Vm, VmConfig};
