use std::io;
use std::num::ParseIntError;

use serde::{Deserialize, Serialize};

/// Execution-time failures. Any of these moves the executor to `Faulted`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize, thiserror::Error)]
pub enum Fault {
    #[error("unknown opcode {opcode} in word {word} at pc {pc}")]
    UnknownOpcode { word: i64, opcode: i64, pc: usize },
    #[error("parameter {position} of word {word} has invalid mode")]
    InvalidMode { word: i64, position: u32 },
    #[error("immediate-mode parameter {position} used as write target at pc {pc}")]
    InvalidWriteMode { position: u32, pc: usize },
    #[error("negative address {0}")]
    AddressNegative(i64),
    #[error("address {addr} exceeds memory limit of {limit} cells")]
    MemoryLimit { addr: i64, limit: usize },
    #[error("input requested but none was supplied")]
    InputExhausted,
    #[error("peer disconnected")]
    Disconnected,
    #[error("pipeline produced no output")]
    NoOutput,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("program text is empty")]
    Empty,
    #[error("token {index} ({token:?}) is not an integer: {source}")]
    InvalidToken {
        index: usize,
        token: String,
        source: ParseIntError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("cannot read program: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Parse(#[from] ParseError),
}
