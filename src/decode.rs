use serde::{Deserialize, Serialize};

use crate::error::Fault;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i64)]
pub enum Opcode {
    Add = 1,
    Multiply = 2,
    Input = 3,
    Output = 4,
    JumpIfTrue = 5,
    JumpIfFalse = 6,
    LessThan = 7,
    Equals = 8,
    AdjustBase = 9,
    Halt = 99,
}

impl Opcode {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(Opcode::Add),
            2 => Some(Opcode::Multiply),
            3 => Some(Opcode::Input),
            4 => Some(Opcode::Output),
            5 => Some(Opcode::JumpIfTrue),
            6 => Some(Opcode::JumpIfFalse),
            7 => Some(Opcode::LessThan),
            8 => Some(Opcode::Equals),
            9 => Some(Opcode::AdjustBase),
            99 => Some(Opcode::Halt),
            _ => None,
        }
    }

    pub fn as_i64(self) -> i64 {
        self as i64
    }

    /// Number of parameter words following the instruction word.
    pub fn arity(self) -> usize {
        match self {
            Opcode::Add | Opcode::Multiply | Opcode::LessThan | Opcode::Equals => 3,
            Opcode::JumpIfTrue | Opcode::JumpIfFalse => 2,
            Opcode::Input | Opcode::Output | Opcode::AdjustBase => 1,
            Opcode::Halt => 0,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Add => "add",
            Opcode::Multiply => "mul",
            Opcode::Input => "in",
            Opcode::Output => "out",
            Opcode::JumpIfTrue => "jnz",
            Opcode::JumpIfFalse => "jz",
            Opcode::LessThan => "lt",
            Opcode::Equals => "eq",
            Opcode::AdjustBase => "arb",
            Opcode::Halt => "halt",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    Position,
    Immediate,
    Relative,
}

impl Mode {
    pub fn from_digit(digit: i64) -> Option<Self> {
        match digit {
            0 => Some(Mode::Position),
            1 => Some(Mode::Immediate),
            2 => Some(Mode::Relative),
            _ => None,
        }
    }
}

/// Two least-significant digits of the word. Truncating, so negative words
/// never alias a valid opcode.
#[inline(always)]
pub fn opcode_digits(word: i64) -> i64 {
    word % 100
}

/// Raw mode digit of parameter `position` (1-based).
#[inline(always)]
pub fn mode_digit(word: i64, position: u32) -> i64 {
    match 10i64.checked_pow(position + 1) {
        Some(scale) => (word / scale) % 10,
        None => 0,
    }
}

/// Decodes `(opcode, mode(position))` of one instruction word.
pub fn decode(word: i64, position: u32) -> (i64, Result<Mode, Fault>) {
    let mode = Mode::from_digit(mode_digit(word, position))
        .ok_or(Fault::InvalidMode { word, position });
    (opcode_digits(word), mode)
}

pub fn mode_of(word: i64, position: u32) -> Result<Mode, Fault> {
    decode(word, position).1
}
