use std::fmt::Display;

use crate::{MemoryId, Opcode, OpcodeSet, SignalId};

/// A single fault in a netlist, carrying enough context to find it.
///
/// Operations are identified by their printed form, e.g. `%sum:4 = add %a %b`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Problem {
    DuplicateName(String),
    InvalidWidth { signal: String, width: u32 },
    ConstOutOfRange { signal: String, width: u32, value: u128 },
    UnknownSignal { operation: String, signal: SignalId },
    UnknownMemory { operation: String, memory: MemoryId },
    IllegalOpcode { operation: String, op: Opcode, legal: OpcodeSet },
    Malformed { operation: String, reason: String },
    MisusedSignal { operation: String, signal: String, reason: &'static str },
    WriteToReadOnly { operation: String, memory: String },
    MultipleDrivers { signal: String, count: usize },
    Undriven { signal: String },
    Unconnected { signal: String },
    UnsynchronizedRead { memory: String, source: String },
    CombinationalCycle { operations: Vec<String> },
}

impl Display for Problem {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Problem::DuplicateName(name) => write!(f, "duplicate signal name {name:?}"),
            Problem::InvalidWidth { signal, width } => {
                write!(f, "signal {signal:?} has invalid width {width} (must be between 1 and 128)")
            }
            Problem::ConstOutOfRange { signal, width, value } => {
                write!(f, "constant {signal:?} value {value} does not fit in {width} bits")
            }
            Problem::UnknownSignal { operation, signal } => {
                write!(f, "operation `{operation}` references signal {signal:?} not in this netlist")
            }
            Problem::UnknownMemory { operation, memory } => {
                write!(f, "operation `{operation}` references memory {memory:?} not in this netlist")
            }
            Problem::IllegalOpcode { operation, op, legal } => {
                write!(f, "operation `{operation}` uses opcode {op} outside the legal set {legal}")
            }
            Problem::Malformed { operation, reason } => write!(f, "operation `{operation}` is malformed: {reason}"),
            Problem::MisusedSignal { operation, signal, reason } => {
                write!(f, "operation `{operation}` misuses signal {signal:?}: {reason}")
            }
            Problem::WriteToReadOnly { operation, memory } => {
                write!(f, "operation `{operation}` writes to read-only memory {memory:?}")
            }
            Problem::MultipleDrivers { signal, count } => write!(f, "signal {signal:?} is driven by {count} operations"),
            Problem::Undriven { signal } => write!(f, "signal {signal:?} is used but never driven"),
            Problem::Unconnected { signal } => write!(f, "signal {signal:?} is declared but not connected"),
            Problem::UnsynchronizedRead { memory, source } => write!(
                f,
                "read address of synchronous memory {memory:?} is not driven by a register, input or constant \
                 (it comes from `{source}`)"
            ),
            Problem::CombinationalCycle { operations } => {
                write!(f, "combinational cycle not broken by a register among:")?;
                for operation in operations {
                    write!(f, "\n    {operation}")?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// The netlist, or something added to it, is not well-formed. Every problem found is listed.
    Invalid(Vec<Problem>),
    /// An invariant the toolkit maintains itself was broken.
    Internal(String),
}

impl Error {
    pub fn internal(message: impl Into<String>) -> Error {
        Error::Internal(message.into())
    }

    pub fn problems(&self) -> &[Problem] {
        match self {
            Error::Invalid(problems) => problems,
            Error::Internal(_) => &[],
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, Error::Internal(_))
    }
}

impl From<Problem> for Error {
    fn from(problem: Problem) -> Self {
        Error::Invalid(vec![problem])
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Invalid(problems) if problems.len() == 1 => write!(f, "{}", problems[0]),
            Error::Invalid(problems) => {
                write!(f, "{} problems found:", problems.len())?;
                for problem in problems {
                    write!(f, "\n  {problem}")?;
                }
                Ok(())
            }
            Error::Internal(message) => write!(f, "internal error: {message}"),
        }
    }
}

impl std::error::Error for Error {}

/// Turns a list of problems collected during a sweep into a result.
pub(crate) fn check(problems: Vec<Problem>) -> Result<(), Error> {
    if problems.is_empty() {
        Ok(())
    } else {
        Err(Error::Invalid(problems))
    }
}
