//! This module contains errors pertaining to the symbolic exploration of the
//! bytecode.

use thiserror::Error;

use crate::{error::container, vm::value::known::KnownWord};

/// Errors that occur while the [`crate::vm::VM`] explores the bytecode.
///
/// Apart from [`Error::ExplorationAborted`], all of these are local to the
/// branch on which they occurred. They are collected while exploration of the
/// remaining branches continues.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("Tried to pop from an empty stack")]
    StackUnderflow,

    #[error("Maximum stack depth exceeded with request for {requested:?} frames")]
    StackTooDeep { requested: usize },

    #[error("Stack operand index {index:?} is outside the valid range for {operation}")]
    InvalidOperandIndex { index: usize, operation: String },

    #[error("A stack frame at depth {depth:?} was requested but only {available:?} exist")]
    PositionNotFound { depth: usize, available: usize },

    #[error(
        "Instruction pointer {requested:?} is out of bounds in bytecode of {available:?} \
         instructions"
    )]
    InstructionPointerOutOfBounds { requested: usize, available: usize },

    #[error("No concrete value was found for the jump destination")]
    NoConcreteJumpDestination,

    #[error("The offset {offset} is not a valid jump destination")]
    InvalidJumpTarget { offset: KnownWord },

    #[error("The opcode {opcode} is handled by the explorer and cannot be stepped")]
    NotSteppable { opcode: String },

    #[error("Program counter {pc:?} was reached in more than {limit:?} distinct stack contexts")]
    VisitLimitExceeded { pc: usize, limit: usize },

    #[error("Exploration was aborted after {steps:?} steps")]
    ExplorationAborted { steps: usize },
}

impl Error {
    /// Checks whether the error is one of the jump resolution failures that
    /// also show up as `Invalid` terminators in the explored graph.
    #[must_use]
    pub fn is_jump_error(&self) -> bool {
        matches!(
            self,
            Self::NoConcreteJumpDestination | Self::InvalidJumpTarget { .. }
        )
    }

    /// Checks whether the error must stop the entire exploration rather than
    /// just the current branch.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ExplorationAborted { .. })
    }
}

/// An execution error with an associated location in the bytecode.
pub type LocatedError = container::Located<Error>;

/// A container of execution errors used for aggregation of errors during
/// exploration.
pub type Errors = container::Errors<LocatedError>;

/// The result type for methods that may have execution errors.
pub type Result<T> = std::result::Result<T, LocatedError>;

impl container::Locatable for Error {
    type Located = LocatedError;

    fn locate(self, offset: u32) -> Self::Located {
        container::Located {
            location: offset,
            payload:  self,
        }
    }
}
