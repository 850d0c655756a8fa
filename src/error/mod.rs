//! This module contains the primary error type for the decompiler's interface.
//! It also re-exports the more specific error types that are
//! subsystem-specific.

pub mod container;
pub mod disassembly;
pub mod execution;

use thiserror::Error;

/// The interface result type for the library.
///
/// Any function considered to be part of the public interface of the library
/// should return this result type. Subsystems return the more-specific child
/// error types as appropriate.
pub type Result<T> = std::result::Result<T, Errors>;

/// The interface error type for the library.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// Errors that come from the disassembly process.
    #[error(transparent)]
    Disassembly(#[from] disassembly::Error),

    /// Errors from exploring the bytecode.
    #[error(transparent)]
    Execution(#[from] execution::Error),

    /// An unknown error, represented as a string.
    #[error("Unknown Error: {_0:?}")]
    Other(String),
}

impl Error {
    /// Constructs an unknown error with the provided `message`.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

impl container::Locatable for Error {
    type Located = LocatedError;

    fn locate(self, offset: u32) -> Self::Located {
        container::Located {
            location: offset,
            payload:  self,
        }
    }
}

/// A library error with an associated bytecode location.
pub type LocatedError = container::Located<Error>;

/// A container of errors that may occur in the decompiler.
pub type Errors = container::Errors<LocatedError>;

impl From<disassembly::LocatedError> for Errors {
    fn from(value: disassembly::LocatedError) -> Self {
        Errors::from(value.widen::<Error>())
    }
}

impl From<execution::LocatedError> for Errors {
    fn from(value: execution::LocatedError) -> Self {
        Errors::from(value.widen::<Error>())
    }
}

impl From<execution::Errors> for Errors {
    fn from(value: execution::Errors) -> Self {
        value.widen()
    }
}
