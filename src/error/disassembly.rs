//! Errors raised while decoding raw code into instructions.

use thiserror::Error;

use crate::error::container;

/// Errors that occur while turning bytes into [`crate::opcode::Opcode`]s.
///
/// Unknown bytes are never an error, as they disassemble to
/// [`crate::opcode::Opcode::Invalid`]. Neither is a `PUSH` whose immediate is
/// cut short by the end of the code.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("There is no code to disassemble")]
    NoCode,

    #[error("The code is too long for its byte offsets to fit in 32 bits")]
    CodeTooLong,

    #[error("Hex-encoded code must have an even number of digits")]
    OddHexLength,

    #[error("{digit:?} at position {position} is not a hex digit")]
    BadHexDigit { digit: char, position: usize },

    #[error("PUSH{_0} does not exist, as a push takes 1 to 32 immediate bytes")]
    PushWidthOutOfRange(u8),

    #[error("PUSH{width} cannot take {given} immediate bytes")]
    PushImmediateTooLong { width: u8, given: usize },

    #[error("{family}{position} does not exist, as it must address one of the top 16 stack items")]
    StackPositionOutOfRange { family: &'static str, position: u8 },

    #[error("LOG{_0} does not exist, as a log carries at most four topics")]
    TooManyLogTopics(u8),
}

/// A disassembly error at a byte offset in the code.
pub type LocatedError = container::Located<Error>;

/// The result type for functions that may return disassembly errors.
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

impl From<hex::FromHexError> for Error {
    fn from(value: hex::FromHexError) -> Self {
        match value {
            hex::FromHexError::InvalidHexCharacter { c, index } => Self::BadHexDigit {
                digit:    c,
                position: index,
            },
            _ => Self::OddHexLength,
        }
    }
}

#[cfg(test)]
mod test {
    use crate::error::disassembly::Error;

    #[test]
    fn converts_hex_failures() {
        assert_eq!(
            Error::from(hex::FromHexError::InvalidHexCharacter { c: 'g', index: 3 }),
            Error::BadHexDigit {
                digit:    'g',
                position: 3,
            }
        );
        assert_eq!(Error::from(hex::FromHexError::OddLength), Error::OddHexLength);
    }

    #[test]
    fn names_the_offending_opcode() {
        let error = Error::StackPositionOutOfRange {
            family:   "DUP",
            position: 17,
        };
        assert_eq!(
            error.to_string(),
            "DUP17 does not exist, as it must address one of the top 16 stack items"
        );
        assert_eq!(
            Error::PushImmediateTooLong { width: 1, given: 2 }.to_string(),
            "PUSH1 cannot take 2 immediate bytes"
        );
    }
}
