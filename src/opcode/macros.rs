//! This module contains useful macros for working with bytecode and opcodes.

/// Constructs a bytecode input from the input instructions as literal opcodes.
///
/// Each argument may be an [`crate::opcode::Opcode`] or anything that converts
/// into one, such as a [`crate::opcode::PushN`].
///
/// # Usage
///
/// ```
/// use evm_decompiler::{
///     bytecode,
///     opcode::{Opcode, PushN},
/// };
///
/// let bytes = bytecode![
///     PushN::new(1, vec![0x03]).unwrap(),
///     Opcode::Jump,
///     Opcode::JumpDest,
///     Opcode::Stop,
/// ];
///
/// assert_eq!(bytes, vec![0x60, 0x03, 0x56, 0x5b, 0x00]);
/// ```
#[macro_export]
macro_rules! bytecode {
    ($($path:expr),*$(,)?) => {{
        let mut vec: Vec<u8> = vec![];
        $(vec.extend($crate::opcode::Opcode::from($path).encode());)*
        vec
    }};
}

// Export it scoped
pub use bytecode;
