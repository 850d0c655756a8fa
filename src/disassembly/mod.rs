//! This module contains the implementation of the [`InstructionStream`], a type
//! that represents the sequence of instructions in a contract's bytecode.

mod disassembler;

use std::{collections::HashMap, rc::Rc};

use crate::{
    error::{container::Locatable, disassembly, disassembly::Error},
    opcode::Opcode,
    vm::value::known::KnownWord,
};

/// A single decoded instruction.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Instruction {
    /// The index of the instruction in the stream.
    pub pc: usize,

    /// The byte offset of the instruction in the bytecode.
    pub offset: u32,

    /// The decoded opcode, including any immediate data.
    pub opcode: Opcode,
}

/// The instruction stream is a representation of a sequence of [`Opcode`]s
/// that implements some program.
///
/// # Non-Emptiness
///
/// The instruction stream is required to contain _at least one_ instruction.
/// This is validated at construction time.
///
/// # Program Counters and Offsets
///
/// Instructions are addressed in two ways. The program counter `pc` is the
/// index of the instruction in the stream, while the `offset` is its byte
/// position in the bytecode. Jumps target offsets, so the stream keeps an index
/// from the offset of every `JUMPDEST` to its program counter.
///
/// # Stream Validity
///
/// The stream performs no validation that the instructions form a sensible
/// program. It is perfectly possible to construct a stream containing invalid
/// instructions, which halt any path that reaches them.
///
/// Cloning the stream is cheap, as the instructions are shared.
#[derive(Clone, Debug)]
pub struct InstructionStream {
    instructions: Rc<Vec<Instruction>>,
    jumpdests:    Rc<HashMap<u32, usize>>,
}

impl InstructionStream {
    /// Gets the instruction with program counter `pc`, if it exists.
    #[must_use]
    pub fn get(&self, pc: usize) -> Option<&Instruction> {
        self.instructions.get(pc)
    }

    /// Gets the number of instructions in the stream.
    #[allow(clippy::len_without_is_empty)] // The structure cannot be empty.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Iterates over the instructions in program order.
    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter()
    }

    /// Resolves the byte offset `target` of a jump to the program counter of
    /// the `JUMPDEST` found there.
    ///
    /// Returns [`None`] if `target` does not hold a `JUMPDEST`, including the
    /// case where it points into the immediate data of a push.
    #[must_use]
    pub fn jumpdest(&self, target: KnownWord) -> Option<usize> {
        let offset = target.as_u32()?;
        self.jumpdests.get(&offset).copied()
    }

    /// Converts the instructions in the instruction stream to their
    /// corresponding bytecode.
    ///
    /// This always results in the same bytecode as the input to the
    /// disassembly process.
    #[must_use]
    pub fn as_bytecode(&self) -> Vec<u8> {
        self.instructions.iter().flat_map(|i| i.opcode.encode()).collect()
    }
}

/// An [`InstructionStream`] is usually created from a byte array of bytecode.
impl<'a> TryFrom<&'a [u8]> for InstructionStream {
    type Error = disassembly::LocatedError;

    fn try_from(value: &'a [u8]) -> Result<Self, Self::Error> {
        let instructions = disassembler::disassemble(value)?;
        let jumpdests = instructions
            .iter()
            .filter(|i| i.opcode == Opcode::JumpDest)
            .map(|i| (i.offset, i.pc))
            .collect();
        let result = Self {
            instructions: Rc::new(instructions),
            jumpdests:    Rc::new(jumpdests),
        };

        // Disabled in production builds, but a good sanity check that disassembly
        // didn't go wrong.
        debug_assert_eq!(result.as_bytecode().as_slice(), value);
        Ok(result)
    }
}

/// An [`InstructionStream`] can be created from a string as long as that
/// string is a hexadecimal encoding of the equivalent bytes. A leading `0x` is
/// accepted.
impl TryFrom<&str> for InstructionStream {
    type Error = disassembly::LocatedError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let digits = value.trim().trim_start_matches("0x");
        let bytes = hex::decode(digits).map_err(|e| {
            let error = Error::from(e);
            let location = match &error {
                Error::BadHexDigit { position, .. } => *position,
                _ => digits.len(),
            };
            error.locate(u32::try_from(location).unwrap_or(u32::MAX))
        })?;
        InstructionStream::try_from(bytes.as_slice())
    }
}

/// Allows converting the [`InstructionStream`] back to the corresponding
/// bytecode representation.
impl From<InstructionStream> for Vec<u8> {
    fn from(value: InstructionStream) -> Self {
        value.as_bytecode()
    }
}

#[cfg(test)]
mod test {
    use crate::{
        constant::{DUP_OPCODE_BASE_VALUE, LOG_OPCODE_BASE_VALUE, SWAP_OPCODE_BASE_VALUE},
        disassembly::InstructionStream,
        error::disassembly,
        opcode::Opcode,
        vm::value::known::KnownWord,
    };

    #[test]
    fn can_parse_from_bytes() -> anyhow::Result<()> {
        let bytes = util::non_family_opcode_bytes();
        let stream = InstructionStream::try_from(bytes.as_slice())?;

        assert_eq!(stream.len(), bytes.len());
        let bytecode: Vec<u8> = stream.into();
        assert_eq!(bytecode, bytes);

        Ok(())
    }

    #[test]
    fn can_parse_from_hex_stream() -> anyhow::Result<()> {
        let bytes = util::non_family_opcode_bytes();
        let hex_string = format!("0x{}", hex::encode(bytes.as_slice()));
        let stream = InstructionStream::try_from(hex_string.as_str())?;

        assert_eq!(stream.as_bytecode(), bytes);

        Ok(())
    }

    #[test]
    fn emits_parse_error_on_incorrectly_encoded_hex_string() {
        let result = InstructionStream::try_from("ab70anx7302842")
            .expect_err("Parsing did not error");

        assert_eq!(result.location, 5);
        assert_eq!(
            result.payload,
            disassembly::Error::BadHexDigit {
                digit:    'n',
                position: 5,
            }
        );
    }

    #[test]
    fn emits_parse_error_on_hex_string_with_bad_length() {
        let bad_length = "ab21fe9b5";
        let result = InstructionStream::try_from(bad_length).expect_err("Parsing did not error");

        assert_eq!(result.location, 9);
        assert_eq!(result.payload, disassembly::Error::OddHexLength);
    }

    #[test]
    fn can_parse_stack_and_log_families() -> anyhow::Result<()> {
        let mut bytes: Vec<u8> = vec![];
        bytes.extend((1..=16).map(|x| DUP_OPCODE_BASE_VALUE + x));
        bytes.extend((1..=16).map(|x| SWAP_OPCODE_BASE_VALUE + x));
        bytes.extend((0..=4).map(|x| LOG_OPCODE_BASE_VALUE + x));
        let stream = InstructionStream::try_from(bytes.as_slice())?;

        assert_eq!(stream.get(0).map(|i| &i.opcode), Some(&Opcode::Dup(1)));
        assert_eq!(stream.get(31).map(|i| &i.opcode), Some(&Opcode::Swap(16)));
        assert_eq!(stream.get(36).map(|i| &i.opcode), Some(&Opcode::Log(4)));
        assert_eq!(stream.as_bytecode(), bytes);

        Ok(())
    }

    #[test]
    fn pushes_consume_their_immediates() -> anyhow::Result<()> {
        let bytes = util::valid_push_opcodes();
        let stream = InstructionStream::try_from(bytes.as_slice())?;

        assert_eq!(stream.len(), 32);
        let third = stream.get(2).expect("Third push missing");
        assert_eq!(third.offset, 5);
        assert_eq!(third.opcode.encode().as_slice(), &bytes[5..=8]);

        Ok(())
    }

    #[test]
    fn resolves_jump_destinations() -> anyhow::Result<()> {
        // PUSH2 0x5b5b; JUMPDEST
        let stream = InstructionStream::try_from([0x61, 0x5b, 0x5b, 0x5b].as_slice())?;

        assert_eq!(stream.jumpdest(KnownWord::from(3usize)), Some(1));
        assert_eq!(stream.jumpdest(KnownWord::from(1usize)), None);
        assert_eq!(stream.jumpdest(KnownWord::max()), None);

        Ok(())
    }

    /// Utilities for writing the tests.
    mod util {
        use crate::constant::PUSH_OPCODE_BASE_VALUE;

        /// Provides the bytes of opcodes that are not part of a numbered
        /// family.
        pub fn non_family_opcode_bytes() -> Vec<u8> {
            vec![
                0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x10, 0x11,
                0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x1b, 0x1c, 0x1d, 0x20, 0x30,
                0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3a, 0x3b, 0x3c, 0x3d, 0x3e,
                0x3f, 0x40, 0x41, 0x42, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49, 0x4a, 0x50, 0x51,
                0x52, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5a, 0x5b, 0x5c, 0x5d, 0x5e, 0x5f,
                0xf0, 0xf1, 0xf2, 0xf3, 0xf4, 0xf5, 0xfa, 0xfd, 0xfe, 0xff,
            ]
        }

        /// Creates `PUSH1` through `PUSH32`, each followed by random data.
        pub fn valid_push_opcodes() -> Vec<u8> {
            let mut bytes: Vec<u8> = vec![];
            for size in 1..=32u8 {
                bytes.push(PUSH_OPCODE_BASE_VALUE + size);
                bytes.extend((0..size).map(|_| rand::random::<u8>()));
            }
            bytes
        }
    }
}
