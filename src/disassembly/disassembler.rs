//! This module contains the parser definition for turning a stream of bytes
//! into an [`super::InstructionStream`].

use crate::{
    constant::{
        DUP_OPCODE_BASE_VALUE,
        LOG_OPCODE_BASE_VALUE,
        PUSH_OPCODE_BASE_VALUE,
        SWAP_OPCODE_BASE_VALUE,
    },
    disassembly::Instruction,
    error::{
        container::Locatable,
        disassembly::{Error, Result},
    },
    opcode::{Opcode, PushN},
};

/// Disassembles the input `bytes` into a vector of [`Instruction`]s.
///
/// # Metadata and Padding
///
/// Any byte that is not assigned an opcode is translated to
/// [`Opcode::Invalid`], and hence will halt execution if it is ever reached.
/// This lets trailing metadata and padding disassemble without error.
///
/// A push at the very end of the code whose immediate is cut short keeps the
/// bytes that are present, and reads the missing ones as zero as the EVM does.
///
/// # Errors
///
/// When `bytes` is empty or too large.
pub fn disassemble(bytes: &[u8]) -> Result<Vec<Instruction>> {
    if bytes.is_empty() {
        return Err(Error::NoCode.locate(0));
    }
    let too_large = |_| Error::CodeTooLong.locate(u32::MAX);

    let mut instructions = Vec::with_capacity(bytes.len());
    let mut offset = 0usize;
    while offset < bytes.len() {
        let location = u32::try_from(offset).map_err(too_large)?;
        let byte = bytes[offset];

        let (opcode, width) = match byte {
            0x60..=0x7f => {
                let size = byte - PUSH_OPCODE_BASE_VALUE;
                let start = offset + 1;
                let end = (start + size as usize).min(bytes.len());
                let push = PushN::new(size, bytes[start..end].to_vec())
                    .map_err(|e| e.locate(location))?;
                (Opcode::Push(push), 1 + end - start)
            }
            0x80..=0x8f => {
                let opcode = Opcode::dup(byte - DUP_OPCODE_BASE_VALUE)
                    .map_err(|e| e.locate(location))?;
                (opcode, 1)
            }
            0x90..=0x9f => {
                let opcode = Opcode::swap(byte - SWAP_OPCODE_BASE_VALUE)
                    .map_err(|e| e.locate(location))?;
                (opcode, 1)
            }
            0xa0..=0xa4 => {
                let opcode = Opcode::log(byte - LOG_OPCODE_BASE_VALUE)
                    .map_err(|e| e.locate(location))?;
                (opcode, 1)
            }
            _ => (
                Opcode::from_simple_byte(byte).unwrap_or(Opcode::Invalid(byte)),
                1,
            ),
        };

        instructions.push(Instruction {
            pc: instructions.len(),
            offset: location,
            opcode,
        });
        offset += width;
    }

    Ok(instructions)
}
