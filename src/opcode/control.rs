//! Opcodes that halt execution, and the `JUMPDEST` marker.

use crate::{
    error::execution::Error,
    opcode::{memory, Opcode},
    vm::{inst::Inst, state::MachineState},
};

/// Executes one of the halting opcodes, or the no-op `JUMPDEST`.
///
/// # Errors
///
/// If there are not enough operands on the stack.
pub fn execute(opcode: &Opcode, state: &mut MachineState) -> Result<(), Error> {
    let terminator = match opcode {
        Opcode::JumpDest => return Ok(()),
        Opcode::Stop => Inst::Stop,
        Opcode::Return | Opcode::Revert => {
            let [offset, size] = state.pop_n()?;
            let payload = memory::payload(state, offset, size);
            if matches!(opcode, Opcode::Return) {
                Inst::Return(payload)
            } else {
                Inst::Revert(payload)
            }
        }
        Opcode::SelfDestruct => Inst::SelfDestruct(state.pop()?),
        Opcode::Invalid(byte) => Inst::Invalid {
            reason: format!("Reached invalid opcode {byte:#04x}"),
        },
        _ => {
            return Err(Error::NotSteppable {
                opcode: opcode.as_text_code(),
            })
        }
    };

    state.halt(terminator);
    Ok(())
}
