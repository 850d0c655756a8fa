//! Opcodes that read from the execution environment.
//!
//! None of these values are known ahead of time, so each becomes an opaque
//! expression naming what was read.

use std::rc::Rc;

use crate::{
    error::execution::Error,
    opcode::{push_eval, Opcode},
    vm::{
        state::MachineState,
        value::{Expr, Property},
    },
};

/// Executes one of the environment opcodes at byte `offset`.
///
/// # Errors
///
/// If there are not enough operands on the stack.
pub fn execute(opcode: &Opcode, offset: u32, state: &mut MachineState) -> Result<(), Error> {
    let property = match opcode {
        Opcode::Address => Property::Address,
        Opcode::Origin => Property::Origin,
        Opcode::Caller => Property::Caller,
        Opcode::GasPrice => Property::GasPrice,
        Opcode::Coinbase => Property::Coinbase,
        Opcode::Timestamp => Property::Timestamp,
        Opcode::Number => Property::Number,
        Opcode::PrevRandao => Property::PrevRandao,
        Opcode::GasLimit => Property::GasLimit,
        Opcode::ChainId => Property::ChainId,
        Opcode::SelfBalance => Property::SelfBalance,
        Opcode::BaseFee => Property::BaseFee,
        Opcode::BlobBaseFee => Property::BlobBaseFee,
        Opcode::CodeSize => Property::CodeSize,
        Opcode::ReturnDataSize => Property::ReturnDataSize,
        Opcode::MSize => Property::MSize,
        Opcode::Gas => Property::Gas,
        Opcode::Pc => Property::ProgramCounter(offset),
        Opcode::CallValue => return state.push(Rc::new(Expr::CallValue)),
        Opcode::CallDataSize => return state.push(Rc::new(Expr::CallDataSize)),
        _ => return unary(opcode, state),
    };

    state.push(Rc::new(Expr::Prop(property)))
}

/// Executes the environment reads that take an operand.
fn unary(opcode: &Opcode, state: &mut MachineState) -> Result<(), Error> {
    let operand = state.pop()?;
    let expr = match opcode {
        Opcode::Balance => Expr::Balance(operand),
        Opcode::ExtCodeSize => Expr::ExtCodeSize(operand),
        Opcode::ExtCodeHash => Expr::ExtCodeHash(operand),
        Opcode::BlockHash => Expr::BlockHash(operand),
        Opcode::BlobHash => Expr::BlobHash(operand),
        Opcode::CallDataLoad => Expr::CallDataLoad(operand),
        _ => {
            return Err(Error::NotSteppable {
                opcode: opcode.as_text_code(),
            })
        }
    };

    push_eval(state, expr)
}
