//! Opcodes that interact with the world outside the current call: logs,
//! message calls and contract creation.
//!
//! The targets of calls and creations are not decompiled. Their results are
//! opaque expressions, and each of them is also logged as an effect so that
//! it keeps its position among the other statements.

use std::rc::Rc;

use crate::{
    error::execution::Error,
    opcode::{memory, Opcode},
    vm::{
        inst::Inst,
        state::MachineState,
        value::{CallKind, CopySource, Expr},
    },
};

/// Executes one of the system opcodes.
///
/// # Errors
///
/// If there are not enough operands on the stack.
pub fn execute(opcode: &Opcode, state: &mut MachineState) -> Result<(), Error> {
    let expr = match opcode {
        Opcode::Log(topic_count) => return log(*topic_count, state),
        Opcode::Create => {
            let [value, offset, size] = state.pop_n()?;
            Expr::Create {
                value,
                offset,
                size,
                salt: None,
            }
        }
        Opcode::Create2 => {
            let [value, offset, size, salt] = state.pop_n()?;
            Expr::Create {
                value,
                offset,
                size,
                salt: Some(salt),
            }
        }
        Opcode::Call | Opcode::CallCode => {
            let [gas, address, value, arg_offset, arg_size, ret_offset, ret_size] =
                state.pop_n()?;
            let kind = if matches!(opcode, Opcode::Call) {
                CallKind::Call
            } else {
                CallKind::CallCode
            };
            Expr::Call {
                kind,
                gas,
                address,
                value: Some(value),
                arg_offset,
                arg_size,
                ret_offset,
                ret_size,
            }
        }
        Opcode::DelegateCall | Opcode::StaticCall => {
            let [gas, address, arg_offset, arg_size, ret_offset, ret_size] = state.pop_n()?;
            let kind = if matches!(opcode, Opcode::DelegateCall) {
                CallKind::DelegateCall
            } else {
                CallKind::StaticCall
            };
            Expr::Call {
                kind,
                gas,
                address,
                value: None,
                arg_offset,
                arg_size,
                ret_offset,
                ret_size,
            }
        }
        _ => {
            return Err(Error::NotSteppable {
                opcode: opcode.as_text_code(),
            })
        }
    };

    // The callee's output lands in the return area.
    if let Expr::Call {
        ret_offset,
        ret_size,
        ..
    } = &expr
    {
        memory::copy_words(state, ret_offset, ret_size, |i| {
            Rc::new(Expr::Copy {
                source: CopySource::ReturnData,
                offset: Expr::val(i * crate::constant::WORD_SIZE_BYTES),
            })
        });
    }

    let expr = Rc::new(expr);
    state.record(Inst::Effect(expr.clone()));
    state.push(expr)
}

/// Executes `LOG{topic_count}`.
fn log(topic_count: u8, state: &mut MachineState) -> Result<(), Error> {
    let [offset, size] = state.pop_n()?;
    let mut topics = Vec::with_capacity(topic_count as usize);
    for _ in 0..topic_count {
        topics.push(state.pop()?);
    }
    let event = topics.first().and_then(|topic| topic.known());
    let data = memory::payload(state, offset, size);
    state.record(Inst::Log {
        event,
        topics,
        data,
    });

    Ok(())
}
