//! Opcodes that perform comparisons and bitwise operations on the EVM.

use crate::{
    error::execution::Error,
    opcode::{push_eval, Opcode},
    vm::{state::MachineState, value::Expr},
};

/// Executes one of the comparison or bitwise opcodes.
///
/// The shift opcodes take the shift amount from the top of the stack, ahead
/// of the value being shifted.
///
/// # Errors
///
/// If there are not enough operands on the stack.
pub fn execute(opcode: &Opcode, state: &mut MachineState) -> Result<(), Error> {
    let expr = match opcode {
        Opcode::IsZero => Expr::IsZero(state.pop()?),
        Opcode::Not => Expr::Not(state.pop()?),
        _ => {
            let [a, b] = state.pop_n()?;
            match opcode {
                Opcode::Lt | Opcode::SLt => Expr::Lt {
                    left:   a,
                    right:  b,
                    equal:  false,
                    signed: matches!(opcode, Opcode::SLt),
                },
                Opcode::Gt | Opcode::SGt => Expr::Gt {
                    left:   a,
                    right:  b,
                    equal:  false,
                    signed: matches!(opcode, Opcode::SGt),
                },
                Opcode::Eq => Expr::Eq {
                    left:  a,
                    right: b,
                    equal: true,
                },
                Opcode::And => Expr::And { left: a, right: b },
                Opcode::Or => Expr::Or { left: a, right: b },
                Opcode::Xor => Expr::Xor { left: a, right: b },
                Opcode::Byte => Expr::Byte {
                    position: a,
                    value:    b,
                },
                Opcode::Shl => Expr::Shl { value: b, shift: a },
                Opcode::Shr => Expr::Shr { value: b, shift: a },
                Opcode::Sar => Expr::Sar { value: b, shift: a },
                _ => {
                    return Err(Error::NotSteppable {
                        opcode: opcode.as_text_code(),
                    })
                }
            }
        }
    };

    push_eval(state, expr)
}

#[cfg(test)]
mod test {
    use std::rc::Rc;

    use crate::{
        bytecode,
        disassembly::InstructionStream,
        inference::StorageTables,
        opcode::{Opcode, PushN},
        signatures::Selector,
        vm::{
            state::MachineState,
            value::{Expr, SharedExpr},
        },
    };

    /// Steps every instruction in `code` over a fresh state and returns the
    /// top of the stack.
    fn run_code(code: &[u8]) -> anyhow::Result<SharedExpr> {
        let stream = InstructionStream::try_from(code)?;
        let mut state = MachineState::new();
        let mut storage = StorageTables::new();
        for instruction in stream.iter() {
            instruction
                .opcode
                .execute(instruction.offset, &mut state, &mut storage)?;
        }

        Ok(state.pop()?)
    }

    #[test]
    fn comparisons_fold() -> anyhow::Result<()> {
        let code = bytecode![
            PushN::new(1, vec![0x02])?,
            PushN::new(1, vec![0x01])?,
            Opcode::Lt,
        ];
        assert_eq!(run_code(&code)?, Expr::val(1usize));

        let code = bytecode![
            PushN::new(1, vec![0x01])?,
            PushN::new(1, vec![0x00])?,
            Opcode::Not,
            Opcode::SLt,
        ];
        assert_eq!(run_code(&code)?, Expr::val(1usize));

        Ok(())
    }

    #[test]
    fn shifts_take_the_amount_from_the_top() -> anyhow::Result<()> {
        let code = bytecode![
            PushN::new(1, vec![0x01])?,
            PushN::new(1, vec![0x08])?,
            Opcode::Shl,
        ];
        assert_eq!(run_code(&code)?, Expr::val(0x100usize));

        Ok(())
    }

    #[test]
    fn selector_dispatch_folds_for_every_compiler_form() -> anyhow::Result<()> {
        let selector = Selector::new([0x0c, 0x55, 0x69, 0x9c]);
        let literal = || PushN::new(4, selector.bytes().to_vec());
        let shift = || PushN::new(1, vec![0xe0]);
        let mut divisor = vec![0x01];
        divisor.extend([0u8; 28]);
        let divide = || PushN::new(29, divisor.clone());

        let forms = [
            bytecode![
                divide()?,
                Opcode::Push0,
                Opcode::CallDataLoad,
                Opcode::Div,
                literal()?,
                Opcode::Eq,
            ],
            bytecode![
                literal()?,
                divide()?,
                Opcode::Push0,
                Opcode::CallDataLoad,
                Opcode::Div,
                Opcode::Eq,
            ],
            bytecode![
                Opcode::Push0,
                Opcode::CallDataLoad,
                shift()?,
                Opcode::Shr,
                literal()?,
                Opcode::Eq,
            ],
            bytecode![
                literal()?,
                Opcode::Push0,
                Opcode::CallDataLoad,
                shift()?,
                Opcode::Shr,
                Opcode::Eq,
            ],
        ];

        for code in forms {
            assert_eq!(run_code(&code)?, Rc::new(Expr::Sig(selector)));
        }

        Ok(())
    }

    #[test]
    fn negated_equality_is_normalised() -> anyhow::Result<()> {
        let code = bytecode![
            PushN::new(1, vec![0x05])?,
            Opcode::Caller,
            Opcode::Eq,
            Opcode::IsZero,
        ];
        let result = run_code(&code)?;
        assert!(matches!(result.as_ref(), Expr::Eq { equal: false, .. }));

        let code = bytecode![Opcode::Caller, Opcode::IsZero, Opcode::IsZero];
        assert!(matches!(run_code(&code)?.as_ref(), Expr::IsZero(_)));

        Ok(())
    }
}
