//! Opcodes that perform arithmetic operations on the EVM.
//!
//! All arithmetic is modulo 2^256. Operands are popped with the top of the
//! stack as the left-hand side, so `PUSH 2 PUSH 7 SUB` computes `7 - 2`.

use crate::{
    error::execution::Error,
    opcode::{push_eval, Opcode},
    vm::{state::MachineState, value::Expr},
};

/// Executes one of the arithmetic opcodes.
///
/// # Errors
///
/// If there are not enough operands on the stack.
pub fn execute(opcode: &Opcode, state: &mut MachineState) -> Result<(), Error> {
    let expr = match opcode {
        Opcode::AddMod | Opcode::MulMod => {
            let [left, right, modulus] = state.pop_n()?;
            if matches!(opcode, Opcode::AddMod) {
                Expr::AddMod {
                    left,
                    right,
                    modulus,
                }
            } else {
                Expr::MulMod {
                    left,
                    right,
                    modulus,
                }
            }
        }
        _ => {
            let [left, right] = state.pop_n()?;
            match opcode {
                Opcode::Add => Expr::Add { left, right },
                Opcode::Mul => Expr::Mul { left, right },
                Opcode::Sub => Expr::Sub { left, right },
                Opcode::Div => Expr::Div { left, right },
                Opcode::SDiv => Expr::SDiv { left, right },
                Opcode::Mod => Expr::Mod { left, right },
                Opcode::SMod => Expr::SMod { left, right },
                Opcode::Exp => Expr::Exp {
                    base:     left,
                    exponent: right,
                },
                Opcode::SignExtend => Expr::SignExtend {
                    size:  left,
                    value: right,
                },
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
        inference::StorageTables,
        opcode::Opcode,
        vm::{
            state::MachineState,
            value::{known::KnownWord, Expr},
        },
    };

    /// Runs `opcode` over a stack holding `operands`, where the first operand
    /// ends up on top.
    fn run(opcode: Opcode, operands: &[Rc<Expr>]) -> anyhow::Result<Rc<Expr>> {
        let mut state = MachineState::new();
        for operand in operands.iter().rev() {
            state.push(operand.clone())?;
        }
        opcode.execute(0, &mut state, &mut StorageTables::new())?;
        assert_eq!(state.stack().size(), 1);

        Ok(state.pop()?)
    }

    #[test]
    fn subtraction_wraps_and_respects_operand_order() -> anyhow::Result<()> {
        let result = run(Opcode::Sub, &[Expr::val(7usize), Expr::val(2usize)])?;
        assert_eq!(result, Expr::val(5usize));

        let result = run(Opcode::Sub, &[Expr::val(2usize), Expr::val(7usize)])?;
        assert_eq!(result, Expr::val(KnownWord::from_signed(-5)));

        Ok(())
    }

    #[test]
    fn symbolic_operands_stay_symbolic() -> anyhow::Result<()> {
        let value = Rc::new(Expr::CallValue);
        let result = run(Opcode::Mul, &[value.clone(), Expr::val(3usize)])?;
        assert_eq!(
            result,
            Rc::new(Expr::Mul {
                left:  value,
                right: Expr::val(3usize),
            })
        );

        Ok(())
    }

    #[test]
    fn three_operand_opcodes_fold() -> anyhow::Result<()> {
        let result = run(Opcode::AddMod, &[
            Expr::val(KnownWord::max()),
            Expr::val(2usize),
            Expr::val(10usize),
        ])?;
        // (2^256 - 1 + 2) mod 10 = (2^256 + 1) mod 10 = 7
        assert_eq!(result, Expr::val(7usize));

        Ok(())
    }

    #[test]
    fn division_by_zero_is_kept() -> anyhow::Result<()> {
        let result = run(Opcode::Div, &[Expr::val(1usize), Expr::val(0usize)])?;
        assert!(matches!(result.as_ref(), Expr::Div { .. }));

        Ok(())
    }

    #[test]
    fn underflow_is_reported() {
        let mut state = MachineState::new();
        let result = Opcode::Add.execute(0, &mut state, &mut StorageTables::new());
        assert!(result.is_err());
    }
}
