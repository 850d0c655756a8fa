//! Opcodes that access persistent and transient storage.
//!
//! Persistent accesses go through the contract's [`StorageTables`], which
//! decide whether the slot is a variable, a mapping entry, an array element or
//! raw storage.

use std::rc::Rc;

use crate::{
    error::execution::Error,
    inference::StorageTables,
    opcode::Opcode,
    vm::{inst::Inst, state::MachineState, value::Expr},
};

/// Executes one of the storage opcodes.
///
/// # Errors
///
/// If there are not enough operands on the stack.
pub fn execute(
    opcode: &Opcode,
    state: &mut MachineState,
    storage: &mut StorageTables,
) -> Result<(), Error> {
    match opcode {
        Opcode::SLoad => {
            let slot = state.pop()?;
            state.push(storage.load(slot))
        }
        Opcode::SStore => {
            let [slot, data] = state.pop_n()?;
            state.record(storage.store(slot, data));
            Ok(())
        }
        Opcode::TLoad => {
            let slot = state.pop()?;
            state.push(Rc::new(Expr::TLoad(slot)))
        }
        Opcode::TStore => {
            let [slot, data] = state.pop_n()?;
            state.record(Inst::TStore { slot, data });
            Ok(())
        }
        _ => Err(Error::NotSteppable {
            opcode: opcode.as_text_code(),
        }),
    }
}

#[cfg(test)]
mod test {
    use std::rc::Rc;

    use crate::{
        inference::StorageTables,
        opcode::Opcode,
        vm::{
            inst::Inst,
            state::MachineState,
            value::{known::KnownWord, Expr, Property},
        },
    };

    #[test]
    fn mapping_loads_go_through_the_tables() -> anyhow::Result<()> {
        let mut state = MachineState::new();
        let mut storage = StorageTables::new();
        state.push(Rc::new(Expr::Prop(Property::Caller)))?;
        state.push(Expr::val(0usize))?;
        Opcode::MStore.execute(0, &mut state, &mut storage)?;
        state.push(Expr::val(3usize))?;
        state.push(Expr::val(0x20usize))?;
        Opcode::MStore.execute(0, &mut state, &mut storage)?;
        state.push(Expr::val(0x40usize))?;
        state.push(Expr::val(0usize))?;
        Opcode::Sha3.execute(0, &mut state, &mut storage)?;
        Opcode::SLoad.execute(0, &mut state, &mut storage)?;

        assert_eq!(
            state.pop()?,
            Rc::new(Expr::MappingLoad {
                slot:   KnownWord::from(3usize),
                keys:   vec![Rc::new(Expr::Prop(Property::Caller))],
                offset: KnownWord::zero(),
            })
        );
        assert_eq!(storage.mapping_name(KnownWord::from(3usize)), "mapping1");

        Ok(())
    }

    #[test]
    fn constant_keys_still_address_mappings() -> anyhow::Result<()> {
        let mut state = MachineState::new();
        let mut storage = StorageTables::new();
        state.push(Expr::val(5usize))?;
        state.push(Expr::val(0usize))?;
        Opcode::MStore.execute(0, &mut state, &mut storage)?;
        state.push(Expr::val(3usize))?;
        state.push(Expr::val(0x20usize))?;
        Opcode::MStore.execute(0, &mut state, &mut storage)?;
        state.push(Expr::val(0x40usize))?;
        state.push(Expr::val(0usize))?;
        Opcode::Sha3.execute(0, &mut state, &mut storage)?;
        Opcode::SLoad.execute(0, &mut state, &mut storage)?;

        assert_eq!(
            state.pop()?,
            Rc::new(Expr::MappingLoad {
                slot:   KnownWord::from(3usize),
                keys:   vec![Expr::val(5usize)],
                offset: KnownWord::zero(),
            })
        );
        assert!(storage.mappings().contains_key(&KnownWord::from(3usize)));
        assert!(storage.variables().is_empty());

        Ok(())
    }

    #[test]
    fn stores_are_logged() -> anyhow::Result<()> {
        let mut state = MachineState::new();
        let mut storage = StorageTables::new();
        state.push(Rc::new(Expr::CallValue))?;
        state.push(Expr::val(1usize))?;
        Opcode::SStore.execute(0, &mut state, &mut storage)?;
        state.push(Expr::val(2usize))?;
        state.push(Expr::val(1usize))?;
        Opcode::TStore.execute(0, &mut state, &mut storage)?;

        assert!(matches!(state.log(), [
            Inst::SStore {
                variable: Some(_),
                ..
            },
            Inst::TStore { .. }
        ]));
        assert!(storage.variables().contains_key(&KnownWord::one()));

        Ok(())
    }
}
