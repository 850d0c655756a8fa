//! Opcodes that perform operations on memory or the stack on the EVM,
//! including hashing of memory and the copy family.

use std::rc::Rc;

use crate::{
    constant::{MEMORY_DECODE_MAX_WORDS, WORD_SIZE_BYTES},
    error::execution::Error,
    inference::StorageTables,
    opcode::Opcode,
    vm::{
        inst::{Inst, Payload},
        state::MachineState,
        value::{eval::eval, known::KnownWord, CopySource, Expr, SharedExpr},
    },
};

/// Executes one of the memory or stack opcodes.
///
/// Hashes of constant memory are recorded in `storage` along with their
/// preimages, as they are how mapping slots with constant keys are computed.
///
/// # Errors
///
/// If there are not enough operands on the stack, or if a `DUP` or `SWAP`
/// refers to a frame that does not exist.
pub fn execute(
    opcode: &Opcode,
    state: &mut MachineState,
    storage: &mut StorageTables,
) -> Result<(), Error> {
    match opcode {
        Opcode::Push0 => state.push(Expr::val(KnownWord::zero())),
        Opcode::Push(push) => state.push(Expr::val(push.value())),
        Opcode::Dup(n) => state.stack_mut().dup(usize::from(*n).wrapping_sub(1)),
        Opcode::Swap(n) => state.stack_mut().swap(*n as usize),
        Opcode::Pop => state.pop().map(|_| ()),
        Opcode::MLoad => {
            let offset = state.pop()?;
            let value = state
                .memory()
                .load(&offset)
                .cloned()
                .unwrap_or_else(|| Rc::new(Expr::MLoad(offset)));
            state.push(value)
        }
        Opcode::MStore | Opcode::MStore8 => {
            let [offset, data] = state.pop_n()?;
            let byte = matches!(opcode, Opcode::MStore8);
            if byte {
                state.memory_mut().store_8(offset.clone(), data.clone());
            } else {
                state.memory_mut().store(offset.clone(), data.clone());
            }
            state.record(Inst::MStore { offset, data, byte });
            Ok(())
        }
        Opcode::Sha3 => {
            let [offset, size] = state.pop_n()?;
            let words = read_words(state, &offset, &size);
            let preimage = words
                .as_ref()
                .and_then(|words| words.iter().map(|w| w.known()).collect::<Option<Vec<_>>>());
            let hash = eval(&Rc::new(Expr::Sha3 {
                offset,
                size,
                words,
            }));
            if let (Some(hash), Some(preimage)) = (hash.known(), preimage) {
                storage.record_preimage(hash, preimage);
            }
            state.push(hash)
        }
        Opcode::MCopy => {
            let [dest, source, size] = state.pop_n()?;
            let words = read_words(state, &source, &size);
            copy_words(state, &dest, &size, |i| match &words {
                Some(words) => words[i].clone(),
                None => Rc::new(Expr::MLoad(word_offset(&source, i))),
            });
            Ok(())
        }
        Opcode::CallDataCopy => {
            let [dest, source, size] = state.pop_n()?;
            copy_words(state, &dest, &size, |i| {
                Rc::new(Expr::CallDataLoad(word_offset(&source, i)))
            });
            Ok(())
        }
        Opcode::CodeCopy | Opcode::ReturnDataCopy => {
            let [dest, source, size] = state.pop_n()?;
            let kind = if matches!(opcode, Opcode::CodeCopy) {
                CopySource::Code
            } else {
                CopySource::ReturnData
            };
            copy_words(state, &dest, &size, |i| {
                Rc::new(Expr::Copy {
                    source: kind.clone(),
                    offset: word_offset(&source, i),
                })
            });
            Ok(())
        }
        Opcode::ExtCodeCopy => {
            let [address, dest, source, size] = state.pop_n()?;
            copy_words(state, &dest, &size, |i| {
                Rc::new(Expr::Copy {
                    source: CopySource::ExtCode(address.clone()),
                    offset: word_offset(&source, i),
                })
            });
            Ok(())
        }
        _ => Err(Error::NotSteppable {
            opcode: opcode.as_text_code(),
        }),
    }
}

/// Reads the memory range described by `offset` and `size` for a halting or
/// logging instruction.
#[must_use]
pub fn payload(state: &MachineState, offset: SharedExpr, size: SharedExpr) -> Payload {
    let words = read_words(state, &offset, &size);
    Payload {
        offset,
        size,
        words,
    }
}

/// Reads the memory range as whole words, if it is concrete, word-aligned and
/// at most [`MEMORY_DECODE_MAX_WORDS`] long.
///
/// Words that were never written are read as symbolic loads.
fn read_words(
    state: &MachineState,
    offset: &SharedExpr,
    size: &SharedExpr,
) -> Option<Vec<SharedExpr>> {
    let count = word_count(size)?;
    offset.known()?;

    let words = (0..count)
        .map(|i| {
            let at = word_offset(offset, i);
            state
                .memory()
                .load(&at)
                .cloned()
                .unwrap_or_else(|| Rc::new(Expr::MLoad(at)))
        })
        .collect();

    Some(words)
}

/// Writes `size` bytes at `dest` word by word, the `i`th word being
/// `word(i)`.
///
/// When the destination or size is not concrete, or the copy is too large to
/// track, the affected part of memory is forgotten instead.
pub(crate) fn copy_words(
    state: &mut MachineState,
    dest: &SharedExpr,
    size: &SharedExpr,
    word: impl Fn(usize) -> SharedExpr,
) {
    let tracked = dest.known().and(word_count(size));
    match (tracked, dest.known(), size.known().and_then(|s| s.as_usize())) {
        (Some(count), ..) => {
            for i in 0..count {
                state.memory_mut().store(word_offset(dest, i), word(i));
            }
        }
        (None, Some(start), Some(bytes)) => {
            state.memory_mut().clobber(&Expr::val(start), bytes);
        }
        (None, Some(start), None) => state.memory_mut().clobber_from(start),
        (None, None, _) => state.memory_mut().clobber(dest, WORD_SIZE_BYTES),
    }
}

/// Gets the number of words in a concrete, word-aligned `size` that is small
/// enough to track.
fn word_count(size: &SharedExpr) -> Option<usize> {
    let bytes = size.known()?.as_usize()?;
    let count = bytes / WORD_SIZE_BYTES;
    (bytes % WORD_SIZE_BYTES == 0 && count <= MEMORY_DECODE_MAX_WORDS).then_some(count)
}

/// Computes `base + 32 * index`, normalised.
pub(crate) fn word_offset(base: &SharedExpr, index: usize) -> SharedExpr {
    eval(&Rc::new(Expr::Add {
        left:  base.clone(),
        right: Expr::val(index * WORD_SIZE_BYTES),
    }))
}

#[cfg(test)]
mod test {
    use std::rc::Rc;

    use crate::{
        inference::StorageTables,
        opcode::{Opcode, PushN},
        vm::{
            inst::Inst,
            state::MachineState,
            value::{known::KnownWord, Expr},
        },
    };

    fn step(state: &mut MachineState, opcodes: &[Opcode]) -> anyhow::Result<()> {
        let mut storage = StorageTables::new();
        for opcode in opcodes {
            opcode.execute(0, state, &mut storage)?;
        }

        Ok(())
    }

    fn push(byte: u8) -> anyhow::Result<Opcode> {
        Ok(Opcode::from(PushN::new(1, vec![byte])?))
    }

    #[test]
    fn stores_and_loads_words() -> anyhow::Result<()> {
        let mut state = MachineState::new();
        step(&mut state, &[
            Opcode::Caller,
            push(0x40)?,
            Opcode::MStore,
            push(0x40)?,
            Opcode::MLoad,
        ])?;

        assert!(matches!(state.log(), [Inst::MStore { byte: false, .. }]));
        assert_eq!(
            state.pop()?,
            Rc::new(Expr::Prop(crate::vm::value::Property::Caller))
        );

        step(&mut state, &[push(0x60)?, Opcode::MLoad])?;
        assert_eq!(state.pop()?, Rc::new(Expr::MLoad(Expr::val(0x60usize))));

        Ok(())
    }

    #[test]
    fn hashes_decoded_memory() -> anyhow::Result<()> {
        let mut state = MachineState::new();
        step(&mut state, &[
            push(0x01)?,
            Opcode::Push0,
            Opcode::MStore,
            push(0x02)?,
            push(0x20)?,
            Opcode::MStore,
            push(0x40)?,
            Opcode::Push0,
            Opcode::Sha3,
        ])?;

        let expected =
            KnownWord::keccak(&[KnownWord::from(1usize), KnownWord::from(2usize)]);
        assert_eq!(state.pop()?, Expr::val(expected));

        Ok(())
    }

    #[test]
    fn stack_operations_follow_the_opcode_numbering() -> anyhow::Result<()> {
        let mut state = MachineState::new();
        step(&mut state, &[
            push(0x01)?,
            push(0x02)?,
            push(0x03)?,
            Opcode::Dup(3),
            Opcode::Swap(2),
        ])?;

        // [1, 2, 3, 1] -> SWAP2 -> [1, 1, 3, 2]
        assert_eq!(state.pop()?, Expr::val(2usize));
        assert_eq!(state.pop()?, Expr::val(3usize));
        assert_eq!(state.pop()?, Expr::val(1usize));

        Ok(())
    }

    #[test]
    fn calldata_copies_are_tracked_per_word() -> anyhow::Result<()> {
        let mut state = MachineState::new();
        step(&mut state, &[
            push(0x40)?,
            push(0x04)?,
            push(0x80)?,
            Opcode::CallDataCopy,
            push(0xa0)?,
            Opcode::MLoad,
        ])?;

        assert_eq!(
            state.pop()?,
            Rc::new(Expr::CallDataLoad(Expr::val(0x24usize)))
        );

        Ok(())
    }
}
