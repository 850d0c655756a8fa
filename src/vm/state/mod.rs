//! The state representation for the symbolic machine, and utilities for
//! dealing with said representation.

pub mod memory;
pub mod stack;

use crate::{
    error::execution::Error,
    vm::{
        inst::Inst,
        state::{memory::Memory, stack::Stack},
        value::SharedExpr,
    },
};

/// The state of one path of execution.
///
/// A state owns its stack and memory, and logs the statements produced since
/// it was created. Once a terminator has been logged through [`Self::halt`]
/// the state is halted, and mutating it any further is a bug in the caller.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MachineState {
    stack:  Stack,
    memory: Memory,
    log:    Vec<Inst>,
    halted: bool,
}

impl MachineState {
    /// Creates a new state with an empty stack and memory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a state from an existing stack and memory.
    #[must_use]
    pub fn with_contents(stack: Stack, memory: Memory) -> Self {
        Self {
            stack,
            memory,
            log: vec![],
            halted: false,
        }
    }

    /// Creates an independent copy of the state for a new branch.
    ///
    /// The copy has its own stack and memory map, but shares the immutable
    /// expressions inside them. Its log is empty and it is not halted.
    #[must_use]
    pub fn fork(&self) -> Self {
        Self::with_contents(self.stack.clone(), self.memory.clone())
    }

    /// Pushes `value` onto the stack.
    ///
    /// # Errors
    ///
    /// If the stack is already full.
    pub fn push(&mut self, value: SharedExpr) -> Result<(), Error> {
        self.assert_running();
        self.stack.push(value)
    }

    /// Pops the top value off the stack.
    ///
    /// # Errors
    ///
    /// If the stack is empty.
    pub fn pop(&mut self) -> Result<SharedExpr, Error> {
        self.assert_running();
        self.stack.pop()
    }

    /// Pops `N` values off the stack, the top of the stack first.
    ///
    /// # Errors
    ///
    /// If the stack holds fewer than `N` values.
    pub fn pop_n<const N: usize>(&mut self) -> Result<[SharedExpr; N], Error> {
        self.assert_running();
        let mut values = Vec::with_capacity(N);
        for _ in 0..N {
            values.push(self.stack.pop()?);
        }
        values.try_into().map_err(|_| Error::StackUnderflow)
    }

    /// Gets the stack.
    #[must_use]
    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    /// Gets the stack for modification.
    pub fn stack_mut(&mut self) -> &mut Stack {
        self.assert_running();
        &mut self.stack
    }

    /// Gets the memory.
    #[must_use]
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Gets the memory for modification.
    pub fn memory_mut(&mut self) -> &mut Memory {
        self.assert_running();
        &mut self.memory
    }

    /// Appends a non-terminating statement to the log.
    pub fn record(&mut self, inst: Inst) {
        self.assert_running();
        debug_assert!(!inst.is_terminator(), "Use halt to record terminators");
        self.log.push(inst);
    }

    /// Appends `terminator` to the log and halts the state.
    ///
    /// # Panics
    ///
    /// If the state has already halted.
    pub fn halt(&mut self, terminator: Inst) {
        self.assert_running();
        self.log.push(terminator);
        self.halted = true;
    }

    /// Checks if the state has halted.
    #[must_use]
    pub fn halted(&self) -> bool {
        self.halted
    }

    /// Gets the statements logged so far.
    #[must_use]
    pub fn log(&self) -> &[Inst] {
        &self.log
    }

    /// Consumes the state, returning its log.
    #[must_use]
    pub fn into_log(self) -> Vec<Inst> {
        self.log
    }

    fn assert_running(&self) {
        assert!(!self.halted, "Attempted to modify a halted machine state");
    }
}
