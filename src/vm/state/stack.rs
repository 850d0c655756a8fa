//! This module contains the implementation of the symbolic machine's stack.

use crate::{
    constant::{MAXIMUM_STACK_DEPTH, STACK_OPERATION_MAX_ITEMS},
    error::execution::Error,
    vm::value::SharedExpr,
};

/// The representation of the symbolic machine's stack.
///
/// # Indexing
///
/// Indexing into this stack is zero-based, where frame 0 is the top stack
/// frame.
///
/// # Depth
///
/// As on a real EVM the stack holds at most [`MAXIMUM_STACK_DEPTH`] items, but
/// each item is an expression rather than a word.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct Stack {
    data: Vec<SharedExpr>,
}

impl Stack {
    /// Creates a new stack without any items on it.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a stack holding `items`, the last of which is the top.
    #[must_use]
    pub fn from_items(items: Vec<SharedExpr>) -> Self {
        Self { data: items }
    }

    /// Pushes the provided value onto the top of the stack.
    ///
    /// # Errors
    ///
    /// If the stack cannot grow to accommodate the requested `data`.
    pub fn push(&mut self, data: SharedExpr) -> Result<(), Error> {
        if self.data.len() + 1 > MAXIMUM_STACK_DEPTH {
            return Err(Error::StackTooDeep {
                requested: self.data.len() + 1,
            });
        }
        self.data.push(data);
        Ok(())
    }

    /// Pops the top value from the stack.
    ///
    /// # Errors
    ///
    /// If the stack has no item to pop.
    pub fn pop(&mut self) -> Result<SharedExpr, Error> {
        self.data.pop().ok_or(Error::StackUnderflow)
    }

    /// Reads from the stack frame at the provided `depth`.
    ///
    /// # Errors
    ///
    /// If `depth` does not exist in the stack.
    pub fn read(&self, depth: usize) -> Result<&SharedExpr, Error> {
        let index = self.index_of(depth)?;
        Ok(&self.data[index])
    }

    /// Duplicates the stack item at depth `n` onto the top of the stack, as
    /// `DUP{n+1}` does.
    ///
    /// # Errors
    ///
    /// If `n` is outside `[0, 15]` or the frame doesn't exist.
    pub fn dup(&mut self, n: usize) -> Result<(), Error> {
        if n >= STACK_OPERATION_MAX_ITEMS as usize {
            return Err(Error::InvalidOperandIndex {
                index:     n,
                operation: "DUP".into(),
            });
        }
        let value = self.read(n)?.clone();
        self.push(value)
    }

    /// Swaps the top stack item with the item at depth `n`, as `SWAP{n}`
    /// does.
    ///
    /// # Errors
    ///
    /// If `n` is outside `[1, 16]` or either frame doesn't exist.
    pub fn swap(&mut self, n: usize) -> Result<(), Error> {
        if n == 0 || n > STACK_OPERATION_MAX_ITEMS as usize {
            return Err(Error::InvalidOperandIndex {
                index:     n,
                operation: "SWAP".into(),
            });
        }
        let top = self.index_of(0)?;
        let other = self.index_of(n)?;
        self.data.swap(top, other);

        Ok(())
    }

    /// Gets the current size of the stack.
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Checks if the stack is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Gets the items on the stack, from the bottom to the top.
    #[must_use]
    pub fn items(&self) -> &[SharedExpr] {
        &self.data
    }

    fn index_of(&self, depth: usize) -> Result<usize, Error> {
        let available = self.data.len();
        if depth >= available {
            return Err(Error::PositionNotFound { depth, available });
        }

        Ok(available - 1 - depth)
    }
}
