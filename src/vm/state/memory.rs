//! This module contains the definition of the symbolic machine's memory.

use std::collections::HashMap;

use crate::{
    constant::WORD_SIZE_BYTES,
    vm::value::{known::KnownWord, SharedExpr},
};

/// A representation of the transient memory of the symbolic machine.
///
/// Where the memory on a real EVM implementation is a byte array, here memory
/// maps offset expressions to the expressions written there. Entries at
/// constant offsets are kept consistent with one another: a write removes any
/// entry at a constant offset whose bytes it overlaps. Entries at symbolic
/// offsets can only be found again through an identical offset expression.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Memory {
    mem: HashMap<SharedExpr, MemStore>,
}

/// The data that actually gets stored into memory.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MemStore {
    pub data: SharedExpr,

    /// Set if the store wrote a single byte rather than a word.
    pub byte: bool,
}

impl Memory {
    /// Constructs a new memory container that currently stores no data.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the 256-bit `value` at the provided `offset`.
    pub fn store(&mut self, offset: SharedExpr, value: SharedExpr) {
        self.clobber(&offset, WORD_SIZE_BYTES);
        self.mem.insert(offset, MemStore {
            data: value,
            byte: false,
        });
    }

    /// Stores the low byte of `value` at the provided `offset`.
    pub fn store_8(&mut self, offset: SharedExpr, value: SharedExpr) {
        self.clobber(&offset, 1);
        self.mem.insert(offset, MemStore {
            data: value,
            byte: true,
        });
    }

    /// Loads the word stored at `offset`.
    ///
    /// Returns [`None`] if no whole word was stored at exactly that offset,
    /// leaving it to the caller to produce a symbolic read.
    #[must_use]
    pub fn load(&self, offset: &SharedExpr) -> Option<&SharedExpr> {
        self.mem
            .get(offset)
            .filter(|store| !store.byte)
            .map(|store| &store.data)
    }

    /// Gets the raw entry at `offset`.
    #[must_use]
    pub fn entry(&self, offset: &SharedExpr) -> Option<&MemStore> {
        self.mem.get(offset)
    }

    /// Removes every entry at a constant offset that overlaps the `size`
    /// bytes starting at `offset`.
    ///
    /// If `offset` is symbolic nothing can be said about overlap, and only
    /// the entry keyed by the identical expression is removed.
    pub fn clobber(&mut self, offset: &SharedExpr, size: usize) {
        let Some(start) = offset.known().and_then(|o| o.as_usize()) else {
            self.mem.remove(offset);
            return;
        };
        let end = start.saturating_add(size);
        self.mem.retain(|key, store| {
            let Some(other) = key.known().and_then(|k| k.as_usize()) else { return true };
            let other_end = other.saturating_add(if store.byte { 1 } else { WORD_SIZE_BYTES });
            other_end <= start || other >= end
        });
    }

    /// Removes every entry at a constant offset at or beyond `offset`.
    pub fn clobber_from(&mut self, offset: KnownWord) {
        self.mem
            .retain(|key, _| key.known().map_or(true, |k| k.value() < offset.value()));
    }

    /// Iterates over all entries in no particular order.
    pub fn entries(&self) -> impl Iterator<Item = (&SharedExpr, &MemStore)> {
        self.mem.iter()
    }

    /// Inserts `store` at `offset` without clobbering any overlapping entry.
    pub(crate) fn insert_raw(&mut self, offset: SharedExpr, store: MemStore) {
        self.mem.insert(offset, store);
    }

    /// Gets the number of entries in the memory.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mem.len()
    }

    /// Checks if the memory has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mem.is_empty()
    }
}

#[cfg(test)]
mod test {
    use std::rc::Rc;

    use crate::vm::{
        state::memory::Memory,
        value::{known::KnownWord, Expr},
    };

    #[test]
    fn can_store_and_overwrite_words() {
        let mut memory = Memory::new();
        let offset = Expr::val(0usize);
        memory.store(offset.clone(), Expr::val(1usize));
        memory.store(offset.clone(), Expr::val(2usize));

        assert_eq!(memory.len(), 1);
        assert_eq!(memory.load(&offset), Some(&Expr::val(2usize)));
    }

    #[test]
    fn overlapping_writes_clobber_constant_entries() {
        let mut memory = Memory::new();
        memory.store(Expr::val(0usize), Expr::val(1usize));
        memory.store(Expr::val(0x20usize), Expr::val(2usize));
        memory.store(Expr::val(0x10usize), Expr::val(3usize));

        assert_eq!(memory.load(&Expr::val(0usize)), None);
        assert_eq!(memory.load(&Expr::val(0x20usize)), None);
        assert_eq!(memory.load(&Expr::val(0x10usize)), Some(&Expr::val(3usize)));

        memory.store_8(Expr::val(0x2fusize), Expr::val(4usize));
        assert_eq!(memory.load(&Expr::val(0x10usize)), None);
        assert_eq!(memory.load(&Expr::val(0x2fusize)), None);
        assert!(memory.entry(&Expr::val(0x2fusize)).is_some());
    }

    #[test]
    fn symbolic_offsets_are_matched_structurally() {
        let mut memory = Memory::new();
        let offset = Rc::new(Expr::CallDataLoad(Expr::val(4usize)));
        memory.store(offset.clone(), Expr::val(9usize));
        memory.store(Expr::val(0usize), Expr::val(1usize));

        let same = Rc::new(Expr::CallDataLoad(Expr::val(4usize)));
        assert_eq!(memory.load(&same), Some(&Expr::val(9usize)));

        memory.clobber_from(KnownWord::zero());
        assert_eq!(memory.len(), 1);
    }
}
