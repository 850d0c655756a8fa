//! This module contains the serialisable form of the storage layout that was
//! inferred for a contract.

use serde::{Deserialize, Serialize};

use crate::{inference::StorageTables, utility::U256Wrapper};

/// The storage layout discovered for the input contract.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct StorageLayout {
    slots: Vec<StorageSlot>,
}

impl StorageLayout {
    /// Adds a slot to the storage layout.
    pub fn add(&mut self, slot: StorageSlot) {
        self.slots.push(slot);

        // Keep them sorted by slot index with ties broken by kind
        self.slots.sort_by_key(|s| (s.index, s.kind));
    }

    /// Gets the storage slots that make up this layout.
    ///
    /// These are guaranteed to be sorted in ascending order by slot index.
    #[must_use]
    pub fn slots(&self) -> &[StorageSlot] {
        &self.slots
    }

    /// Gets the slot of the provided `kind` at `index`, if there is one.
    #[must_use]
    pub fn slot(&self, index: impl Into<U256Wrapper>, kind: SlotKind) -> Option<&StorageSlot> {
        let index = index.into();
        self.slots.iter().find(|s| s.index == index && s.kind == kind)
    }

    /// Checks that there is no slot in the layout at the specified `index`.
    #[must_use]
    pub fn has_no_slot_at(&self, index: impl Into<U256Wrapper>) -> bool {
        let index = index.into();
        !self.slots.iter().any(|s| s.index == index)
    }

    /// Gets the number of slots in the storage layout.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Checks if the storage layout is empty (has no slots).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl From<&StorageTables> for StorageLayout {
    fn from(tables: &StorageTables) -> Self {
        let mut layout = Self::default();
        for slot in tables.variables().keys().filter(|s| !tables.is_array_length(**s)) {
            layout.add(StorageSlot {
                index: slot.into(),
                kind:  SlotKind::Variable,
                name:  tables.variable_name(*slot),
                typ:   tables.variable_type(*slot).to_string(),
            });
        }
        for slot in tables.mappings().keys() {
            layout.add(StorageSlot {
                index: slot.into(),
                kind:  SlotKind::Mapping,
                name:  tables.mapping_name(*slot),
                typ:   tables.mapping_type(*slot),
            });
        }
        for slot in tables.arrays().keys() {
            layout.add(StorageSlot {
                index: slot.into(),
                kind:  SlotKind::Array,
                name:  tables.array_name(*slot),
                typ:   tables.array_type(*slot),
            });
        }

        layout
    }
}

/// What lives at a storage slot.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotKind {
    Variable,
    Mapping,
    Array,
}

/// A storage slot with its name and best-known type.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct StorageSlot {
    /// The concrete index of the storage slot in the contract.
    pub index: U256Wrapper,

    pub kind: SlotKind,

    /// The label of the slot if a public accessor named it, and otherwise a
    /// name derived from its position.
    pub name: String,

    #[serde(rename = "type")]
    /// The declared type of the slot, such as `mapping(address => uint256)`.
    pub typ: String,
}

#[cfg(test)]
mod test {
    use std::rc::Rc;

    use crate::{
        inference::StorageTables,
        layout::{SlotKind, StorageLayout},
        vm::value::{known::KnownWord, Expr, Property},
    };

    #[test]
    fn builds_from_storage_tables() -> anyhow::Result<()> {
        let mut tables = StorageTables::new();
        let caller = Rc::new(Expr::Prop(Property::Caller));
        tables.store(Expr::val(0usize), caller.clone());
        tables.load(Rc::new(Expr::Sha3 {
            offset: Expr::val(0usize),
            size:   Expr::val(64usize),
            words:  Some(vec![caller, Expr::val(1usize)]),
        }));
        tables.label_variable(KnownWord::zero(), "owner");

        let layout = StorageLayout::from(&tables);
        assert_eq!(layout.slot_count(), 2);
        let owner = layout.slot(0usize, SlotKind::Variable).expect("No variable at slot 0");
        assert_eq!(owner.name, "owner");
        assert_eq!(owner.typ, "address");
        let mapping = layout.slot(1usize, SlotKind::Mapping).expect("No mapping at slot 1");
        assert_eq!(mapping.typ, "mapping(address => uint256)");
        assert!(layout.has_no_slot_at(2usize));

        let json = serde_json::to_string(&layout)?;
        assert!(json.contains(r#""kind":"mapping""#));
        assert!(json.contains(r#""type":"mapping(address => uint256)""#));

        Ok(())
    }
}
