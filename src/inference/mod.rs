//! This module contains the contract-wide storage tables that turn raw storage
//! slots into variables, mappings and arrays.
//!
//! # Late Binding
//!
//! Expressions and statements that touch storage refer to the tables by slot
//! key only. Labels discovered later, when the public functions are named,
//! therefore apply to every access that was built before the label was known.
//!
//! # Recognition
//!
//! A slot expression is classified as follows:
//!
//! 1. `keccak(k_1, ..., k_n, c)` for a constant `c` is an access to the mapping
//!    at slot `c` with keys `k_1..k_n`. If the last part is itself a mapping
//!    location, the access is into a nested mapping.
//! 2. `keccak(...) + c` (in either operand order) is the same access, at the
//!    struct field `c` slots into the mapping's value.
//! 3. `keccak(n) + i` (either order) for one of the first
//!    [`SLOT_HASH_COUNT`] slot indices `n` is element `i` of the dynamic array
//!    whose length is at slot `n`.
//! 4. A constant that is, or lies a few slots past, a hash computed from
//!    constant memory during exploration is the mapping access that hash
//!    describes, with constant keys.
//! 5. Any other constant is a plain variable.
//! 6. Anything else is left as raw storage.

pub mod types;

use std::collections::{BTreeMap, BTreeSet};

use bimap::BiMap;
use tracing::debug;

use crate::{
    constant::{MAXIMUM_CONSTANT_STRUCT_OFFSET, SLOT_HASH_COUNT, WORD_SIZE_BITS},
    inference::types::ValueType,
    vm::{
        inst::Inst,
        value::{known::KnownWord, Expr, SharedExpr},
    },
};

/// What a storage slot expression refers to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SlotKind {
    Variable(KnownWord),
    Mapping {
        slot:   KnownWord,
        keys:   Vec<SharedExpr>,
        offset: KnownWord,
    },
    Array {
        slot:  KnownWord,
        index: SharedExpr,
    },
    Raw,
}

/// A plain storage variable.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Variable {
    pub label: Option<String>,
    pub types: BTreeSet<ValueType>,
}

/// A mapping rooted at a storage slot.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Mapping {
    pub label: Option<String>,

    /// The distinct key lists the mapping was accessed with.
    pub key_shapes: Vec<Vec<SharedExpr>>,

    /// The struct field offsets accessed in the mapping's values.
    pub struct_offsets: BTreeSet<KnownWord>,

    /// The distinct values written into the mapping.
    pub value_exprs: Vec<SharedExpr>,

    /// The types observed for the values at each struct offset.
    pub value_types: BTreeMap<KnownWord, BTreeSet<ValueType>>,
}

impl Mapping {
    /// Gets the number of keys used to index the mapping.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.key_shapes.iter().map(Vec::len).max().unwrap_or(1)
    }

    /// Gets the best type for each key of the mapping.
    #[must_use]
    pub fn key_types(&self) -> Vec<ValueType> {
        (0..self.depth())
            .map(|i| {
                let observed: Vec<ValueType> = self
                    .key_shapes
                    .iter()
                    .filter_map(|keys| keys.get(i))
                    .map(|key| ValueType::observe(key))
                    .collect();
                ValueType::best(&observed)
            })
            .collect()
    }

    /// Checks whether the mapping's values are structs.
    #[must_use]
    pub fn has_struct_values(&self) -> bool {
        self.struct_offsets.iter().any(|offset| !offset.is_zero_value())
    }
}

/// A dynamic array whose length is held at a storage slot.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Array {
    pub label: Option<String>,
    pub types: BTreeSet<ValueType>,
}

/// The storage tables for a single contract.
///
/// These are mutated as exploration discovers storage accesses, and are read
/// when the results are named and rendered.
#[derive(Clone, Debug)]
pub struct StorageTables {
    variables: BTreeMap<KnownWord, Variable>,
    mappings:  BTreeMap<KnownWord, Mapping>,
    arrays:    BTreeMap<KnownWord, Array>,

    /// The hashes of the first [`SLOT_HASH_COUNT`] slot indices, used for
    /// recognising dynamic array accesses.
    slot_hashes: BiMap<KnownWord, usize>,

    /// The preimages of the constant hashes computed during exploration, for
    /// recognising mapping accesses with constant keys.
    preimages: BTreeMap<KnownWord, Vec<KnownWord>>,
}

impl StorageTables {
    /// Creates empty tables.
    #[must_use]
    pub fn new() -> Self {
        Self {
            variables:   BTreeMap::new(),
            mappings:    BTreeMap::new(),
            arrays:      BTreeMap::new(),
            slot_hashes: slot_hashes(SLOT_HASH_COUNT),
            preimages:   BTreeMap::new(),
        }
    }

    /// Classifies the storage slot expression `slot`.
    #[must_use]
    pub fn classify(&self, slot: &SharedExpr) -> SlotKind {
        match slot.as_ref() {
            Expr::Val(value) => {
                if let Some(index) = self.slot_hashes.get_by_left(value) {
                    return SlotKind::Array {
                        slot:  KnownWord::from(*index),
                        index: Expr::val(0usize),
                    };
                }
                match self.constant_mapping_location(*value) {
                    Some((slot, keys, offset)) => SlotKind::Mapping { slot, keys, offset },
                    None => SlotKind::Variable(*value),
                }
            }
            Expr::Sha3 { .. } => match self.mapping_location(slot) {
                Some((slot, keys)) => SlotKind::Mapping {
                    slot,
                    keys,
                    offset: KnownWord::zero(),
                },
                None => SlotKind::Raw,
            },
            Expr::Add { left, right } => {
                let (constant, other) = match (left.known(), right.known()) {
                    (Some(c), None) => (c, right),
                    (None, Some(c)) => (c, left),
                    _ => return SlotKind::Raw,
                };
                if let Some((slot, keys)) = self.mapping_location(other) {
                    return SlotKind::Mapping {
                        slot,
                        keys,
                        offset: constant,
                    };
                }
                match self.slot_hashes.get_by_left(&constant) {
                    Some(index) => SlotKind::Array {
                        slot:  KnownWord::from(*index),
                        index: other.clone(),
                    },
                    None => SlotKind::Raw,
                }
            }
            _ => SlotKind::Raw,
        }
    }

    /// Records that `hash` is the keccak hash of `words`.
    ///
    /// Hashes of a single word cannot be mapping locations and are not kept.
    pub fn record_preimage(&mut self, hash: KnownWord, words: Vec<KnownWord>) {
        if words.len() > 1 {
            self.preimages.entry(hash).or_insert(words);
        }
    }

    /// Resolves a constant `slot` that lies at most
    /// [`MAXIMUM_CONSTANT_STRUCT_OFFSET`] past a recorded hash of keys and a
    /// mapping slot, returning the mapping slot, the keys and the offset.
    fn constant_mapping_location(
        &self,
        slot: KnownWord,
    ) -> Option<(KnownWord, Vec<SharedExpr>, KnownWord)> {
        let (hash, _) = self.preimages.range(..=slot).next_back()?;
        let offset = slot - *hash;
        if offset > KnownWord::from(MAXIMUM_CONSTANT_STRUCT_OFFSET) {
            return None;
        }
        let (slot, keys) = self.hashed_location(*hash)?;
        Some((slot, keys, offset))
    }

    /// Gets the mapping slot and keys whose hash is `hash`, following nested
    /// mappings through their recorded preimages.
    fn hashed_location(&self, hash: KnownWord) -> Option<(KnownWord, Vec<SharedExpr>)> {
        let (base, keys) = self.preimages.get(&hash)?.split_last()?;
        let keys = keys.iter().map(|key| Expr::val(*key));
        match self.hashed_location(*base) {
            Some((slot, mut outer)) => {
                outer.extend(keys);
                Some((slot, outer))
            }
            None => Some((*base, keys.collect())),
        }
    }

    /// Gets the mapping slot and keys of a hash `expr` of one or more keys and
    /// a base, where the base is either the mapping's slot or the location of
    /// an outer mapping.
    fn mapping_location(&self, expr: &SharedExpr) -> Option<(KnownWord, Vec<SharedExpr>)> {
        let Expr::Sha3 {
            words: Some(words), ..
        } = expr.as_ref()
        else {
            return None;
        };
        let (base, keys) = words.split_last()?;
        if keys.is_empty() {
            return None;
        }

        let outer = match base.known() {
            Some(hash) => self.hashed_location(hash),
            None => self.mapping_location(base),
        };
        if let Some((slot, mut outer)) = outer {
            outer.extend(keys.iter().cloned());
            return Some((slot, outer));
        }
        if let Some(slot) = base.known() {
            return Some((slot, keys.to_vec()));
        }

        // Some compilers hash the slot ahead of the key.
        let (base, keys) = words.split_first()?;
        base.known().map(|slot| (slot, keys.to_vec()))
    }

    /// Registers a read of `slot` and builds the expression for its value.
    pub fn load(&mut self, slot: SharedExpr) -> SharedExpr {
        let expr = match self.classify(&slot) {
            SlotKind::Variable(key) => {
                self.variables.entry(key).or_default();
                Expr::SLoad {
                    slot,
                    variable: Some(key),
                }
            }
            SlotKind::Mapping { slot, keys, offset } => {
                self.observe_mapping(slot, &keys, offset);
                Expr::MappingLoad { slot, keys, offset }
            }
            SlotKind::Array { slot, index } => {
                self.arrays.entry(slot).or_default();
                Expr::ArrayLoad { slot, index }
            }
            SlotKind::Raw => Expr::SLoad {
                slot,
                variable: None,
            },
        };

        std::rc::Rc::new(expr)
    }

    /// Registers a write of `data` to `slot` and builds the statement for it.
    pub fn store(&mut self, slot: SharedExpr, data: SharedExpr) -> Inst {
        let observed = ValueType::observe(&data);
        match self.classify(&slot) {
            SlotKind::Variable(key) => {
                self.variables.entry(key).or_default().types.insert(observed);
                Inst::SStore {
                    slot,
                    variable: Some(key),
                    data,
                }
            }
            SlotKind::Mapping { slot, keys, offset } => {
                let mapping = self.observe_mapping(slot, &keys, offset);
                mapping.value_types.entry(offset).or_default().insert(observed);
                if !mapping.value_exprs.contains(&data) {
                    mapping.value_exprs.push(data.clone());
                }
                Inst::MappingStore {
                    slot,
                    keys,
                    offset,
                    data,
                }
            }
            SlotKind::Array { slot, index } => {
                self.arrays.entry(slot).or_default().types.insert(observed);
                Inst::ArrayStore { slot, index, data }
            }
            SlotKind::Raw => Inst::SStore {
                slot,
                variable: None,
                data,
            },
        }
    }

    fn observe_mapping(
        &mut self,
        slot: KnownWord,
        keys: &[SharedExpr],
        offset: KnownWord,
    ) -> &mut Mapping {
        let mapping = self.mappings.entry(slot).or_insert_with(|| {
            debug!(slot = %slot, "Discovered mapping");
            Mapping::default()
        });
        if !mapping.key_shapes.iter().any(|shape| shape.as_slice() == keys) {
            mapping.key_shapes.push(keys.to_vec());
        }
        mapping.struct_offsets.insert(offset);
        mapping
    }

    /// Records that values of type `typ` were read from the variable at
    /// `slot`.
    pub fn observe_variable_type(&mut self, slot: KnownWord, typ: ValueType) {
        if let Some(variable) = self.variables.get_mut(&slot) {
            variable.types.insert(typ);
        }
    }

    /// Gets the plain variables, ordered by slot.
    #[must_use]
    pub fn variables(&self) -> &BTreeMap<KnownWord, Variable> {
        &self.variables
    }

    /// Gets the mappings, ordered by slot.
    #[must_use]
    pub fn mappings(&self) -> &BTreeMap<KnownWord, Mapping> {
        &self.mappings
    }

    /// Gets the dynamic arrays, ordered by slot.
    #[must_use]
    pub fn arrays(&self) -> &BTreeMap<KnownWord, Array> {
        &self.arrays
    }

    /// Labels the variable at `slot`, returning `false` if there is none.
    pub fn label_variable(&mut self, slot: KnownWord, label: impl Into<String>) -> bool {
        self.variables
            .get_mut(&slot)
            .map(|variable| variable.label = Some(label.into()))
            .is_some()
    }

    /// Labels the mapping at `slot`, returning `false` if there is none.
    pub fn label_mapping(&mut self, slot: KnownWord, label: impl Into<String>) -> bool {
        self.mappings
            .get_mut(&slot)
            .map(|mapping| mapping.label = Some(label.into()))
            .is_some()
    }

    /// Labels the array at `slot`, returning `false` if there is none.
    pub fn label_array(&mut self, slot: KnownWord, label: impl Into<String>) -> bool {
        self.arrays
            .get_mut(&slot)
            .map(|array| array.label = Some(label.into()))
            .is_some()
    }

    /// Gets the name of the variable at `slot`: its label if it has one, and
    /// otherwise `var{n}` for the `n`th variable by slot.
    #[must_use]
    pub fn variable_name(&self, slot: KnownWord) -> String {
        name_in(&self.variables, slot, "var", |v| v.label.as_deref())
    }

    /// Gets the name of the mapping at `slot`.
    #[must_use]
    pub fn mapping_name(&self, slot: KnownWord) -> String {
        name_in(&self.mappings, slot, "mapping", |m| m.label.as_deref())
    }

    /// Gets the name of the array at `slot`.
    #[must_use]
    pub fn array_name(&self, slot: KnownWord) -> String {
        name_in(&self.arrays, slot, "array", |a| a.label.as_deref())
    }

    /// Gets the declared type of the variable at `slot`.
    #[must_use]
    pub fn variable_type(&self, slot: KnownWord) -> ValueType {
        ValueType::best(self.variables.get(&slot).into_iter().flat_map(|v| &v.types))
    }

    /// Gets the declared type of the array at `slot`, such as `address[]`.
    #[must_use]
    pub fn array_type(&self, slot: KnownWord) -> String {
        let element = ValueType::best(self.arrays.get(&slot).into_iter().flat_map(|a| &a.types));
        format!("{element}[]")
    }

    /// Gets the declared type of the mapping at `slot`, such as
    /// `mapping(address => mapping(address => uint256))`.
    #[must_use]
    pub fn mapping_type(&self, slot: KnownWord) -> String {
        let Some(mapping) = self.mappings.get(&slot) else {
            return format!("mapping({0} => {0})", ValueType::UInt(WORD_SIZE_BITS));
        };
        let value = if mapping.has_struct_values() {
            self.struct_name(slot)
        } else {
            let observed = mapping.value_types.get(&KnownWord::zero());
            ValueType::best(observed.into_iter().flatten()).to_string()
        };

        mapping
            .key_types()
            .iter()
            .rev()
            .fold(value, |inner, key| format!("mapping({key} => {inner})"))
    }

    /// Gets the name of the struct stored as the values of the mapping at
    /// `slot`.
    #[must_use]
    pub fn struct_name(&self, slot: KnownWord) -> String {
        let position = self.mappings.keys().position(|key| *key == slot).unwrap_or(self.mappings.len());
        format!("Struct{}", position + 1)
    }

    /// Gets the fields of the struct values of the mapping at `slot`, as
    /// pairs of slot offset and type.
    #[must_use]
    pub fn struct_fields(&self, slot: KnownWord) -> Vec<(KnownWord, ValueType)> {
        let Some(mapping) = self.mappings.get(&slot) else { return vec![] };
        mapping
            .struct_offsets
            .iter()
            .map(|offset| {
                let observed = mapping.value_types.get(offset);
                (*offset, ValueType::best(observed.into_iter().flatten()))
            })
            .collect()
    }

    /// Checks whether a variable slot also holds the length of an array.
    #[must_use]
    pub fn is_array_length(&self, slot: KnownWord) -> bool {
        self.arrays.contains_key(&slot)
    }
}

impl Default for StorageTables {
    fn default() -> Self {
        Self::new()
    }
}

/// Gets the name of the struct field `offset` slots into a value.
#[must_use]
pub fn field_name(offset: KnownWord) -> String {
    match offset.as_usize() {
        Some(offset) => format!("field{offset}"),
        None => format!("field_{offset}"),
    }
}

/// Generates the hashes of the first `count` slot indices, assuming
/// big-endian (network) byte ordering.
fn slot_hashes(count: usize) -> BiMap<KnownWord, usize> {
    (0..count)
        .map(|index| (KnownWord::keccak(&[KnownWord::from(index)]), index))
        .collect()
}


/// Finds the label of `slot` in `table`, falling back to a name derived from
/// its position.
fn name_in<T>(
    table: &BTreeMap<KnownWord, T>,
    slot: KnownWord,
    prefix: &str,
    label: impl Fn(&T) -> Option<&str>,
) -> String {
    if let Some(name) = table.get(&slot).and_then(&label) {
        return name.to_string();
    }
    let position = table.keys().position(|key| *key == slot).unwrap_or(table.len());
    format!("{prefix}{}", position + 1)
}

#[cfg(test)]
mod test {
    use std::rc::Rc;

    use crate::{
        inference::{field_name, types::ValueType, SlotKind, StorageTables},
        vm::{
            inst::Inst,
            value::{known::KnownWord, Expr, Property, SharedExpr},
        },
    };

    fn caller() -> SharedExpr {
        Rc::new(Expr::Prop(Property::Caller))
    }

    fn sha3(words: Vec<SharedExpr>) -> SharedExpr {
        Rc::new(Expr::Sha3 {
            offset: Expr::val(0usize),
            size:   Expr::val(words.len() * 32),
            words:  Some(words),
        })
    }

    #[test]
    fn recognises_mappings_keyed_by_caller() {
        let mut tables = StorageTables::new();
        let slot = sha3(vec![caller(), Expr::val(3usize)]);
        let load = tables.load(slot);

        assert_eq!(
            load,
            Rc::new(Expr::MappingLoad {
                slot:   KnownWord::from(3usize),
                keys:   vec![caller()],
                offset: KnownWord::zero(),
            })
        );
        let mapping = &tables.mappings()[&KnownWord::from(3usize)];
        assert_eq!(mapping.key_shapes, vec![vec![caller()]]);
        assert_eq!(tables.mapping_name(KnownWord::from(3usize)), "mapping1");
        assert_eq!(mapping.key_types(), vec![ValueType::Address]);
    }

    #[test]
    fn recognises_struct_offsets_and_nesting() {
        let tables = StorageTables::new();
        let inner = sha3(vec![caller(), Expr::val(1usize)]);
        let nested = sha3(vec![Rc::new(Expr::CallValue), inner.clone()]);
        let field = Rc::new(Expr::Add {
            left:  Expr::val(2usize),
            right: inner,
        });

        assert_eq!(tables.classify(&nested), SlotKind::Mapping {
            slot:   KnownWord::from(1usize),
            keys:   vec![caller(), Rc::new(Expr::CallValue)],
            offset: KnownWord::zero(),
        });
        assert_eq!(tables.classify(&field), SlotKind::Mapping {
            slot:   KnownWord::from(1usize),
            keys:   vec![caller()],
            offset: KnownWord::from(2usize),
        });
    }

    #[test]
    fn recognises_arrays_variables_and_raw_slots() {
        let tables = StorageTables::new();
        let base = KnownWord::keccak(&[KnownWord::from(4usize)]);
        let element = Rc::new(Expr::Add {
            left:  Rc::new(Expr::CallValue),
            right: Expr::val(base),
        });

        assert_eq!(tables.classify(&element), SlotKind::Array {
            slot:  KnownWord::from(4usize),
            index: Rc::new(Expr::CallValue),
        });
        assert_eq!(
            tables.classify(&Expr::val(7usize)),
            SlotKind::Variable(KnownWord::from(7usize))
        );
        assert_eq!(tables.classify(&caller()), SlotKind::Raw);
    }

    #[test]
    fn resolves_constant_keys_through_recorded_hashes() {
        let mut tables = StorageTables::new();
        let word = |n: usize| KnownWord::from(n);
        let inner = KnownWord::keccak(&[word(5), word(3)]);
        let outer = KnownWord::keccak(&[word(6), inner]);
        tables.record_preimage(inner, vec![word(5), word(3)]);
        tables.record_preimage(outer, vec![word(6), inner]);

        assert_eq!(tables.classify(&Expr::val(inner)), SlotKind::Mapping {
            slot:   word(3),
            keys:   vec![Expr::val(5usize)],
            offset: KnownWord::zero(),
        });
        assert_eq!(tables.classify(&Expr::val(outer + word(1))), SlotKind::Mapping {
            slot:   word(3),
            keys:   vec![Expr::val(5usize), Expr::val(6usize)],
            offset: word(1),
        });

        // A symbolic key into a mapping reached through a constant key
        let mixed = sha3(vec![caller(), Expr::val(inner)]);
        assert_eq!(tables.classify(&mixed), SlotKind::Mapping {
            slot:   word(3),
            keys:   vec![Expr::val(5usize), caller()],
            offset: KnownWord::zero(),
        });

        // Unrecorded hashes remain plain variables
        let unknown = KnownWord::keccak(&[word(1), word(2)]);
        assert_eq!(tables.classify(&Expr::val(unknown)), SlotKind::Variable(unknown));
    }

    #[test]
    fn stores_record_types_and_labels_bind_late() {
        let mut tables = StorageTables::new();
        let inst = tables.store(Expr::val(0usize), caller());
        assert!(matches!(inst, Inst::SStore {
            variable: Some(_),
            ..
        }));
        tables.load(Expr::val(5usize));

        let zero = KnownWord::zero();
        assert_eq!(tables.variable_name(KnownWord::from(5usize)), "var2");
        assert!(tables.label_variable(zero, "owner"));
        assert_eq!(tables.variable_name(zero), "owner");
        assert!(!tables.label_mapping(zero, "nothing"));
        assert!(tables.variables()[&zero].types.contains(&ValueType::Address));
        assert_eq!(tables.variable_type(zero), ValueType::Address);
    }

    #[test]
    fn declares_nested_and_struct_mapping_types() {
        let mut tables = StorageTables::new();
        let balance = sha3(vec![caller(), Expr::val(2usize)]);
        let allowance = sha3(vec![caller(), sha3(vec![caller(), Expr::val(3usize)])]);
        tables.store(balance, Expr::val(100usize));
        tables.store(allowance, Expr::val(100usize));

        let entry = sha3(vec![caller(), Expr::val(4usize)]);
        let field = Rc::new(Expr::Add {
            left:  entry.clone(),
            right: Expr::val(1usize),
        });
        tables.store(entry, caller());
        tables.store(field, Expr::val(100usize));

        assert_eq!(
            tables.mapping_type(KnownWord::from(2usize)),
            "mapping(address => uint256)"
        );
        assert_eq!(
            tables.mapping_type(KnownWord::from(3usize)),
            "mapping(address => mapping(address => uint256))"
        );
        assert_eq!(
            tables.mapping_type(KnownWord::from(4usize)),
            "mapping(address => Struct3)"
        );
        assert_eq!(tables.struct_fields(KnownWord::from(4usize)), vec![
            (KnownWord::zero(), ValueType::Address),
            (KnownWord::one(), ValueType::UInt(256)),
        ]);
        assert_eq!(field_name(KnownWord::one()), "field1");
    }
}
