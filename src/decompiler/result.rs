//! The decompiled form of a contract, as produced by the decompiler's final
//! stage.

use std::collections::BTreeMap;

use crate::{
    codegen,
    error::execution::Errors,
    inference::StorageTables,
    layout::StorageLayout,
    metadata::Metadata,
    signatures::{signature_name, signature_parameters, Selector},
    vm::{
        inst::{BlockId, Inst},
        value::known::KnownWord,
        ExplorationResult,
    },
};

/// A public function of the contract.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Function {
    pub selector: Selector,

    /// The human-readable signature, if the signature database knew it.
    pub signature: Option<String>,

    /// The first block of the function's body.
    pub entry: BlockId,

    /// The types of the function's parameters.
    pub parameters: Vec<String>,

    /// Whether the function accepts value.
    pub payable: bool,

    /// Whether the function leaves state untouched.
    pub view: bool,
}

impl Function {
    /// Gets the name from the function's signature, if it has one.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.signature.as_deref().map(signature_name)
    }

    /// Gets the name of the function, falling back to its selector.
    #[must_use]
    pub fn name(&self) -> String {
        self.label().map_or_else(|| self.selector.to_string(), str::to_string)
    }
}

/// The part of storage that a public accessor reads.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum AccessorTarget {
    Variable(KnownWord),
    Mapping(KnownWord),
    Array(KnownWord),
}

/// A public function that only returns a value read from storage.
///
/// These are not listed as functions. Instead, their name labels what they
/// read, which is then declared as `public`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Accessor {
    pub selector: Selector,
    pub name:     String,
    pub target:   AccessorTarget,
}

/// An event emitted by the contract.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Event {
    /// The first topic of the log, which is the hash of the signature.
    pub hash: KnownWord,

    /// The human-readable signature, if the signature database knew it.
    pub signature: Option<String>,

    /// The number of indexed arguments.
    pub indexed: usize,

    /// The number of words of unindexed data.
    pub data_words: usize,
}

impl Event {
    /// Gets the name of the event, falling back to a name derived from its
    /// hash.
    #[must_use]
    pub fn name(&self) -> String {
        match &self.signature {
            Some(signature) => signature_name(signature).to_string(),
            None => Self::synthetic_name(self.hash),
        }
    }

    /// Gets the name of an event without a known signature, derived from the
    /// start of its `hash`.
    #[must_use]
    pub fn synthetic_name(hash: KnownWord) -> String {
        format!("Event_{}", &hex::encode(hash.bytes_be())[..8])
    }

    /// Gets the types of the event's parameters.
    #[must_use]
    pub fn parameters(&self) -> Vec<String> {
        match &self.signature {
            Some(signature) => signature_parameters(signature),
            None => vec!["uint256".to_string(); self.indexed + self.data_words],
        }
    }
}

/// A decompiled contract.
#[derive(Clone, Debug)]
pub struct Decompilation {
    pub(crate) metadata:    Option<Metadata>,
    pub(crate) exploration: ExplorationResult,
    pub(crate) functions:   Vec<Function>,
    pub(crate) accessors:   Vec<Accessor>,
    pub(crate) events:      BTreeMap<KnownWord, Event>,
    pub(crate) fallback:    bool,
}

impl Decompilation {
    /// Gets the compiler metadata that was stripped from the code.
    #[must_use]
    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    /// Gets the public functions, in order of discovery, leaving out the ones
    /// that were folded into a storage declaration.
    #[must_use]
    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    /// Gets the function with the provided `selector`, if it is listed.
    #[must_use]
    pub fn function(&self, selector: Selector) -> Option<&Function> {
        self.functions.iter().find(|f| f.selector == selector)
    }

    /// Gets the public accessors that were folded into storage declarations.
    #[must_use]
    pub fn accessors(&self) -> &[Accessor] {
        &self.accessors
    }

    /// Gets the events, ordered by hash.
    #[must_use]
    pub fn events(&self) -> &BTreeMap<KnownWord, Event> {
        &self.events
    }

    /// Gets the variables, mappings and arrays found in storage.
    #[must_use]
    pub fn storage(&self) -> &StorageTables {
        &self.exploration.storage
    }

    /// Gets the errors that ended individual paths during exploration.
    #[must_use]
    pub fn errors(&self) -> &Errors {
        &self.exploration.errors
    }

    /// Gets the join points whose merge did not validate against the
    /// dominator tree, which are worth a closer look.
    #[must_use]
    pub fn flagged_joins(&self) -> &[BlockId] {
        &self.exploration.flagged_joins
    }

    /// Gets the underlying control-flow graph and tables.
    #[must_use]
    pub fn exploration(&self) -> &ExplorationResult {
        &self.exploration
    }

    /// Checks whether the dispatcher does more than halt when no function
    /// matches, and is therefore rendered as a fallback function.
    #[must_use]
    pub fn has_fallback(&self) -> bool {
        self.fallback
    }

    /// Gets the statements of `function`, block by block in depth-first
    /// order.
    #[must_use]
    pub fn statements(&self, function: &Function) -> Vec<&Inst> {
        self.exploration
            .cfg(function.entry)
            .blocks()
            .iter()
            .filter_map(|id| self.exploration.block(*id))
            .flat_map(|block| &block.insts)
            .collect()
    }

    /// Gets the storage layout.
    #[must_use]
    pub fn layout(&self) -> StorageLayout {
        StorageLayout::from(self.storage())
    }

    /// Renders the contract as Solidity-like source.
    #[must_use]
    pub fn render(&self) -> String {
        codegen::solidity::render(self)
    }

    /// Renders the contract as Yul-like source.
    #[must_use]
    pub fn render_yul(&self) -> String {
        codegen::yul::render(self)
    }
}
