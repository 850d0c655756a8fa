//! The statement IR produced at statement boundaries during exploration.

use std::fmt::{Display, Formatter};

use crate::{
    signatures::Selector,
    vm::value::{known::KnownWord, Expr, SharedExpr},
};

/// The index of a basic block in the explorer's block arena.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct BlockId(pub usize);

impl Display for BlockId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A range of memory that is passed to a halting or logging instruction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Payload {
    pub offset: SharedExpr,
    pub size:   SharedExpr,

    /// The words in the range, if it was concrete, word-aligned and small
    /// enough to read back out of memory.
    pub words: Option<Vec<SharedExpr>>,
}

impl Payload {
    fn exprs(&self) -> Vec<&SharedExpr> {
        let mut exprs = vec![&self.offset, &self.size];
        exprs.extend(self.words.iter().flatten());
        exprs
    }
}

/// A statement in a basic block.
///
/// Every block ends in exactly one terminator, as reported by
/// [`Inst::is_terminator`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Inst {
    /// A write to memory; `byte` is set for `MSTORE8`.
    MStore {
        offset: SharedExpr,
        data:   SharedExpr,
        byte:   bool,
    },

    /// A write to storage. `variable` is set when the slot was recognised as
    /// a plain variable.
    SStore {
        slot:     SharedExpr,
        variable: Option<KnownWord>,
        data:     SharedExpr,
    },

    /// A write into the mapping rooted at `slot`.
    MappingStore {
        slot:   KnownWord,
        keys:   Vec<SharedExpr>,
        offset: KnownWord,
        data:   SharedExpr,
    },

    /// A write of an element of the dynamic array whose length lives at
    /// `slot`.
    ArrayStore {
        slot:  KnownWord,
        index: SharedExpr,
        data:  SharedExpr,
    },

    /// A write to transient storage.
    TStore { slot: SharedExpr, data: SharedExpr },

    /// An event emission. `event` is the first topic when it is a constant.
    Log {
        event:  Option<KnownWord>,
        topics: Vec<SharedExpr>,
        data:   Payload,
    },

    /// An expression evaluated for its side effects, such as a call whose
    /// result is discarded.
    Effect(SharedExpr),

    /// An unconditional jump.
    Jump { target: BlockId },

    /// A conditional jump.
    JumpI {
        condition:   SharedExpr,
        target:      BlockId,
        fallthrough: BlockId,
    },

    /// Execution falling through into a jump destination.
    JumpDest { fallthrough: BlockId },

    /// A case of the function dispatcher. The function body is explored as a
    /// separate root.
    SigCase {
        selector:    Selector,
        fallthrough: BlockId,
    },

    Stop,
    Return(Payload),
    Revert(Payload),
    SelfDestruct(SharedExpr),

    /// A path that could not be continued.
    Invalid { reason: String },
}

impl Inst {
    /// Checks if the instruction ends a basic block.
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Self::Jump { .. }
                | Self::JumpI { .. }
                | Self::JumpDest { .. }
                | Self::SigCase { .. }
                | Self::Stop
                | Self::Return(_)
                | Self::Revert(_)
                | Self::SelfDestruct(_)
                | Self::Invalid { .. }
        )
    }

    /// Gets the blocks that control may pass to after this instruction.
    #[must_use]
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Self::Jump { target } => vec![*target],
            Self::JumpI {
                target,
                fallthrough,
                ..
            } => vec![*target, *fallthrough],
            Self::JumpDest { fallthrough } | Self::SigCase { fallthrough, .. } => {
                vec![*fallthrough]
            }
            _ => vec![],
        }
    }

    /// Gets the expressions that the instruction reads.
    #[must_use]
    pub fn exprs(&self) -> Vec<&SharedExpr> {
        match self {
            Self::MStore { offset, data, .. } => vec![offset, data],
            Self::SStore { slot, data, .. } | Self::TStore { slot, data } => vec![slot, data],
            Self::MappingStore { keys, data, .. } => {
                let mut exprs: Vec<&SharedExpr> = keys.iter().collect();
                exprs.push(data);
                exprs
            }
            Self::ArrayStore { index, data, .. } => vec![index, data],
            Self::Log { topics, data, .. } => {
                let mut exprs: Vec<&SharedExpr> = topics.iter().collect();
                exprs.extend(data.exprs());
                exprs
            }
            Self::Effect(expr) | Self::SelfDestruct(expr) => vec![expr],
            Self::JumpI { condition, .. } => vec![condition],
            Self::Return(payload) | Self::Revert(payload) => payload.exprs(),
            Self::Jump { .. }
            | Self::JumpDest { .. }
            | Self::SigCase { .. }
            | Self::Stop
            | Self::Invalid { .. } => vec![],
        }
    }

    /// Checks whether the instruction changes persistent state.
    #[must_use]
    pub fn mutates_state(&self) -> bool {
        match self {
            Self::SStore { .. }
            | Self::MappingStore { .. }
            | Self::ArrayStore { .. }
            | Self::Log { .. }
            | Self::SelfDestruct(_) => true,
            Self::Effect(expr) => expr.any(&|e| match e {
                Expr::Call { kind, .. } => kind.may_mutate(),
                Expr::Create { .. } => true,
                _ => false,
            }),
            _ => false,
        }
    }
}
