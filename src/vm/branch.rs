//! Branches are the units of work in the explorer's queue, and blocks are what
//! exploring them produces.

use derivative::Derivative;

use crate::vm::{
    inst::{BlockId, Inst},
    state::MachineState,
};

/// A program point waiting to be explored.
///
/// The branch owns the state that execution reaches the point with, so that
/// exploring it can never affect any other path.
#[derive(Clone, Debug)]
pub struct Branch {
    /// The block that exploring this branch fills in.
    pub block: BlockId,

    /// The program counter of the first instruction.
    pub pc: usize,

    /// The state on arrival.
    pub state: MachineState,
}

/// A basic block of the explored control-flow graph.
///
/// Once explored, `insts` ends in exactly one terminator.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct Block {
    pub id: BlockId,

    /// The index of the rooted subgraph the block belongs to. The dispatcher
    /// is root `0`, and each public function gets its own root.
    pub root: usize,

    /// The program counter of the first instruction.
    pub pc: usize,

    /// The byte offset of the first instruction.
    pub offset: u32,

    pub insts: Vec<Inst>,

    /// The state on entry, widened with `Phi` nodes as more paths join here.
    #[derivative(Debug = "ignore")]
    pub(crate) entry: MachineState,
}

impl Block {
    /// Gets the terminator of the block, if it has been explored.
    #[must_use]
    pub fn terminator(&self) -> Option<&Inst> {
        self.insts.last().filter(|inst| inst.is_terminator())
    }

    /// Gets the blocks that control may pass to from this one.
    #[must_use]
    pub fn successors(&self) -> Vec<BlockId> {
        self.terminator().map(Inst::successors).unwrap_or_default()
    }
}
