//! The reachable part of the block graph below one root.

use std::collections::{HashMap, HashSet};

use crate::vm::{branch::Block, inst::BlockId};

/// The subgraph of blocks reachable from `entry`, with the edges in both
/// directions.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Cfg {
    entry:        BlockId,
    order:        Vec<BlockId>,
    successors:   HashMap<BlockId, Vec<BlockId>>,
    predecessors: HashMap<BlockId, Vec<BlockId>>,
}

impl Cfg {
    /// Walks `blocks` depth-first from `entry`.
    ///
    /// Successors that are not in `blocks` are ignored.
    #[must_use]
    pub fn build(blocks: &[Block], entry: BlockId) -> Self {
        let mut order = vec![];
        let mut seen = HashSet::new();
        let mut successors: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
        let mut predecessors: HashMap<BlockId, Vec<BlockId>> = HashMap::new();

        let mut stack = vec![entry];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            let Some(block) = blocks.get(id.0) else { continue };
            order.push(id);

            let next: Vec<BlockId> = block
                .successors()
                .into_iter()
                .filter(|succ| succ.0 < blocks.len())
                .collect();
            for succ in &next {
                let preds = predecessors.entry(*succ).or_default();
                if !preds.contains(&id) {
                    preds.push(id);
                }
            }
            stack.extend(next.iter().rev().copied());
            successors.insert(id, next);
        }

        Self {
            entry,
            order,
            successors,
            predecessors,
        }
    }

    #[must_use]
    pub fn entry(&self) -> BlockId {
        self.entry
    }

    /// Gets the reachable blocks in depth-first pre-order.
    #[must_use]
    pub fn blocks(&self) -> &[BlockId] {
        &self.order
    }

    #[must_use]
    pub fn contains(&self, id: BlockId) -> bool {
        self.successors.contains_key(&id)
    }

    #[must_use]
    pub fn predecessors(&self, id: BlockId) -> &[BlockId] {
        self.predecessors.get(&id).map_or(&[], Vec::as_slice)
    }
}
