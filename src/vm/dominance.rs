//! Dominator sets over a [`Cfg`], used to check that the places where the
//! explorer merged states are genuine join points.

use std::collections::{BTreeSet, HashMap};

use crate::vm::{cfg::Cfg, inst::BlockId};

/// The dominator sets of every block in a [`Cfg`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Dominators {
    sets: HashMap<BlockId, BTreeSet<BlockId>>,
}

impl Dominators {
    /// Computes the dominators of `cfg` by iterating
    /// `Dom(n) = {n} ∪ ⋂ Dom(p)` over the predecessors `p` of `n` to a fixed
    /// point, starting from `Dom(entry) = {entry}`.
    #[must_use]
    pub fn compute(cfg: &Cfg) -> Self {
        let all: BTreeSet<BlockId> = cfg.blocks().iter().copied().collect();
        let mut sets: HashMap<BlockId, BTreeSet<BlockId>> = cfg
            .blocks()
            .iter()
            .map(|id| {
                let initial = if *id == cfg.entry() {
                    BTreeSet::from([*id])
                } else {
                    all.clone()
                };
                (*id, initial)
            })
            .collect();

        let mut changed = true;
        while changed {
            changed = false;
            for id in cfg.blocks().iter().filter(|id| **id != cfg.entry()) {
                let mut new = cfg
                    .predecessors(*id)
                    .iter()
                    .filter_map(|pred| sets.get(pred))
                    .fold(None, |acc: Option<BTreeSet<BlockId>>, set| {
                        Some(match acc {
                            None => set.clone(),
                            Some(acc) => acc.intersection(set).copied().collect(),
                        })
                    })
                    .unwrap_or_default();
                new.insert(*id);

                if sets.get(id) != Some(&new) {
                    sets.insert(*id, new);
                    changed = true;
                }
            }
        }

        Self { sets }
    }

    /// Checks whether `a` dominates `b`.
    #[must_use]
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        self.sets.get(&b).is_some_and(|set| set.contains(&a))
    }

    /// Gets the dominator set of `id`.
    #[must_use]
    pub fn of(&self, id: BlockId) -> Option<&BTreeSet<BlockId>> {
        self.sets.get(&id)
    }

    /// Checks that `block` is a genuine join point in `cfg`.
    ///
    /// A join needs at least two predecessors, and at least one of them must
    /// reach it from outside of its dominance region. A loop header qualifies
    /// through its entry edge, and the end of an `if` through both arms.
    #[must_use]
    pub fn is_join(&self, cfg: &Cfg, block: BlockId) -> bool {
        let preds = cfg.predecessors(block);
        preds.len() >= 2 && preds.iter().any(|pred| !self.dominates(block, *pred))
    }
}
