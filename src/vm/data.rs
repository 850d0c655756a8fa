//! This module contains the small data-types that the explorer uses to
//! memoise program points and to bound how often each one is explored.

use std::collections::HashMap;

use crate::{
    disassembly::InstructionStream,
    vm::{state::stack::Stack, value::known::KnownWord},
};

/// The part of a stack that decides whether two arrivals at the same program
/// counter may share a block.
///
/// Two stacks share a context when they have the same depth and carry the
/// same literal `JUMPDEST` offsets at the same positions. Such markers are
/// return addresses of internal calls, so they choose where control goes next
/// and are never merged into a `Phi`.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Context {
    depth:   usize,
    markers: Vec<(usize, KnownWord)>,
}

impl Context {
    /// Computes the context of `stack` against the jump destinations in
    /// `instructions`.
    #[must_use]
    pub fn of(stack: &Stack, instructions: &InstructionStream) -> Self {
        let markers = stack
            .items()
            .iter()
            .enumerate()
            .filter_map(|(position, item)| {
                let value = item.known()?;
                instructions.jumpdest(value).map(|_| (position, value))
            })
            .collect();

        Self {
            depth: stack.size(),
            markers,
        }
    }

    /// Checks if the item at `position` (counted from the bottom) is a marker.
    #[must_use]
    pub fn is_marker(&self, position: usize) -> bool {
        self.markers.iter().any(|(p, _)| *p == position)
    }
}

/// The key of a memoised block: the rooted subgraph, the program counter and
/// the stack context.
pub type PointKey = (usize, usize, Context);

/// A container that tracks how many distinct contexts have been explored at
/// each program counter of each rooted subgraph.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VisitCounts {
    limit: usize,
    data:  HashMap<(usize, usize), usize>,
}

impl VisitCounts {
    /// Constructs a tracker that allows `limit` contexts per program point.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            data: HashMap::new(),
        }
    }

    /// Marks a new context at `pc` in the subgraph rooted at `root`.
    pub fn mark_visited(&mut self, root: usize, pc: usize) {
        self.data
            .entry((root, pc))
            .and_modify(|count| *count = count.saturating_add(1))
            .or_insert(1);
    }

    /// Checks whether `pc` in `root` may not take any further contexts.
    #[must_use]
    pub fn at_visit_limit(&self, root: usize, pc: usize) -> bool {
        self.data.get(&(root, pc)).copied().unwrap_or(0) >= self.limit
    }

    /// Gets the limit that this tracker enforces.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }
}

#[cfg(test)]
mod test {
    use crate::{
        bytecode,
        disassembly::InstructionStream,
        opcode::{Opcode, PushN},
        vm::{
            data::{Context, VisitCounts},
            state::stack::Stack,
            value::{Expr, Property},
        },
    };

    #[test]
    fn visit_limit_is_per_root_and_pc() {
        let mut tracker = VisitCounts::new(2);
        tracker.mark_visited(0, 7);
        assert!(!tracker.at_visit_limit(0, 7));
        tracker.mark_visited(0, 7);
        assert!(tracker.at_visit_limit(0, 7));
        assert!(!tracker.at_visit_limit(1, 7));
        assert!(!tracker.at_visit_limit(0, 8));
    }

    #[test]
    fn contexts_distinguish_jump_markers_only() -> anyhow::Result<()> {
        let code = bytecode![
            PushN::new(1, vec![0x03])?,
            Opcode::Pop,
            Opcode::JumpDest,
            Opcode::Stop,
        ];
        let instructions = InstructionStream::try_from(code.as_slice())?;

        let caller = std::rc::Rc::new(Expr::Prop(Property::Caller));
        let with_marker = Stack::from_items(vec![Expr::val(3usize), caller.clone()]);
        let with_value = Stack::from_items(vec![Expr::val(4usize), caller.clone()]);
        let with_other_value = Stack::from_items(vec![Expr::val(5usize), caller]);

        let marked = Context::of(&with_marker, &instructions);
        assert!(marked.is_marker(0));
        assert!(!marked.is_marker(1));
        assert_ne!(marked, Context::of(&with_value, &instructions));
        assert_eq!(
            Context::of(&with_value, &instructions),
            Context::of(&with_other_value, &instructions)
        );

        Ok(())
    }
}
