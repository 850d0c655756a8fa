//! This module contains the symbolic virtual machine that explores the
//! control flow of a contract.
//!
//! # Exploration
//!
//! The [`VM`] works through a FIFO queue of [`Branch`]es. Each branch is a
//! program point together with the state that execution arrives there with,
//! and exploring it steps opcodes until the block it fills in ends in a
//! terminator. Terminators that name a destination create or reuse the block
//! for that destination.
//!
//! Blocks are memoised by their rooted subgraph, their program counter and the
//! [`Context`] of the arriving stack. When a second path arrives at a known
//! block with a different state, the differing stack slots and memory words
//! are widened into [`Expr::Phi`] nodes and the block is explored again. A
//! slot is widened at most once and memory words only ever disappear, so this
//! converges, and loops are explored as a join rather than being unrolled.
//!
//! # Dispatch
//!
//! A `JUMPI` on a recognised selector comparison is a case of the dispatch
//! table. The fallthrough continues the dispatcher, while the function body is
//! recorded and explored as its own rooted subgraph once the dispatcher is
//! done.

pub mod branch;
pub mod cfg;
pub mod data;
pub mod dominance;
pub mod inst;
pub mod state;
pub mod value;

use std::{
    collections::{BTreeSet, HashMap, HashSet, VecDeque},
    rc::Rc,
};

use tracing::{debug, info, warn};

use crate::{
    constant::{
        DEFAULT_MAXIMUM_SELECTORS,
        DEFAULT_PERMISSIVE_ERRORS_ENABLED,
        DEFAULT_VISITS_PER_POINT,
    },
    disassembly::{Instruction, InstructionStream},
    error::{
        container::Locatable,
        execution::{Error, Errors, LocatedError},
    },
    inference::StorageTables,
    opcode::Opcode,
    signatures::Selector,
    vm::{
        branch::{Block, Branch},
        cfg::Cfg,
        data::{Context, PointKey, VisitCounts},
        dominance::Dominators,
        inst::{BlockId, Inst},
        state::{
            memory::{MemStore, Memory},
            stack::Stack,
            MachineState,
        },
        value::{eval::eval, Expr, SharedExpr},
    },
    watchdog::DynWatchdog,
};

/// The virtual machine used to explore the control flow of contract bytecode.
#[derive(Debug)]
pub struct VM {
    instructions: InstructionStream,
    config:       Config,
    watchdog:     DynWatchdog,

    /// The arena of blocks, indexed by [`BlockId`].
    blocks: Vec<Block>,

    /// The branches waiting to be explored.
    queue: VecDeque<Branch>,

    /// The block for each program point that has been reached.
    memo: HashMap<PointKey, BlockId>,

    /// The number of contexts taken at each program point.
    visits: VisitCounts,

    /// The program points that have already reported hitting the visit limit.
    limited: HashSet<(usize, usize)>,

    /// The blocks that control has arrived at each block from.
    arrivals: HashMap<BlockId, BTreeSet<BlockId>>,

    /// The blocks where states from distinct predecessors were merged.
    joins: BTreeSet<BlockId>,

    /// The dispatch entries found so far, in order of discovery.
    selectors: Vec<SelectorEntry>,

    /// The block currently being explored.
    current: Option<BlockId>,

    storage: StorageTables,
    errors:  Errors,
    steps:   usize,
}

/// A function entry point found in the dispatch table.
#[derive(Clone, Debug)]
struct SelectorEntry {
    selector: Selector,
    pc:       usize,
    state:    MachineState,
}

impl VM {
    /// Constructs a new virtual machine that explores `instructions`.
    #[must_use]
    pub fn new(instructions: InstructionStream, config: Config, watchdog: DynWatchdog) -> Self {
        let visits = VisitCounts::new(config.maximum_visits_per_point);
        Self {
            instructions,
            config,
            watchdog,
            blocks: vec![],
            queue: VecDeque::new(),
            memo: HashMap::new(),
            visits,
            limited: HashSet::new(),
            arrivals: HashMap::new(),
            joins: BTreeSet::new(),
            selectors: vec![],
            current: None,
            storage: StorageTables::new(),
            errors: Errors::new(),
            steps: 0,
        }
    }

    /// Explores the dispatcher from the first instruction, and then the body
    /// of every function found in its dispatch table.
    ///
    /// Errors that only end a single path are collected in the result.
    ///
    /// # Errors
    ///
    /// If exploration was aborted by the watchdog or by running out of steps.
    /// The returned container also holds every error collected up to then.
    pub fn explore(mut self) -> Result<ExplorationResult, Errors> {
        info!(instructions = self.instructions.len(), "Exploring dispatcher");
        let dispatcher = self.enter(0, 0, MachineState::new());
        self.drain()?;

        let mut functions = vec![];
        let mut next = 0;
        while let Some(entry) = self.selectors.get(next).cloned() {
            next += 1;
            let root = functions.len() + 1;
            debug!(selector = %entry.selector, pc = entry.pc, "Exploring function");
            let block = self.enter(root, entry.pc, entry.state);
            functions.push((entry.selector, block));
            self.drain()?;
        }

        let flagged_joins = self.validate_joins(dispatcher, &functions);
        info!(
            blocks = self.blocks.len(),
            functions = functions.len(),
            errors = self.errors.len(),
            "Exploration finished"
        );

        Ok(ExplorationResult {
            instructions: self.instructions,
            blocks: self.blocks,
            dispatcher,
            functions,
            storage: self.storage,
            errors: self.errors,
            joins: self.joins.into_iter().collect(),
            flagged_joins,
        })
    }

    /// Explores branches until the queue is empty.
    fn drain(&mut self) -> Result<(), Errors> {
        while let Some(branch) = self.queue.pop_front() {
            let id = branch.block;
            self.current = Some(id);
            match self.explore_branch(branch) {
                Ok(insts) => self.blocks[id.0].insts = insts,
                Err(fatal) => {
                    warn!(error = %fatal, "Exploration aborted");
                    let mut errors = std::mem::take(&mut self.errors);
                    errors.add_many_located([fatal]);
                    return Err(errors);
                }
            }
        }
        self.current = None;

        Ok(())
    }

    /// Steps through the code from the branch's program counter until the
    /// state halts, returning the statements produced on the way.
    fn explore_branch(&mut self, branch: Branch) -> Result<Vec<Inst>, LocatedError> {
        let instructions = self.instructions.clone();
        let root = self.blocks[branch.block.0].root;
        let mut state = branch.state;
        let mut pc = branch.pc;

        loop {
            // Running off the end of the code stops execution.
            let Some(instruction) = instructions.get(pc) else {
                state.halt(Inst::Stop);
                break;
            };
            self.tick(instruction.offset)?;

            match &instruction.opcode {
                Opcode::JumpDest if pc != branch.pc => {
                    let fallthrough = self.enter(root, pc, state.fork());
                    state.halt(Inst::JumpDest { fallthrough });
                }
                Opcode::Jump => self.jump(root, instruction, &mut state),
                Opcode::JumpI => self.jump_conditionally(root, instruction, &mut state),
                opcode => {
                    if let Err(error) =
                        opcode.execute(instruction.offset, &mut state, &mut self.storage)
                    {
                        self.kill(instruction.offset, error, &mut state);
                    }
                }
            }

            if state.halted() {
                break;
            }
            pc += 1;
        }

        Ok(state.into_log())
    }

    /// Counts a step, aborting if the watchdog or the step budget says so.
    fn tick(&mut self, offset: u32) -> Result<(), LocatedError> {
        let poll_interval = self.watchdog.poll_every().max(1);
        let stopped = self.steps % poll_interval == 0 && self.watchdog.should_stop();
        let exhausted = self.config.maximum_steps.is_some_and(|max| self.steps >= max);
        if stopped || exhausted {
            return Err(Error::ExplorationAborted { steps: self.steps }.locate(offset));
        }
        self.steps += 1;

        Ok(())
    }

    /// Executes `JUMP`.
    fn jump(&mut self, root: usize, instruction: &Instruction, state: &mut MachineState) {
        match state.pop() {
            Ok(offset) => self.jump_to(root, instruction.offset, &offset, state),
            Err(error) => self.kill(instruction.offset, error, state),
        }
    }

    /// Ends the block in `state` with a jump to the destination `offset`.
    fn jump_to(&mut self, root: usize, at: u32, offset: &SharedExpr, state: &mut MachineState) {
        match self.resolve(offset) {
            Ok(pc) => {
                let target = self.enter(root, pc, state.fork());
                state.halt(Inst::Jump { target });
            }
            Err(error) => self.dead_end(at, error, state),
        }
    }

    /// Executes `JUMPI`.
    fn jump_conditionally(
        &mut self,
        root: usize,
        instruction: &Instruction,
        state: &mut MachineState,
    ) {
        let [offset, condition] = match state.pop_n() {
            Ok(operands) => operands,
            Err(error) => return self.kill(instruction.offset, error, state),
        };
        let condition = strip_double_negation(eval(&condition));
        let fallthrough_pc = instruction.pc + 1;

        // A constant condition leaves a single successor.
        if let Some(value) = condition.known() {
            if value.is_zero_value() {
                let target = self.enter(root, fallthrough_pc, state.fork());
                state.halt(Inst::Jump { target });
            } else {
                self.jump_to(root, instruction.offset, &offset, state);
            }
            return;
        }

        let target_pc = match self.resolve(&offset) {
            Ok(pc) => pc,
            Err(error) => return self.dead_end(instruction.offset, error, state),
        };

        if let Expr::Sig(selector) = condition.as_ref() {
            self.record_selector(*selector, target_pc, state.fork());
            let fallthrough = self.enter(root, fallthrough_pc, state.fork());
            state.halt(Inst::SigCase {
                selector: *selector,
                fallthrough,
            });
            return;
        }

        let target = self.enter(root, target_pc, state.fork());
        let fallthrough = self.enter(root, fallthrough_pc, state.fork());
        state.halt(Inst::JumpI {
            condition,
            target,
            fallthrough,
        });
    }

    /// Resolves the jump destination `offset` to a program counter.
    fn resolve(&self, offset: &SharedExpr) -> Result<usize, Error> {
        let offset = eval(offset)
            .known()
            .ok_or(Error::NoConcreteJumpDestination)?;
        self.instructions
            .jumpdest(offset)
            .ok_or(Error::InvalidJumpTarget { offset })
    }

    /// Gets the block for program counter `pc` in the subgraph rooted at
    /// `root`, for a path arriving with `state`.
    ///
    /// This creates and enqueues a new block for an unseen context, and merges
    /// `state` into the existing block otherwise.
    fn enter(&mut self, root: usize, pc: usize, state: MachineState) -> BlockId {
        let context = Context::of(state.stack(), &self.instructions);
        let key = (root, pc, context);

        if let Some(id) = self.memo.get(&key).copied() {
            self.merge(id, &key.2, state);
            self.arrive(id);
            return id;
        }

        let id = BlockId(self.blocks.len());
        let offset = self.offset_of(pc);
        if self.visits.at_visit_limit(root, pc) {
            let limit = self.visits.limit();
            if self.limited.insert((root, pc)) {
                warn!(pc, limit, "Visit limit reached");
                self.errors.add_located(offset, Error::VisitLimitExceeded { pc, limit });
            }
            self.blocks.push(Block {
                id,
                root,
                pc,
                offset,
                insts: vec![Inst::Invalid {
                    reason: format!("Visit limit of {limit} reached at pc {pc}"),
                }],
                entry: state,
            });
            return id;
        }

        self.visits.mark_visited(root, pc);
        self.blocks.push(Block {
            id,
            root,
            pc,
            offset,
            insts: vec![],
            entry: state.fork(),
        });
        self.memo.insert(key, id);
        self.arrive(id);
        debug!(block = %id, pc, root, "Enqueued branch");
        self.queue.push_back(Branch {
            block: id,
            pc,
            state,
        });

        id
    }

    /// Records that control arrives at `id` from the block being explored.
    fn arrive(&mut self, id: BlockId) {
        if let Some(from) = self.current {
            self.arrivals.entry(id).or_default().insert(from);
        }
    }

    /// Merges `state` into the entry state of block `id`, exploring the block
    /// again if that widened it.
    fn merge(&mut self, id: BlockId, context: &Context, state: MachineState) {
        let block = &mut self.blocks[id.0];
        let stack = merge_stacks(block.entry.stack(), state.stack(), context);
        let memory = merge_memory(block.entry.memory(), state.memory());
        let widened = MachineState::with_contents(stack, memory);
        if widened == block.entry {
            return;
        }

        // Widening caused by a predecessor that was itself re-explored is
        // propagation rather than a join.
        let from_new_predecessor = self
            .current
            .map_or(true, |from| !self.arrivals.get(&id).is_some_and(|s| s.contains(&from)));
        if from_new_predecessor {
            self.joins.insert(id);
        }
        debug!(block = %id, pc = block.pc, "Widened state at join");

        block.entry = widened.fork();
        if let Some(pending) = self.queue.iter_mut().find(|b| b.block == id) {
            pending.state = widened;
        } else {
            block.insts.clear();
            let pc = block.pc;
            self.queue.push_back(Branch {
                block: id,
                pc,
                state: widened,
            });
        }
    }

    /// Records a dispatch entry for `selector`, unless it is already known or
    /// the table is full.
    fn record_selector(&mut self, selector: Selector, pc: usize, state: MachineState) {
        if self.selectors.iter().any(|entry| entry.selector == selector) {
            return;
        }
        if self.selectors.len() >= self.config.maximum_selectors {
            warn!(selector = %selector, "Selector limit reached");
            return;
        }
        debug!(selector = %selector, pc, "Discovered selector");
        self.selectors.push(SelectorEntry {
            selector,
            pc,
            state,
        });
    }

    /// Ends the path in `state` after a jump that could not be resolved.
    fn dead_end(&mut self, offset: u32, error: Error, state: &mut MachineState) {
        debug!(offset, error = %error, "Dead end");
        let reason = error.to_string();
        if !self.config.permissive_errors {
            self.errors.add_located(offset, error);
        }
        state.halt(Inst::Invalid { reason });
    }

    /// Ends the path in `state` after the stepper failed.
    fn kill(&mut self, offset: u32, error: Error, state: &mut MachineState) {
        warn!(offset, error = %error, "Branch killed");
        let reason = error.to_string();
        self.errors.add_located(offset, error);
        state.halt(Inst::Invalid { reason });
    }

    /// Checks every join against the dominators of its rooted subgraph,
    /// returning the ones that are not genuine join points.
    fn validate_joins(&self, dispatcher: BlockId, functions: &[(Selector, BlockId)]) -> Vec<BlockId> {
        let mut flagged = vec![];
        let roots = std::iter::once(dispatcher).chain(functions.iter().map(|(_, id)| *id));
        for root in roots {
            let cfg = Cfg::build(&self.blocks, root);
            let dominators = Dominators::compute(&cfg);
            for join in self.joins.iter().filter(|id| cfg.contains(**id)) {
                if !dominators.is_join(&cfg, *join) {
                    warn!(block = %join, "Merged state at a block that is not a join point");
                    flagged.push(*join);
                }
            }
        }

        flagged
    }

    /// Gets the byte offset of the instruction at `pc`, or the size of the code
    /// if `pc` is past the end.
    fn offset_of(&self, pc: usize) -> u32 {
        match self.instructions.get(pc) {
            Some(instruction) => instruction.offset,
            None => u32::try_from(self.instructions.as_bytecode().len()).unwrap_or(u32::MAX),
        }
    }
}

/// Replaces `iszero(iszero(x))` by `x`, which is equivalent as a jump
/// condition even when `x` is not boolean.
fn strip_double_negation(condition: SharedExpr) -> SharedExpr {
    if let Expr::IsZero(inner) = condition.as_ref() {
        if let Expr::IsZero(value) = inner.as_ref() {
            return value.clone();
        }
    }
    condition
}

/// Merges two stacks of the same context, widening each differing item.
fn merge_stacks(existing: &Stack, arriving: &Stack, context: &Context) -> Stack {
    let items = existing
        .items()
        .iter()
        .zip(arriving.items())
        .enumerate()
        .map(|(position, (old, new))| {
            if old == new {
                return old.clone();
            }
            debug_assert!(
                !context.is_marker(position),
                "Jump destination markers must agree at a join"
            );
            widen(old, new)
        })
        .collect();

    Stack::from_items(items)
}

/// Merges two memories, keeping the words that both contain.
fn merge_memory(existing: &Memory, arriving: &Memory) -> Memory {
    let mut merged = Memory::new();
    for (offset, old) in existing.entries() {
        let Some(new) = arriving.entry(offset) else { continue };
        if old.byte != new.byte {
            continue;
        }
        let data = if old.data == new.data {
            old.data.clone()
        } else {
            widen(&old.data, &new.data)
        };
        merged.insert_raw(offset.clone(), MemStore {
            data,
            byte: old.byte,
        });
    }

    merged
}

/// Widens a slot whose value differs between two paths. A slot that is
/// already a `Phi` stays as it is.
fn widen(old: &SharedExpr, new: &SharedExpr) -> SharedExpr {
    if matches!(old.as_ref(), Expr::Phi { .. }) {
        return old.clone();
    }
    Rc::new(Expr::Phi {
        left:  old.clone(),
        right: new.clone(),
    })
}

/// The results of exploring a contract.
#[derive(Clone, Debug)]
pub struct ExplorationResult {
    pub instructions: InstructionStream,

    /// Every block created, including ones no longer reachable after a block
    /// was explored again.
    pub blocks: Vec<Block>,

    /// The entry block of the dispatcher.
    pub dispatcher: BlockId,

    /// The entry block of each public function, in order of discovery.
    pub functions: Vec<(Selector, BlockId)>,

    pub storage: StorageTables,

    /// The errors that ended individual paths.
    pub errors: Errors,

    /// The blocks where states from different predecessors were merged.
    pub joins: Vec<BlockId>,

    /// The joins that did not validate against the dominator tree.
    pub flagged_joins: Vec<BlockId>,
}

impl ExplorationResult {
    #[must_use]
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.0)
    }

    /// Gets the graph reachable from `entry`.
    #[must_use]
    pub fn cfg(&self, entry: BlockId) -> Cfg {
        Cfg::build(&self.blocks, entry)
    }
}

/// The configuration for the explorer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// The number of distinct stack contexts that may be explored at one
    /// program counter of one rooted subgraph. Further arrivals end in an
    /// `Invalid` terminator.
    ///
    /// Defaults to [`DEFAULT_VISITS_PER_POINT`].
    pub maximum_visits_per_point: usize,

    /// The number of opcode steps after which exploration is aborted, if any.
    ///
    /// Defaults to [`None`].
    pub maximum_steps: Option<usize>,

    /// If enabled, jumps that cannot be resolved still end their path in an
    /// `Invalid` terminator but are not reported as errors.
    ///
    /// Defaults to [`DEFAULT_PERMISSIVE_ERRORS_ENABLED`].
    pub permissive_errors: bool,

    /// The number of dispatch entries that are explored as functions.
    ///
    /// Defaults to [`DEFAULT_MAXIMUM_SELECTORS`].
    pub maximum_selectors: usize,
}

impl Config {
    #[must_use]
    pub fn with_maximum_visits_per_point(mut self, value: usize) -> Self {
        self.maximum_visits_per_point = value;
        self
    }

    #[must_use]
    pub fn with_maximum_steps(mut self, value: usize) -> Self {
        self.maximum_steps = Some(value);
        self
    }

    #[must_use]
    pub fn with_permissive_errors(mut self, value: bool) -> Self {
        self.permissive_errors = value;
        self
    }

    #[must_use]
    pub fn with_maximum_selectors(mut self, value: usize) -> Self {
        self.maximum_selectors = value;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            maximum_visits_per_point: DEFAULT_VISITS_PER_POINT,
            maximum_steps:            None,
            permissive_errors:        DEFAULT_PERMISSIVE_ERRORS_ENABLED,
            maximum_selectors:        DEFAULT_MAXIMUM_SELECTORS,
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::{atomic::AtomicBool, Arc};

    use crate::{
        bytecode,
        disassembly::InstructionStream,
        error::execution::Error,
        opcode::{Opcode, PushN},
        signatures::Selector,
        vm::{
            inst::{BlockId, Inst},
            Config,
            ExplorationResult,
            VM,
        },
        watchdog::{FlagWatchdog, LazyWatchdog},
    };

    fn explore(code: &[u8], config: Config) -> anyhow::Result<ExplorationResult> {
        let instructions = InstructionStream::try_from(code)?;
        let result = VM::new(instructions, config, LazyWatchdog.in_rc())
            .explore()
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        Ok(result)
    }

    fn terminator(result: &ExplorationResult, id: BlockId) -> &Inst {
        result
            .block(id)
            .and_then(|b| b.terminator())
            .expect("Block was not explored")
    }

    #[test]
    fn constant_conditions_leave_one_successor() -> anyhow::Result<()> {
        let code = bytecode![
            PushN::new(1, vec![0x01])?,
            PushN::new(1, vec![0x07])?,
            Opcode::JumpI,
            Opcode::Invalid(0xfe),
            Opcode::Invalid(0xfe),
            Opcode::JumpDest,
            Opcode::Stop,
        ];
        let result = explore(&code, Config::default())?;

        let Inst::Jump { target } = terminator(&result, result.dispatcher) else {
            panic!("Expected a single jump");
        };
        assert_eq!(terminator(&result, *target), &Inst::Stop);
        assert_eq!(result.cfg(result.dispatcher).blocks().len(), 2);
        assert!(result.errors.is_empty());

        Ok(())
    }

    #[test]
    fn unresolvable_jumps_are_dead_ends() -> anyhow::Result<()> {
        let code = bytecode![Opcode::CallValue, Opcode::Jump];

        let strict = explore(&code, Config::default())?;
        assert!(matches!(
            terminator(&strict, strict.dispatcher),
            Inst::Invalid { .. }
        ));
        assert_eq!(
            strict.errors.payloads()[0].payload,
            Error::NoConcreteJumpDestination
        );

        let permissive = explore(&code, Config::default().with_permissive_errors(true))?;
        assert!(permissive.errors.is_empty());

        Ok(())
    }

    #[test]
    fn stack_errors_kill_only_their_branch() -> anyhow::Result<()> {
        let code = bytecode![
            Opcode::CallDataSize,
            PushN::new(1, vec![0x06])?,
            Opcode::JumpI,
            Opcode::Add,
            Opcode::Stop,
            Opcode::JumpDest,
            Opcode::Stop,
        ];
        let result = explore(&code, Config::default())?;

        let Inst::JumpI {
            target,
            fallthrough,
            ..
        } = terminator(&result, result.dispatcher)
        else {
            panic!("Expected a conditional jump");
        };
        assert_eq!(terminator(&result, *target), &Inst::Stop);
        assert!(matches!(
            terminator(&result, *fallthrough),
            Inst::Invalid { .. }
        ));
        assert_eq!(result.errors.payloads()[0].payload, Error::StackUnderflow);

        Ok(())
    }

    #[test]
    fn loops_join_through_phi() -> anyhow::Result<()> {
        let code = bytecode![
            PushN::new(2, vec![0x01, 0x00])?,
            Opcode::JumpDest,
            PushN::new(1, vec![0x01])?,
            Opcode::Add,
            Opcode::Dup(1),
            PushN::new(2, vec![0x01, 0x10])?,
            Opcode::Gt,
            PushN::new(1, vec![0x03])?,
            Opcode::JumpI,
            Opcode::Stop,
        ];
        let result = explore(&code, Config::default())?;

        let Inst::JumpDest { fallthrough: header } = terminator(&result, result.dispatcher) else {
            panic!("Expected a fallthrough into the loop");
        };
        let Inst::JumpI {
            target,
            fallthrough,
            condition,
        } = terminator(&result, *header)
        else {
            panic!("Expected the loop condition");
        };
        assert_eq!(target, header);
        assert!(condition.any(&|e| matches!(e, crate::vm::value::Expr::Phi { .. })));
        assert_eq!(terminator(&result, *fallthrough), &Inst::Stop);
        assert_eq!(result.joins, vec![*header]);
        assert!(result.flagged_joins.is_empty());

        Ok(())
    }

    #[test]
    fn dispatch_cases_become_functions() -> anyhow::Result<()> {
        let selector = Selector::from_signature("x()");
        let code = bytecode![
            PushN::new(1, vec![0x00])?,
            Opcode::CallDataLoad,
            PushN::new(1, vec![0xe0])?,
            Opcode::Shr,
            Opcode::Dup(1),
            PushN::new(4, selector.bytes().to_vec())?,
            Opcode::Eq,
            PushN::new(1, vec![0x14])?,
            Opcode::JumpI,
            PushN::new(1, vec![0x00])?,
            Opcode::Dup(1),
            Opcode::Revert,
            Opcode::JumpDest,
            Opcode::Stop,
        ];
        let result = explore(&code, Config::default())?;

        assert!(matches!(
            terminator(&result, result.dispatcher),
            Inst::SigCase { selector: s, .. } if *s == selector
        ));
        assert_eq!(result.functions.len(), 1);
        let (found, entry) = result.functions[0];
        assert_eq!(found, selector);
        assert_eq!(terminator(&result, entry), &Inst::Stop);
        assert_eq!(result.block(entry).map(|b| b.root), Some(1));

        Ok(())
    }

    #[test]
    fn running_off_the_end_stops() -> anyhow::Result<()> {
        let result = explore(&bytecode![Opcode::CallValue, Opcode::Pop], Config::default())?;
        assert_eq!(terminator(&result, result.dispatcher), &Inst::Stop);

        Ok(())
    }

    #[test]
    fn raised_watchdog_aborts() -> anyhow::Result<()> {
        let code = bytecode![Opcode::CallValue, Opcode::Pop];
        let instructions = InstructionStream::try_from(code.as_slice())?;
        let watchdog = FlagWatchdog::new(Arc::new(AtomicBool::new(true))).in_rc();

        let errors = VM::new(instructions, Config::default(), watchdog)
            .explore()
            .expect_err("Exploration was not aborted");
        assert!(errors.payloads().iter().any(|e| e.payload.is_fatal()));

        Ok(())
    }

    #[test]
    fn step_budget_aborts() -> anyhow::Result<()> {
        let code = bytecode![Opcode::CallValue, Opcode::Pop, Opcode::Stop];
        let instructions = InstructionStream::try_from(code.as_slice())?;

        let errors = VM::new(
            instructions,
            Config::default().with_maximum_steps(2),
            LazyWatchdog.in_rc(),
        )
        .explore()
        .expect_err("Exploration was not aborted");
        assert_eq!(errors.payloads()[0].payload, Error::ExplorationAborted {
            steps: 2,
        });

        Ok(())
    }
}
