//! This module renders decompiled contracts as pseudo-source.
//!
//! Both dialects render expressions through [`Fragment`]s, which carry the
//! precedence of their outermost operator. An operand is wrapped in
//! parentheses exactly when its precedence is lower than that of the operator
//! it appears under, or when it is equal and sits on the side that the
//! operator does not associate to.
//!
//! Function bodies are rendered by walking the control-flow graph from the
//! entry block. Conditional jumps nest both of their successors, and a block
//! that was already rendered is referred to by its label rather than being
//! rendered again.

pub mod solidity;
pub mod yul;

use std::collections::{HashMap, HashSet};

use itertools::Itertools;

use crate::{
    constant::DECIMAL_RENDER_THRESHOLD,
    signatures::Selector,
    vm::{
        cfg::Cfg,
        inst::{BlockId, Inst},
        value::{known::KnownWord, SharedExpr},
        ExplorationResult,
    },
};

/// The precedences of the operators, from the loosest binding to the
/// tightest.
pub mod precedence {
    pub const EQUALITY: u8 = 3;
    pub const RELATIONAL: u8 = 4;
    pub const BIT_OR: u8 = 5;
    pub const BIT_XOR: u8 = 6;
    pub const BIT_AND: u8 = 7;
    pub const SHIFT: u8 = 8;
    pub const ADDITIVE: u8 = 9;
    pub const MULTIPLICATIVE: u8 = 10;
    pub const EXPONENT: u8 = 11;
    pub const UNARY: u8 = 12;
    pub const ATOM: u8 = 13;
}

/// The way repeated applications of a binary operator group.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Associativity {
    /// `(a + b) + c` and `a + (b + c)` mean the same.
    Full,

    /// `a - b - c` means `(a - b) - c`.
    Left,

    /// `a ** b ** c` means `a ** (b ** c)`.
    Right,
}

/// Rendered text, along with the precedence of its outermost operator.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Fragment {
    pub text:       String,
    pub precedence: u8,
}

impl Fragment {
    #[must_use]
    pub fn new(text: impl Into<String>, precedence: u8) -> Self {
        Self {
            text: text.into(),
            precedence,
        }
    }

    /// Creates a fragment that never needs wrapping.
    #[must_use]
    pub fn atom(text: impl Into<String>) -> Self {
        Self::new(text, precedence::ATOM)
    }

    /// Gets the text of the fragment as an operand of an operator with
    /// precedence `parent`.
    #[must_use]
    pub fn operand(&self, parent: u8) -> String {
        self.wrapped_if(self.precedence < parent)
    }

    fn wrapped_if(&self, wrap: bool) -> String {
        if wrap {
            format!("({})", self.text)
        } else {
            self.text.clone()
        }
    }
}

/// Renders the binary operator `op` of `precedence` over `left` and `right`.
#[must_use]
pub fn infix(
    left: &Fragment,
    op: &str,
    right: &Fragment,
    precedence: u8,
    associativity: Associativity,
) -> Fragment {
    let left = left.wrapped_if(
        left.precedence < precedence
            || (left.precedence == precedence && associativity == Associativity::Right),
    );
    let right = right.wrapped_if(
        right.precedence < precedence
            || (right.precedence == precedence && associativity == Associativity::Left),
    );

    Fragment::new(format!("{left} {op} {right}"), precedence)
}

/// Renders the prefix operator `op` over `operand`.
#[must_use]
pub fn prefix(op: &str, operand: &Fragment) -> Fragment {
    Fragment::new(
        format!("{op}{}", operand.operand(precedence::UNARY)),
        precedence::UNARY,
    )
}

/// Renders a call of `function` with `arguments`.
#[must_use]
pub fn call<S: AsRef<str>>(function: &str, arguments: impl IntoIterator<Item = S>) -> Fragment {
    let arguments = arguments.into_iter().map(|a| a.as_ref().to_string()).join(", ");
    Fragment::atom(format!("{function}({arguments})"))
}

/// Renders `value` in decimal if it is small, and in hexadecimal otherwise.
#[must_use]
pub fn literal(value: KnownWord) -> String {
    match value.as_u32() {
        Some(small) if small <= DECIMAL_RENDER_THRESHOLD => small.to_string(),
        _ => value.to_string(),
    }
}

/// Gets the label of the block starting at byte `offset`.
#[must_use]
pub fn block_label(offset: u32) -> String {
    format!("loc_{offset:x}")
}

/// The tokens that a dialect uses for a two-way branch, each as a list of
/// lines.
#[derive(Clone, Debug, Default)]
pub struct BranchTokens {
    pub open:   Vec<String>,
    pub middle: Vec<String>,
    pub close:  Vec<String>,
}

/// The statement spelling of a dialect.
pub trait Dialect {
    /// Renders a statement that is not a jump.
    fn statement(&self, inst: &Inst) -> Option<String>;

    /// Renders the tokens around the arms of a branch on `condition`. The
    /// taken arm is rendered first.
    fn branch(&self, condition: &SharedExpr) -> BranchTokens;

    /// Renders a case of the dispatch table, if the dialect shows them.
    fn dispatch(&self, selector: Selector) -> Option<String>;

    /// Renders the definition of the label `label`.
    fn label(&self, label: &str) -> String;

    /// Renders a jump to the label `label`.
    fn reference(&self, label: &str) -> String;
}

/// The indentation of one nesting level.
pub const INDENT: &str = "    ";

/// Renders the graph reachable from `entry` as lines of statements.
pub struct BodyWriter<'a, D: Dialect> {
    result:   &'a ExplorationResult,
    cfg:      Cfg,
    dialect:  &'a D,
    rendered: HashSet<BlockId>,
    lines:    Vec<String>,

    /// The number of ways control enters each block, counting the entry of
    /// the body itself.
    incoming: HashMap<BlockId, usize>,
}

impl<'a, D: Dialect> BodyWriter<'a, D> {
    #[must_use]
    pub fn new(result: &'a ExplorationResult, entry: BlockId, dialect: &'a D) -> Self {
        let cfg = result.cfg(entry);
        let mut incoming = HashMap::from([(entry, 1)]);
        let edges = cfg
            .blocks()
            .iter()
            .filter_map(|id| result.block(*id))
            .flat_map(|block| block.successors());
        for successor in edges {
            *incoming.entry(successor).or_default() += 1;
        }

        Self {
            result,
            cfg,
            dialect,
            rendered: HashSet::new(),
            lines: vec![],
            incoming,
        }
    }

    /// Renders the body, with each line indented by `depth` levels.
    #[must_use]
    pub fn write(mut self, depth: usize) -> Vec<String> {
        self.block(self.cfg.entry(), depth);
        self.lines
    }

    fn line(&mut self, depth: usize, text: impl AsRef<str>) {
        self.lines.push(format!("{}{}", INDENT.repeat(depth), text.as_ref()));
    }

    fn block(&mut self, id: BlockId, depth: usize) {
        let result = self.result;
        let Some(block) = result.block(id) else { return };
        let label = block_label(block.offset);
        if !self.rendered.insert(id) {
            let text = self.dialect.reference(&label);
            self.line(depth, text);
            return;
        }
        if self.incoming.get(&id).copied().unwrap_or_default() > 1 {
            let text = self.dialect.label(&label);
            self.line(depth, text);
        }

        for inst in &block.insts {
            match inst {
                Inst::Jump { target }
                | Inst::JumpDest {
                    fallthrough: target,
                } => self.block(*target, depth),
                Inst::JumpI {
                    condition,
                    target,
                    fallthrough,
                } => {
                    let tokens = self.dialect.branch(condition);
                    tokens.open.iter().for_each(|t| self.line(depth, t));
                    self.block(*target, depth + 1);
                    tokens.middle.iter().for_each(|t| self.line(depth, t));
                    self.block(*fallthrough, depth + 1);
                    tokens.close.iter().for_each(|t| self.line(depth, t));
                }
                Inst::SigCase {
                    selector,
                    fallthrough,
                } => {
                    if let Some(text) = self.dialect.dispatch(*selector) {
                        self.line(depth, text);
                    }
                    self.block(*fallthrough, depth);
                }
                other => {
                    if let Some(text) = self.dialect.statement(other) {
                        self.line(depth, text);
                    }
                }
            }
        }
    }
}
