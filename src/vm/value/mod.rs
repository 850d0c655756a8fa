//! This module contains the expression IR that represents 256-bit EVM values
//! symbolically.

pub mod eval;
pub mod known;

use std::rc::Rc;

use crate::{
    constant::{ADDRESS_WIDTH_BITS, WORD_SIZE_BITS},
    signatures::Selector,
    vm::value::known::KnownWord,
};

/// A structurally-shared pointer to an immutable expression.
///
/// Two expressions are equal when their trees are equal, regardless of
/// whether they share any nodes.
pub type SharedExpr = Rc<Expr>;

/// A symbolic 256-bit value, built up as execution proceeds.
///
/// Expressions are immutable once built. Storage accesses refer to the
/// contract-wide [`crate::inference::StorageTables`] by slot key rather than by
/// name, so that names discovered later apply to every access.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Expr {
    /// A concretely known value.
    Val(KnownWord),

    /// Addition of symbolic values.
    Add { left: SharedExpr, right: SharedExpr },

    /// Multiplication of symbolic values.
    Mul { left: SharedExpr, right: SharedExpr },

    /// Subtraction of symbolic values.
    Sub { left: SharedExpr, right: SharedExpr },

    /// Unsigned division of symbolic values.
    Div { left: SharedExpr, right: SharedExpr },

    /// Signed division of symbolic values.
    SDiv { left: SharedExpr, right: SharedExpr },

    /// Unsigned modulo of symbolic values.
    Mod { left: SharedExpr, right: SharedExpr },

    /// Signed modulo of symbolic values.
    SMod { left: SharedExpr, right: SharedExpr },

    /// Addition followed by modulo, without intermediate overflow.
    AddMod {
        left:    SharedExpr,
        right:   SharedExpr,
        modulus: SharedExpr,
    },

    /// Multiplication followed by modulo, without intermediate overflow.
    MulMod {
        left:    SharedExpr,
        right:   SharedExpr,
        modulus: SharedExpr,
    },

    /// Exponentiation of symbolic values.
    Exp { base: SharedExpr, exponent: SharedExpr },

    /// Sign extension of `value` from `size + 1` bytes.
    SignExtend { size: SharedExpr, value: SharedExpr },

    /// `left < right`, or `left <= right` when `equal` is set.
    Lt {
        left:   SharedExpr,
        right:  SharedExpr,
        equal:  bool,
        signed: bool,
    },

    /// `left > right`, or `left >= right` when `equal` is set.
    Gt {
        left:   SharedExpr,
        right:  SharedExpr,
        equal:  bool,
        signed: bool,
    },

    /// `left == right`, or `left != right` when `equal` is unset.
    Eq {
        left:  SharedExpr,
        right: SharedExpr,
        equal: bool,
    },

    /// `value == 0`.
    IsZero(SharedExpr),

    /// Bitwise and.
    And { left: SharedExpr, right: SharedExpr },

    /// Bitwise or.
    Or { left: SharedExpr, right: SharedExpr },

    /// Bitwise exclusive or.
    Xor { left: SharedExpr, right: SharedExpr },

    /// Bitwise negation.
    Not(SharedExpr),

    /// The byte of `value` at `position`, counting from the most significant.
    Byte {
        position: SharedExpr,
        value:    SharedExpr,
    },

    /// Left shift of `value` by `shift` bits.
    Shl { value: SharedExpr, shift: SharedExpr },

    /// Logical right shift of `value` by `shift` bits.
    Shr { value: SharedExpr, shift: SharedExpr },

    /// Arithmetic right shift of `value` by `shift` bits.
    Sar { value: SharedExpr, shift: SharedExpr },

    /// A recognised comparison of the calldata's function selector against a
    /// literal selector.
    Sig(Selector),

    /// A read of the execution environment.
    Prop(Property),

    /// The balance of the account at the address.
    Balance(SharedExpr),

    /// The code size of the account at the address.
    ExtCodeSize(SharedExpr),

    /// The code hash of the account at the address.
    ExtCodeHash(SharedExpr),

    /// The hash of the block with the provided number.
    BlockHash(SharedExpr),

    /// The versioned hash of the blob at the provided index.
    BlobHash(SharedExpr),

    /// The value sent with the current call.
    CallValue,

    /// A word of calldata at the provided byte offset.
    CallDataLoad(SharedExpr),

    /// The size of the calldata in bytes.
    CallDataSize,

    /// A word of memory whose contents were not tracked.
    MLoad(SharedExpr),

    /// The Keccak-256 hash of `size` bytes of memory at `offset`.
    ///
    /// When the range could be read word by word, `words` holds the hashed
    /// values.
    Sha3 {
        offset: SharedExpr,
        size:   SharedExpr,
        words:  Option<Vec<SharedExpr>>,
    },

    /// A load from storage.
    ///
    /// If `variable` is set, it is the key of the plain variable in the
    /// storage tables.
    SLoad {
        slot:     SharedExpr,
        variable: Option<KnownWord>,
    },

    /// A load from the mapping rooted at `slot`, indexed by `keys` from the
    /// outermost to the innermost, and offset by `offset` slots into the
    /// value's struct.
    MappingLoad {
        slot:   KnownWord,
        keys:   Vec<SharedExpr>,
        offset: KnownWord,
    },

    /// A load of element `index` from the dynamic array whose length is held
    /// at `slot`.
    ArrayLoad { slot: KnownWord, index: SharedExpr },

    /// A load from transient storage.
    TLoad(SharedExpr),

    /// The success flag of a message call.
    Call {
        kind:       CallKind,
        gas:        SharedExpr,
        address:    SharedExpr,
        value:      Option<SharedExpr>,
        arg_offset: SharedExpr,
        arg_size:   SharedExpr,
        ret_offset: SharedExpr,
        ret_size:   SharedExpr,
    },

    /// The address of a newly created contract.
    Create {
        value:  SharedExpr,
        offset: SharedExpr,
        size:   SharedExpr,
        salt:   Option<SharedExpr>,
    },

    /// A word copied into memory from somewhere other than the calldata.
    Copy {
        source: CopySource,
        offset: SharedExpr,
    },

    /// A value that depends on which predecessor reached a join point.
    Phi { left: SharedExpr, right: SharedExpr },
}

/// Reads of the execution environment that take no operands.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Property {
    Address,
    Origin,
    Caller,
    GasPrice,
    Coinbase,
    Timestamp,
    Number,
    PrevRandao,
    GasLimit,
    ChainId,
    SelfBalance,
    BaseFee,
    BlobBaseFee,
    CodeSize,
    ReturnDataSize,
    MSize,
    Gas,
    ProgramCounter(u32),
}

impl Property {
    /// Gets the Solidity spelling of the property.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Address => "address(this)",
            Self::Origin => "tx.origin",
            Self::Caller => "msg.sender",
            Self::GasPrice => "tx.gasprice",
            Self::Coinbase => "block.coinbase",
            Self::Timestamp => "block.timestamp",
            Self::Number => "block.number",
            Self::PrevRandao => "block.prevrandao",
            Self::GasLimit => "block.gaslimit",
            Self::ChainId => "block.chainid",
            Self::SelfBalance => "address(this).balance",
            Self::BaseFee => "block.basefee",
            Self::BlobBaseFee => "block.blobbasefee",
            Self::CodeSize => "address(this).code.length",
            Self::ReturnDataSize => "returndata.length",
            Self::MSize => "msize()",
            Self::Gas => "gasleft()",
            Self::ProgramCounter(offset) => return format!("{offset}"),
        }
        .to_string()
    }

    /// Gets the Yul builtin that reads the property.
    #[must_use]
    pub fn yul_name(&self) -> String {
        match self {
            Self::Address => "address()",
            Self::Origin => "origin()",
            Self::Caller => "caller()",
            Self::GasPrice => "gasprice()",
            Self::Coinbase => "coinbase()",
            Self::Timestamp => "timestamp()",
            Self::Number => "number()",
            Self::PrevRandao => "prevrandao()",
            Self::GasLimit => "gaslimit()",
            Self::ChainId => "chainid()",
            Self::SelfBalance => "selfbalance()",
            Self::BaseFee => "basefee()",
            Self::BlobBaseFee => "blobbasefee()",
            Self::CodeSize => "codesize()",
            Self::ReturnDataSize => "returndatasize()",
            Self::MSize => "msize()",
            Self::Gas => "gas()",
            Self::ProgramCounter(offset) => return format!("{offset}"),
        }
        .to_string()
    }

    /// Gets the Solidity type of the property.
    #[must_use]
    pub fn solidity_type(&self) -> &'static str {
        if self.is_address() {
            "address"
        } else {
            "uint256"
        }
    }

    /// Checks whether the property is an account address.
    #[must_use]
    pub fn is_address(&self) -> bool {
        matches!(
            self,
            Self::Address | Self::Origin | Self::Caller | Self::Coinbase
        )
    }
}

/// The flavours of message call.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CallKind {
    Call,
    CallCode,
    DelegateCall,
    StaticCall,
}

impl CallKind {
    /// Gets the Yul builtin for the call.
    #[must_use]
    pub fn yul_name(&self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::CallCode => "callcode",
            Self::DelegateCall => "delegatecall",
            Self::StaticCall => "staticcall",
        }
    }

    /// Checks whether the call may change state.
    #[must_use]
    pub fn may_mutate(&self) -> bool {
        !matches!(self, Self::StaticCall)
    }
}

/// Where a word written by one of the copy opcodes came from.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum CopySource {
    Code,
    ExtCode(SharedExpr),
    ReturnData,
}

impl Expr {
    /// Wraps a known word into a shared expression.
    #[must_use]
    pub fn val(value: impl Into<KnownWord>) -> SharedExpr {
        Rc::new(Self::Val(value.into()))
    }

    /// Gets the known value of the expression if it is a literal.
    #[must_use]
    pub fn known(&self) -> Option<KnownWord> {
        match self {
            Self::Val(value) => Some(*value),
            _ => None,
        }
    }

    /// Checks whether the expression is a literal equal to `value`.
    #[must_use]
    pub fn is_val(&self, value: impl Into<KnownWord>) -> bool {
        self.known() == Some(value.into())
    }

    /// Checks whether the expression can only evaluate to zero or one.
    #[must_use]
    pub fn is_boolean(&self) -> bool {
        match self {
            Self::Lt { .. }
            | Self::Gt { .. }
            | Self::Eq { .. }
            | Self::IsZero(_)
            | Self::Sig(_)
            | Self::Call { .. } => true,
            Self::Val(value) => value.bit_width() <= 1,
            Self::Phi { left, right } => left.is_boolean() && right.is_boolean(),
            _ => false,
        }
    }

    /// Gets an upper bound on the number of significant bits the value can
    /// have.
    #[must_use]
    pub fn bit_width(&self) -> usize {
        match self {
            Self::Val(value) => value.bit_width(),
            _ if self.is_boolean() => 1,
            Self::And { left, right } => left.bit_width().min(right.bit_width()),
            Self::Or { left, right } | Self::Xor { left, right } => {
                left.bit_width().max(right.bit_width())
            }
            Self::Shr { value, shift } => match shift.known().and_then(|s| s.as_usize()) {
                Some(bits) => value.bit_width().saturating_sub(bits),
                None => value.bit_width(),
            },
            Self::Div { left, right } => match right.known() {
                Some(divisor) if !divisor.is_zero_value() => {
                    left.bit_width().saturating_sub(divisor.bit_width() - 1)
                }
                _ => left.bit_width(),
            },
            Self::Mod { right, .. } => match right.known() {
                Some(modulus) if !modulus.is_zero_value() => modulus.bit_width(),
                _ => WORD_SIZE_BITS,
            },
            Self::Byte { .. } => 8,
            Self::Prop(property) if property.is_address() => ADDRESS_WIDTH_BITS,
            Self::Create { .. } => ADDRESS_WIDTH_BITS,
            Self::Phi { left, right } => left.bit_width().max(right.bit_width()),
            _ => WORD_SIZE_BITS,
        }
    }

    /// Gets the direct children of the expression.
    #[must_use]
    pub fn children(&self) -> Vec<&SharedExpr> {
        match self {
            Self::Val(_)
            | Self::Sig(_)
            | Self::Prop(_)
            | Self::CallValue
            | Self::CallDataSize => vec![],
            Self::Add { left, right }
            | Self::Mul { left, right }
            | Self::Sub { left, right }
            | Self::Div { left, right }
            | Self::SDiv { left, right }
            | Self::Mod { left, right }
            | Self::SMod { left, right }
            | Self::Lt { left, right, .. }
            | Self::Gt { left, right, .. }
            | Self::Eq { left, right, .. }
            | Self::And { left, right }
            | Self::Or { left, right }
            | Self::Xor { left, right }
            | Self::Phi { left, right } => vec![left, right],
            Self::AddMod {
                left,
                right,
                modulus,
            }
            | Self::MulMod {
                left,
                right,
                modulus,
            } => vec![left, right, modulus],
            Self::Exp { base, exponent } => vec![base, exponent],
            Self::SignExtend { size, value } => vec![size, value],
            Self::Byte { position, value } => vec![position, value],
            Self::Shl { value, shift } | Self::Shr { value, shift } | Self::Sar { value, shift } => {
                vec![value, shift]
            }
            Self::IsZero(value)
            | Self::Not(value)
            | Self::Balance(value)
            | Self::ExtCodeSize(value)
            | Self::ExtCodeHash(value)
            | Self::BlockHash(value)
            | Self::BlobHash(value)
            | Self::CallDataLoad(value)
            | Self::MLoad(value)
            | Self::TLoad(value) => vec![value],
            Self::Sha3 {
                offset,
                size,
                words,
            } => {
                let mut children = vec![offset, size];
                children.extend(words.iter().flatten());
                children
            }
            Self::SLoad { slot, .. } => vec![slot],
            Self::MappingLoad { keys, .. } => keys.iter().collect(),
            Self::ArrayLoad { index, .. } => vec![index],
            Self::Call {
                gas,
                address,
                value,
                arg_offset,
                arg_size,
                ret_offset,
                ret_size,
                ..
            } => {
                let mut children = vec![gas, address];
                children.extend(value.iter());
                children.extend([arg_offset, arg_size, ret_offset, ret_size]);
                children
            }
            Self::Create {
                value,
                offset,
                size,
                salt,
            } => {
                let mut children = vec![value, offset, size];
                children.extend(salt.iter());
                children
            }
            Self::Copy { source, offset } => match source {
                CopySource::ExtCode(address) => vec![address, offset],
                CopySource::Code | CopySource::ReturnData => vec![offset],
            },
        }
    }

    /// Checks whether `predicate` holds for the expression or any expression
    /// within it.
    pub fn any(&self, predicate: &impl Fn(&Expr) -> bool) -> bool {
        predicate(self) || self.children().into_iter().any(|child| child.any(predicate))
    }

    /// If the expression reads an ABI-encoded argument from calldata, possibly
    /// under a mask, gets the index of that argument.
    #[must_use]
    pub fn argument_index(&self) -> Option<usize> {
        match self {
            Self::CallDataLoad(offset) => {
                let offset = offset.known()?.as_usize()?;
                let index = offset.checked_sub(crate::constant::CALLDATA_ARGUMENTS_OFFSET)?;
                (index % crate::constant::WORD_SIZE_BYTES == 0)
                    .then_some(index / crate::constant::WORD_SIZE_BYTES)
            }
            Self::And { left, right } => match (left.known(), right.known()) {
                (None, Some(_)) => left.argument_index(),
                (Some(_), None) => right.argument_index(),
                _ => None,
            },
            Self::SignExtend { value, .. } => value.argument_index(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use std::rc::Rc;

    use crate::vm::value::{known::KnownWord, Expr, Property};

    #[test]
    fn expressions_compare_structurally() {
        let a = Rc::new(Expr::Add {
            left:  Expr::val(1usize),
            right: Rc::new(Expr::CallValue),
        });
        let b = Rc::new(Expr::Add {
            left:  Expr::val(1usize),
            right: Rc::new(Expr::CallValue),
        });
        assert_eq!(a, b);
        assert_eq!(a.children(), vec![&Expr::val(1usize), &Rc::new(Expr::CallValue)]);
    }

    #[test]
    fn computes_bit_widths() {
        let selector = Expr::Shr {
            value: Rc::new(Expr::CallDataLoad(Expr::val(0usize))),
            shift: Expr::val(224usize),
        };
        assert_eq!(selector.bit_width(), 32);
        assert_eq!(Expr::Prop(Property::Caller).bit_width(), 160);
        assert_eq!(Expr::IsZero(Rc::new(Expr::CallValue)).bit_width(), 1);
        assert_eq!(Expr::Val(KnownWord::from(0xffusize)).bit_width(), 8);
    }

    #[test]
    fn finds_calldata_arguments() {
        let first = Expr::CallDataLoad(Expr::val(4usize));
        let masked = Expr::And {
            left:  Rc::new(Expr::CallDataLoad(Expr::val(36usize))),
            right: Rc::new(Expr::Val(KnownWord::low_mask(160))),
        };
        assert_eq!(first.argument_index(), Some(0));
        assert_eq!(masked.argument_index(), Some(1));
        assert_eq!(Expr::CallDataLoad(Expr::val(0usize)).argument_index(), None);
    }
}
