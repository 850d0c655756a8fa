//! Observation of the value types stored into and keyed by storage.

use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter},
};

use serde::Serialize;

use crate::{
    constant::{ADDRESS_WIDTH_BITS, BYTE_SIZE_BITS, SELECTOR_SHIFT_BITS, WORD_SIZE_BITS},
    vm::value::{Expr, Property},
};

/// The type of a value as suggested by the way it was computed.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum ValueType {
    Address,
    Bool,
    Bytes4,
    UInt(usize),
}

impl ValueType {
    /// Guesses the type of `expr` from its shape.
    #[must_use]
    pub fn observe(expr: &Expr) -> Self {
        match expr {
            _ if expr.is_boolean() => Self::Bool,
            Expr::Prop(property) if property.is_address() => Self::Address,
            Expr::Prop(Property::SelfBalance) => Self::UInt(WORD_SIZE_BITS),
            Expr::Create { .. } => Self::Address,
            Expr::Shr { value, shift } if is_calldata_head(value) => {
                match shift.known().and_then(|s| s.as_usize()) {
                    Some(SELECTOR_SHIFT_BITS) => Self::Bytes4,
                    _ => Self::UInt(WORD_SIZE_BITS),
                }
            }
            Expr::And { left, right } => {
                let mask = left.known().or(right.known());
                match mask.and_then(|m| m.low_mask_width()) {
                    Some(ADDRESS_WIDTH_BITS) => Self::Address,
                    Some(width) if width % BYTE_SIZE_BITS == 0 => Self::UInt(width),
                    _ => Self::UInt(WORD_SIZE_BITS),
                }
            }
            Expr::Phi { left, right } => {
                let left = Self::observe(left);
                if left == Self::observe(right) {
                    left
                } else {
                    Self::UInt(WORD_SIZE_BITS)
                }
            }
            _ => Self::UInt(WORD_SIZE_BITS),
        }
    }

    /// Picks the type that best describes a slot where all of `observed`
    /// were seen.
    #[must_use]
    pub fn best<'a>(observed: impl IntoIterator<Item = &'a ValueType>) -> Self {
        let observed: BTreeSet<ValueType> = observed.into_iter().copied().collect();
        let mut types = observed.iter().copied();
        match (types.next(), types.next()) {
            (None, _) => Self::UInt(WORD_SIZE_BITS),
            (Some(only), None) => only,
            _ if observed.iter().all(|t| matches!(t, Self::UInt(_))) => observed
                .iter()
                .filter_map(|t| match t {
                    Self::UInt(width) => Some(*width),
                    _ => None,
                })
                .max()
                .map_or(Self::UInt(WORD_SIZE_BITS), Self::UInt),
            _ if observed.contains(&Self::Address)
                && observed
                    .iter()
                    .all(|t| matches!(t, Self::Address | Self::UInt(ADDRESS_WIDTH_BITS))) =>
            {
                Self::Address
            }
            _ => Self::UInt(WORD_SIZE_BITS),
        }
    }
}

impl Display for ValueType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Address => write!(f, "address"),
            Self::Bool => write!(f, "bool"),
            Self::Bytes4 => write!(f, "bytes4"),
            Self::UInt(width) => write!(f, "uint{width}"),
        }
    }
}

fn is_calldata_head(expr: &Expr) -> bool {
    matches!(expr, Expr::CallDataLoad(offset) if offset.is_val(0usize))
}

#[cfg(test)]
mod test {
    use std::rc::Rc;

    use crate::{
        inference::types::ValueType,
        vm::value::{known::KnownWord, Expr, Property},
    };

    #[test]
    fn observes_types_from_shapes() {
        let masked = Expr::And {
            left:  Rc::new(Expr::CallDataLoad(Expr::val(4usize))),
            right: Expr::val(KnownWord::low_mask(160)),
        };
        assert_eq!(ValueType::observe(&masked), ValueType::Address);
        assert_eq!(
            ValueType::observe(&Expr::Prop(Property::Caller)),
            ValueType::Address
        );
        assert_eq!(ValueType::observe(&Expr::IsZero(Expr::val(1usize))), ValueType::Bool);

        let byte = Expr::And {
            left:  Rc::new(Expr::CallValue),
            right: Expr::val(0xffusize),
        };
        assert_eq!(ValueType::observe(&byte), ValueType::UInt(8));
        assert_eq!(ValueType::UInt(8).to_string(), "uint8");
    }

    #[test]
    fn picks_the_best_type() {
        assert_eq!(ValueType::best(&[]), ValueType::UInt(256));
        assert_eq!(
            ValueType::best(&[ValueType::UInt(8), ValueType::UInt(64)]),
            ValueType::UInt(64)
        );
        assert_eq!(
            ValueType::best(&[ValueType::Address, ValueType::UInt(160)]),
            ValueType::Address
        );
        assert_eq!(
            ValueType::best(&[ValueType::Bool, ValueType::Address]),
            ValueType::UInt(256)
        );
    }
}
