//! The evaluator that normalises expressions by folding constants and applying
//! algebraic identities.
//!
//! Evaluation works bottom-up. Children are normalised first, and then local
//! rewrites are applied to the node until none matches. Any node produced by a
//! rewrite is normalised again, so the result of [`eval`] is a fixed point of
//! [`eval`].

use std::rc::Rc;

use crate::{
    constant::{SELECTOR_SHIFT_BITS, WORD_SIZE_BYTES},
    signatures::Selector,
    vm::value::{known::KnownWord, Expr, SharedExpr},
};

/// Normalises `expr`, returning a new tree and leaving the input untouched.
#[must_use]
pub fn eval(expr: &SharedExpr) -> SharedExpr {
    let rebuilt = expr.map_children(eval);
    match rewrite(&rebuilt) {
        Some(next) => eval(&next),
        None => rebuilt,
    }
}

impl Expr {
    /// Rebuilds the expression with every direct child replaced by
    /// `f(child)`.
    ///
    /// Nodes whose children are all unchanged are shared rather than copied.
    #[must_use]
    pub fn map_children(self: &Rc<Self>, f: impl Fn(&SharedExpr) -> SharedExpr) -> SharedExpr {
        let mut changed = false;
        let mut m = |child: &SharedExpr| {
            let new = f(child);
            changed |= !Rc::ptr_eq(&new, child);
            new
        };

        let node = match self.as_ref() {
            Self::Val(_)
            | Self::Sig(_)
            | Self::Prop(_)
            | Self::CallValue
            | Self::CallDataSize => return self.clone(),
            Self::Add { left, right } => Self::Add {
                left:  m(left),
                right: m(right),
            },
            Self::Mul { left, right } => Self::Mul {
                left:  m(left),
                right: m(right),
            },
            Self::Sub { left, right } => Self::Sub {
                left:  m(left),
                right: m(right),
            },
            Self::Div { left, right } => Self::Div {
                left:  m(left),
                right: m(right),
            },
            Self::SDiv { left, right } => Self::SDiv {
                left:  m(left),
                right: m(right),
            },
            Self::Mod { left, right } => Self::Mod {
                left:  m(left),
                right: m(right),
            },
            Self::SMod { left, right } => Self::SMod {
                left:  m(left),
                right: m(right),
            },
            Self::AddMod {
                left,
                right,
                modulus,
            } => Self::AddMod {
                left:    m(left),
                right:   m(right),
                modulus: m(modulus),
            },
            Self::MulMod {
                left,
                right,
                modulus,
            } => Self::MulMod {
                left:    m(left),
                right:   m(right),
                modulus: m(modulus),
            },
            Self::Exp { base, exponent } => Self::Exp {
                base:     m(base),
                exponent: m(exponent),
            },
            Self::SignExtend { size, value } => Self::SignExtend {
                size:  m(size),
                value: m(value),
            },
            Self::Lt {
                left,
                right,
                equal,
                signed,
            } => Self::Lt {
                left:   m(left),
                right:  m(right),
                equal:  *equal,
                signed: *signed,
            },
            Self::Gt {
                left,
                right,
                equal,
                signed,
            } => Self::Gt {
                left:   m(left),
                right:  m(right),
                equal:  *equal,
                signed: *signed,
            },
            Self::Eq { left, right, equal } => Self::Eq {
                left:  m(left),
                right: m(right),
                equal: *equal,
            },
            Self::IsZero(value) => Self::IsZero(m(value)),
            Self::And { left, right } => Self::And {
                left:  m(left),
                right: m(right),
            },
            Self::Or { left, right } => Self::Or {
                left:  m(left),
                right: m(right),
            },
            Self::Xor { left, right } => Self::Xor {
                left:  m(left),
                right: m(right),
            },
            Self::Not(value) => Self::Not(m(value)),
            Self::Byte { position, value } => Self::Byte {
                position: m(position),
                value:    m(value),
            },
            Self::Shl { value, shift } => Self::Shl {
                value: m(value),
                shift: m(shift),
            },
            Self::Shr { value, shift } => Self::Shr {
                value: m(value),
                shift: m(shift),
            },
            Self::Sar { value, shift } => Self::Sar {
                value: m(value),
                shift: m(shift),
            },
            Self::Balance(value) => Self::Balance(m(value)),
            Self::ExtCodeSize(value) => Self::ExtCodeSize(m(value)),
            Self::ExtCodeHash(value) => Self::ExtCodeHash(m(value)),
            Self::BlockHash(value) => Self::BlockHash(m(value)),
            Self::BlobHash(value) => Self::BlobHash(m(value)),
            Self::CallDataLoad(value) => Self::CallDataLoad(m(value)),
            Self::MLoad(value) => Self::MLoad(m(value)),
            Self::TLoad(value) => Self::TLoad(m(value)),
            Self::Sha3 {
                offset,
                size,
                words,
            } => Self::Sha3 {
                offset: m(offset),
                size:   m(size),
                words:  words.as_ref().map(|ws| ws.iter().map(&mut m).collect()),
            },
            Self::SLoad { slot, variable } => Self::SLoad {
                slot:     m(slot),
                variable: *variable,
            },
            Self::MappingLoad { slot, keys, offset } => Self::MappingLoad {
                slot:   *slot,
                keys:   keys.iter().map(&mut m).collect(),
                offset: *offset,
            },
            Self::ArrayLoad { slot, index } => Self::ArrayLoad {
                slot:  *slot,
                index: m(index),
            },
            Self::Call {
                kind,
                gas,
                address,
                value,
                arg_offset,
                arg_size,
                ret_offset,
                ret_size,
            } => Self::Call {
                kind:       *kind,
                gas:        m(gas),
                address:    m(address),
                value:      value.as_ref().map(&mut m),
                arg_offset: m(arg_offset),
                arg_size:   m(arg_size),
                ret_offset: m(ret_offset),
                ret_size:   m(ret_size),
            },
            Self::Create {
                value,
                offset,
                size,
                salt,
            } => Self::Create {
                value:  m(value),
                offset: m(offset),
                size:   m(size),
                salt:   salt.as_ref().map(&mut m),
            },
            Self::Copy { source, offset } => Self::Copy {
                source: match source {
                    super::CopySource::ExtCode(address) => {
                        super::CopySource::ExtCode(m(address))
                    }
                    other => other.clone(),
                },
                offset: m(offset),
            },
            Self::Phi { left, right } => Self::Phi {
                left:  m(left),
                right: m(right),
            },
        };

        if changed {
            Rc::new(node)
        } else {
            self.clone()
        }
    }
}

/// Applies a single rewrite to the root of `expr`, whose children are already
/// normalised.
fn rewrite(expr: &SharedExpr) -> Option<SharedExpr> {
    if let Some(value) = fold(expr) {
        return Some(Rc::new(Expr::Val(value)));
    }

    let zero = KnownWord::zero();
    let one = KnownWord::one();
    match expr.as_ref() {
        Expr::Add { left, right } => {
            if left.is_val(zero) {
                return Some(right.clone());
            }
            if right.is_val(zero) {
                return Some(left.clone());
            }
            let (inner, constant) = match (left.known(), right.known()) {
                (Some(c), None) => (right, c),
                (None, Some(c)) => (left, c),
                _ => return None,
            };
            let Expr::Add { left: a, right: b } = inner.as_ref() else { return None };
            match (a.known(), b.known()) {
                (Some(c), None) => Some(add(b.clone(), Expr::val(c + constant))),
                (None, Some(c)) => Some(add(a.clone(), Expr::val(c + constant))),
                _ => None,
            }
        }
        Expr::Sub { left, right } => {
            if right.is_val(zero) {
                Some(left.clone())
            } else if left == right {
                Some(Expr::val(zero))
            } else {
                None
            }
        }
        Expr::Mul { left, right } => {
            if left.is_val(zero) || right.is_val(zero) {
                Some(Expr::val(zero))
            } else if left.is_val(one) {
                Some(right.clone())
            } else if right.is_val(one) {
                Some(left.clone())
            } else {
                None
            }
        }
        Expr::Div { left, right } | Expr::SDiv { left, right } => {
            right.is_val(one).then(|| left.clone())
        }
        Expr::Exp { base, exponent } => {
            if exponent.is_val(zero) {
                Some(Expr::val(one))
            } else if exponent.is_val(one) {
                Some(base.clone())
            } else {
                None
            }
        }
        Expr::Lt {
            left, right, equal, ..
        }
        | Expr::Gt {
            left, right, equal, ..
        } => (left == right).then(|| Expr::val(*equal)),
        Expr::Eq { left, right, equal } => {
            if left == right {
                return Some(Expr::val(*equal));
            }
            if *equal {
                recognise_selector(left, right)
                    .or_else(|| recognise_selector(right, left))
                    .map(|selector| Rc::new(Expr::Sig(selector)))
            } else {
                None
            }
        }
        Expr::IsZero(value) => match value.as_ref() {
            Expr::IsZero(inner) if inner.is_boolean() => Some(inner.clone()),
            Expr::Eq { left, right, equal } => Some(Rc::new(Expr::Eq {
                left:  left.clone(),
                right: right.clone(),
                equal: !equal,
            })),
            Expr::Lt {
                left,
                right,
                equal,
                signed,
            } => Some(Rc::new(Expr::Gt {
                left:   left.clone(),
                right:  right.clone(),
                equal:  !equal,
                signed: *signed,
            })),
            Expr::Gt {
                left,
                right,
                equal,
                signed,
            } => Some(Rc::new(Expr::Lt {
                left:   left.clone(),
                right:  right.clone(),
                equal:  !equal,
                signed: *signed,
            })),
            _ => None,
        },
        Expr::And { left, right } => {
            if left == right {
                return Some(left.clone());
            }
            let (value, mask) = match (left.known(), right.known()) {
                (Some(c), None) => (right, c),
                (None, Some(c)) => (left, c),
                _ => return None,
            };
            if mask.is_zero_value() {
                return Some(Expr::val(zero));
            }
            if let Some(width) = mask.low_mask_width() {
                if value.bit_width() <= width {
                    return Some(value.clone());
                }
            }
            let Expr::And { left: a, right: b } = value.as_ref() else { return None };
            match (a.known(), b.known()) {
                (Some(c), None) => Some(and(b.clone(), Expr::val(c & mask))),
                (None, Some(c)) => Some(and(a.clone(), Expr::val(c & mask))),
                _ => None,
            }
        }
        Expr::Or { left, right } | Expr::Xor { left, right } => {
            if left.is_val(zero) {
                Some(right.clone())
            } else if right.is_val(zero) {
                Some(left.clone())
            } else {
                None
            }
        }
        Expr::Shl { value, shift } | Expr::Shr { value, shift } | Expr::Sar { value, shift } => {
            shift.is_val(zero).then(|| value.clone())
        }
        Expr::Phi { left, right } => (left == right).then(|| left.clone()),
        _ => None,
    }
}

/// Computes the value of `expr` if all of its operands are known.
///
/// Division and modulo by zero are left unfolded.
fn fold(expr: &Expr) -> Option<KnownWord> {
    let binary = |left: &SharedExpr, right: &SharedExpr| Some((left.known()?, right.known()?));
    let value = match expr {
        Expr::Add { left, right } => binary(left, right).map(|(l, r)| l + r)?,
        Expr::Mul { left, right } => binary(left, right).map(|(l, r)| l * r)?,
        Expr::Sub { left, right } => binary(left, right).map(|(l, r)| l - r)?,
        Expr::Div { left, right } => binary(left, right).and_then(|(l, r)| l.checked_div(r))?,
        Expr::SDiv { left, right } => {
            binary(left, right).and_then(|(l, r)| l.checked_signed_div(r))?
        }
        Expr::Mod { left, right } => binary(left, right).and_then(|(l, r)| l.checked_rem(r))?,
        Expr::SMod { left, right } => {
            binary(left, right).and_then(|(l, r)| l.checked_signed_rem(r))?
        }
        Expr::AddMod {
            left,
            right,
            modulus,
        } => binary(left, right).and_then(|(l, r)| l.checked_add_mod(r, modulus.known()?))?,
        Expr::MulMod {
            left,
            right,
            modulus,
        } => binary(left, right).and_then(|(l, r)| l.checked_mul_mod(r, modulus.known()?))?,
        Expr::Exp { base, exponent } => binary(base, exponent).map(|(b, e)| b.exp(e))?,
        Expr::SignExtend { size, value } => binary(size, value).map(|(s, v)| v.sign_extend(s))?,
        Expr::Lt {
            left,
            right,
            equal,
            signed,
        } => {
            let (l, r) = binary(left, right)?;
            let strict = if *signed { l.signed_lt(r) } else { l.lt(r) };
            if *equal {
                strict | l.eq(r)
            } else {
                strict
            }
        }
        Expr::Gt {
            left,
            right,
            equal,
            signed,
        } => {
            let (l, r) = binary(left, right)?;
            let strict = if *signed { l.signed_gt(r) } else { l.gt(r) };
            if *equal {
                strict | l.eq(r)
            } else {
                strict
            }
        }
        Expr::Eq { left, right, equal } => {
            let (l, r) = binary(left, right)?;
            if *equal {
                l.eq(r)
            } else {
                l.eq(r).is_zero()
            }
        }
        Expr::IsZero(value) => value.known()?.is_zero(),
        Expr::And { left, right } => binary(left, right).map(|(l, r)| l & r)?,
        Expr::Or { left, right } => binary(left, right).map(|(l, r)| l | r)?,
        Expr::Xor { left, right } => binary(left, right).map(|(l, r)| l ^ r)?,
        Expr::Not(value) => !value.known()?,
        Expr::Byte { position, value } => binary(position, value).map(|(p, v)| v.byte(p))?,
        Expr::Shl { value, shift } => binary(value, shift).map(|(v, s)| v.shl(s))?,
        Expr::Shr { value, shift } => binary(value, shift).map(|(v, s)| v.shr(s))?,
        Expr::Sar { value, shift } => binary(value, shift).map(|(v, s)| v.sar(s))?,
        Expr::Sha3 {
            size,
            words: Some(words),
            ..
        } => {
            let size = size.known()?.as_usize()?;
            if size != words.len() * WORD_SIZE_BYTES {
                return None;
            }
            let words = words.iter().map(|w| w.known()).collect::<Option<Vec<_>>>()?;
            KnownWord::keccak(&words)
        }
        _ => return None,
    };

    Some(value)
}

/// Checks whether `extraction` reads the selector out of the calldata and
/// `literal` is a four-byte constant, returning the selector if so.
fn recognise_selector(extraction: &SharedExpr, literal: &SharedExpr) -> Option<Selector> {
    let selector = Selector::from_word(literal.known()?)?;
    is_selector_extraction(extraction).then_some(selector)
}

/// Matches `calldataload(0) >> 224` and `calldataload(0) / 2^224`.
fn is_selector_extraction(expr: &Expr) -> bool {
    let is_head = |e: &SharedExpr| {
        matches!(e.as_ref(), Expr::CallDataLoad(offset) if offset.is_val(KnownWord::zero()))
    };
    match expr {
        Expr::Shr { value, shift } => {
            is_head(value) && shift.is_val(KnownWord::from(SELECTOR_SHIFT_BITS))
        }
        Expr::Div { left, right } => {
            is_head(left)
                && right.is_val(KnownWord::one().shl(KnownWord::from(SELECTOR_SHIFT_BITS)))
        }
        _ => false,
    }
}

fn add(left: SharedExpr, right: SharedExpr) -> SharedExpr {
    Rc::new(Expr::Add { left, right })
}

fn and(left: SharedExpr, right: SharedExpr) -> SharedExpr {
    Rc::new(Expr::And { left, right })
}

#[cfg(test)]
mod test {
    use std::rc::Rc;

    use crate::{
        signatures::Selector,
        vm::value::{eval::eval, known::KnownWord, Expr, Property, SharedExpr},
    };

    fn val(v: usize) -> SharedExpr {
        Expr::val(v)
    }

    fn caller() -> SharedExpr {
        Rc::new(Expr::Prop(Property::Caller))
    }

    fn head() -> SharedExpr {
        Rc::new(Expr::CallDataLoad(val(0)))
    }

    #[test]
    fn folds_wrapping_arithmetic() {
        let sub = Rc::new(Expr::Sub {
            left:  val(1),
            right: val(2),
        });
        assert_eq!(eval(&sub), Rc::new(Expr::Val(KnownWord::max())));

        let nested = Rc::new(Expr::Mul {
            left:  Rc::new(Expr::Add {
                left:  val(2),
                right: val(3),
            }),
            right: val(4),
        });
        assert_eq!(eval(&nested), val(20));
    }

    #[test]
    fn leaves_division_by_zero_symbolic() {
        let div = Rc::new(Expr::Div {
            left:  val(7),
            right: val(0),
        });
        assert_eq!(eval(&div), div);

        let modulo = Rc::new(Expr::Mod {
            left:  caller(),
            right: val(0),
        });
        assert_eq!(eval(&modulo), modulo);
    }

    #[test]
    fn applies_identities() {
        let cases = [
            Expr::Add {
                left:  caller(),
                right: val(0),
            },
            Expr::Mul {
                left:  val(1),
                right: caller(),
            },
            Expr::Div {
                left:  caller(),
                right: val(1),
            },
            Expr::Or {
                left:  val(0),
                right: caller(),
            },
            Expr::Exp {
                base:     caller(),
                exponent: val(1),
            },
        ];
        for case in cases {
            assert_eq!(eval(&Rc::new(case)), caller());
        }

        let zero = Rc::new(Expr::Mul {
            left:  caller(),
            right: val(0),
        });
        assert_eq!(eval(&zero), val(0));

        let same = Rc::new(Expr::Sub {
            left:  caller(),
            right: caller(),
        });
        assert_eq!(eval(&same), val(0));
    }

    #[test]
    fn reassociates_constant_offsets() {
        let expr = Rc::new(Expr::Add {
            left:  val(3),
            right: Rc::new(Expr::Add {
                left:  caller(),
                right: val(4),
            }),
        });
        let expected = Rc::new(Expr::Add {
            left:  caller(),
            right: val(7),
        });
        assert_eq!(eval(&expr), expected);
    }

    #[test]
    fn negates_comparisons() {
        let lt = Rc::new(Expr::Lt {
            left:   caller(),
            right:  val(5),
            equal:  false,
            signed: false,
        });
        let negated = eval(&Rc::new(Expr::IsZero(lt)));
        let expected = Rc::new(Expr::Gt {
            left:   caller(),
            right:  val(5),
            equal:  true,
            signed: false,
        });
        assert_eq!(negated, expected);

        let eq = Rc::new(Expr::Eq {
            left:  caller(),
            right: val(5),
            equal: true,
        });
        let ne = eval(&Rc::new(Expr::IsZero(eq.clone())));
        assert!(matches!(ne.as_ref(), Expr::Eq { equal: false, .. }));
        assert_eq!(eval(&Rc::new(Expr::IsZero(ne))), eq);
    }

    #[test]
    fn removes_double_negation_of_booleans_only() {
        let boolean = Rc::new(Expr::Eq {
            left:  caller(),
            right: val(1),
            equal: true,
        });
        let not_eq = Rc::new(Expr::IsZero(Rc::new(Expr::IsZero(boolean.clone()))));
        assert_eq!(eval(&not_eq), boolean);

        let word = Rc::new(Expr::IsZero(Rc::new(Expr::IsZero(caller()))));
        assert_eq!(eval(&word), word);
    }

    #[test]
    fn eliminates_masks() {
        let all_ones = Rc::new(Expr::And {
            left:  caller(),
            right: Rc::new(Expr::Val(KnownWord::max())),
        });
        assert_eq!(eval(&all_ones), caller());

        let address_mask = Rc::new(Expr::Val(KnownWord::low_mask(160)));
        let masked = Rc::new(Expr::And {
            left:  address_mask.clone(),
            right: caller(),
        });
        assert_eq!(eval(&masked), caller());

        let nested = Rc::new(Expr::And {
            left:  Rc::new(Expr::And {
                left:  head(),
                right: val(0xffff),
            }),
            right: val(0xff),
        });
        let expected = Rc::new(Expr::And {
            left:  head(),
            right: val(0xff),
        });
        assert_eq!(eval(&nested), expected);
    }

    #[test]
    fn recognises_selectors_in_every_form() {
        let selector = Selector::new([0x0c, 0x55, 0x69, 0x9c]);
        let literal = Rc::new(Expr::Val(selector.as_word()));
        let shr = Rc::new(Expr::Shr {
            value: head(),
            shift: val(224),
        });
        let div = Rc::new(Expr::Div {
            left:  head(),
            right: Rc::new(Expr::Val(KnownWord::one().shl(KnownWord::from(224usize)))),
        });
        let masked = Rc::new(Expr::And {
            left:  div.clone(),
            right: val(0xffff_ffff),
        });

        for extraction in [shr, div, masked] {
            for (left, right) in [
                (extraction.clone(), literal.clone()),
                (literal.clone(), extraction.clone()),
            ] {
                let eq = Rc::new(Expr::Eq {
                    left,
                    right,
                    equal: true,
                });
                assert_eq!(eval(&eq), Rc::new(Expr::Sig(selector)));
            }
        }
    }

    #[test]
    fn folds_constant_hashes() {
        let words = vec![val(1), val(2)];
        let sha = Rc::new(Expr::Sha3 {
            offset: val(0),
            size:   val(64),
            words:  Some(words),
        });
        let expected =
            KnownWord::keccak(&[KnownWord::from(1usize), KnownWord::from(2usize)]);
        assert_eq!(eval(&sha), Rc::new(Expr::Val(expected)));

        let symbolic = Rc::new(Expr::Sha3 {
            offset: val(0),
            size:   val(64),
            words:  Some(vec![caller(), val(2)]),
        });
        assert_eq!(eval(&symbolic), symbolic);
    }

    #[test]
    fn collapses_identical_phis() {
        let phi = Rc::new(Expr::Phi {
            left:  caller(),
            right: Rc::new(Expr::Add {
                left:  caller(),
                right: val(0),
            }),
        });
        assert_eq!(eval(&phi), caller());
    }

    #[test]
    fn evaluation_is_idempotent() {
        let expr = Rc::new(Expr::IsZero(Rc::new(Expr::Lt {
            left:   Rc::new(Expr::Add {
                left:  Rc::new(Expr::Add {
                    left:  caller(),
                    right: val(1),
                }),
                right: val(2),
            }),
            right:  Rc::new(Expr::And {
                left:  head(),
                right: val(0xff),
            }),
            equal:  false,
            signed: true,
        })));
        let once = eval(&expr);
        assert_eq!(eval(&once), once);
    }
}
