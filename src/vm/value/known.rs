//! This module contains a representation of concrete word values for the EVM
//! that can be known and manipulated statically.
//!
//! All arithmetic follows the EVM's semantics exactly, wrapping modulo
//! `2^256`. Signed operations reinterpret the bit pattern as two's complement.

use std::{
    fmt::{Display, Formatter},
    mem,
};

use ethnum::{I256, U256};

use crate::{constant::WORD_SIZE_BITS, utility::keccak};

/// A 256-bit word whose value is concretely known during symbolic execution.
///
/// The value is stored as a plain unsigned integer, so byte ordering only
/// matters at the boundaries where the word is built from, or turned into,
/// bytes. Those boundaries always use the EVM's big-endian ordering.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct KnownWord {
    value: U256,
}

impl KnownWord {
    /// Constructs a known word from the provided numeric `value`.
    #[must_use]
    pub fn new(value: impl Into<U256>) -> Self {
        let value = value.into();
        Self { value }
    }

    /// Creates a known value representing zero.
    #[must_use]
    pub fn zero() -> Self {
        Self::new(U256::ZERO)
    }

    /// Creates a known value representing one.
    #[must_use]
    pub fn one() -> Self {
        Self::new(U256::ONE)
    }

    /// Creates a known value with all bits set.
    #[must_use]
    pub fn max() -> Self {
        Self::new(U256::MAX)
    }

    /// Creates the mask covering the lowest `bits` bits of a word.
    #[must_use]
    pub fn low_mask(bits: usize) -> Self {
        if bits >= WORD_SIZE_BITS {
            Self::max()
        } else {
            Self::new((U256::ONE << bits as u32) - U256::ONE)
        }
    }

    /// Reinterprets a signed value as a word.
    #[must_use]
    pub fn from_signed(value: impl Into<I256>) -> Self {
        let value = value.into().as_u256();
        Self { value }
    }

    /// Constructs a new `KnownWord` from `bytes` in big-endian ordering.
    ///
    /// Inputs shorter than a word are treated as the low-order bytes of the
    /// word, and inputs longer than a word keep only their last 32 bytes.
    #[must_use]
    pub fn from_be_slice(bytes: &[u8]) -> Self {
        let mut buffer = [0u8; mem::size_of::<Self>()];
        let used = bytes.len().min(buffer.len());
        buffer[mem::size_of::<Self>() - used..].copy_from_slice(&bytes[bytes.len() - used..]);
        Self::from_be_bytes(buffer)
    }

    /// Constructs a new `KnownWord` from exactly a word's worth of big-endian
    /// `bytes`.
    #[must_use]
    pub fn from_be_bytes(bytes: [u8; mem::size_of::<Self>()]) -> Self {
        let value = U256::from_be_bytes(bytes);
        Self { value }
    }

    /// Gets the numeric value of the word.
    #[must_use]
    pub fn value(&self) -> U256 {
        self.value
    }

    /// Gets the value of the word interpreted as a two's complement number.
    #[must_use]
    pub fn value_signed(&self) -> I256 {
        self.value.as_i256()
    }

    /// Gets the bytes of this word in big-endian ordering.
    #[must_use]
    pub fn bytes_be(&self) -> [u8; mem::size_of::<Self>()] {
        self.value.to_be_bytes()
    }

    /// Gets the value as a [`usize`] if it fits.
    #[must_use]
    pub fn as_usize(&self) -> Option<usize> {
        usize::try_from(self.value).ok()
    }

    /// Gets the value as a [`u32`] if it fits.
    #[must_use]
    pub fn as_u32(&self) -> Option<u32> {
        u32::try_from(self.value).ok()
    }

    /// Checks if the word is zero.
    #[must_use]
    pub fn is_zero_value(&self) -> bool {
        self.value == U256::ZERO
    }

    /// Gets the number of significant bits in the word.
    #[must_use]
    pub fn bit_width(&self) -> usize {
        WORD_SIZE_BITS - self.value.leading_zeros() as usize
    }

    /// If the word is of the form `2^w - 1` for `0 < w <= 256`, returns `w`.
    #[must_use]
    pub fn low_mask_width(&self) -> Option<usize> {
        if self.is_zero_value() {
            return None;
        }
        let width = self.bit_width();
        (*self == Self::low_mask(width)).then_some(width)
    }

    /// Computes the Keccak-256 hash of the big-endian concatenation of
    /// `words`.
    #[must_use]
    pub fn keccak(words: &[KnownWord]) -> Self {
        let bytes: Vec<u8> = words.iter().flat_map(KnownWord::bytes_be).collect();
        Self::from_be_bytes(keccak(bytes))
    }

    /// Performs unsigned division, returning [`None`] when `rhs` is zero.
    #[must_use]
    pub fn checked_div(self, rhs: Self) -> Option<Self> {
        self.value.checked_div(rhs.value).map(Self::new)
    }

    /// Performs unsigned modulo, returning [`None`] when `rhs` is zero.
    #[must_use]
    pub fn checked_rem(self, rhs: Self) -> Option<Self> {
        self.value.checked_rem(rhs.value).map(Self::new)
    }

    /// Performs signed division, returning [`None`] when `rhs` is zero.
    ///
    /// Dividing the most negative value by `-1` wraps back to the most negative
    /// value.
    #[must_use]
    pub fn checked_signed_div(self, rhs: Self) -> Option<Self> {
        if rhs.is_zero_value() {
            return None;
        }
        Some(Self::from_signed(
            self.value_signed().wrapping_div(rhs.value_signed()),
        ))
    }

    /// Performs signed modulo, returning [`None`] when `rhs` is zero.
    ///
    /// The sign of the result follows the sign of `self`.
    #[must_use]
    pub fn checked_signed_rem(self, rhs: Self) -> Option<Self> {
        if rhs.is_zero_value() {
            return None;
        }
        Some(Self::from_signed(
            self.value_signed().wrapping_rem(rhs.value_signed()),
        ))
    }

    /// Computes `(self + rhs) % modulus` without intermediate overflow,
    /// returning [`None`] when `modulus` is zero.
    #[must_use]
    pub fn checked_add_mod(self, rhs: Self, modulus: Self) -> Option<Self> {
        if modulus.is_zero_value() {
            return None;
        }
        let n = modulus.value;
        Some(Self::new(add_mod(self.value % n, rhs.value % n, n)))
    }

    /// Computes `(self * rhs) % modulus` without intermediate overflow,
    /// returning [`None`] when `modulus` is zero.
    #[must_use]
    pub fn checked_mul_mod(self, rhs: Self, modulus: Self) -> Option<Self> {
        if modulus.is_zero_value() {
            return None;
        }
        let n = modulus.value;
        let mut base = self.value % n;
        let mut factor = rhs.value % n;
        let mut result = U256::ZERO;
        while factor != U256::ZERO {
            if factor & U256::ONE == U256::ONE {
                result = add_mod(result, base, n);
            }
            base = add_mod(base, base, n);
            factor >>= 1;
        }
        Some(Self::new(result))
    }

    /// Computes `self` raised to `exponent` modulo `2^256`, by
    /// square-and-multiply.
    #[must_use]
    pub fn exp(self, exponent: Self) -> Self {
        let mut base = self.value;
        let mut exponent = exponent.value;
        let mut result = U256::ONE;
        while exponent != U256::ZERO {
            if exponent & U256::ONE == U256::ONE {
                result = result.wrapping_mul(base);
            }
            base = base.wrapping_mul(base);
            exponent >>= 1;
        }
        Self::new(result)
    }

    /// Extends the sign bit of the `(size + 1)`-byte value in `self`.
    #[must_use]
    pub fn sign_extend(self, size: Self) -> Self {
        let Some(byte) = size.as_usize().filter(|b| *b < 31) else {
            return self;
        };
        let bits = (byte + 1) * 8;
        let mask = Self::low_mask(bits);
        let sign_bit = U256::ONE << (bits as u32 - 1);
        if self.value & sign_bit == U256::ZERO {
            self & mask
        } else {
            self | !mask
        }
    }

    /// Computes less-than of two known words.
    #[must_use]
    pub fn lt(self, rhs: Self) -> Self {
        Self::from(self.value < rhs.value)
    }

    /// Computes greater-than of two known words.
    #[must_use]
    pub fn gt(self, rhs: Self) -> Self {
        Self::from(self.value > rhs.value)
    }

    /// Computes signed less-than of two known words.
    #[must_use]
    pub fn signed_lt(self, rhs: Self) -> Self {
        Self::from(self.value_signed() < rhs.value_signed())
    }

    /// Computes signed greater-than of two known words.
    #[must_use]
    pub fn signed_gt(self, rhs: Self) -> Self {
        Self::from(self.value_signed() > rhs.value_signed())
    }

    /// Computes equality of two known words.
    #[must_use]
    pub fn eq(self, rhs: Self) -> Self {
        Self::from(self.value == rhs.value)
    }

    /// Checks if `self` is zero, producing `1` if it is.
    #[must_use]
    pub fn is_zero(self) -> Self {
        Self::from(self.is_zero_value())
    }

    /// Gets the byte at `position` counted from the most significant end.
    #[must_use]
    pub fn byte(self, position: Self) -> Self {
        match position.as_usize() {
            Some(ix) if ix < mem::size_of::<Self>() => Self::from(self.bytes_be()[ix] as usize),
            _ => Self::zero(),
        }
    }

    /// Computes the left shift of `self` by `shift`.
    #[must_use]
    pub fn shl(self, shift: Self) -> Self {
        match shift.as_u32() {
            Some(bits) if (bits as usize) < WORD_SIZE_BITS => Self::new(self.value << bits),
            _ => Self::zero(),
        }
    }

    /// Computes the logical right shift of `self` by `shift`.
    #[must_use]
    pub fn shr(self, shift: Self) -> Self {
        match shift.as_u32() {
            Some(bits) if (bits as usize) < WORD_SIZE_BITS => Self::new(self.value >> bits),
            _ => Self::zero(),
        }
    }

    /// Computes the arithmetic right shift of `self` by `shift`.
    #[must_use]
    pub fn sar(self, shift: Self) -> Self {
        let negative = self.value_signed() < I256::ZERO;
        match shift.as_u32() {
            Some(bits) if (bits as usize) < WORD_SIZE_BITS => {
                Self::from_signed(self.value_signed() >> bits)
            }
            _ if negative => Self::max(),
            _ => Self::zero(),
        }
    }
}

/// Computes `(a + b) % n` for `a, b < n` without overflowing.
fn add_mod(a: U256, b: U256, n: U256) -> U256 {
    let headroom = n - b;
    if a >= headroom {
        a - headroom
    } else {
        a + b
    }
}

impl std::ops::Add<KnownWord> for KnownWord {
    type Output = KnownWord;

    fn add(self, rhs: KnownWord) -> Self::Output {
        KnownWord::new(self.value.wrapping_add(rhs.value))
    }
}

impl std::ops::Mul<KnownWord> for KnownWord {
    type Output = KnownWord;

    fn mul(self, rhs: KnownWord) -> Self::Output {
        KnownWord::new(self.value.wrapping_mul(rhs.value))
    }
}

impl std::ops::Sub<KnownWord> for KnownWord {
    type Output = KnownWord;

    fn sub(self, rhs: KnownWord) -> Self::Output {
        KnownWord::new(self.value.wrapping_sub(rhs.value))
    }
}

impl std::ops::BitAnd<KnownWord> for KnownWord {
    type Output = KnownWord;

    fn bitand(self, rhs: KnownWord) -> Self::Output {
        KnownWord::new(self.value & rhs.value)
    }
}

impl std::ops::BitOr<KnownWord> for KnownWord {
    type Output = KnownWord;

    fn bitor(self, rhs: KnownWord) -> Self::Output {
        KnownWord::new(self.value | rhs.value)
    }
}

impl std::ops::BitXor<KnownWord> for KnownWord {
    type Output = KnownWord;

    fn bitxor(self, rhs: KnownWord) -> Self::Output {
        KnownWord::new(self.value ^ rhs.value)
    }
}

impl std::ops::Not for KnownWord {
    type Output = KnownWord;

    fn not(self) -> Self::Output {
        KnownWord::new(!self.value)
    }
}

impl From<usize> for KnownWord {
    fn from(value: usize) -> Self {
        Self::new(value as u128)
    }
}

impl From<u32> for KnownWord {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl From<U256> for KnownWord {
    fn from(value: U256) -> Self {
        Self::new(value)
    }
}

impl From<KnownWord> for U256 {
    fn from(value: KnownWord) -> Self {
        value.value
    }
}

impl From<KnownWord> for bool {
    fn from(value: KnownWord) -> Self {
        !value.is_zero_value()
    }
}

impl From<bool> for KnownWord {
    fn from(value: bool) -> Self {
        if value {
            Self::one()
        } else {
            Self::zero()
        }
    }
}

/// Pretty-prints the known word as a hexadecimal-encoded number without
/// leading zeroes.
impl Display for KnownWord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let str = hex::encode(self.value.to_be_bytes());
        let str = str.trim_start_matches('0');
        let str = if str.is_empty() { "0" } else { str };
        write!(f, "0x{str}")
    }
}

#[cfg(test)]
mod test {
    use ethnum::{I256, U256};

    use crate::vm::value::known::KnownWord;

    fn signed(value: i64) -> KnownWord {
        KnownWord::from_signed(I256::from(value))
    }

    #[test]
    fn can_construct_from_short_big_endian_slices() {
        assert_eq!(
            KnownWord::from_be_slice(&[0x01, 0x00]),
            KnownWord::from(0x100usize)
        );
        assert_eq!(KnownWord::from_be_slice(&[]), KnownWord::zero());
    }

    #[test]
    fn arithmetic_wraps_around() {
        assert_eq!(KnownWord::zero() - KnownWord::one(), KnownWord::max());
        assert_eq!(KnownWord::max() + KnownWord::one(), KnownWord::zero());
        assert_eq!(
            KnownWord::max() * KnownWord::from(2usize),
            KnownWord::max() - KnownWord::one()
        );
    }

    #[test]
    fn division_by_zero_is_not_computed() {
        let seven = KnownWord::from(7usize);
        assert_eq!(seven.checked_div(KnownWord::zero()), None);
        assert_eq!(seven.checked_rem(KnownWord::zero()), None);
        assert_eq!(seven.checked_signed_div(KnownWord::zero()), None);
        assert_eq!(
            seven.checked_div(KnownWord::from(2usize)),
            Some(KnownWord::from(3usize))
        );
    }

    #[test]
    fn signed_division_and_modulo_follow_the_dividend() {
        assert_eq!(signed(-8).checked_signed_div(signed(2)), Some(signed(-4)));
        assert_eq!(signed(-8).checked_signed_rem(signed(3)), Some(signed(-2)));

        let min = KnownWord::new(U256::ONE << 255);
        assert_eq!(min.checked_signed_div(signed(-1)), Some(min));
    }

    #[test]
    fn modular_operations_do_not_overflow() {
        let max = KnownWord::max();
        let modulus = KnownWord::from(10usize);
        // (2^256 - 1) mod 10 = 5
        assert_eq!(
            max.checked_add_mod(max, modulus),
            Some(KnownWord::from(0usize))
        );
        assert_eq!(
            max.checked_mul_mod(max, modulus),
            Some(KnownWord::from(5usize))
        );
        assert_eq!(max.checked_mul_mod(max, KnownWord::zero()), None);
    }

    #[test]
    fn exponentiation_wraps() {
        let two = KnownWord::from(2usize);
        assert_eq!(
            KnownWord::from(7usize).exp(two),
            KnownWord::from(49usize)
        );
        assert_eq!(two.exp(KnownWord::from(256usize)), KnownWord::zero());
        assert_eq!(two.exp(KnownWord::zero()), KnownWord::one());
    }

    #[test]
    fn comparisons_produce_booleans() {
        let seven = KnownWord::from(7usize);
        let two = KnownWord::from(2usize);
        assert_eq!(seven.lt(two), KnownWord::from(false));
        assert_eq!(seven.gt(two), KnownWord::from(true));
        assert_eq!(signed(-8).signed_lt(two), KnownWord::from(true));
        assert_eq!(signed(-8).signed_gt(two), KnownWord::from(false));
        assert_eq!(seven.eq(seven), KnownWord::one());
        assert_eq!(KnownWord::zero().is_zero(), KnownWord::one());
    }

    #[test]
    fn shifts_saturate_past_the_word_size() {
        let one = KnownWord::one();
        let big = KnownWord::from(256usize);
        assert_eq!(one.shl(KnownWord::from(4usize)), KnownWord::from(16usize));
        assert_eq!(one.shl(big), KnownWord::zero());
        assert_eq!(KnownWord::max().shr(big), KnownWord::zero());
        assert_eq!(signed(-16).sar(KnownWord::from(2usize)), signed(-4));
        assert_eq!(signed(-16).sar(big), KnownWord::max());
    }

    #[test]
    fn byte_and_sign_extension() {
        let word = KnownWord::from(0x1234usize);
        assert_eq!(word.byte(KnownWord::from(31usize)), KnownWord::from(0x34usize));
        assert_eq!(word.byte(KnownWord::from(32usize)), KnownWord::zero());
        assert_eq!(
            KnownWord::from(0xffusize).sign_extend(KnownWord::zero()),
            KnownWord::max()
        );
        assert_eq!(
            KnownWord::from(0x7fusize).sign_extend(KnownWord::zero()),
            KnownWord::from(0x7fusize)
        );
    }

    #[test]
    fn recognises_low_masks() {
        assert_eq!(KnownWord::low_mask(160).low_mask_width(), Some(160));
        assert_eq!(KnownWord::max().low_mask_width(), Some(256));
        assert_eq!(KnownWord::from(0xf0usize).low_mask_width(), None);
        assert_eq!(KnownWord::zero().low_mask_width(), None);
    }

    #[test]
    fn hashes_slot_indices() {
        let hash = KnownWord::keccak(&[KnownWord::zero()]);
        assert_eq!(
            hash.to_string(),
            "0x290decd9548b62a8d60345a988386fc84ba6bc95484008f6362f93160ef3e563"
        );
    }
}
