//! Utility functions useful throughout the codebase.

use std::{
    cmp::Ordering,
    fmt::{Debug, Formatter},
};

use ethnum::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};

use crate::vm::value::known::KnownWord;

/// A type alias to make [`U256Wrapper`] easier to type internally.
pub type U256W = U256Wrapper;

/// The `U256Wrapper` is responsible for allowing the serialisation of the
/// [`U256`] type to JSON.
///
/// It provides reasonable conversions from a number of common types used within
/// the library.
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq)]
#[repr(transparent)]
pub struct U256Wrapper(pub U256);

impl Debug for U256Wrapper {
    /// The wrapper has absolutely no semantic meaning, so we print the
    /// underlying value for the debug representation.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialOrd for U256Wrapper {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for U256Wrapper {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl From<U256> for U256Wrapper {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl From<U256Wrapper> for U256 {
    fn from(U256Wrapper(value): U256Wrapper) -> Self {
        value
    }
}

impl From<KnownWord> for U256Wrapper {
    fn from(value: KnownWord) -> Self {
        Self(value.value())
    }
}

impl From<&KnownWord> for U256Wrapper {
    fn from(value: &KnownWord) -> Self {
        Self(value.value())
    }
}

impl From<U256Wrapper> for KnownWord {
    fn from(value: U256Wrapper) -> Self {
        KnownWord::new(value.0)
    }
}

impl From<usize> for U256Wrapper {
    fn from(value: usize) -> Self {
        Self(U256::from(value as u128))
    }
}

impl Serialize for U256Wrapper {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut value = String::from("0x");
        value.push_str(&hex::encode(self.0.to_be_bytes()));

        serializer.serialize_str(&value)
    }
}

impl<'de> Deserialize<'de> for U256Wrapper {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        let digits = s.strip_prefix("0x").unwrap_or(&s);
        let u256 = U256::from_str_radix(digits, 16).map_err(serde::de::Error::custom)?;
        Ok(U256Wrapper(u256))
    }
}

/// Computes the Keccak-256 hash of `bytes`.
#[must_use]
pub fn keccak(bytes: impl AsRef<[u8]>) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(bytes.as_ref());
    hasher.finalize().into()
}

/// Gets the bytecode from the provided hex-encoded string `code`.
///
/// This hex-encoded string may or may not start with the `0x` prefix. Both
/// cases will be handled.
///
/// # Errors
///
/// Returns [`Err`] if `code` is not valid hex.
pub fn decode_hex(code: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let trimmed = code.trim();
    let no_0x_prefix = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    hex::decode(no_0x_prefix)
}

#[cfg(test)]
mod test {
    use crate::utility::{decode_hex, keccak, U256Wrapper};

    #[test]
    fn serializes_as_prefixed_hex() -> anyhow::Result<()> {
        let value = U256Wrapper::from(0x2a_usize);
        let json = serde_json::to_string(&value)?;
        assert_eq!(
            json,
            "\"0x000000000000000000000000000000000000000000000000000000000000002a\""
        );

        let back: U256Wrapper = serde_json::from_str(&json)?;
        assert_eq!(back, value);

        Ok(())
    }

    #[test]
    fn hashes_the_empty_input() {
        assert_eq!(
            hex::encode(keccak([0u8; 0])),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn decodes_hex_with_and_without_prefix() -> anyhow::Result<()> {
        assert_eq!(decode_hex("0x6001")?, vec![0x60, 0x01]);
        assert_eq!(decode_hex("6001")?, vec![0x60, 0x01]);
        assert!(decode_hex("0x6g").is_err());

        Ok(())
    }
}
