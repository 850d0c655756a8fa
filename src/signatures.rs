//! This module contains the selector type and the interface through which the
//! decompiler looks up human-readable signatures for function selectors and
//! event topics.
//!
//! Lookups happen only when results are named and rendered, and a missing entry
//! is never an error. The database is always passed in explicitly.

use std::{
    collections::HashMap,
    fmt::{Display, Formatter},
};

use serde::Deserialize;

use crate::{
    constant::SELECTOR_WIDTH_BITS,
    utility::keccak,
    vm::value::known::KnownWord,
};

/// The four-byte identifier of a public function.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Selector([u8; 4]);

impl Selector {
    /// Constructs a selector from its raw bytes.
    #[must_use]
    pub fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Computes the selector for a human-readable signature such as
    /// `transfer(address,uint256)`.
    #[must_use]
    pub fn from_signature(signature: &str) -> Self {
        let hash = keccak(signature.as_bytes());
        Self([hash[0], hash[1], hash[2], hash[3]])
    }

    /// Constructs a selector from a word, if the word fits in four bytes.
    #[must_use]
    pub fn from_word(word: KnownWord) -> Option<Self> {
        if word.bit_width() > SELECTOR_WIDTH_BITS {
            return None;
        }
        let bytes = word.bytes_be();
        Some(Self([bytes[28], bytes[29], bytes[30], bytes[31]]))
    }

    /// Gets the selector as a word.
    #[must_use]
    pub fn as_word(&self) -> KnownWord {
        KnownWord::from_be_slice(&self.0)
    }

    /// Gets the raw bytes of the selector.
    #[must_use]
    pub fn bytes(&self) -> [u8; 4] {
        self.0
    }
}

impl Display for Selector {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// A source of human-readable signatures.
pub trait SignatureDatabase {
    /// Gets the signature of the function with the provided `selector`.
    fn function(&self, selector: Selector) -> Option<&str>;

    /// Gets the signature of the event whose first topic is `hash`.
    fn event(&self, hash: KnownWord) -> Option<&str>;
}

/// A database that knows no signatures at all.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct NoSignatures;

impl SignatureDatabase for NoSignatures {
    fn function(&self, _: Selector) -> Option<&str> {
        None
    }

    fn event(&self, _: KnownWord) -> Option<&str> {
        None
    }
}

/// An in-memory signature database built from known signatures.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StaticSignatures {
    functions: HashMap<Selector, String>,
    events:    HashMap<KnownWord, String>,
}

/// The on-disk JSON form of a [`StaticSignatures`].
#[derive(Debug, Deserialize)]
struct SignatureList {
    #[serde(default)]
    functions: Vec<String>,
    #[serde(default)]
    events:    Vec<String>,
}

impl StaticSignatures {
    /// Creates an empty database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a database from JSON of the form
    /// `{"functions": ["x()"], "events": ["Transfer(address,address,uint256)"]}`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `json` is not of that form.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let list: SignatureList = serde_json::from_str(json)?;
        let mut database = Self::new();
        list.functions.iter().for_each(|s| database.add_function(s));
        list.events.iter().for_each(|s| database.add_event(s));

        Ok(database)
    }

    /// Adds the function `signature`, keyed by its selector.
    pub fn add_function(&mut self, signature: impl Into<String>) {
        let signature = signature.into();
        self.functions.insert(Selector::from_signature(&signature), signature);
    }

    /// Adds the event `signature`, keyed by its topic hash.
    pub fn add_event(&mut self, signature: impl Into<String>) {
        let signature = signature.into();
        let hash = KnownWord::from_be_bytes(keccak(signature.as_bytes()));
        self.events.insert(hash, signature);
    }

    /// Adds the function `signature`, returning the database.
    #[must_use]
    pub fn with_function(mut self, signature: impl Into<String>) -> Self {
        self.add_function(signature);
        self
    }

    /// Adds the event `signature`, returning the database.
    #[must_use]
    pub fn with_event(mut self, signature: impl Into<String>) -> Self {
        self.add_event(signature);
        self
    }
}

impl SignatureDatabase for StaticSignatures {
    fn function(&self, selector: Selector) -> Option<&str> {
        self.functions.get(&selector).map(String::as_str)
    }

    fn event(&self, hash: KnownWord) -> Option<&str> {
        self.events.get(&hash).map(String::as_str)
    }
}

/// Gets the name part of a signature like `transfer(address,uint256)`.
#[must_use]
pub fn signature_name(signature: &str) -> &str {
    signature.split('(').next().unwrap_or(signature)
}

/// Gets the top-level parameter types of a signature like
/// `f((uint256,address),bytes)`, keeping tuple types intact.
#[must_use]
pub fn signature_parameters(signature: &str) -> Vec<String> {
    let Some(start) = signature.find('(') else { return vec![] };
    let Some(end) = signature.rfind(')') else { return vec![] };
    if end <= start + 1 {
        return vec![];
    }

    let mut parameters = vec![];
    let mut depth = 0usize;
    let mut current = String::new();
    for c in signature[start + 1..end].chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => parameters.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parameters.push(current);

    parameters
}

#[cfg(test)]
mod test {
    use crate::{
        signatures::{
            signature_name,
            signature_parameters,
            Selector,
            SignatureDatabase,
            StaticSignatures,
        },
        vm::value::known::KnownWord,
    };

    #[test]
    fn computes_well_known_selectors() {
        assert_eq!(
            Selector::from_signature("transfer(address,uint256)").to_string(),
            "0xa9059cbb"
        );
        assert_eq!(
            Selector::from_signature("balanceOf(address)").to_string(),
            "0x70a08231"
        );
    }

    #[test]
    fn converts_selectors_to_and_from_words() {
        let selector = Selector::new([0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(Selector::from_word(selector.as_word()), Some(selector));
        assert_eq!(Selector::from_word(KnownWord::max()), None);
    }

    #[test]
    fn loads_signatures_from_json() -> anyhow::Result<()> {
        let database = StaticSignatures::from_json(
            r#"{"functions": ["x()"], "events": ["Transfer(address,address,uint256)"]}"#,
        )?;
        assert_eq!(database.function(Selector::from_signature("x()")), Some("x()"));

        let topic = KnownWord::from_be_slice(&hex::decode(
            "ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef",
        )?);
        assert_eq!(
            database.event(topic),
            Some("Transfer(address,address,uint256)")
        );
        assert_eq!(database.function(Selector::new([0; 4])), None);

        Ok(())
    }

    #[test]
    fn splits_signatures() {
        assert_eq!(signature_name("transfer(address,uint256)"), "transfer");
        assert_eq!(
            signature_parameters("f((uint256,address),bytes)"),
            vec!["(uint256,address)".to_string(), "bytes".to_string()]
        );
        assert!(signature_parameters("x()").is_empty());
    }
}
