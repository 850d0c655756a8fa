//! This module strips the metadata that the Solidity compiler appends to the
//! runtime bytecode.
//!
//! The metadata is a CBOR map whose length is stored in the final two bytes of
//! the code. Only the small subset of CBOR that the compiler emits is
//! understood here: a definite-length map with text keys, whose values are
//! byte strings, text strings or booleans.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// The content-addressing scheme of the metadata hash.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Ipfs,
    Bzzr0,
    Bzzr1,
}

impl Display for Protocol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Ipfs => "ipfs",
            Self::Bzzr0 => "bzzr0",
            Self::Bzzr1 => "bzzr1",
        };
        write!(f, "{name}")
    }
}

/// The metadata found at the end of a contract's code.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Metadata {
    pub protocol: Option<Protocol>,

    /// The hash of the metadata file, hex encoded.
    pub hash: Option<String>,

    /// The version of the compiler that produced the code.
    pub compiler_version: Option<String>,
}

/// Splits `bytecode` into the executable code and the metadata at its end.
///
/// If the trailing bytes do not decode as compiler metadata, the whole input
/// is returned as code.
#[must_use]
pub fn strip(bytecode: &[u8]) -> (&[u8], Option<Metadata>) {
    match split(bytecode) {
        Some((code, metadata)) => (code, Some(metadata)),
        None => (bytecode, None),
    }
}

fn split(bytecode: &[u8]) -> Option<(&[u8], Metadata)> {
    let [.., high, low] = bytecode else { return None };
    let length = usize::from(u16::from_be_bytes([*high, *low]));
    let end = bytecode.len() - 2;
    let start = end.checked_sub(length)?;
    let metadata = decode(&bytecode[start..end])?;

    Some((&bytecode[..start], metadata))
}

/// Decodes the CBOR map in `blob`.
fn decode(blob: &[u8]) -> Option<Metadata> {
    let mut reader = Reader { blob, position: 0 };
    let entries = match reader.byte()? {
        header @ 0xa0..=0xb7 => header - 0xa0,
        _ => return None,
    };

    let mut metadata = Metadata::default();
    let mut recognised = false;
    for _ in 0..entries {
        let key = reader.text()?;
        let value = reader.value()?;
        match (key.as_str(), value) {
            ("ipfs", Value::Bytes(hash)) => {
                metadata.protocol = Some(Protocol::Ipfs);
                metadata.hash = Some(hex::encode(hash));
                recognised = true;
            }
            ("bzzr0" | "bzzr1", Value::Bytes(hash)) => {
                let protocol = if key == "bzzr0" {
                    Protocol::Bzzr0
                } else {
                    Protocol::Bzzr1
                };
                metadata.protocol = Some(protocol);
                metadata.hash = Some(hex::encode(hash));
                recognised = true;
            }
            ("solc", Value::Bytes([major, minor, patch])) => {
                metadata.compiler_version = Some(format!("{major}.{minor}.{patch}"));
                recognised = true;
            }
            ("solc", Value::Text(version)) => {
                metadata.compiler_version = Some(version);
                recognised = true;
            }
            _ => {}
        }
    }

    (recognised && reader.position == blob.len()).then_some(metadata)
}

/// A CBOR value of one of the kinds found in compiler metadata.
enum Value<'a> {
    Bytes(&'a [u8]),
    Text(String),
    Bool,
}

struct Reader<'a> {
    blob:     &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    fn byte(&mut self) -> Option<u8> {
        let byte = *self.blob.get(self.position)?;
        self.position += 1;
        Some(byte)
    }

    fn take(&mut self, count: usize) -> Option<&'a [u8]> {
        let end = self.position.checked_add(count)?;
        let slice = self.blob.get(self.position..end)?;
        self.position = end;
        Some(slice)
    }

    /// Reads the length that follows a header whose low five bits are
    /// `info`.
    fn length(&mut self, info: u8) -> Option<usize> {
        match info {
            0..=23 => Some(usize::from(info)),
            24 => self.byte().map(usize::from),
            25 => {
                let bytes = self.take(2)?;
                Some(usize::from(u16::from_be_bytes([bytes[0], bytes[1]])))
            }
            _ => None,
        }
    }

    fn text(&mut self) -> Option<String> {
        match self.value()? {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    fn value(&mut self) -> Option<Value<'a>> {
        let header = self.byte()?;
        let (major, info) = (header >> 5, header & 0x1f);
        match major {
            2 => {
                let length = self.length(info)?;
                self.take(length).map(Value::Bytes)
            }
            3 => {
                let length = self.length(info)?;
                let bytes = self.take(length)?;
                String::from_utf8(bytes.to_vec()).ok().map(Value::Text)
            }
            7 if info == 20 || info == 21 => Some(Value::Bool),
            _ => None,
        }
    }
}
