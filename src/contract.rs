//! This module contains types useful for dealing with concrete contracts that
//! you want to decompile.

use std::{fs::File, io::Read};

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::utility::decode_hex;

/// A representation of a contract that is passed to the library.
///
/// The bytecode is the deployed (runtime) code, and may still carry the
/// compiler's metadata at its end.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Contract {
    bytecode: Vec<u8>,
}

impl Contract {
    /// Creates a new contract from the provided `bytecode`.
    #[must_use]
    pub fn new(bytecode: Vec<u8>) -> Self {
        Self { bytecode }
    }

    /// Creates a new contract from hex-encoded `code`, with or without a `0x`
    /// prefix.
    ///
    /// # Errors
    ///
    /// If `code` is not valid hex.
    pub fn from_hex(code: &str) -> anyhow::Result<Self> {
        let bytecode = decode_hex(code).map_err(|e| anyhow!("Could not decode hex: {e}"))?;
        Ok(Self { bytecode })
    }

    /// Creates a new contract from the file at the provided `path`.
    ///
    /// The file at `path` must be the JSON artifact of a compiled contract in
    /// the format that `forge` and `hardhat` write, from which the deployed
    /// bytecode is taken.
    ///
    /// # Errors
    ///
    /// If the file cannot be read, parsed or its bytecode decoded.
    pub fn new_from_file(path: impl Into<String>) -> anyhow::Result<Self> {
        let path = path.into();
        let mut file = File::open(&path).map_err(|_| anyhow!("File {path} not available"))?;
        let mut contents = vec![];
        file.read_to_end(&mut contents)
            .map_err(|_| anyhow!("File {path} could not be read"))?;

        let artifact: CompiledContract = serde_json::from_slice(contents.as_slice())
            .map_err(|_| anyhow!("Could not parse compiled contract"))?;
        Self::from_hex(&artifact.deployed_bytecode.object)
    }

    /// Gets a reference to the bytecode of the contract.
    #[must_use]
    pub fn bytecode(&self) -> &[u8] {
        &self.bytecode
    }
}

/// The parts of a compiled contract artifact that the decompiler uses.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledContract {
    deployed_bytecode: DeployedBytecode,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployedBytecode {
    object: String,
}

#[cfg(test)]
mod test {
    use crate::contract::{CompiledContract, Contract};

    #[test]
    fn reads_prefixed_hex() -> anyhow::Result<()> {
        let contract = Contract::from_hex("0x600100")?;
        assert_eq!(contract.bytecode(), &[0x60, 0x01, 0x00]);
        assert!(Contract::from_hex("0x6z").is_err());

        Ok(())
    }

    #[test]
    fn parses_artifacts() -> anyhow::Result<()> {
        let artifact: CompiledContract =
            serde_json::from_str(r#"{"deployedBytecode": {"object": "0x6000"}}"#)?;
        let contract = Contract::from_hex(&artifact.deployed_bytecode.object)?;
        assert_eq!(contract.bytecode(), &[0x60, 0x00]);

        Ok(())
    }

    #[test]
    fn loads_artifacts_from_disk() -> anyhow::Result<()> {
        let path = std::env::temp_dir().join(format!("artifact-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"deployedBytecode": {"object": "0x34600055"}}"#)?;
        let contract = Contract::new_from_file(path.to_string_lossy());
        std::fs::remove_file(&path)?;

        assert_eq!(contract?.bytecode(), &[0x34, 0x60, 0x00, 0x55]);
        assert!(Contract::new_from_file("/nonexistent/artifact.json").is_err());

        Ok(())
    }
}
