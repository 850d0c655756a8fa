//! This module contains common utilities for simplifying the writing of
//! integration tests for this library.

#![cfg(test)]

use anyhow::anyhow;
use evm_decompiler as decompiler;
use evm_decompiler::{
    bytecode,
    contract::Contract,
    opcode::{Opcode, PushN},
    signatures::{Selector, SignatureDatabase},
    vm,
    watchdog::{DynWatchdog, LazyWatchdog},
    Decompilation,
};

/// The byte offset at which [`single_function`] places the function body.
#[allow(unused)] // It is actually
pub const BODY_OFFSET: u8 = 0x14;

/// Builds a contract with a dispatcher that jumps to `body` when called with
/// `selector`, and reverts otherwise.
///
/// The body starts with a `JUMPDEST` at [`BODY_OFFSET`], so any jumps within it
/// must count from there.
#[allow(unused)] // It is actually
pub fn single_function(selector: Selector, body: Vec<u8>) -> anyhow::Result<Vec<u8>> {
    let mut code = bytecode![
        PushN::new(1, vec![0x00])?,
        Opcode::CallDataLoad,
        PushN::new(1, vec![0xe0])?,
        Opcode::Shr,
        Opcode::Dup(1),
        PushN::new(4, selector.bytes().to_vec())?,
        Opcode::Eq,
        PushN::new(1, vec![BODY_OFFSET])?,
        Opcode::JumpI,
        PushN::new(1, vec![0x00])?,
        Opcode::Dup(1),
        Opcode::Revert,
        Opcode::JumpDest,
    ];
    code.extend(body);

    Ok(code)
}

/// Decompiles `code` with the default configuration, naming things from
/// `signatures`.
#[allow(unused)] // It is actually
pub fn decompile(
    code: Vec<u8>,
    signatures: &dyn SignatureDatabase,
) -> anyhow::Result<Decompilation> {
    decompile_with(code, vm::Config::default(), LazyWatchdog.in_rc(), signatures)
}

/// Decompiles `code` with the provided `config` under `watchdog`.
#[allow(unused)] // It is actually
pub fn decompile_with(
    code: Vec<u8>,
    config: vm::Config,
    watchdog: DynWatchdog,
    signatures: &dyn SignatureDatabase,
) -> anyhow::Result<Decompilation> {
    decompiler::new(Contract::new(code), config, watchdog)
        .decompile(signatures)
        .map_err(|errors| anyhow!("Decompilation failed: {errors}"))
}
