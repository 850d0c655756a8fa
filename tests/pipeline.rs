//! This module is an integration test that checks the decompiler's handling
//! of its inputs, from the raw bytecode to the watchdog.
#![cfg(test)]

use std::time::Duration;

use evm_decompiler::{
    bytecode,
    contract::Contract,
    error::{execution, Error},
    metadata::Protocol,
    opcode::{Opcode, PushN},
    signatures::{NoSignatures, Selector, SignatureDatabase, StaticSignatures},
    vm,
    watchdog::DeadlineWatchdog,
};

mod common;

/// Encodes solc-style metadata pointing at an IPFS `hash`.
fn metadata(hash: &[u8]) -> Vec<u8> {
    let mut blob = vec![0xa2, 0x64];
    blob.extend(b"ipfs");
    blob.extend([0x58, u8::try_from(hash.len()).unwrap()]);
    blob.extend(hash);
    blob.push(0x64);
    blob.extend(b"solc");
    blob.extend([0x43, 0x00, 0x08, 0x13]);
    let length = u16::try_from(blob.len()).unwrap();
    blob.extend(length.to_be_bytes());
    blob
}

#[test]
fn strips_metadata_before_disassembly() -> anyhow::Result<()> {
    let mut code = bytecode![
        Opcode::CallValue,
        PushN::new(1, vec![0x00])?,
        Opcode::SStore,
        Opcode::Stop,
    ];
    code.extend(metadata(&[0x12, 0x20, 0xaa, 0xbb]));
    let decompiler = evm_decompiler::new(
        Contract::new(code),
        vm::Config::default(),
        evm_decompiler::watchdog::LazyWatchdog.in_rc(),
    )
    .disassemble()?;

    assert_eq!(decompiler.state().instructions.len(), 4);
    let decompilation = decompiler.explore()?.name(&NoSignatures).into_decompilation();
    let metadata = decompilation.metadata().expect("Metadata was not found");
    assert_eq!(metadata.protocol, Some(Protocol::Ipfs));
    assert_eq!(metadata.compiler_version.as_deref(), Some("0.8.19"));

    let source = decompilation.render();
    assert!(source.starts_with("// Compiled with solc 0.8.19\n// Metadata: ipfs://1220aabb\n"));
    assert!(source.contains("fallback() external payable {"));
    assert!(source.contains("var1 = msg.value;"));

    Ok(())
}

#[test]
fn expired_deadline_aborts() -> anyhow::Result<()> {
    let code = bytecode![Opcode::CallValue, Opcode::Pop, Opcode::Stop];
    let errors = evm_decompiler::new(
        Contract::new(code),
        vm::Config::default(),
        DeadlineWatchdog::new(Duration::ZERO).in_rc(),
    )
    .decompile(&NoSignatures)
    .expect_err("Decompilation was not aborted");

    assert!(errors.payloads().iter().any(|e| matches!(
        e.payload,
        Error::Execution(execution::Error::ExplorationAborted { .. })
    )));

    Ok(())
}

#[test]
fn step_budget_is_reported() -> anyhow::Result<()> {
    let code = bytecode![Opcode::CallValue, Opcode::Pop, Opcode::Stop];
    let result = common::decompile_with(
        code,
        vm::Config::default().with_maximum_steps(1),
        evm_decompiler::watchdog::LazyWatchdog.in_rc(),
        &NoSignatures,
    );

    assert!(result.is_err());

    Ok(())
}

#[test]
fn loads_signatures_from_json() -> anyhow::Result<()> {
    let signatures = StaticSignatures::from_json(
        r#"{"functions": ["x()"], "events": ["Transfer(address,address,uint256)"]}"#,
    )?;
    assert_eq!(signatures.function(Selector::from_signature("x()")), Some("x()"));
    assert!(StaticSignatures::from_json(r#""x()""#).is_err());

    Ok(())
}
