//! This module contains the state tracking functionality for the decompiler.

use std::fmt::Debug;

use crate::{
    decompiler::result::Decompilation,
    disassembly::InstructionStream,
    metadata::Metadata,
    vm,
    vm::ExplorationResult,
    watchdog::DynWatchdog,
};

/// A marker trait that says that the type implementing it is a decompiler
/// state.
///
/// States can be transitioned between as part of the
/// [`crate::decompiler::Decompiler`] state machine, and are intended to enforce
/// that correct state transitions take place.
pub trait State
where
    Self: Debug + Sized,
{
}

/// The initial state for the decompiler.
#[derive(Debug)]
pub struct HasContract {
    /// The configuration for the explorer.
    pub config: vm::Config,

    /// The watchdog that is monitoring the progress of the decompiler.
    pub watchdog: DynWatchdog,
}
impl State for HasContract {}

/// The state for a decompiler that has stripped the metadata from and
/// disassembled the bytecode.
#[derive(Debug)]
pub struct DisassemblyComplete {
    /// The disassembled executable code of the contract.
    pub instructions: InstructionStream,

    /// The compiler metadata that was found at the end of the bytecode.
    pub metadata: Option<Metadata>,

    /// The configuration for the explorer.
    pub config: vm::Config,

    /// The watchdog that is monitoring the progress of the decompiler.
    pub watchdog: DynWatchdog,
}
impl State for DisassemblyComplete {}

/// The decompiler has explored every reachable path of the contract.
#[derive(Debug)]
pub struct ExplorationComplete {
    /// The graph and tables built by exploration.
    pub result: ExplorationResult,

    /// The compiler metadata that was found at the end of the bytecode.
    pub metadata: Option<Metadata>,
}
impl State for ExplorationComplete {}

/// The decompiler has attached names to the explored functions, variables and
/// events, and the result is ready to be rendered.
#[derive(Debug)]
pub struct NamingComplete {
    pub decompilation: Decompilation,
}
impl State for NamingComplete {}
