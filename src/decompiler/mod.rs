//! This module contains the definition of the decompiler itself.

pub mod naming;
pub mod result;
pub mod state;

use tracing::info;

use crate::{
    contract::Contract,
    decompiler::{result::Decompilation, state::State},
    disassembly::InstructionStream,
    error,
    metadata,
    signatures::SignatureDatabase,
    vm,
    vm::VM,
    watchdog::DynWatchdog,
};

/// Creates a new decompiler wrapping the provided `contract`, exploring it with
/// the provided `config` under the supervision of `watchdog`.
#[must_use]
pub fn new(contract: Contract, config: vm::Config, watchdog: DynWatchdog) -> InitialDecompiler {
    let state = state::HasContract { config, watchdog };
    Decompiler { contract, state }
}

/// The `Decompiler` is responsible for ingesting a contract and turning it into
/// a [`Decompilation`] that can be inspected and rendered.
///
/// # Enforcing Valid State Transitions
///
/// The decompiler enforces that only correct state transitions can occur
/// through use of structs that implement the exact state required by it at any
/// given point.
///
/// There is the [`Self::state`] function that provides access to the state data
/// of whichever state the decompiler is currently in.
#[derive(Debug)]
pub struct Decompiler<S: State> {
    /// The contract that is being decompiled.
    contract: Contract,

    /// The internal state of the decompiler.
    state: S,
}

/// The operations available in all states.
impl<S: State> Decompiler<S> {
    /// Gets a reference to the contract being decompiled.
    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    /// Gets an immutable reference to the current state of the decompiler.
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Moves the decompiler into the state `NS` created by applying
    /// `transform` to the current state.
    fn transform_state<NS: State>(
        self,
        transform: impl FnOnce(S, &Contract) -> error::Result<NS>,
    ) -> error::Result<Decompiler<NS>> {
        let state = transform(self.state, &self.contract)?;
        let contract = self.contract;

        Ok(Decompiler { contract, state })
    }
}

/// A type that allows the user to easily name the initial state of the
/// decompiler.
pub type InitialDecompiler = Decompiler<state::HasContract>;

/// Operations available on a newly-created decompiler.
impl Decompiler<state::HasContract> {
    /// Executes the decompilation process from beginning to end, performing all
    /// the intermediate steps automatically.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the bytecode cannot be disassembled, or if
    /// exploration was aborted.
    pub fn decompile(self, signatures: &dyn SignatureDatabase) -> error::Result<Decompilation> {
        let decompiler = self.disassemble()?;
        let decompiler = decompiler.explore()?;
        let decompiler = decompiler.name(signatures);

        Ok(decompiler.into_decompilation())
    }

    /// Strips the compiler metadata from the contract's code and disassembles
    /// what remains.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if disassembly fails.
    pub fn disassemble(self) -> error::Result<Decompiler<state::DisassemblyComplete>> {
        self.transform_state(|old_state, contract| {
            let (code, metadata) = metadata::strip(contract.bytecode());
            let instructions = InstructionStream::try_from(code)?;
            info!(
                instructions = instructions.len(),
                metadata = metadata.is_some(),
                "Disassembled contract"
            );

            Ok(state::DisassemblyComplete {
                instructions,
                metadata,
                config: old_state.config,
                watchdog: old_state.watchdog,
            })
        })
    }
}

/// Operations available on a decompiler that has completed the disassembly of
/// the bytecode.
impl Decompiler<state::DisassemblyComplete> {
    /// Symbolically explores every reachable path of the disassembled code.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if exploration was aborted by the watchdog or by
    /// exhausting its step budget.
    pub fn explore(self) -> error::Result<Decompiler<state::ExplorationComplete>> {
        self.transform_state(|old_state, _| {
            let vm = VM::new(old_state.instructions, old_state.config, old_state.watchdog);
            let result = vm.explore()?;
            info!(
                blocks = result.blocks.len(),
                functions = result.functions.len(),
                errors = result.errors.len(),
                "Explored contract"
            );

            Ok(state::ExplorationComplete {
                result,
                metadata: old_state.metadata,
            })
        })
    }
}

/// Operations available on a decompiler that has explored the contract.
impl Decompiler<state::ExplorationComplete> {
    /// Names the functions, storage and events found by exploration using
    /// `signatures`, folding public variable accessors into the variables
    /// they read.
    #[must_use]
    pub fn name(self, signatures: &dyn SignatureDatabase) -> Decompiler<state::NamingComplete> {
        let state::ExplorationComplete { result, metadata } = self.state;
        let decompilation = naming::name(result, metadata, signatures);
        info!(
            functions = decompilation.functions().len(),
            accessors = decompilation.accessors().len(),
            events = decompilation.events().len(),
            "Named contract"
        );

        Decompiler {
            contract: self.contract,
            state:    state::NamingComplete { decompilation },
        }
    }
}

/// Operations available on a decompiler that has completed naming.
impl Decompiler<state::NamingComplete> {
    /// Gets the decompiled contract.
    #[must_use]
    pub fn decompilation(&self) -> &Decompilation {
        &self.state.decompilation
    }

    /// Takes the decompiled contract out of the decompiler.
    #[must_use]
    pub fn into_decompilation(self) -> Decompilation {
        self.state.decompilation
    }
}
