//! This library implements a decompiler for [EVM](https://ethereum.org/en/developers/docs/evm/)
//! bytecode. It recovers the control flow, the public functions and the storage
//! layout of the contract being studied, and renders them as readable
//! pseudo-source. It is a _best effort_ analysis.
//!
//! # How it Works
//!
//! From a very high level, decompilation is performed as follows:
//!
//! 1. Any compiler metadata is stripped from the end of the bytecode, and the
//!    rest is turned into a [`disassembly::InstructionStream`]. This is a
//!    sequence of [`opcode::Opcode`]s that is equivalent to the bytecode.
//! 2. The stream of instructions is executed symbolically on a [`vm::VM`],
//!    which explores every reachable path, splitting the code into basic
//!    blocks of [`vm::inst::Inst`]s. Values are kept as
//!    [`vm::value::Expr`]essions, and are folded to constants wherever
//!    possible.
//! 3. Every access to storage is classified as it happens, building up
//!    [`inference::StorageTables`] of the variables, mappings and arrays that
//!    the contract uses.
//! 4. Functions, storage and events are named from a
//!    [`signatures::SignatureDatabase`], and functions that only read storage
//!    are folded into `public` declarations.
//! 5. The resulting [`Decompilation`] can be rendered by the [`codegen`]
//!    dialects, or its [`StorageLayout`] output on its own.
//!
//! # Basic Usage
//!
//! For the most basic usage of the library, it is sufficient to construct a
//! decompiler and call the `.decompile` method, passing your signatures.
//!
//! ```
//! use evm_decompiler as decompiler;
//! use evm_decompiler::{
//!     bytecode,
//!     contract::Contract,
//!     opcode::{Opcode, PushN},
//!     signatures::NoSignatures,
//!     vm,
//!     watchdog::LazyWatchdog,
//! };
//!
//! let bytes = bytecode![
//!     Opcode::CallValue,                  // Get a symbolic value
//!     PushN::new(1, vec![0x00]).unwrap(), // The slot to store it in
//!     Opcode::SStore,                     // Store it
//!     Opcode::Stop,                       // Halt
//! ];
//!
//! let decompilation = decompiler::new(
//!     Contract::new(bytes),
//!     vm::Config::default(),
//!     LazyWatchdog.in_rc(),
//! )
//! .decompile(&NoSignatures)
//! .unwrap();
//!
//! assert_eq!(decompilation.layout().slots().len(), 1);
//! assert!(decompilation.render().contains("var1 = msg.value;"));
//! ```

#![warn(clippy::all, clippy::cargo, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)] // Allows for better API naming

pub mod codegen;
pub mod constant;
pub mod contract;
pub mod decompiler;
pub mod disassembly;
pub mod error;
pub mod inference;
pub mod layout;
pub mod metadata;
pub mod opcode;
pub mod signatures;
pub mod utility;
pub mod vm;
pub mod watchdog;

// Re-exports to provide the library interface.
pub use decompiler::{new, result::Decompilation};
pub use layout::StorageLayout;
