//! This module contains the [`Opcode`] type, covering each of the EVM's
//! [opcodes](https://ethereum.org/en/developers/docs/evm/opcodes/), and their
//! symbolic semantics.
//!
//! The semantics are grouped by family in the submodules. Each family function
//! pops its operands from a [`MachineState`], builds the corresponding
//! expression, normalises it with [`eval`] and pushes or records the result.
//! `JUMP` and `JUMPI` have no entry here, as only the [`crate::vm::VM`] can
//! create the branches they lead to.

pub mod arithmetic;
pub mod control;
pub mod environment;
pub mod logic;
pub mod macros;
pub mod memory;
pub mod storage;
pub mod system;

use crate::{
    constant::{
        DUP_OPCODE_BASE_VALUE,
        LOG_OPCODE_BASE_VALUE,
        LOG_OPCODE_MAX_TOPICS,
        PUSH_OPCODE_BASE_VALUE,
        PUSH_OPCODE_MAX_BYTES,
        STACK_OPERATION_MAX_ITEMS,
        SWAP_OPCODE_BASE_VALUE,
    },
    error::{disassembly, execution},
    inference::StorageTables,
    vm::{
        state::MachineState,
        value::{eval::eval, known::KnownWord, Expr, SharedExpr},
    },
};

/// Defines the [`Opcode`] enum from a table of the opcodes that carry no
/// immediate data, together with the lookups that are generated from that
/// table.
macro_rules! define_opcodes {
    ($($(#[$meta:meta])* $name:ident = $byte:literal, $text:literal, $args:literal;)*) => {
        /// A single EVM instruction.
        ///
        /// The `PUSH`, `DUP`, `SWAP` and `LOG` families are represented by one
        /// variant each, and bytes that are not assigned an opcode disassemble
        /// to [`Opcode::Invalid`].
        #[derive(Clone, Debug, Eq, Hash, PartialEq)]
        pub enum Opcode {
            $($(#[$meta])* $name,)*

            /// `PUSH1` through `PUSH32`.
            Push(PushN),

            /// `DUP1` through `DUP16`, holding the `n` in `DUPn`.
            Dup(u8),

            /// `SWAP1` through `SWAP16`, holding the `n` in `SWAPn`.
            Swap(u8),

            /// `LOG0` through `LOG4`, holding the topic count.
            Log(u8),

            /// The designated `INVALID` opcode (`0xfe`) or any unassigned byte.
            Invalid(u8),
        }

        impl Opcode {
            /// Gets the opcode without immediate data that `byte` encodes.
            #[must_use]
            pub fn from_simple_byte(byte: u8) -> Option<Self> {
                match byte {
                    $($byte => Some(Self::$name),)*
                    _ => None,
                }
            }

            /// Gets the byte representation of the opcode.
            #[must_use]
            pub fn as_byte(&self) -> u8 {
                match self {
                    $(Self::$name => $byte,)*
                    Self::Push(push) => PUSH_OPCODE_BASE_VALUE + push.size(),
                    Self::Dup(n) => DUP_OPCODE_BASE_VALUE + n,
                    Self::Swap(n) => SWAP_OPCODE_BASE_VALUE + n,
                    Self::Log(n) => LOG_OPCODE_BASE_VALUE + n,
                    Self::Invalid(byte) => *byte,
                }
            }

            /// Gets a textual representation of the opcode to aid in
            /// debugging.
            #[must_use]
            pub fn as_text_code(&self) -> String {
                match self {
                    $(Self::$name => $text.into(),)*
                    Self::Push(push) => format!("PUSH{}", push.size()),
                    Self::Dup(n) => format!("DUP{n}"),
                    Self::Swap(n) => format!("SWAP{n}"),
                    Self::Log(n) => format!("LOG{n}"),
                    Self::Invalid(byte) => format!("INVALID({byte:#04x})"),
                }
            }

            /// Gets the number of arguments that the opcode pops from the
            /// stack.
            #[must_use]
            pub fn arg_count(&self) -> usize {
                match self {
                    $(Self::$name => $args,)*
                    Self::Push(_) | Self::Invalid(_) => 0,
                    Self::Dup(n) => *n as usize,
                    Self::Swap(n) => *n as usize + 1,
                    Self::Log(n) => *n as usize + 2,
                }
            }
        }
    };
}

define_opcodes! {
    Stop = 0x00, "STOP", 0;
    Add = 0x01, "ADD", 2;
    Mul = 0x02, "MUL", 2;
    Sub = 0x03, "SUB", 2;
    Div = 0x04, "DIV", 2;
    SDiv = 0x05, "SDIV", 2;
    Mod = 0x06, "MOD", 2;
    SMod = 0x07, "SMOD", 2;
    AddMod = 0x08, "ADDMOD", 3;
    MulMod = 0x09, "MULMOD", 3;
    Exp = 0x0a, "EXP", 2;
    SignExtend = 0x0b, "SIGNEXTEND", 2;
    Lt = 0x10, "LT", 2;
    Gt = 0x11, "GT", 2;
    SLt = 0x12, "SLT", 2;
    SGt = 0x13, "SGT", 2;
    Eq = 0x14, "EQ", 2;
    IsZero = 0x15, "ISZERO", 1;
    And = 0x16, "AND", 2;
    Or = 0x17, "OR", 2;
    Xor = 0x18, "XOR", 2;
    Not = 0x19, "NOT", 1;
    Byte = 0x1a, "BYTE", 2;
    Shl = 0x1b, "SHL", 2;
    Shr = 0x1c, "SHR", 2;
    Sar = 0x1d, "SAR", 2;
    Sha3 = 0x20, "SHA3", 2;
    Address = 0x30, "ADDRESS", 0;
    Balance = 0x31, "BALANCE", 1;
    Origin = 0x32, "ORIGIN", 0;
    Caller = 0x33, "CALLER", 0;
    CallValue = 0x34, "CALLVALUE", 0;
    CallDataLoad = 0x35, "CALLDATALOAD", 1;
    CallDataSize = 0x36, "CALLDATASIZE", 0;
    CallDataCopy = 0x37, "CALLDATACOPY", 3;
    CodeSize = 0x38, "CODESIZE", 0;
    CodeCopy = 0x39, "CODECOPY", 3;
    GasPrice = 0x3a, "GASPRICE", 0;
    ExtCodeSize = 0x3b, "EXTCODESIZE", 1;
    ExtCodeCopy = 0x3c, "EXTCODECOPY", 4;
    ReturnDataSize = 0x3d, "RETURNDATASIZE", 0;
    ReturnDataCopy = 0x3e, "RETURNDATACOPY", 3;
    ExtCodeHash = 0x3f, "EXTCODEHASH", 1;
    BlockHash = 0x40, "BLOCKHASH", 1;
    Coinbase = 0x41, "COINBASE", 0;
    Timestamp = 0x42, "TIMESTAMP", 0;
    Number = 0x43, "NUMBER", 0;
    PrevRandao = 0x44, "PREVRANDAO", 0;
    GasLimit = 0x45, "GASLIMIT", 0;
    ChainId = 0x46, "CHAINID", 0;
    SelfBalance = 0x47, "SELFBALANCE", 0;
    BaseFee = 0x48, "BASEFEE", 0;
    BlobHash = 0x49, "BLOBHASH", 1;
    BlobBaseFee = 0x4a, "BLOBBASEFEE", 0;
    Pop = 0x50, "POP", 1;
    MLoad = 0x51, "MLOAD", 1;
    MStore = 0x52, "MSTORE", 2;
    MStore8 = 0x53, "MSTORE8", 2;
    SLoad = 0x54, "SLOAD", 1;
    SStore = 0x55, "SSTORE", 2;
    Jump = 0x56, "JUMP", 1;
    JumpI = 0x57, "JUMPI", 2;
    Pc = 0x58, "PC", 0;
    MSize = 0x59, "MSIZE", 0;
    Gas = 0x5a, "GAS", 0;
    JumpDest = 0x5b, "JUMPDEST", 0;
    TLoad = 0x5c, "TLOAD", 1;
    TStore = 0x5d, "TSTORE", 2;
    MCopy = 0x5e, "MCOPY", 3;
    Push0 = 0x5f, "PUSH0", 0;
    Create = 0xf0, "CREATE", 3;
    Call = 0xf1, "CALL", 7;
    CallCode = 0xf2, "CALLCODE", 7;
    Return = 0xf3, "RETURN", 2;
    DelegateCall = 0xf4, "DELEGATECALL", 6;
    Create2 = 0xf5, "CREATE2", 4;
    StaticCall = 0xfa, "STATICCALL", 6;
    Revert = 0xfd, "REVERT", 2;
    SelfDestruct = 0xff, "SELFDESTRUCT", 1;
}

impl Opcode {
    /// Constructs `DUPn`.
    ///
    /// # Errors
    ///
    /// If `n` is not in `1..=16`.
    pub fn dup(n: u8) -> Result<Self, disassembly::Error> {
        if n == 0 || n > STACK_OPERATION_MAX_ITEMS {
            return Err(disassembly::Error::StackPositionOutOfRange {
                family:   "DUP",
                position: n,
            });
        }
        Ok(Self::Dup(n))
    }

    /// Constructs `SWAPn`.
    ///
    /// # Errors
    ///
    /// If `n` is not in `1..=16`.
    pub fn swap(n: u8) -> Result<Self, disassembly::Error> {
        if n == 0 || n > STACK_OPERATION_MAX_ITEMS {
            return Err(disassembly::Error::StackPositionOutOfRange {
                family:   "SWAP",
                position: n,
            });
        }
        Ok(Self::Swap(n))
    }

    /// Constructs `LOGn`.
    ///
    /// # Errors
    ///
    /// If `n` exceeds the maximum topic count of four.
    pub fn log(n: u8) -> Result<Self, disassembly::Error> {
        if n > LOG_OPCODE_MAX_TOPICS {
            return Err(disassembly::Error::TooManyLogTopics(n));
        }
        Ok(Self::Log(n))
    }

    /// Encodes the opcode, including any immediate data, into bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = vec![self.as_byte()];
        if let Self::Push(push) = self {
            bytes.extend(push.bytes());
        }
        bytes
    }

    /// Checks whether the opcode ends execution of the current path.
    #[must_use]
    pub fn is_halting(&self) -> bool {
        matches!(
            self,
            Self::Stop | Self::Return | Self::Revert | Self::SelfDestruct | Self::Invalid(_)
        )
    }

    /// Executes the opcode symbolically at byte `offset`, modifying `state`
    /// and consulting and updating the contract's `storage` tables.
    ///
    /// Halting opcodes halt the `state` with the matching terminator.
    ///
    /// # Errors
    ///
    /// If the state of the stack does not allow execution of the opcode, or if
    /// the opcode is one of the jumps, which only the explorer can execute.
    pub fn execute(
        &self,
        offset: u32,
        state: &mut MachineState,
        storage: &mut StorageTables,
    ) -> Result<(), execution::Error> {
        match self {
            Self::Add
            | Self::Mul
            | Self::Sub
            | Self::Div
            | Self::SDiv
            | Self::Mod
            | Self::SMod
            | Self::AddMod
            | Self::MulMod
            | Self::Exp
            | Self::SignExtend => arithmetic::execute(self, state),
            Self::Lt
            | Self::Gt
            | Self::SLt
            | Self::SGt
            | Self::Eq
            | Self::IsZero
            | Self::And
            | Self::Or
            | Self::Xor
            | Self::Not
            | Self::Byte
            | Self::Shl
            | Self::Shr
            | Self::Sar => logic::execute(self, state),
            Self::Address
            | Self::Balance
            | Self::Origin
            | Self::Caller
            | Self::CallValue
            | Self::CallDataLoad
            | Self::CallDataSize
            | Self::CodeSize
            | Self::GasPrice
            | Self::ExtCodeSize
            | Self::ReturnDataSize
            | Self::ExtCodeHash
            | Self::BlockHash
            | Self::Coinbase
            | Self::Timestamp
            | Self::Number
            | Self::PrevRandao
            | Self::GasLimit
            | Self::ChainId
            | Self::SelfBalance
            | Self::BaseFee
            | Self::BlobHash
            | Self::BlobBaseFee
            | Self::Pc
            | Self::MSize
            | Self::Gas => environment::execute(self, offset, state),
            Self::Sha3
            | Self::Pop
            | Self::MLoad
            | Self::MStore
            | Self::MStore8
            | Self::MCopy
            | Self::CallDataCopy
            | Self::CodeCopy
            | Self::ExtCodeCopy
            | Self::ReturnDataCopy
            | Self::Push0
            | Self::Push(_)
            | Self::Dup(_)
            | Self::Swap(_) => memory::execute(self, state, storage),
            Self::SLoad | Self::SStore | Self::TLoad | Self::TStore => {
                storage::execute(self, state, storage)
            }
            Self::Log(_)
            | Self::Create
            | Self::Create2
            | Self::Call
            | Self::CallCode
            | Self::DelegateCall
            | Self::StaticCall => system::execute(self, state),
            Self::Stop
            | Self::Return
            | Self::Revert
            | Self::SelfDestruct
            | Self::Invalid(_)
            | Self::JumpDest => control::execute(self, state),
            Self::Jump | Self::JumpI => Err(execution::Error::NotSteppable {
                opcode: self.as_text_code(),
            }),
        }
    }
}

impl From<PushN> for Opcode {
    fn from(value: PushN) -> Self {
        Self::Push(value)
    }
}

/// The immediate data of a `PUSHn` opcode.
///
/// A push at the very end of the code may be truncated, in which case it holds
/// fewer than `n` bytes and the missing low-order bytes read as zero.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct PushN {
    size:  u8,
    bytes: Vec<u8>,
}

impl PushN {
    /// Constructs `PUSH{size}` with the provided immediate `bytes`.
    ///
    /// # Errors
    ///
    /// If `size` is not in `1..=32` or more than `size` bytes are provided.
    pub fn new(size: u8, bytes: Vec<u8>) -> Result<Self, disassembly::Error> {
        if size == 0 || size > PUSH_OPCODE_MAX_BYTES {
            return Err(disassembly::Error::PushWidthOutOfRange(size));
        }
        if bytes.len() > size as usize {
            return Err(disassembly::Error::PushImmediateTooLong {
                width: size,
                given: bytes.len(),
            });
        }
        Ok(Self { size, bytes })
    }

    /// Gets the `n` in `PUSHn`.
    #[must_use]
    pub fn size(&self) -> u8 {
        self.size
    }

    /// Gets the immediate bytes as they appear in the code.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Gets the value that the opcode pushes.
    #[must_use]
    pub fn value(&self) -> KnownWord {
        let mut padded = self.bytes.clone();
        padded.resize(self.size as usize, 0);
        KnownWord::from_be_slice(&padded)
    }
}

/// Pushes the normalised form of `expr` onto the stack of `state`.
pub(crate) fn push_eval(state: &mut MachineState, expr: Expr) -> Result<(), execution::Error> {
    let shared: SharedExpr = std::rc::Rc::new(expr);
    state.push(eval(&shared))
}

#[cfg(test)]
mod test {
    use crate::{
        error::disassembly,
        opcode::{Opcode, PushN},
        vm::value::known::KnownWord,
    };

    #[test]
    fn encodes_and_decodes_simple_opcodes() {
        for byte in 0..=u8::MAX {
            if let Some(opcode) = Opcode::from_simple_byte(byte) {
                assert_eq!(opcode.as_byte(), byte);
            }
        }
        assert_eq!(Opcode::from_simple_byte(0x0c), None);
        assert_eq!(Opcode::Dup(16).as_byte(), 0x8f);
        assert_eq!(Opcode::Swap(1).as_byte(), 0x90);
        assert_eq!(Opcode::Log(4).as_byte(), 0xa4);
    }

    #[test]
    fn validates_family_operands() {
        assert!(Opcode::dup(0).is_err());
        assert!(Opcode::swap(17).is_err());
        assert_eq!(
            Opcode::log(5),
            Err(disassembly::Error::TooManyLogTopics(5))
        );
        assert_eq!(Opcode::dup(2), Ok(Opcode::Dup(2)));
        assert_eq!(
            PushN::new(33, vec![]),
            Err(disassembly::Error::PushWidthOutOfRange(33))
        );
        assert_eq!(
            PushN::new(1, vec![0x01, 0x02]),
            Err(disassembly::Error::PushImmediateTooLong { width: 1, given: 2 })
        );
    }

    #[test]
    fn pushes_encode_their_immediates() -> anyhow::Result<()> {
        let push = PushN::new(2, vec![0x01, 0x02])?;
        assert_eq!(Opcode::from(push.clone()).encode(), vec![0x61, 0x01, 0x02]);
        assert_eq!(push.value(), KnownWord::from(0x0102usize));
        assert_eq!(Opcode::from(push).as_text_code(), "PUSH2");

        Ok(())
    }

    #[test]
    fn truncated_pushes_are_right_padded() -> anyhow::Result<()> {
        let push = PushN::new(2, vec![0x01])?;
        assert_eq!(push.value(), KnownWord::from(0x0100usize));
        assert!(PushN::new(1, vec![0x01, 0x02]).is_err());
        assert!(PushN::new(33, vec![]).is_err());

        Ok(())
    }
}
