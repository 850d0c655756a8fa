//! This module contains constants that are needed throughout the codebase.

/// The maximum size that a contract can have when being deployed on the
/// blockchain.
///
/// This is specified in [EIP-170](https://eips.ethereum.org/EIPS/eip-170).
pub const CONTRACT_MAXIMUM_SIZE_BYTES: usize = 24_576;

/// The base byte value for the `PUSH` opcode, for `N > 0`.
///
/// This is constructed such that for `PUSHN`, `PUSH_OPCODE_BASE_VALUE` + `N`
/// equals the byte value for the corresponding `PUSH` opcode.
pub const PUSH_OPCODE_BASE_VALUE: u8 = 0x5f;

/// The base byte value for the `DUP` opcode.
///
/// This is constructed such that for `DUPN`, `DUP_OPCODE_BASE_VALUE` + `N`
/// equals the byte value for the corresponding `DUP` opcode.
pub const DUP_OPCODE_BASE_VALUE: u8 = 0x7f;

/// The base byte value for the `SWAP` opcode.
///
/// This is constructed such that for `SWAPN`, `SWAP_OPCODE_BASE_VALUE` + `N`
/// equals the byte value for the corresponding `SWAP` opcode.
pub const SWAP_OPCODE_BASE_VALUE: u8 = 0x8f;

/// The base byte value for the `LOG` opcode.
///
/// This is constructed such that for `LOGN`, `LOG_OPCODE_BASE_VALUE` + `N`
/// equals the byte value for the corresponding `LOG` opcode.
pub const LOG_OPCODE_BASE_VALUE: u8 = 0xa0;

/// The maximum number of bytes that can be pushed at once using the `PUSH`
/// opcode.
pub const PUSH_OPCODE_MAX_BYTES: u8 = 32;

/// The maximum number of items that `DUP` and `SWAP` can address.
pub const STACK_OPERATION_MAX_ITEMS: u8 = 16;

/// The maximum number of topics that can be attached to a `LOG`.
pub const LOG_OPCODE_MAX_TOPICS: u8 = 4;

/// The maximum stack depth for the EVM.
pub const MAXIMUM_STACK_DEPTH: usize = 1024;

/// The width of word on the EVM in bits.
pub const WORD_SIZE_BITS: usize = 256;

/// The width of a byte on the EVM (and most other places) in bits.
pub const BYTE_SIZE_BITS: usize = 8;

/// The width of a word on the EVM in bytes.
pub const WORD_SIZE_BYTES: usize = WORD_SIZE_BITS / BYTE_SIZE_BITS;

/// The bit-width of an address type.
pub const ADDRESS_WIDTH_BITS: usize = 160;

/// The bit-width of a selector type.
pub const SELECTOR_WIDTH_BITS: usize = 32;

/// The number of bits that the calldata word is shifted right by in order to
/// leave only the function selector.
pub const SELECTOR_SHIFT_BITS: usize = WORD_SIZE_BITS - SELECTOR_WIDTH_BITS;

/// The byte offset in calldata at which the ABI-encoded arguments begin.
pub const CALLDATA_ARGUMENTS_OFFSET: usize = 4;

/// The number of storage indices for which hashes will be generated (and hence
/// recognised) when looking for dynamic array accesses.
pub const SLOT_HASH_COUNT: usize = 1000;

/// The largest struct field offset past a constant mapping location that is
/// still recognised as a field of that mapping's value.
pub const MAXIMUM_CONSTANT_STRUCT_OFFSET: usize = 0xff;

/// The largest memory range, in words, that will be decoded into individual
/// symbolic words by operations like `SHA3`, `RETURN` and the copy opcodes.
///
/// Larger ranges are kept as opaque offset and size pairs.
pub const MEMORY_DECODE_MAX_WORDS: usize = 16;

/// The default maximum number of distinct stack contexts that will be explored
/// at any given program counter of a function.
pub const DEFAULT_VISITS_PER_POINT: usize = 16;

/// The default maximum number of function selectors that will be explored as
/// independent entry points.
pub const DEFAULT_MAXIMUM_SELECTORS: usize = 1024;

/// The default number of loop iterations the decompiler will wait before
/// polling the watchdog.
pub const DEFAULT_WATCHDOG_POLL_LOOP_ITERATIONS: usize = 100;

/// The default value for whether to run the explorer in permissive errors
/// mode.
///
/// Permissive errors mode stops the explorer from reporting the jump failures
/// that are already visible as `Invalid` terminators in the output. See
/// [`crate::vm::Config`] for more information.
pub const DEFAULT_PERMISSIVE_ERRORS_ENABLED: bool = false;

/// Values at or below this threshold are rendered in decimal, while larger
/// values are rendered in hexadecimal.
pub const DECIMAL_RENDER_THRESHOLD: u32 = 0xffff;
