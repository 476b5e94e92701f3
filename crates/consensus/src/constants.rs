//! Consensus-wide constants shared across validation.

/// Value a coinbase may mint on top of the fees collected in its block.
pub const SUBSIDY: u64 = 10_000_000_000;
/// Exclusive upper bound on the serialized size of a script, in bytes.
pub const MAX_SCRIPT_SIZE: usize = 1 << 16;
/// Every count and length prefix on the wire is a big-endian u16.
pub const MAX_LENGTH_PREFIX: usize = u16::MAX as usize;
/// Serialized size of a block header.
pub const BLOCK_HEADER_SIZE: usize = 76;
/// Width of the header nonce on the wire.
pub const NONCE_SIZE: usize = 12;
/// Largest nonce representable in `NONCE_SIZE` bytes.
pub const MAX_NONCE: u128 = (1u128 << (NONCE_SIZE * 8)) - 1;
/// Serialized size of an outpoint (`hash || index`).
pub const OUTPOINT_SIZE: usize = 34;
