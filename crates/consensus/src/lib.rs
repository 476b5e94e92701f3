//! Consensus constants, network parameters, and shared hash type.

pub mod constants;
pub mod params;

pub use params::{chain_params, hash256_from_hex, hash256_to_hex, ChainParams, HexError, Network};

/// 32-byte digest used for transaction ids, block ids, and merkle roots.
pub type Hash256 = [u8; 32];

/// Predecessor id of the first block in a chain.
pub const GENESIS_PREV_HASH: Hash256 = [0u8; 32];
