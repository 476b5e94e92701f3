//! Proof-of-work: hash-to-work conversion, cumulative chain work, nonce search.

pub mod miner;
pub mod work;

pub use miner::{find_nonce, find_nonce_in_range, PowError};
pub use primitive_types::U256;
pub use work::{block_work, chain_work, work_from_bytes, work_to_bytes};
