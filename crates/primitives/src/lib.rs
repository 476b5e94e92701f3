//! Core block/transaction types and consensus serialization.

pub mod block;
pub mod encoding;
pub mod hash;
pub mod outpoint;
pub mod script;
pub mod transaction;

pub use block::{Block, BlockHeader};
pub use encoding::{decode, encode, DecodeError, EncodeError};
pub use hash::{merkle_root, sha256, sha256d};
pub use outpoint::OutPoint;
pub use script::{Expression, Script};
pub use transaction::{Transaction, TxIn, TxOut};
