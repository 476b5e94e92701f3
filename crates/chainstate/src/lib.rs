//! UTXO ledger, undo records, header index and the chain manager on top of them.

pub mod config;
pub mod index;
pub mod ledger;
pub mod state;
pub mod undo;
pub mod utxo;
pub mod validation;

pub use config::ChainConfig;
pub use index::{ChainTip, HeaderEntry};
pub use state::{ChainState, ChainStateError};
pub use undo::BlockUndo;
pub use validation::{ErrorKind, ValidationError};
