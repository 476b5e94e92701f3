//! Register-script execution, signature hashing, and standard templates.

pub mod interpreter;
mod secp;
pub mod sighash;
pub mod standard;

pub use interpreter::{execute, verify_spend, Memory, Opcode, ScriptError, SIGHASH_SLOT};
pub use secp::{SchnorrChecker, SignatureChecker};
pub use sighash::signature_hash;
