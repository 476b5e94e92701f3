//! Signature hash.

use powledger_consensus::Hash256;
use powledger_primitives::encoding::EncodeError;
use powledger_primitives::script::Script;
use powledger_primitives::transaction::Transaction;

/// Txid of `tx` with every unlocking script cleared.
///
/// One hash covers every input, so a signature commits to all outputs and all
/// spent outpoints but not to any other signer's unlocking data.
pub fn signature_hash(tx: &Transaction) -> Result<Hash256, EncodeError> {
    let mut stripped = tx.clone();
    for input in &mut stripped.inputs {
        input.unlocking_script = Script::default();
    }
    stripped.txid()
}
