//! Error taxonomy and context-free (structural) checks.

use std::collections::HashSet;

use powledger_consensus::constants::MAX_NONCE;
use powledger_consensus::{hash256_to_hex, Hash256};
use powledger_primitives::block::Block;
use powledger_primitives::encoding::{DecodeError, EncodeError};
use powledger_primitives::outpoint::OutPoint;
use powledger_primitives::transaction::Transaction;
use powledger_script::ScriptError;
use primitive_types::U256;

use crate::undo::BlockUndo;

/// Coarse classification callers branch on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    MalformedEncoding,
    StructuralInvalid,
    ConsensusViolation,
    UnknownReference,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Decode(DecodeError),
    Encode(EncodeError),
    InvalidBlock(&'static str),
    InvalidTransaction(&'static str),
    InvalidUndo(&'static str),
    DuplicateInput,
    MerkleMismatch,
    MissingInput(OutPoint),
    ScriptFailed {
        txid: Hash256,
        input: usize,
        error: ScriptError,
    },
    ValueOverflow,
    Overspend {
        inputs: u128,
        outputs: u128,
    },
    DuplicateCoinbase(OutPoint),
    DoubleSpend(OutPoint),
    FeeExceeded {
        claimed: u128,
        allowed: u128,
    },
    BadLinkage {
        expected: Hash256,
        found: Hash256,
    },
    NotTip {
        tip: Option<Hash256>,
        block: Hash256,
    },
    MissingCreatedOutput(OutPoint),
    /// A batch forks from a block that is neither indexed nor the genesis sentinel.
    UnknownParent(Hash256),
    /// The replacement branch never gathered more work than the branch it unwound.
    InsufficientWork {
        candidate: U256,
        abandoned: U256,
    },
}

impl ValidationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ValidationError::Decode(_) | ValidationError::Encode(_) => ErrorKind::MalformedEncoding,
            ValidationError::InvalidBlock(_)
            | ValidationError::InvalidTransaction(_)
            | ValidationError::InvalidUndo(_)
            | ValidationError::DuplicateInput
            | ValidationError::MerkleMismatch => ErrorKind::StructuralInvalid,
            ValidationError::ValueOverflow
            | ValidationError::Overspend { .. }
            | ValidationError::DuplicateCoinbase(_)
            | ValidationError::DoubleSpend(_)
            | ValidationError::FeeExceeded { .. }
            | ValidationError::BadLinkage { .. }
            | ValidationError::InsufficientWork { .. } => ErrorKind::ConsensusViolation,
            ValidationError::MissingInput(_)
            | ValidationError::ScriptFailed { .. }
            | ValidationError::NotTip { .. }
            | ValidationError::MissingCreatedOutput(_)
            | ValidationError::UnknownParent(_) => ErrorKind::UnknownReference,
        }
    }
}

fn outpoint_display(outpoint: &OutPoint) -> String {
    format!("{}:{}", hash256_to_hex(&outpoint.hash), outpoint.index)
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Decode(err) => write!(f, "{err}"),
            ValidationError::Encode(err) => write!(f, "{err}"),
            ValidationError::InvalidBlock(message) => write!(f, "{message}"),
            ValidationError::InvalidTransaction(message) => write!(f, "{message}"),
            ValidationError::InvalidUndo(message) => write!(f, "{message}"),
            ValidationError::DuplicateInput => write!(f, "duplicate input"),
            ValidationError::MerkleMismatch => write!(f, "merkle root mismatch"),
            ValidationError::MissingInput(outpoint) => {
                write!(f, "missing input {}", outpoint_display(outpoint))
            }
            ValidationError::ScriptFailed { txid, input, error } => write!(
                f,
                "script validation failed for tx {} input {input}: {error}",
                hash256_to_hex(txid)
            ),
            ValidationError::ValueOverflow => write!(f, "value sum overflows"),
            ValidationError::Overspend { inputs, outputs } => {
                write!(f, "outputs {outputs} exceed inputs {inputs}")
            }
            ValidationError::DuplicateCoinbase(outpoint) => write!(
                f,
                "coinbase output {} already unspent",
                outpoint_display(outpoint)
            ),
            ValidationError::DoubleSpend(outpoint) => {
                write!(f, "output {} spent twice in block", outpoint_display(outpoint))
            }
            ValidationError::FeeExceeded { claimed, allowed } => {
                write!(f, "coinbase claims {claimed}, at most {allowed} allowed")
            }
            ValidationError::BadLinkage { expected, found } => write!(
                f,
                "block builds on {}, tip is {}",
                hash256_to_hex(found),
                hash256_to_hex(expected)
            ),
            ValidationError::NotTip { tip, block } => match tip {
                Some(tip) => write!(
                    f,
                    "block {} is not the tip {}",
                    hash256_to_hex(block),
                    hash256_to_hex(tip)
                ),
                None => write!(f, "block {} is not the tip of an empty chain", hash256_to_hex(block)),
            },
            ValidationError::MissingCreatedOutput(outpoint) => write!(
                f,
                "undo references absent output {}",
                outpoint_display(outpoint)
            ),
            ValidationError::UnknownParent(hash) => {
                write!(f, "batch forks from unknown block {}", hash256_to_hex(hash))
            }
            ValidationError::InsufficientWork {
                candidate,
                abandoned,
            } => write!(
                f,
                "candidate branch work {candidate} does not exceed abandoned work {abandoned}"
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<DecodeError> for ValidationError {
    fn from(err: DecodeError) -> Self {
        ValidationError::Decode(err)
    }
}

impl From<EncodeError> for ValidationError {
    fn from(err: EncodeError) -> Self {
        ValidationError::Encode(err)
    }
}

/// Checks a transaction in isolation: at least one input, no duplicate input
/// outpoints, every script within size, and coinbase inputs only in a coinbase
/// transaction.
pub fn check_transaction(tx: &Transaction) -> Result<(), ValidationError> {
    // An input-free transaction has a txid fixed by its outputs alone, so two
    // copies would create the same outpoints.
    if tx.inputs.is_empty() {
        return Err(ValidationError::InvalidTransaction("transaction has no inputs"));
    }
    let coinbase = tx.is_coinbase();
    let mut seen = HashSet::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        if input.is_coinbase() && !coinbase {
            return Err(ValidationError::InvalidTransaction(
                "coinbase input in non-coinbase transaction",
            ));
        }
        if !seen.insert(&input.prevout) {
            return Err(ValidationError::DuplicateInput);
        }
        if !input.unlocking_script.is_valid() {
            return Err(ValidationError::InvalidTransaction("unlocking script too large"));
        }
    }
    for output in &tx.outputs {
        if !output.locking_script.is_valid() {
            return Err(ValidationError::InvalidTransaction("locking script too large"));
        }
    }
    Ok(())
}

/// Checks a block in isolation and returns its transaction ids.
pub fn check_block(block: &Block) -> Result<Vec<Hash256>, ValidationError> {
    let Some((first, rest)) = block.transactions.split_first() else {
        return Err(ValidationError::InvalidBlock(
            "block must contain at least one transaction",
        ));
    };
    if block.header.nonce > MAX_NONCE {
        return Err(ValidationError::InvalidBlock("nonce exceeds 96 bits"));
    }
    let txids = block.txids()?;
    if block.compute_merkle_root()? != block.header.merkle_root {
        return Err(ValidationError::MerkleMismatch);
    }
    if !first.is_coinbase() {
        return Err(ValidationError::InvalidBlock("first transaction is not coinbase"));
    }
    check_transaction(first)?;
    for tx in rest {
        if tx.is_coinbase() {
            return Err(ValidationError::InvalidBlock("more than one coinbase"));
        }
        check_transaction(tx)?;
    }
    Ok(txids)
}

/// Checks an undo record in isolation: restored outputs must be well formed and
/// never keyed by the coinbase sentinel.
pub fn check_undo(undo: &BlockUndo) -> Result<(), ValidationError> {
    let mut seen = HashSet::with_capacity(undo.restored.len());
    for (key, output) in &undo.restored {
        if key.is_coinbase() {
            return Err(ValidationError::InvalidUndo(
                "restored output keyed by the coinbase sentinel",
            ));
        }
        if !output.locking_script.is_valid() {
            return Err(ValidationError::InvalidUndo("restored locking script too large"));
        }
        if !seen.insert(*key) {
            return Err(ValidationError::InvalidUndo("output restored twice"));
        }
    }
    let mut created = HashSet::with_capacity(undo.created.len());
    for key in &undo.created {
        if !created.insert(*key) {
            return Err(ValidationError::InvalidUndo("output created twice"));
        }
    }
    Ok(())
}
