//! UTXO ledger: consensus validation and reversible block application.
//!
//! Reads go through the ledger's store; every mutation is accumulated in one
//! `WriteBatch` and only handed to the store after the whole block validated.

use std::collections::HashSet;
use std::sync::Arc;

use powledger_consensus::Hash256;
use powledger_primitives::block::Block;
use powledger_primitives::outpoint::OutPoint;
use powledger_primitives::script::Script;
use powledger_primitives::transaction::{Transaction, TxOut};
use powledger_script::{signature_hash, verify_spend, SignatureChecker};
use powledger_storage::{KeyValueStore, WriteBatch};
use rayon::prelude::*;

use crate::state::ChainStateError;
use crate::undo::BlockUndo;
use crate::utxo::{OutPointKey, UtxoSet};
use crate::validation::{check_block, check_transaction, check_undo, ValidationError};

/// Blocks spending at least this many inputs verify their scripts on the rayon pool.
pub const PARALLEL_SCRIPT_THRESHOLD: usize = 16;

struct ScriptCheck<'a> {
    txid: Hash256,
    sighash: Hash256,
    input: usize,
    locking: &'a Script,
    unlocking: &'a Script,
}

impl ScriptCheck<'_> {
    fn run(&self, checker: &dyn SignatureChecker) -> Result<(), ValidationError> {
        verify_spend(self.locking, self.unlocking, &self.sighash, checker).map_err(|error| {
            ValidationError::ScriptFailed {
                txid: self.txid,
                input: self.input,
                error,
            }
        })
    }
}

/// A transaction's spent outputs, resolved against the current UTXO set.
struct ResolvedInputs {
    txid: Hash256,
    spent: Vec<TxOut>,
    input_value: u128,
}

pub struct Ledger<S> {
    utxos: UtxoSet<S>,
    subsidy: u64,
    checker: Arc<dyn SignatureChecker>,
}

impl<S: KeyValueStore> Ledger<S> {
    pub fn new(store: S, subsidy: u64, checker: Arc<dyn SignatureChecker>) -> Self {
        Self {
            utxos: UtxoSet::new(store),
            subsidy,
            checker,
        }
    }

    pub fn utxos(&self) -> &UtxoSet<S> {
        &self.utxos
    }

    /// Full check of a non-coinbase transaction against the current set.
    pub fn validate_transaction(&self, tx: &Transaction) -> Result<(), ChainStateError> {
        let resolved = self.resolve_inputs(tx)?;
        let sighash = signature_hash(tx).map_err(ValidationError::from)?;
        for check in script_checks(tx, &resolved, sighash) {
            check.run(self.checker.as_ref())?;
        }
        Ok(())
    }

    /// A coinbase may not recreate an output that is still unspent.
    pub fn validate_coinbase(&self, tx: &Transaction) -> Result<(), ChainStateError> {
        let txid = tx.txid().map_err(ValidationError::from)?;
        for index in 0..tx.outputs.len() {
            let outpoint = OutPoint::new(txid, output_index(index)?);
            if self.utxos.contains_key(&OutPointKey::new(&outpoint))? {
                return Err(ValidationError::DuplicateCoinbase(outpoint).into());
            }
        }
        Ok(())
    }

    pub fn validate_block(&self, block: &Block) -> Result<(), ChainStateError> {
        self.validate_block_inner(block).map(|_| ())
    }

    /// Validates `block`, then applies it as one batch and returns the undo record.
    pub fn add_block(&self, block: &Block) -> Result<BlockUndo, ChainStateError> {
        let (block_id, txids, resolved) = self.validate_block_inner(block)?;

        let mut undo = BlockUndo::new(block_id);
        let mut batch = WriteBatch::new();
        for (tx, txid) in block.transactions.iter().zip(&txids) {
            for (index, output) in tx.outputs.iter().enumerate() {
                let key = OutPointKey::new(&OutPoint::new(*txid, output_index(index)?));
                self.utxos
                    .put(&mut batch, &key, output)
                    .map_err(ValidationError::from)?;
                undo.created.push(key);
            }
        }
        for (tx, inputs) in block.transactions.iter().skip(1).zip(resolved) {
            for (input, previous) in tx.inputs.iter().zip(inputs.spent) {
                let key = OutPointKey::new(&input.prevout);
                self.utxos.delete(&mut batch, &key);
                undo.restored.push((key, previous));
            }
        }
        self.utxos.store().write_batch(&batch)?;
        Ok(undo)
    }

    /// Exact inverse of the `add_block` that produced `undo`.
    pub fn reverse_block(&self, undo: &BlockUndo) -> Result<(), ChainStateError> {
        check_undo(undo)?;
        let mut batch = WriteBatch::new();
        for key in &undo.created {
            if !self.utxos.contains_key(key)? {
                return Err(ValidationError::MissingCreatedOutput(key.to_outpoint()).into());
            }
            self.utxos.delete(&mut batch, key);
        }
        for (key, output) in &undo.restored {
            self.utxos
                .put(&mut batch, key, output)
                .map_err(ValidationError::from)?;
        }
        self.utxos.store().write_batch(&batch)?;
        Ok(())
    }

    fn validate_block_inner(
        &self,
        block: &Block,
    ) -> Result<(Hash256, Vec<Hash256>, Vec<ResolvedInputs>), ChainStateError> {
        let block_id = block.hash().map_err(ValidationError::from)?;
        let txids = check_block(block)?;
        let coinbase = &block.transactions[0];
        self.validate_coinbase(coinbase)?;

        let spends = &block.transactions[1..];
        let mut resolved = Vec::with_capacity(spends.len());
        let mut failure = None;
        for tx in spends {
            match self.resolve_inputs(tx) {
                Ok(inputs) => resolved.push(inputs),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }
        // Scripts of the transactions before a failing one still run first, so
        // the reported error is the one a one-by-one pass would hit.
        let mut checks = Vec::new();
        for (tx, inputs) in spends.iter().zip(&resolved) {
            let sighash = signature_hash(tx).map_err(ValidationError::from)?;
            checks.extend(script_checks(tx, inputs, sighash));
        }
        self.run_script_checks(&checks)?;
        if let Some(err) = failure {
            return Err(err);
        }

        let mut spent = HashSet::new();
        for input in spends.iter().flat_map(|tx| tx.inputs.iter()) {
            if !spent.insert(&input.prevout) {
                return Err(ValidationError::DoubleSpend(input.prevout.clone()).into());
            }
        }

        let mut total_in: u128 = 0;
        let mut total_out: u128 = 0;
        for (tx, inputs) in spends.iter().zip(&resolved) {
            total_in = total_in
                .checked_add(inputs.input_value)
                .ok_or(ValidationError::ValueOverflow)?;
            total_out = total_out
                .checked_add(tx.output_value())
                .ok_or(ValidationError::ValueOverflow)?;
        }

        // subsidy + inputs - outputs - coinbase outputs must not go negative
        let coinbase_out = coinbase.output_value();
        let budget = i128::from(self.subsidy) + to_i128(total_in)? - to_i128(total_out)?;
        if budget - to_i128(coinbase_out)? < 0 {
            return Err(ValidationError::FeeExceeded {
                claimed: coinbase_out,
                allowed: u128::try_from(budget.max(0)).unwrap_or(0),
            }
            .into());
        }
        Ok((block_id, txids, resolved))
    }

    fn resolve_inputs(&self, tx: &Transaction) -> Result<ResolvedInputs, ChainStateError> {
        check_transaction(tx)?;
        if tx.is_coinbase() {
            return Err(ValidationError::InvalidTransaction("coinbase spends nothing").into());
        }
        let txid = tx.txid().map_err(ValidationError::from)?;
        let mut spent = Vec::with_capacity(tx.inputs.len());
        let mut input_value: u128 = 0;
        for input in &tx.inputs {
            let output = self
                .utxos
                .get(&input.prevout)?
                .ok_or_else(|| ValidationError::MissingInput(input.prevout.clone()))?;
            input_value += u128::from(output.value);
            spent.push(output);
        }
        let output_value = tx.output_value();
        if output_value > input_value {
            return Err(ValidationError::Overspend {
                inputs: input_value,
                outputs: output_value,
            }
            .into());
        }
        Ok(ResolvedInputs {
            txid,
            spent,
            input_value,
        })
    }

    fn run_script_checks(&self, checks: &[ScriptCheck<'_>]) -> Result<(), ChainStateError> {
        let checker = self.checker.as_ref();
        if checks.len() < PARALLEL_SCRIPT_THRESHOLD {
            for check in checks {
                check.run(checker)?;
            }
            return Ok(());
        }
        // Collect in order so the reported failure matches the sequential path.
        let results: Vec<Result<(), ValidationError>> =
            checks.par_iter().map(|check| check.run(checker)).collect();
        for result in results {
            result?;
        }
        Ok(())
    }
}

fn script_checks<'a>(
    tx: &'a Transaction,
    resolved: &'a ResolvedInputs,
    sighash: Hash256,
) -> impl Iterator<Item = ScriptCheck<'a>> {
    tx.inputs
        .iter()
        .zip(&resolved.spent)
        .enumerate()
        .map(move |(input, (txin, previous))| ScriptCheck {
            txid: resolved.txid,
            sighash,
            input,
            locking: &previous.locking_script,
            unlocking: &txin.unlocking_script,
        })
}

fn output_index(index: usize) -> Result<u16, ValidationError> {
    u16::try_from(index).map_err(|_| ValidationError::InvalidTransaction("too many outputs"))
}

fn to_i128(value: u128) -> Result<i128, ValidationError> {
    i128::try_from(value).map_err(|_| ValidationError::ValueOverflow)
}
