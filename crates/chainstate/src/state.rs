//! Chain manager: block connection, disconnection and reorg-aware batch ingest.
//!
//! The ledger and the header index share one staged overlay, so the UTXO changes
//! and the index changes of a block reach the base store in the same commit.
//! Queries read the base store and never observe a half-applied block.

use std::sync::{Arc, Mutex, MutexGuard};

use powledger_consensus::{hash256_to_hex, ChainParams, Hash256};
use powledger_log::{log_debug, log_info, log_warn};
use powledger_pow::{block_work, work_to_bytes, U256};
use powledger_primitives::block::Block;
use powledger_primitives::encoding::{DecodeError, EncodeError};
use powledger_primitives::outpoint::OutPoint;
use powledger_primitives::transaction::{Transaction, TxOut};
use powledger_script::{SchnorrChecker, SignatureChecker};
use powledger_storage::{Column, KeyValueStore, StagedStore, StoreError, WriteBatch};

use crate::index::{ChainIndex, ChainTip, HeaderEntry};
use crate::ledger::Ledger;
use crate::undo::BlockUndo;
use crate::utxo::UtxoSet;
use crate::validation::{ErrorKind, ValidationError};

#[derive(Debug)]
pub enum ChainStateError {
    Validation(ValidationError),
    Store(StoreError),
    CorruptIndex(&'static str),
    EmptyChain,
    Io(std::io::Error),
}

impl ChainStateError {
    /// Classification of consensus failures; storage and I/O faults have none.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ChainStateError::Validation(err) => Some(err.kind()),
            ChainStateError::EmptyChain => Some(ErrorKind::UnknownReference),
            ChainStateError::Store(_) | ChainStateError::CorruptIndex(_) | ChainStateError::Io(_) => {
                None
            }
        }
    }
}

impl std::fmt::Display for ChainStateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainStateError::Validation(err) => write!(f, "{err}"),
            ChainStateError::Store(err) => write!(f, "{err}"),
            ChainStateError::CorruptIndex(message) => write!(f, "{message}"),
            ChainStateError::EmptyChain => write!(f, "chain has no blocks"),
            ChainStateError::Io(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ChainStateError {}

impl From<ValidationError> for ChainStateError {
    fn from(err: ValidationError) -> Self {
        ChainStateError::Validation(err)
    }
}

impl From<StoreError> for ChainStateError {
    fn from(err: StoreError) -> Self {
        ChainStateError::Store(err)
    }
}

impl From<EncodeError> for ChainStateError {
    fn from(err: EncodeError) -> Self {
        ChainStateError::Validation(ValidationError::from(err))
    }
}

impl From<DecodeError> for ChainStateError {
    fn from(err: DecodeError) -> Self {
        ChainStateError::Validation(ValidationError::from(err))
    }
}

impl From<std::io::Error> for ChainStateError {
    fn from(err: std::io::Error) -> Self {
        ChainStateError::Io(err)
    }
}

type Staged<S> = Arc<StagedStore<Arc<S>>>;

pub struct ChainState<S> {
    staged: Staged<S>,
    ledger: Ledger<Staged<S>>,
    index: ChainIndex<Staged<S>>,
    committed_utxos: UtxoSet<Arc<S>>,
    committed_index: ChainIndex<Arc<S>>,
    params: ChainParams,
    write_lock: Mutex<()>,
}

impl<S: KeyValueStore> ChainState<S> {
    pub fn new(store: Arc<S>, params: ChainParams) -> Self {
        Self::with_checker(store, params, Arc::new(SchnorrChecker))
    }

    pub fn with_checker(
        store: Arc<S>,
        params: ChainParams,
        checker: Arc<dyn SignatureChecker>,
    ) -> Self {
        let staged = Arc::new(StagedStore::new(Arc::clone(&store)));
        Self {
            ledger: Ledger::new(Arc::clone(&staged), params.subsidy, checker),
            index: ChainIndex::new(Arc::clone(&staged)),
            committed_utxos: UtxoSet::new(Arc::clone(&store)),
            committed_index: ChainIndex::new(store),
            staged,
            params,
            write_lock: Mutex::new(()),
        }
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    /// Connects `block` on top of the tip and returns the new tip.
    pub fn apply_block(&self, block: &Block) -> Result<ChainTip, ChainStateError> {
        let _guard = self.lock()?;
        let tip = self.atomically(|state| state.stage_apply(block))?;
        log_debug!(
            "connected block {} at height {}",
            hash256_to_hex(&tip.hash),
            tip.height
        );
        Ok(tip)
    }

    /// Disconnects the tip using a caller-supplied undo record, which must match the
    /// record stored when the tip was connected.
    pub fn unapply_block(&self, undo: &BlockUndo) -> Result<(), ChainStateError> {
        let _guard = self.lock()?;
        let entry = self.atomically(|state| {
            let tip = state.index.best_block()?.map(|tip| tip.hash);
            if tip == Some(undo.block_id) && state.staged_undo(&undo.block_id)? != *undo {
                return Err(ValidationError::InvalidUndo(
                    "undo record differs from the one stored for the tip",
                )
                .into());
            }
            state.stage_unapply(undo)
        })?;
        log_debug!(
            "disconnected block {} from height {}",
            hash256_to_hex(&undo.block_id),
            entry.height
        );
        Ok(())
    }

    /// Disconnects the tip using its stored undo record and returns that record.
    pub fn unapply_tip(&self) -> Result<BlockUndo, ChainStateError> {
        let _guard = self.lock()?;
        let (undo, entry) = self.atomically(|state| {
            let tip = state.index.best_block()?.ok_or(ChainStateError::EmptyChain)?;
            let undo = state.staged_undo(&tip.hash)?;
            let entry = state.stage_unapply(&undo)?;
            Ok((undo, entry))
        })?;
        log_debug!(
            "disconnected block {} from height {}",
            hash256_to_hex(&undo.block_id),
            entry.height
        );
        Ok(undo)
    }

    /// Ingests a batch of consecutive blocks, reorganizing onto them when they
    /// carry strictly more work than the blocks they replace.
    ///
    /// Returns `false` when the contested part of the batch was rejected; in that
    /// case nothing changed and the cause is logged. Blocks past the point where
    /// the batch overtook the current chain are connected one at a time, and the
    /// first one that fails ends the batch without undoing the earlier ones.
    pub fn ingest(&self, blocks: &[Block]) -> bool {
        let _guard = match self.lock() {
            Ok(guard) => guard,
            Err(err) => {
                log_warn!("ingest refused: {err}");
                return false;
            }
        };

        let next = match self.atomically(|state| state.stage_contested(blocks)) {
            Ok(Some(next)) => next,
            Ok(None) => return true,
            Err(err) => {
                log_warn!("rejected batch of {} blocks: {err}", blocks.len());
                return false;
            }
        };

        for block in &blocks[next..] {
            match self.atomically(|state| state.stage_apply(block)) {
                Ok(tip) => log_debug!(
                    "connected block {} at height {}",
                    hash256_to_hex(&tip.hash),
                    tip.height
                ),
                Err(err) => {
                    let id = block
                        .hash()
                        .map(|id| hash256_to_hex(&id))
                        .unwrap_or_else(|_| "<unencodable>".to_string());
                    log_warn!("stopped batch at block {id}: {err}");
                    break;
                }
            }
        }
        true
    }

    /// Full check of a loose transaction against the committed UTXO set.
    pub fn validate_transaction(&self, tx: &Transaction) -> Result<(), ChainStateError> {
        let _guard = self.lock()?;
        self.ledger.validate_transaction(tx)
    }

    pub fn tip(&self) -> Result<Option<ChainTip>, ChainStateError> {
        Ok(self.committed_index.best_block()?)
    }

    pub fn header_entry(&self, id: &Hash256) -> Result<Option<HeaderEntry>, ChainStateError> {
        Ok(self.committed_index.get_header(id)?)
    }

    pub fn contains_block(&self, id: &Hash256) -> Result<bool, ChainStateError> {
        Ok(self.committed_index.contains(id)?)
    }

    pub fn block_id_at(&self, height: u32) -> Result<Option<Hash256>, ChainStateError> {
        Ok(self.committed_index.height_hash(height)?)
    }

    /// Up to `count` active-chain entries ending at the tip, oldest first.
    pub fn recent_headers(
        &self,
        count: usize,
    ) -> Result<Vec<(Hash256, HeaderEntry)>, ChainStateError> {
        Ok(self.committed_index.recent_headers(count)?)
    }

    /// Stored body of any block that was ever connected.
    pub fn block(&self, id: &Hash256) -> Result<Option<Block>, ChainStateError> {
        match self.staged.base().get(Column::BlockData, id)? {
            Some(bytes) => Ok(Some(Block::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Undo record of an active-chain block.
    pub fn block_undo(&self, id: &Hash256) -> Result<Option<BlockUndo>, ChainStateError> {
        match self.staged.base().get(Column::BlockUndo, id)? {
            Some(bytes) => Ok(Some(BlockUndo::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn utxo(&self, outpoint: &OutPoint) -> Result<Option<TxOut>, ChainStateError> {
        Ok(self.committed_utxos.get(outpoint)?)
    }

    /// Snapshot of the whole committed UTXO set, ordered by outpoint key.
    pub fn utxo_entries(&self) -> Result<Vec<(OutPoint, TxOut)>, ChainStateError> {
        Ok(self.committed_utxos.entries()?)
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>, ChainStateError> {
        self.write_lock
            .lock()
            .map_err(|_| ChainStateError::Store(StoreError::LockPoisoned("chain state")))
    }

    /// Runs `op` against the overlay, then commits; any error drops the overlay.
    fn atomically<T>(
        &self,
        op: impl FnOnce(&Self) -> Result<T, ChainStateError>,
    ) -> Result<T, ChainStateError> {
        let result = op(self).and_then(|value| {
            self.staged.commit()?;
            Ok(value)
        });
        if result.is_err() {
            if let Err(err) = self.staged.rollback() {
                log_warn!("rollback failed: {err}");
            }
        }
        result
    }

    fn staged_undo(&self, id: &Hash256) -> Result<BlockUndo, ChainStateError> {
        let bytes = self
            .staged
            .get(Column::BlockUndo, id)?
            .ok_or(ChainStateError::CorruptIndex("undo record missing for indexed block"))?;
        Ok(BlockUndo::decode(&bytes)?)
    }

    fn stage_apply(&self, block: &Block) -> Result<ChainTip, ChainStateError> {
        let block_id = block.hash()?;
        let (expected, height, parent_work) = match self.index.best_block()? {
            Some(tip) => {
                let height = tip
                    .height
                    .checked_add(1)
                    .ok_or(ChainStateError::CorruptIndex("height overflow"))?;
                (tip.hash, height, tip.chainwork_value())
            }
            None => (self.params.genesis_prev, 0, U256::zero()),
        };
        if block.header.prev_block != expected {
            return Err(ValidationError::BadLinkage {
                expected,
                found: block.header.prev_block,
            }
            .into());
        }

        let undo = self.ledger.add_block(block)?;
        let entry = HeaderEntry {
            prev_hash: expected,
            height,
            chainwork: work_to_bytes(parent_work.saturating_add(block_work(&block_id))),
        };
        let mut batch = WriteBatch::new();
        self.index.put_header(&mut batch, &block_id, &entry);
        self.index.set_best_block(&mut batch, &block_id);
        batch.put(Column::BlockData, block_id, block.to_bytes()?);
        batch.put(Column::BlockUndo, block_id, undo.encode()?);
        self.staged.write_batch(&batch)?;
        Ok(ChainTip {
            hash: block_id,
            height,
            chainwork: entry.chainwork,
        })
    }

    fn stage_unapply(&self, undo: &BlockUndo) -> Result<HeaderEntry, ChainStateError> {
        let tip = self.index.best_block()?.map(|tip| tip.hash);
        if tip != Some(undo.block_id) {
            return Err(ValidationError::NotTip {
                tip,
                block: undo.block_id,
            }
            .into());
        }
        let entry = self
            .index
            .get_header(&undo.block_id)?
            .ok_or(ChainStateError::CorruptIndex("tip missing from header index"))?;

        self.ledger.reverse_block(undo)?;
        let mut batch = WriteBatch::new();
        self.index.delete_header(&mut batch, &undo.block_id, &entry);
        batch.delete(Column::BlockUndo, undo.block_id);
        if entry.height == 0 {
            self.index.clear_best_block(&mut batch);
        } else {
            self.index.set_best_block(&mut batch, &entry.prev_hash);
        }
        self.staged.write_batch(&batch)?;
        Ok(entry)
    }

    /// Stages the unwind to the batch's fork point and the replay of new blocks
    /// until they outweigh what was unwound. Returns the position of the first
    /// block left for the tail, or `None` when every block is already indexed.
    fn stage_contested(&self, blocks: &[Block]) -> Result<Option<usize>, ChainStateError> {
        let mut first_new = None;
        for (position, block) in blocks.iter().enumerate() {
            if !self.index.contains(&block.hash()?)? {
                first_new = Some(position);
                break;
            }
        }
        let Some(first_new) = first_new else {
            return Ok(None);
        };

        let fork_point = blocks[first_new].header.prev_block;
        if fork_point != self.params.genesis_prev && !self.index.contains(&fork_point)? {
            return Err(ValidationError::UnknownParent(fork_point).into());
        }

        let mut abandoned = U256::zero();
        let mut unwound = 0usize;
        while let Some(tip) = self.index.best_block()? {
            if tip.hash == fork_point {
                break;
            }
            let undo = self.staged_undo(&tip.hash)?;
            self.stage_unapply(&undo)?;
            abandoned = abandoned.saturating_add(block_work(&tip.hash));
            unwound += 1;
        }

        let mut candidate = U256::zero();
        let mut next = first_new;
        let mut new_tip = None;
        while next < blocks.len() && candidate <= abandoned {
            let tip = self.stage_apply(&blocks[next])?;
            candidate = candidate.saturating_add(block_work(&tip.hash));
            new_tip = Some(tip);
            next += 1;
        }
        // Equal work keeps the chain that was there first.
        if candidate <= abandoned {
            return Err(ValidationError::InsufficientWork {
                candidate,
                abandoned,
            }
            .into());
        }

        if let Some(tip) = new_tip.filter(|_| unwound > 0) {
            log_info!(
                "reorganized at {}: disconnected {unwound} blocks, new tip {} at height {}",
                hash256_to_hex(&fork_point),
                hash256_to_hex(&tip.hash),
                tip.height
            );
        }
        Ok(Some(next))
    }
}

#[cfg(feature = "fjall")]
impl ChainState<powledger_storage::fjall::FjallStore> {
    /// Opens (or creates) the on-disk chain described by `config`.
    pub fn open(config: &crate::config::ChainConfig) -> Result<Self, ChainStateError> {
        config.ensure_dirs()?;
        let db_dir = config.db_dir();
        let store = powledger_storage::fjall::FjallStore::open(&db_dir)?;
        log_info!(
            "opened {} chain state at {}",
            config.network.as_str(),
            db_dir.display()
        );
        Ok(Self::new(
            Arc::new(store),
            powledger_consensus::chain_params(config.network),
        ))
    }
}
