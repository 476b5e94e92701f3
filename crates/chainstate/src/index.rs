//! Header index of the active chain.
//!
//! Rows are keyed by block id; a height column maps positions back to ids and a
//! meta key names the tip. Only blocks on the active chain are indexed, so the
//! rows always form one list linked through `prev_hash` back to the genesis
//! sentinel.

use powledger_consensus::Hash256;
use powledger_primitives::encoding::{Decoder, Encoder};
use powledger_storage::{Column, KeyValueStore, StoreError, WriteBatch};
use primitive_types::U256;

const META_BEST_BLOCK_KEY: &[u8] = b"best_block";
const HEADER_ENTRY_LEN: usize = 32 + 4 + 32;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HeaderEntry {
    pub prev_hash: Hash256,
    /// Position in the chain; the first block sits at 0.
    pub height: u32,
    /// Cumulative work up to and including this block, big-endian.
    pub chainwork: [u8; 32],
}

impl HeaderEntry {
    pub fn chainwork_value(&self) -> U256 {
        U256::from_big_endian(&self.chainwork)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChainTip {
    pub hash: Hash256,
    pub height: u32,
    pub chainwork: [u8; 32],
}

impl ChainTip {
    pub fn chainwork_value(&self) -> U256 {
        U256::from_big_endian(&self.chainwork)
    }
}

pub struct ChainIndex<S> {
    store: S,
}

impl<S: KeyValueStore> ChainIndex<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn get_header(&self, hash: &Hash256) -> Result<Option<HeaderEntry>, StoreError> {
        let bytes = match self.store.get(Column::HeaderIndex, hash)? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        decode_header_entry(&bytes)
            .map(Some)
            .map_err(StoreError::Backend)
    }

    pub fn contains(&self, hash: &Hash256) -> Result<bool, StoreError> {
        Ok(self.store.get(Column::HeaderIndex, hash)?.is_some())
    }

    pub fn put_header(&self, batch: &mut WriteBatch, hash: &Hash256, entry: &HeaderEntry) {
        batch.put(Column::HeaderIndex, hash, encode_header_entry(entry));
        batch.put(Column::HeightIndex, height_key(entry.height), *hash);
    }

    pub fn delete_header(&self, batch: &mut WriteBatch, hash: &Hash256, entry: &HeaderEntry) {
        batch.delete(Column::HeaderIndex, hash);
        batch.delete(Column::HeightIndex, height_key(entry.height));
    }

    pub fn set_best_block(&self, batch: &mut WriteBatch, hash: &Hash256) {
        batch.put(Column::Meta, META_BEST_BLOCK_KEY, *hash);
    }

    pub fn clear_best_block(&self, batch: &mut WriteBatch) {
        batch.delete(Column::Meta, META_BEST_BLOCK_KEY);
    }

    pub fn best_block(&self) -> Result<Option<ChainTip>, StoreError> {
        let hash = match self.store.get(Column::Meta, META_BEST_BLOCK_KEY)? {
            Some(bytes) => decode_hash(&bytes).map_err(StoreError::Backend)?,
            None => return Ok(None),
        };
        let entry = self
            .get_header(&hash)?
            .ok_or_else(|| StoreError::Backend("best block missing from header index".to_string()))?;
        Ok(Some(ChainTip {
            hash,
            height: entry.height,
            chainwork: entry.chainwork,
        }))
    }

    pub fn height_hash(&self, height: u32) -> Result<Option<Hash256>, StoreError> {
        let bytes = match self.store.get(Column::HeightIndex, &height_key(height))? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        decode_hash(&bytes).map(Some).map_err(StoreError::Backend)
    }

    /// Up to `count` entries ending at the tip, oldest first.
    pub fn recent_headers(&self, count: usize) -> Result<Vec<(Hash256, HeaderEntry)>, StoreError> {
        let Some(tip) = self.best_block()? else {
            return Ok(Vec::new());
        };
        let available = u64::from(tip.height) + 1;
        let take = available.min(count as u64) as u32;
        let mut out = Vec::with_capacity(take as usize);
        for height in (tip.height + 1 - take)..=tip.height {
            let hash = self
                .height_hash(height)?
                .ok_or_else(|| StoreError::Backend(format!("height {height} missing from index")))?;
            let entry = self
                .get_header(&hash)?
                .ok_or_else(|| StoreError::Backend(format!("header row missing at height {height}")))?;
            out.push((hash, entry));
        }
        Ok(out)
    }
}

pub fn height_key(height: u32) -> [u8; 4] {
    height.to_be_bytes()
}

fn encode_header_entry(entry: &HeaderEntry) -> Vec<u8> {
    let mut encoder = Encoder::new();
    encoder.write_hash(&entry.prev_hash);
    encoder.write_bytes(&entry.height.to_be_bytes());
    encoder.write_bytes(&entry.chainwork);
    encoder.into_inner()
}

pub(crate) fn decode_header_entry(bytes: &[u8]) -> Result<HeaderEntry, String> {
    if bytes.len() != HEADER_ENTRY_LEN {
        return Err("invalid header entry length".to_string());
    }
    let mut decoder = Decoder::new(bytes);
    let prev_hash = decoder.read_hash().map_err(|err| err.to_string())?;
    let height = u32::from_be_bytes(decoder.read_fixed::<4>().map_err(|err| err.to_string())?);
    let chainwork = decoder.read_fixed::<32>().map_err(|err| err.to_string())?;
    Ok(HeaderEntry {
        prev_hash,
        height,
        chainwork,
    })
}

fn decode_hash(bytes: &[u8]) -> Result<Hash256, String> {
    if bytes.len() != 32 {
        return Err("invalid hash length".to_string());
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(bytes);
    Ok(hash)
}
