//! UTXO set logic backed by the storage trait.

use powledger_consensus::constants::OUTPOINT_SIZE;
use powledger_primitives::encoding::{decode, encode, EncodeError};
use powledger_primitives::outpoint::OutPoint;
use powledger_primitives::transaction::TxOut;
use powledger_storage::{Column, KeyValueStore, StoreError, WriteBatch};

pub const OUTPOINT_KEY_LEN: usize = OUTPOINT_SIZE;

/// `hash ++ index_be`; big-endian index keeps a transaction's outputs adjacent and ordered.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct OutPointKey([u8; OUTPOINT_KEY_LEN]);

impl OutPointKey {
    pub fn new(outpoint: &OutPoint) -> Self {
        let mut bytes = [0u8; OUTPOINT_KEY_LEN];
        bytes[..32].copy_from_slice(&outpoint.hash);
        bytes[32..].copy_from_slice(&outpoint.index.to_be_bytes());
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != OUTPOINT_KEY_LEN {
            return None;
        }
        let mut out = [0u8; OUTPOINT_KEY_LEN];
        out.copy_from_slice(bytes);
        Some(Self(out))
    }

    pub fn from_bytes(bytes: [u8; OUTPOINT_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; OUTPOINT_KEY_LEN] {
        &self.0
    }

    pub fn to_outpoint(&self) -> OutPoint {
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&self.0[..32]);
        OutPoint::new(hash, u16::from_be_bytes([self.0[32], self.0[33]]))
    }

    pub fn is_coinbase(&self) -> bool {
        self.to_outpoint().is_coinbase()
    }
}

impl From<&OutPoint> for OutPointKey {
    fn from(outpoint: &OutPoint) -> Self {
        Self::new(outpoint)
    }
}

pub struct UtxoSet<S> {
    store: S,
}

impl<S> UtxoSet<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: KeyValueStore> UtxoSet<S> {
    pub fn get(&self, outpoint: &OutPoint) -> Result<Option<TxOut>, StoreError> {
        self.get_key(&OutPointKey::new(outpoint))
    }

    pub fn get_key(&self, key: &OutPointKey) -> Result<Option<TxOut>, StoreError> {
        match self.store.get(Column::Utxo, key.as_bytes())? {
            Some(bytes) => Ok(Some(
                decode::<TxOut>(&bytes).map_err(|err| StoreError::Backend(err.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    pub fn contains_key(&self, key: &OutPointKey) -> Result<bool, StoreError> {
        Ok(self.store.get(Column::Utxo, key.as_bytes())?.is_some())
    }

    pub fn put(
        &self,
        batch: &mut WriteBatch,
        key: &OutPointKey,
        output: &TxOut,
    ) -> Result<(), EncodeError> {
        batch.put(Column::Utxo, key.as_bytes(), encode(output)?);
        Ok(())
    }

    pub fn delete(&self, batch: &mut WriteBatch, key: &OutPointKey) {
        batch.delete(Column::Utxo, key.as_bytes());
    }

    /// Every unspent output, ordered by key.
    pub fn entries(&self) -> Result<Vec<(OutPoint, TxOut)>, StoreError> {
        let mut out = Vec::new();
        self.store
            .for_each_prefix(Column::Utxo, &[], &mut |key: &[u8], value: &[u8]| {
                let key = OutPointKey::from_slice(key)
                    .ok_or_else(|| StoreError::Backend("invalid utxo key length".to_string()))?;
                let output = decode::<TxOut>(value)
                    .map_err(|err| StoreError::Backend(err.to_string()))?;
                out.push((key.to_outpoint(), output));
                Ok(())
            })?;
        Ok(out)
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
