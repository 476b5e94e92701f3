//! Column-oriented key-value contract shared by the ledger, plus its backends.
//!
//! A backend only has to answer point reads, ordered prefix visits and atomic
//! batches; single-key writes and collected scans are layered on top.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

pub mod memory;
pub mod staged;

#[cfg(feature = "fjall")]
pub mod fjall;

pub use memory::MemoryStore;
pub use staged::StagedStore;

#[derive(Debug)]
pub enum StoreError {
    Backend(String),
    LockPoisoned(&'static str),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Backend(message) => write!(f, "{message}"),
            StoreError::LockPoisoned(what) => write!(f, "{what} lock poisoned"),
        }
    }
}

impl std::error::Error for StoreError {}

#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Column {
    /// Block id -> header entry (prev id, height, cumulative work).
    HeaderIndex = 0,
    /// Big-endian height -> block id of the active chain.
    HeightIndex = 1,
    /// Outpoint key -> encoded `TxOut`.
    Utxo = 2,
    /// Block id -> encoded block body.
    BlockData = 3,
    /// Block id -> encoded undo record.
    BlockUndo = 4,
    Meta = 5,
}

impl Column {
    pub const ALL: [Column; 6] = [
        Column::HeaderIndex,
        Column::HeightIndex,
        Column::Utxo,
        Column::BlockData,
        Column::BlockUndo,
        Column::Meta,
    ];

    pub const COUNT: usize = Column::ALL.len();

    pub const fn index(self) -> usize {
        self as usize
    }

    /// Partition name on disk; renaming one orphans existing data.
    pub fn as_str(self) -> &'static str {
        match self {
            Column::HeaderIndex => "header_index",
            Column::HeightIndex => "height_index",
            Column::Utxo => "utxo",
            Column::BlockData => "block_data",
            Column::BlockUndo => "block_undo",
            Column::Meta => "meta",
        }
    }
}

macro_rules! inline_bytes {
    ($name:ident, $inline:literal) => {
        /// Byte string kept inline up to the size of the common keys and values.
        #[derive(Clone, Debug, Eq, PartialEq)]
        pub struct $name(SmallVec<[u8; $inline]>);

        impl $name {
            pub fn as_slice(&self) -> &[u8] {
                self.0.as_slice()
            }

            pub fn to_vec(&self) -> Vec<u8> {
                self.0.to_vec()
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                self.as_slice()
            }
        }

        impl From<Vec<u8>> for $name {
            fn from(value: Vec<u8>) -> Self {
                Self(SmallVec::from_vec(value))
            }
        }

        impl From<&[u8]> for $name {
            fn from(value: &[u8]) -> Self {
                Self(SmallVec::from_slice(value))
            }
        }

        impl<const N: usize> From<[u8; N]> for $name {
            fn from(value: [u8; N]) -> Self {
                Self(SmallVec::from_slice(&value))
            }
        }

        impl<const N: usize> From<&[u8; N]> for $name {
            fn from(value: &[u8; N]) -> Self {
                Self(SmallVec::from_slice(value))
            }
        }
    };
}

// Outpoint keys are 34 bytes, block ids and hashes 32.
inline_bytes!(WriteKey, 40);
inline_bytes!(WriteValue, 32);

#[derive(Clone, Debug)]
pub struct WriteOp {
    pub column: Column,
    pub key: WriteKey,
    /// `None` deletes the key.
    pub value: Option<WriteValue>,
}

/// Ordered list of puts and deletes applied as one unit; later ops on the same
/// key win.
#[derive(Clone, Debug, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ops: Vec::with_capacity(capacity),
        }
    }

    pub fn put(&mut self, column: Column, key: impl Into<WriteKey>, value: impl Into<WriteValue>) {
        self.ops.push(WriteOp {
            column,
            key: key.into(),
            value: Some(value.into()),
        });
    }

    pub fn delete(&mut self, column: Column, key: impl Into<WriteKey>) {
        self.ops.push(WriteOp {
            column,
            key: key.into(),
            value: None,
        });
    }

    pub fn extend(&mut self, other: WriteBatch) {
        self.ops.extend(other.ops);
    }

    pub fn iter(&self) -> impl Iterator<Item = &WriteOp> {
        self.ops.iter()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

pub type ScanResult = Vec<(Vec<u8>, Vec<u8>)>;
pub type PrefixVisitor<'a> = dyn FnMut(&[u8], &[u8]) -> Result<(), StoreError> + 'a;

pub trait KeyValueStore: Send + Sync {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Calls `visitor` for every key in `column` starting with `prefix`, in key
    /// order. An error from the visitor stops the walk and is returned.
    fn for_each_prefix(
        &self,
        column: Column,
        prefix: &[u8],
        visitor: &mut PrefixVisitor<'_>,
    ) -> Result<(), StoreError>;

    /// Applies every op of `batch` or none of them.
    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StoreError>;

    fn contains(&self, column: Column, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.get(column, key)?.is_some())
    }

    fn scan_prefix(&self, column: Column, prefix: &[u8]) -> Result<ScanResult, StoreError> {
        let mut out = Vec::new();
        self.for_each_prefix(column, prefix, &mut |key: &[u8], value: &[u8]| {
            out.push((key.to_vec(), value.to_vec()));
            Ok(())
        })?;
        Ok(out)
    }

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let mut batch = WriteBatch::with_capacity(1);
        batch.put(column, key, value);
        self.write_batch(&batch)
    }

    fn delete(&self, column: Column, key: &[u8]) -> Result<(), StoreError> {
        let mut batch = WriteBatch::with_capacity(1);
        batch.delete(column, key);
        self.write_batch(&batch)
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(column, key)
    }

    fn for_each_prefix(
        &self,
        column: Column,
        prefix: &[u8],
        visitor: &mut PrefixVisitor<'_>,
    ) -> Result<(), StoreError> {
        (**self).for_each_prefix(column, prefix, visitor)
    }

    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        (**self).write_batch(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_keeps_op_order() {
        let mut batch = WriteBatch::new();
        batch.put(Column::Utxo, [1u8; 34], vec![9u8; 3]);
        batch.delete(Column::Utxo, &[1u8; 34]);
        let mut tail = WriteBatch::new();
        tail.put(Column::Meta, b"tip".as_slice(), [2u8; 32]);
        batch.extend(tail);

        let ops: Vec<_> = batch.iter().collect();
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0].value.as_ref().map(WriteValue::to_vec), Some(vec![9u8; 3]));
        assert!(ops[1].value.is_none());
        assert_eq!(ops[2].column, Column::Meta);
        assert_eq!(ops[2].key.as_slice(), b"tip");
    }

    #[test]
    fn long_keys_spill_to_heap() {
        let key = WriteKey::from(vec![7u8; 100]);
        assert_eq!(key.as_slice().len(), 100);
        assert_eq!(key.to_vec(), vec![7u8; 100]);
    }
}
