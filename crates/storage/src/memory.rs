//! Ordered in-memory backend for tests and throwaway chains.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{Column, KeyValueStore, PrefixVisitor, StoreError, WriteBatch};

type Table = BTreeMap<Vec<u8>, Vec<u8>>;

/// One ordered table per column behind a single lock, so a batch spanning
/// columns is applied atomically.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<[Table; Column::COUNT]>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of keys across all columns.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.iter().map(Table::len).sum())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.read()?.iter().all(Table::is_empty))
    }

    pub fn column_len(&self, column: Column) -> Result<usize, StoreError> {
        Ok(self.read()?[column.index()].len())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, [Table; Column::COUNT]>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::LockPoisoned("memory store"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, [Table; Column::COUNT]>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::LockPoisoned("memory store"))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.read()?[column.index()].get(key).cloned())
    }

    fn for_each_prefix(
        &self,
        column: Column,
        prefix: &[u8],
        visitor: &mut PrefixVisitor<'_>,
    ) -> Result<(), StoreError> {
        let tables = self.read()?;
        let range = tables[column.index()].range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded));
        for (key, value) in range {
            if !key.starts_with(prefix) {
                break;
            }
            visitor(key, value)?;
        }
        Ok(())
    }

    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        for op in batch.iter() {
            let table = &mut tables[op.column.index()];
            match &op.value {
                Some(value) => {
                    table.insert(op.key.to_vec(), value.to_vec());
                }
                None => {
                    table.remove(op.key.as_slice());
                }
            }
        }
        Ok(())
    }
}
