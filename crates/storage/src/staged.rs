//! Write overlay with explicit commit and rollback.
//!
//! Every write lands in a pending map; reads see pending entries first and fall
//! through to the base store. `commit` pushes the whole overlay to the base as a
//! single `WriteBatch`, `rollback` drops it. The base is never touched before
//! `commit`, so a multi-block operation that fails halfway leaves no trace.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::{Column, KeyValueStore, PrefixVisitor, StoreError, WriteBatch, WriteValue};

/// `None` marks a staged delete.
type PendingMap = BTreeMap<(Column, Vec<u8>), Option<Vec<u8>>>;

pub struct StagedStore<S> {
    base: S,
    pending: Mutex<PendingMap>,
}

impl<S: KeyValueStore> StagedStore<S> {
    pub fn new(base: S) -> Self {
        Self {
            base,
            pending: Mutex::new(PendingMap::new()),
        }
    }

    /// Committed state only; staged writes are invisible here.
    pub fn base(&self) -> &S {
        &self.base
    }

    pub fn pending_len(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.len())
    }

    pub fn has_pending(&self) -> Result<bool, StoreError> {
        Ok(!self.lock()?.is_empty())
    }

    /// Writes all staged operations to the base in one batch and returns how many
    /// were written. On a backend error the overlay is kept so the caller can
    /// decide to retry or roll back.
    pub fn commit(&self) -> Result<usize, StoreError> {
        let mut pending = self.lock()?;
        if pending.is_empty() {
            return Ok(0);
        }
        let mut batch = WriteBatch::with_capacity(pending.len());
        for ((column, key), value) in pending.iter() {
            match value {
                Some(value) => batch.put(*column, key.as_slice(), value.as_slice()),
                None => batch.delete(*column, key.as_slice()),
            }
        }
        self.base.write_batch(&batch)?;
        let written = pending.len();
        pending.clear();
        Ok(written)
    }

    /// Discards every staged operation.
    pub fn rollback(&self) -> Result<usize, StoreError> {
        let mut pending = self.lock()?;
        let dropped = pending.len();
        pending.clear();
        Ok(dropped)
    }

    fn lock(&self) -> Result<MutexGuard<'_, PendingMap>, StoreError> {
        self.pending
            .lock()
            .map_err(|_| StoreError::LockPoisoned("staged store"))
    }
}

impl<S: KeyValueStore> KeyValueStore for StagedStore<S> {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        match self.lock()?.get(&(column, key.to_vec())) {
            Some(staged) => Ok(staged.clone()),
            None => self.base.get(column, key),
        }
    }

    fn for_each_prefix(
        &self,
        column: Column,
        prefix: &[u8],
        visitor: &mut PrefixVisitor<'_>,
    ) -> Result<(), StoreError> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.base.scan_prefix(column, prefix)?.into_iter().collect();
        {
            let pending = self.lock()?;
            let staged = pending
                .range((column, prefix.to_vec())..)
                .take_while(|((entry_column, key), _)| {
                    *entry_column == column && key.starts_with(prefix)
                });
            for ((_, key), value) in staged {
                match value {
                    Some(value) => merged.insert(key.clone(), value.clone()),
                    None => merged.remove(key),
                };
            }
        }
        // The pending lock is released so the visitor may read through this store.
        for (key, value) in &merged {
            visitor(key, value)?;
        }
        Ok(())
    }

    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        let mut pending = self.lock()?;
        for op in batch.iter() {
            pending.insert(
                (op.column, op.key.to_vec()),
                op.value.as_ref().map(WriteValue::to_vec),
            );
        }
        Ok(())
    }
}
