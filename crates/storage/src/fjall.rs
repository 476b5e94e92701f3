//! Persistent backend: one fjall partition per [`Column`] inside a single
//! keyspace, so a [`WriteBatch`] spanning columns commits atomically.

use std::path::Path;
use std::time::{Duration, Instant};

use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};

use crate::{Column, KeyValueStore, PrefixVisitor, StoreError, WriteBatch};

const SLOW_COMMIT: Duration = Duration::from_millis(500);

#[derive(Clone, Debug, Default)]
pub struct FjallOptions {
    /// Block cache size; fjall's default when unset.
    pub cache_bytes: Option<u64>,
    /// Sync each committed batch to disk instead of leaving it in the OS buffer.
    pub sync_commits: bool,
}

pub struct FjallStore {
    keyspace: Keyspace,
    partitions: [PartitionHandle; Column::COUNT],
    durability: PersistMode,
}

impl FjallStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_options(path, FjallOptions::default())
    }

    pub fn open_with_options(
        path: impl AsRef<Path>,
        options: FjallOptions,
    ) -> Result<Self, StoreError> {
        let mut config = Config::new(path);
        if let Some(bytes) = options.cache_bytes {
            config = config.cache_size(bytes);
        }
        let keyspace = config.open().map_err(backend)?;

        let mut handles = Vec::with_capacity(Column::COUNT);
        for column in Column::ALL {
            handles.push(
                keyspace
                    .open_partition(column.as_str(), PartitionCreateOptions::default())
                    .map_err(backend)?,
            );
        }
        let partitions = handles
            .try_into()
            .map_err(|_| StoreError::Backend("partition count mismatch".to_string()))?;

        let durability = if options.sync_commits {
            PersistMode::SyncData
        } else {
            PersistMode::Buffer
        };
        Ok(Self {
            keyspace,
            partitions,
            durability,
        })
    }

    /// Forces the journal and all partitions to disk.
    pub fn persist(&self) -> Result<(), StoreError> {
        self.keyspace.persist(PersistMode::SyncAll).map_err(backend)
    }

    fn partition(&self, column: Column) -> &PartitionHandle {
        &self.partitions[column.index()]
    }
}

impl KeyValueStore for FjallStore {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let value = self.partition(column).get(key).map_err(backend)?;
        Ok(value.map(|slice| slice.to_vec()))
    }

    fn for_each_prefix(
        &self,
        column: Column,
        prefix: &[u8],
        visitor: &mut PrefixVisitor<'_>,
    ) -> Result<(), StoreError> {
        for item in self.partition(column).prefix(prefix) {
            let (key, value) = item.map_err(backend)?;
            visitor(key.as_ref(), value.as_ref())?;
        }
        Ok(())
    }

    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut commit = self.keyspace.batch().durability(Some(self.durability));
        for op in batch.iter() {
            let partition = self.partition(op.column);
            match &op.value {
                Some(value) => commit.insert(partition, op.key.as_slice(), value.as_slice()),
                None => commit.remove(partition, op.key.as_slice()),
            }
        }

        let started = Instant::now();
        commit.commit().map_err(backend)?;
        let elapsed = started.elapsed();
        if elapsed >= SLOW_COMMIT {
            powledger_log::log_warn!(
                "slow commit: {} ops took {}ms ({} journals)",
                batch.len(),
                elapsed.as_millis(),
                self.keyspace.journal_count(),
            );
        }
        Ok(())
    }
}

fn backend(err: fjall::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}
