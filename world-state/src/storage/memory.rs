use core::ops::Bound;
use std::sync::{PoisonError, RwLock};

use super::{BatchOp, Column, KeyValue, Storage, StorageError, WriteBatch};
use crate::Map;

type ColumnMap = Map<Vec<u8>, Vec<u8>>;

/// In-memory implementation of [Storage].
///
/// All columns live behind a single `std::sync::RwLock`, so a [WriteBatch] is applied under one
/// write guard and readers never observe half of a batch.
///
/// It is primarily intended for scenarios where data persistence to disk is not a
/// primary concern. Common use cases include:
/// - Testing environments.
/// - Short-lived world states, e.g. simulations run on top of a copy of the chain.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    columns: RwLock<[ColumnMap; Column::COUNT]>,
}

impl MemoryStorage {
    /// Creates a new, empty in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries stored in `column`.
    pub fn len(&self, column: Column) -> Result<usize, StorageError> {
        Ok(self.columns.read()?[column.position()].len())
    }

    /// Returns true if no column holds any entry.
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.columns.read()?.iter().all(|column| column.is_empty()))
    }
}

impl Clone for MemoryStorage {
    fn clone(&self) -> Self {
        MemoryStorage {
            columns: RwLock::new(
                self.columns.read().expect("Failed to read lock for columns in clone").clone(),
            ),
        }
    }
}

impl Storage for MemoryStorage {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.columns.read()?[column.position()].get(key).cloned())
    }

    fn floor(&self, column: Column, key: &[u8]) -> Result<Option<KeyValue>, StorageError> {
        let columns = self.columns.read()?;
        let entry = columns[column.position()]
            .range::<[u8], _>((Bound::Unbounded, Bound::Included(key)))
            .next_back();
        Ok(entry.map(|(key, value)| (key.clone(), value.clone())))
    }

    fn ceiling(&self, column: Column, key: &[u8]) -> Result<Option<KeyValue>, StorageError> {
        let columns = self.columns.read()?;
        let entry = columns[column.position()]
            .range::<[u8], _>((Bound::Included(key), Bound::Unbounded))
            .next();
        Ok(entry.map(|(key, value)| (key.clone(), value.clone())))
    }

    /// Applies the batch under a single write guard.
    ///
    /// # Errors
    /// Returns `StorageError::Backend` if the write lock cannot be acquired.
    fn write(&self, batch: WriteBatch) -> Result<(), StorageError> {
        let mut columns = self.columns.write()?;
        for op in batch {
            match op {
                BatchOp::Put { column, key, value } => {
                    columns[column.position()].insert(key, value);
                },
                BatchOp::Delete { column, key } => {
                    columns[column.position()].remove(&key);
                },
            }
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        let mut columns = self.columns.write()?;
        columns.iter_mut().for_each(ColumnMap::clear);
        Ok(())
    }
}

impl<T> From<PoisonError<T>> for StorageError {
    fn from(e: PoisonError<T>) -> Self {
        // Simple string-based error since we can't box PoisonError<T> directly
        // (T might not implement Send)
        #[derive(Debug)]
        struct LockError(String);

        impl std::fmt::Display for LockError {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::error::Error for LockError {}

        StorageError::Backend(Box::new(LockError(e.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage_with(keys: &[&[u8]]) -> MemoryStorage {
        let storage = MemoryStorage::new();
        let mut batch = WriteBatch::new();
        for key in keys {
            batch.put(Column::LeafIndices, *key, key.to_vec());
        }
        storage.write(batch).unwrap();
        storage
    }

    #[test]
    fn floor_returns_the_greatest_key_not_above_the_key() {
        let storage = storage_with(&[&[1, 0], &[1, 5], &[2, 0]]);

        let (key, _) = storage.floor(Column::LeafIndices, &[1, 7]).unwrap().unwrap();
        assert_eq!(key, vec![1, 5]);
        let (key, _) = storage.floor(Column::LeafIndices, &[1, 5]).unwrap().unwrap();
        assert_eq!(key, vec![1, 5]);
        assert!(storage.floor(Column::LeafIndices, &[0, 9]).unwrap().is_none());
        // other columns are independent keyspaces
        assert!(storage.floor(Column::Nodes, &[9, 9]).unwrap().is_none());
    }

    #[test]
    fn ceiling_returns_the_least_key_not_below_the_key() {
        let storage = storage_with(&[&[1, 0], &[1, 5], &[2, 0]]);

        let (key, _) = storage.ceiling(Column::LeafIndices, &[1, 1]).unwrap().unwrap();
        assert_eq!(key, vec![1, 5]);
        let (key, _) = storage.ceiling(Column::LeafIndices, &[1, 6]).unwrap().unwrap();
        assert_eq!(key, vec![2, 0]);
        assert!(storage.ceiling(Column::LeafIndices, &[2, 1]).unwrap().is_none());
    }

    #[test]
    fn batch_operations_apply_in_order() {
        let storage = MemoryStorage::new();
        let mut batch = WriteBatch::new();
        batch.put(Column::Metadata, b"a".to_vec(), vec![1]);
        batch.delete(Column::Metadata, b"a".to_vec());
        batch.put(Column::Metadata, b"b".to_vec(), vec![2]);
        batch.put(Column::Metadata, b"b".to_vec(), vec![3]);
        storage.write(batch).unwrap();

        assert_eq!(storage.get(Column::Metadata, b"a").unwrap(), None);
        assert_eq!(storage.get(Column::Metadata, b"b").unwrap(), Some(vec![3]));
        assert_eq!(storage.len(Column::Metadata).unwrap(), 1);
    }

    #[test]
    fn clear_empties_every_column() {
        let storage = storage_with(&[&[1], &[2]]);
        storage.write({
            let mut batch = WriteBatch::new();
            batch.put(Column::Blocks, vec![0], vec![0]);
            batch
        })
        .unwrap();

        storage.clear().unwrap();
        assert!(storage.is_empty().unwrap());
    }
}
