//! Ordered key-value backends the committed world state is persisted to.
//!
//! A backend knows nothing about trees: it stores opaque byte keys and values in a handful of
//! [Column]s and applies [WriteBatch]es atomically. The layout of keys and values is owned by
//! [crate::merkle::NodeStore] and [crate::state::WorldState].

use core::fmt;

mod error;
pub use error::StorageError;

mod memory;
pub use memory::MemoryStorage;

#[cfg(feature = "rocksdb")]
mod rocksdb;
#[cfg(feature = "rocksdb")]
pub use rocksdb::{RocksDbConfig, RocksDbStorage};

/// A key-value pair read from a [Storage].
pub type KeyValue = (Vec<u8>, Vec<u8>);

// COLUMNS
// ================================================================================================

/// The independent keyspaces of a [Storage].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Column {
    /// Inner nodes keyed by tree and hash, with their reference counts.
    Nodes,
    /// Indexed tree leaf preimages keyed by tree and hash, with their reference counts.
    Leaves,
    /// Leaf position lookups: `(tree, key, index)` for indexed trees and `(tree, leaf, index)` for
    /// append-only trees.
    LeafIndices,
    /// Per-block state records keyed by block number.
    Blocks,
    /// Chain status, chain identifier and genesis data.
    Metadata,
}

impl Column {
    pub const COUNT: usize = 5;

    pub const ALL: [Column; Self::COUNT] =
        [Column::Nodes, Column::Leaves, Column::LeafIndices, Column::Blocks, Column::Metadata];

    /// Returns the name of the column, used e.g. as a RocksDB column family name.
    pub const fn name(self) -> &'static str {
        match self {
            Column::Nodes => "nodes",
            Column::Leaves => "leaves",
            Column::LeafIndices => "leaf_indices",
            Column::Blocks => "blocks",
            Column::Metadata => "metadata",
        }
    }

    pub(crate) const fn position(self) -> usize {
        self as usize
    }
}

// WRITE BATCH
// ================================================================================================

/// A single write of a [WriteBatch].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { column: Column, key: Vec<u8>, value: Vec<u8> },
    Delete { column: Column, key: Vec<u8> },
}

/// A set of writes applied to a [Storage] atomically.
///
/// Operations are applied in insertion order, so a later write to the same key wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, column: Column, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Put { column, key: key.into(), value: value.into() });
    }

    pub fn delete(&mut self, column: Column, key: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Delete { column, key: key.into() });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl IntoIterator for WriteBatch {
    type Item = BatchOp;
    type IntoIter = std::vec::IntoIter<BatchOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

// STORAGE TRAIT
// ================================================================================================

/// An ordered byte-key map with atomic batch writes.
///
/// Keys within a column are ordered lexicographically. Implementations use interior mutability so
/// that a single instance can be shared between the canonical world state and its forks behind an
/// `Arc`.
pub trait Storage: fmt::Debug + Send + Sync + 'static {
    /// Returns the value stored under `key`, if any.
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Returns the entry with the greatest key less than or equal to `key`.
    fn floor(&self, column: Column, key: &[u8]) -> Result<Option<KeyValue>, StorageError>;

    /// Returns the entry with the least key greater than or equal to `key`.
    fn ceiling(&self, column: Column, key: &[u8]) -> Result<Option<KeyValue>, StorageError>;

    /// Applies every operation of `batch`, or none of them.
    fn write(&self, batch: WriteBatch) -> Result<(), StorageError>;

    /// Removes every entry of every column.
    fn clear(&self) -> Result<(), StorageError>;

    /// Flushes buffered writes to durable storage.
    fn sync(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
