use std::{path::PathBuf, sync::Arc};

use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DB, DBCompactionStyle, DBCompressionType,
    Direction, FlushOptions, IteratorMode, Options, WriteOptions,
};

use super::{BatchOp, Column, KeyValue, Storage, StorageError, WriteBatch};

/// A RocksDB-backed persistent implementation of [Storage].
///
/// Every [Column] maps to a RocksDB column family of the same name:
/// - `nodes` and `leaves`: content-addressed tree data, point lookups only.
/// - `leaf_indices`: leaf position lookups, scanned with forward and reverse iterators.
/// - `blocks`: one state record per retained block.
/// - `metadata`: chain status, chain identifier and genesis data.
#[derive(Debug, Clone)]
pub struct RocksDbStorage {
    db: Arc<DB>,
}

impl RocksDbStorage {
    /// Opens or creates a RocksDB database at the configured path.
    ///
    /// # Errors
    /// Returns `StorageError::Backend` if the database cannot be opened or configured,
    /// for example, due to path issues, permissions, or RocksDB internal errors.
    pub fn open(config: RocksDbConfig) -> Result<Self, StorageError> {
        // Base DB options
        let mut db_opts = Options::default();
        // Create DB if it doesn't exist
        db_opts.create_if_missing(true);
        // Auto-create missing column families
        db_opts.create_missing_column_families(true);
        // Tune compaction threads to match CPU cores
        db_opts.increase_parallelism(rayon::current_num_threads() as i32);
        // Limit the number of open file handles
        db_opts.set_max_open_files(config.max_open_files);
        // Parallelize flush/compaction up to CPU count
        db_opts.set_max_background_jobs(rayon::current_num_threads() as i32);
        // Maximum WAL size
        db_opts.set_max_total_wal_size(512 * 1024 * 1024);

        // Shared block cache across all column families
        let cache = Cache::new_lru_cache(config.cache_size);

        // Helper to build options for the content-addressed column families
        fn point_lookup_cf(cache: &Cache, bloom_filter_bits: f64) -> Options {
            let mut tbl = BlockBasedOptions::default();
            // Use shared LRU cache for block data
            tbl.set_block_cache(cache);
            tbl.set_bloom_filter(bloom_filter_bits, false);
            // Enable whole-key bloom filtering (better with point lookups)
            tbl.set_whole_key_filtering(true);
            // Pin L0 filter and index blocks in cache
            tbl.set_pin_l0_filter_and_index_blocks_in_cache(true);

            let mut opts = Options::default();
            opts.set_block_based_table_factory(&tbl);
            // 128 MB memtable
            opts.set_write_buffer_size(128 << 20);
            opts.set_max_write_buffer_number(3);
            opts.set_min_write_buffer_number_to_merge(1);
            // Use level-based compaction
            opts.set_compaction_style(DBCompactionStyle::Level);
            // 512 MB target file size
            opts.set_target_file_size_base(512 << 20);
            opts.set_target_file_size_multiplier(2);
            // LZ4 compression
            opts.set_compression_type(DBCompressionType::Lz4);
            opts.set_level_zero_file_num_compaction_trigger(8);
            opts
        }

        // Leaf indices are range-scanned, so bloom filters do not help
        let mut indices_opts = Options::default();
        let mut indices_table = BlockBasedOptions::default();
        indices_table.set_block_cache(&cache);
        indices_opts.set_block_based_table_factory(&indices_table);
        indices_opts.set_compression_type(DBCompressionType::Lz4);

        let mut blocks_opts = Options::default();
        blocks_opts.set_compression_type(DBCompressionType::Lz4);

        // Metadata CF with no compression
        let mut metadata_opts = Options::default();
        metadata_opts.set_compression_type(DBCompressionType::None);

        let cfs = vec![
            ColumnFamilyDescriptor::new(Column::Nodes.name(), point_lookup_cf(&cache, 10.0)),
            ColumnFamilyDescriptor::new(Column::Leaves.name(), point_lookup_cf(&cache, 10.0)),
            ColumnFamilyDescriptor::new(Column::LeafIndices.name(), indices_opts),
            ColumnFamilyDescriptor::new(Column::Blocks.name(), blocks_opts),
            ColumnFamilyDescriptor::new(Column::Metadata.name(), metadata_opts),
        ];

        let db = DB::open_cf_descriptors(&db_opts, config.path, cfs)?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Retrieves a handle to the RocksDB column family backing `column`.
    ///
    /// # Errors
    /// Returns `StorageError::Corrupted` if the column family does not exist.
    fn cf_handle(&self, column: Column) -> Result<&rocksdb::ColumnFamily, StorageError> {
        self.db.cf_handle(column.name()).ok_or_else(|| {
            StorageError::Corrupted(format!("missing column family `{}`", column.name()))
        })
    }

    fn first_entry(
        &self,
        column: Column,
        key: &[u8],
        direction: Direction,
    ) -> Result<Option<KeyValue>, StorageError> {
        let cf = self.cf_handle(column)?;
        let mut iter = self.db.iterator_cf(cf, IteratorMode::From(key, direction));
        match iter.next() {
            Some(entry) => {
                let (key, value) = entry?;
                Ok(Some((key.into_vec(), value.into_vec())))
            },
            None => Ok(None),
        }
    }
}

impl Storage for RocksDbStorage {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let cf = self.cf_handle(column)?;
        Ok(self.db.get_cf(cf, key)?)
    }

    fn floor(&self, column: Column, key: &[u8]) -> Result<Option<KeyValue>, StorageError> {
        self.first_entry(column, key, Direction::Reverse)
    }

    fn ceiling(&self, column: Column, key: &[u8]) -> Result<Option<KeyValue>, StorageError> {
        self.first_entry(column, key, Direction::Forward)
    }

    /// Applies the batch as a single RocksDB `WriteBatch`.
    ///
    /// # Errors
    /// - `StorageError::Corrupted`: If a column family is missing.
    /// - `StorageError::Backend`: If the write fails.
    fn write(&self, batch: WriteBatch) -> Result<(), StorageError> {
        let mut db_batch = rocksdb::WriteBatch::default();
        for op in batch {
            match op {
                BatchOp::Put { column, key, value } => {
                    db_batch.put_cf(self.cf_handle(column)?, key, value);
                },
                BatchOp::Delete { column, key } => {
                    db_batch.delete_cf(self.cf_handle(column)?, key);
                },
            }
        }

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(false);
        self.db.write_opt(db_batch, &write_opts)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        let mut db_batch = rocksdb::WriteBatch::default();
        for column in Column::ALL {
            let cf = self.cf_handle(column)?;
            for entry in self.db.iterator_cf(cf, IteratorMode::Start) {
                let (key, _) = entry?;
                db_batch.delete_cf(cf, key);
            }
        }
        self.db.write(db_batch)?;
        Ok(())
    }

    /// Syncs the RocksDB database to disk.
    ///
    /// # Errors
    /// - Returns `StorageError::Backend` if the flush operation fails.
    fn sync(&self) -> Result<(), StorageError> {
        let mut fopts = FlushOptions::default();
        fopts.set_wait(true);

        for column in Column::ALL {
            let cf = self.cf_handle(column)?;
            self.db.flush_cf_opt(cf, &fopts)?;
        }

        self.db.flush_wal(true)?;
        Ok(())
    }
}

impl From<rocksdb::Error> for StorageError {
    fn from(e: rocksdb::Error) -> Self {
        StorageError::Backend(Box::new(e))
    }
}

// CONFIG
// ================================================================================================

/// Configuration for opening a [RocksDbStorage].
#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    /// The filesystem path where the RocksDB database will be stored.
    pub(crate) path: PathBuf,

    /// The size of the RocksDB block cache in bytes.
    ///
    /// Default: 1GB (1 << 30 bytes)
    pub(crate) cache_size: usize,

    /// The maximum number of files that RocksDB can have open simultaneously.
    ///
    /// Default: 512 files
    pub(crate) max_open_files: i32,
}

impl RocksDbConfig {
    /// Creates a new RocksDbConfig with the given database path and default settings.
    ///
    /// # Default Settings
    /// * `cache_size`: 1GB (1,073,741,824 bytes)
    /// * `max_open_files`: 512
    ///
    /// # Examples
    /// ```
    /// use world_state::storage::RocksDbConfig;
    ///
    /// let config = RocksDbConfig::new("/path/to/database");
    /// ```
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            cache_size: 1 << 30,
            max_open_files: 512,
        }
    }

    /// Sets the block cache size for RocksDB.
    pub fn with_cache_size(mut self, size: usize) -> Self {
        self.cache_size = size;
        self
    }

    /// Sets the maximum number of files that RocksDB can have open simultaneously.
    pub fn with_max_open_files(mut self, count: i32) -> Self {
        self.max_open_files = count;
        self
    }
}
