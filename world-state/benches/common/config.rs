//! Benchmark configuration constants.

use std::time::Duration;

/// Default measurement time for most benchmarks
pub const DEFAULT_MEASUREMENT_TIME: Duration = Duration::from_secs(10);

/// Sample size for statistical significance
pub const DEFAULT_SAMPLE_SIZE: usize = 50;

/// Number of leaves inserted per batch
pub const BATCH_SIZES: &[usize] = &[
    1,   // Single leaf
    16,  // A transaction
    64,  // A small block
    256, // A large block
];

/// Number of transactions per block
pub const BLOCK_SIZES: &[usize] = &[1, 8, 32];
