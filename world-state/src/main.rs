use std::{path::PathBuf, sync::Arc, time::Instant};

use clap::{Parser, ValueEnum};
use rand_utils::rand_value;
#[cfg(feature = "rocksdb")]
use world_state::storage::{RocksDbConfig, RocksDbStorage};
use world_state::{
    BlockBody, Felt, TxEffect, WorldState, WorldStateConfig, WorldStateError, Word,
    merkle::{PublicDataLeaf, TreeId},
    state::StateView,
    storage::{MemoryStorage, Storage},
};

#[derive(Parser, Debug)]
#[command(name = "Benchmark", about = "World state benchmark", version, rename_all = "kebab-case")]
pub struct BenchmarkCmd {
    /// Number of blocks to build and apply
    #[arg(short = 'b', long = "blocks", default_value = "100")]
    blocks: u64,
    /// Number of transactions per block
    #[arg(short = 't', long = "txs", default_value = "16")]
    txs: usize,
    /// Number of note hashes per transaction
    #[arg(short = 'n', long = "notes", default_value = "4")]
    notes: usize,
    /// Number of nullifiers per transaction
    #[arg(short = 'x', long = "nullifiers", default_value = "4")]
    nullifiers: usize,
    /// Number of public data writes per transaction
    #[arg(short = 'w', long = "writes", default_value = "2")]
    writes: usize,
    /// Number of blocks to unwind at the end of the run
    #[arg(short = 'u', long = "unwind", default_value = "10")]
    unwind: u64,
    /// Path for the benchmark database
    #[clap(short = 'p', long = "path")]
    storage_path: Option<PathBuf>,
    /// Storage backend to use at runtime: memory or rocksdb
    #[arg(short = 's', long = "storage", value_enum, default_value = "memory")]
    storage: StorageKind,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum StorageKind {
    Memory,
    Rocksdb,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = BenchmarkCmd::parse();
    println!(
        "Running benchmark with {} storage",
        match args.storage {
            StorageKind::Memory => "memory",
            StorageKind::Rocksdb => "rocksdb",
        }
    );

    let result = match args.storage {
        StorageKind::Memory => benchmark_world_state(Arc::new(MemoryStorage::new()), &args),
        StorageKind::Rocksdb => benchmark_with_rocksdb(&args),
    };
    result.unwrap();
    println!("Benchmark completed successfully");
}

#[cfg(feature = "rocksdb")]
fn benchmark_with_rocksdb(args: &BenchmarkCmd) -> Result<(), WorldStateError> {
    let path = args.storage_path.clone().unwrap_or_else(|| PathBuf::from("world_state_db"));
    let storage = RocksDbStorage::open(RocksDbConfig::new(path))?;
    benchmark_world_state(Arc::new(storage), args)
}

#[cfg(not(feature = "rocksdb"))]
fn benchmark_with_rocksdb(_args: &BenchmarkCmd) -> Result<(), WorldStateError> {
    panic!("the rocksdb storage requires the `rocksdb` feature");
}

/// Runs the block building, block application and unwinding benchmarks.
pub fn benchmark_world_state<S: Storage>(
    storage: Arc<S>,
    args: &BenchmarkCmd,
) -> Result<(), WorldStateError> {
    let now = Instant::now();
    let state = WorldState::open(storage, WorldStateConfig::default())?;
    let elapsed = now.elapsed().as_secs_f32();
    println!("Opened the world state at {} in {elapsed:.1} seconds\n", state.status()?);

    let first = state.status()?.unfinalized_tip + 1;
    let mut build_times = Vec::new();
    let mut apply_times = Vec::new();

    for block_number in first..first + args.blocks {
        let body = random_body(args);

        let now = Instant::now();
        let mut fork = state.fork(None)?;
        let block = fork.build_block(block_number, block_number, body, &[])?;
        build_times.push(now.elapsed().as_micros());
        fork.close();

        let now = Instant::now();
        state.handle_block_and_messages(&block, &[])?;
        apply_times.push(now.elapsed().as_micros());
    }

    let leaves = args.txs * (args.notes + args.nullifiers + args.writes);
    println!(
        "The average block building time measured over {} blocks with {leaves} leaves each is {:.0} μs",
        args.blocks,
        build_times.iter().sum::<u128>() as f64 / args.blocks as f64,
    );
    println!(
        "The average block application time measured over {} blocks with {leaves} leaves each is {:.0} μs\n",
        args.blocks,
        apply_times.iter().sum::<u128>() as f64 / args.blocks as f64,
    );

    proof_generation(&state)?;

    let status = state.status()?;
    let unwind = args.unwind.min(status.unfinalized_tip - status.finalized_tip);
    let now = Instant::now();
    let status = state.unwind_blocks(unwind)?;
    let elapsed = now.elapsed().as_secs_f64() * 1000_f64;
    println!("Unwound {unwind} blocks in {elapsed:.1} ms, now at {status}");

    state.close()
}

/// Runs the sibling path generation benchmark on the committed note hash tree.
pub fn proof_generation<S: Storage>(state: &WorldState<S>) -> Result<(), WorldStateError> {
    const NUM_PROOFS: u64 = 100;

    let committed = state.get_committed()?;
    let size = committed.get_tree_info(TreeId::NoteHash)?.size;
    if size == 0 {
        return Ok(());
    }

    let mut proof_times = Vec::new();
    for _ in 0..NUM_PROOFS {
        let index = rand_value::<u64>() % size;
        let now = Instant::now();
        let _path = committed.get_sibling_path(TreeId::NoteHash, index)?;
        proof_times.push(now.elapsed().as_micros());
    }

    println!(
        "The average sibling path generation time measured by {NUM_PROOFS} proofs in a tree with {size} leaves is {:.0} μs\n",
        proof_times.iter().sum::<u128>() as f64 / NUM_PROOFS as f64,
    );
    Ok(())
}

fn random_body(args: &BenchmarkCmd) -> BlockBody {
    let tx_effects = (0..args.txs)
        .map(|_| TxEffect {
            note_hashes: (0..args.notes).map(|_| random_word()).collect(),
            nullifiers: (0..args.nullifiers).map(|_| Felt::new(rand_value())).collect(),
            public_data_writes: (0..args.writes)
                .map(|_| {
                    // a small slot range so that some writes update existing slots
                    let slot = Felt::new(rand_value::<u64>() % 1024 + 1);
                    PublicDataLeaf::new(slot, Felt::new(rand_value()))
                })
                .collect(),
        })
        .collect();
    BlockBody::new(tx_effects)
}

fn random_word() -> Word {
    Word::new([
        Felt::new(rand_value()),
        Felt::new(rand_value()),
        Felt::new(rand_value()),
        Felt::new(rand_value()),
    ])
}
