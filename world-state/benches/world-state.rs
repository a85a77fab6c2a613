//! Benchmarks of the tree primitives and of the chain progress tracker.
//!
//! Every benchmark runs on the in-memory storage with the default tree heights, so the numbers
//! reflect hashing and node bookkeeping rather than disk access.

use std::{hint, sync::Arc};

use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};
use world_state::{
    BlockBody, Felt, TxEffect, WorldState, WorldStateConfig, Word,
    merkle::{
        IndexedLeafValue, MerkleForest, NodeStore, NullifierLeaf, PublicDataLeaf, TreeArray,
        TreeId,
    },
    state::{DEFAULT_TREE_HEIGHTS, StateView},
    storage::MemoryStorage,
};

mod common;
use common::*;

use crate::config::{BATCH_SIZES, BLOCK_SIZES, DEFAULT_MEASUREMENT_TIME, DEFAULT_SAMPLE_SIZE};

// === Test Data Generation ===

fn empty_forest() -> MerkleForest<MemoryStorage> {
    let store = NodeStore::new(Arc::new(MemoryStorage::new()));
    let mut forest = MerkleForest::empty(store, TreeArray::new(DEFAULT_TREE_HEIGHTS));
    forest.prefill(TreeId::Nullifier, 1).unwrap();
    forest.prefill(TreeId::PublicData, 1).unwrap();
    forest
}

fn words(count: usize, seed: u64) -> Vec<Word> {
    (0..count as u64)
        .map(|i| Word::new([Felt::new(seed), Felt::new(i), Felt::new(i * 7), Felt::new(1)]))
        .collect()
}

/// Spreads keys over the whole `u64` range so that low leaves are not always the last leaf.
fn nullifiers(count: usize, seed: u64) -> Vec<IndexedLeafValue> {
    (1..=count as u64)
        .map(|i| NullifierLeaf::new(Felt::new(i.wrapping_mul(0x9e37_79b9_7f4a_7c15) ^ seed)).into())
        .collect()
}

fn block_body(txs: usize, seed: u64) -> BlockBody {
    let tx_effects = (0..txs as u64)
        .map(|tx| TxEffect {
            note_hashes: words(4, seed * 1_000 + tx),
            nullifiers: (0..4)
                .map(|i| Felt::new((seed * 1_000 + tx) * 16 + i + 1))
                .collect(),
            public_data_writes: (0..2)
                .map(|i| PublicDataLeaf::new(Felt::new(tx * 2 + i + 1), Felt::new(seed)))
                .collect(),
        })
        .collect();
    BlockBody::new(tx_effects)
}

fn open_state() -> WorldState<MemoryStorage> {
    WorldState::open(Arc::new(MemoryStorage::new()), WorldStateConfig::default()).unwrap()
}

// === Tree Benchmarks ===

benchmark_batch! {
    forest_append_leaves,
    BATCH_SIZES,
    |b: &mut criterion::Bencher, size: usize| {
        let leaves = words(size, 1);
        b.iter_batched(
            empty_forest,
            |mut forest| {
                forest.append_leaves(TreeId::NoteHash, hint::black_box(&leaves)).unwrap();
                forest
            },
            BatchSize::SmallInput,
        )
    },
}

benchmark_batch! {
    forest_sequential_insert,
    BATCH_SIZES,
    |b: &mut criterion::Bencher, size: usize| {
        let values = nullifiers(size, 1);
        b.iter_batched(
            empty_forest,
            |mut forest| {
                hint::black_box(
                    forest.sequential_insert(TreeId::Nullifier, hint::black_box(&values)).unwrap(),
                );
                forest
            },
            BatchSize::SmallInput,
        )
    },
}

benchmark_with_setup_data! {
    forest_sibling_path,
    DEFAULT_MEASUREMENT_TIME,
    DEFAULT_SAMPLE_SIZE,
    "sibling_path",
    || {
        let mut forest = empty_forest();
        forest.append_leaves(TreeId::NoteHash, &words(1_024, 2)).unwrap();
        forest
    },
    |b: &mut criterion::Bencher, forest: &MerkleForest<MemoryStorage>| {
        b.iter(|| {
            for index in (0..1_024).step_by(64) {
                hint::black_box(forest.get_sibling_path(TreeId::NoteHash, index).unwrap());
            }
        })
    },
}

// === World State Benchmarks ===

benchmark_with_setup_data! {
    state_fork_with_checkpoint,
    DEFAULT_MEASUREMENT_TIME,
    DEFAULT_SAMPLE_SIZE,
    "fork_with_checkpoint",
    open_state,
    |b: &mut criterion::Bencher, state: &WorldState<MemoryStorage>| {
        let values = nullifiers(16, 3);
        b.iter(|| {
            let mut fork = state.fork(None).unwrap();
            fork.create_checkpoint().unwrap();
            fork.sequential_insert(TreeId::Nullifier, &values).unwrap();
            fork.revert_checkpoint().unwrap();
            hint::black_box(fork.get_state_reference().unwrap());
        })
    },
}

fn state_handle_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("handle_block");
    group.measurement_time(DEFAULT_MEASUREMENT_TIME);
    group.sample_size(DEFAULT_SAMPLE_SIZE);

    for &txs in BLOCK_SIZES {
        group.bench_with_input(BenchmarkId::new("txs", txs), &txs, |b, &txs| {
            b.iter_batched(
                || {
                    let state = open_state();
                    let mut fork = state.fork(None).unwrap();
                    let block = fork.build_block(1, 1, block_body(txs, 1), &[]).unwrap();
                    drop(fork);
                    (state, block)
                },
                |(state, block)| {
                    state.handle_block_and_messages(&block, &[]).unwrap();
                    state
                },
                BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

criterion_group!(
    world_state_benchmark_group,
    forest_append_leaves,
    forest_sequential_insert,
    forest_sibling_path,
    state_fork_with_checkpoint,
    state_handle_block,
);

criterion_main!(world_state_benchmark_group);
