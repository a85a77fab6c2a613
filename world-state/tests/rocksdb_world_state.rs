use std::sync::Arc;

use tempfile::TempDir;
use world_state::{
    BlockBody, ChainStatus, Felt, L2Block, TxEffect, WorldState, WorldStateConfig, Word,
    merkle::{PublicDataLeaf, TreeId},
    state::StateView,
    storage::{RocksDbConfig, RocksDbStorage},
};

fn setup_storage() -> (Arc<RocksDbStorage>, TempDir) {
    let temp_dir = tempfile::Builder::new()
        .prefix("test_world_state_rocksdb_")
        .tempdir()
        .expect("Failed to create temporary directory for RocksDB test");

    let storage = RocksDbStorage::open(RocksDbConfig::new(temp_dir.path()))
        .expect("Failed to open RocksDbStorage in temporary directory");
    (Arc::new(storage), temp_dir)
}

fn reopen(temp_dir: &TempDir) -> Arc<RocksDbStorage> {
    let storage = RocksDbStorage::open(RocksDbConfig::new(temp_dir.path()))
        .expect("Failed to reopen RocksDbStorage");
    Arc::new(storage)
}

fn config(chain_id: u64) -> WorldStateConfig {
    WorldStateConfig::default()
        .with_chain_id(Word::new([Felt::new(chain_id), Felt::new(0), Felt::new(0), Felt::new(0)]))
        .with_tree_height(TreeId::NoteHash, 8)
        .with_tree_height(TreeId::Nullifier, 8)
        .with_tree_height(TreeId::PublicData, 8)
        .with_tree_height(TreeId::L1ToL2Message, 8)
        .with_tree_height(TreeId::Archive, 8)
}

fn note(value: u64) -> Word {
    Word::new([Felt::new(value), Felt::new(value), Felt::new(0), Felt::new(1)])
}

fn advance(state: &WorldState<RocksDbStorage>, value: u64) -> L2Block {
    let tip = state.status().unwrap().unfinalized_tip;
    let body = BlockBody::new(vec![TxEffect {
        note_hashes: vec![note(value)],
        nullifiers: vec![Felt::new(value)],
        public_data_writes: vec![PublicDataLeaf::new(Felt::new(1), Felt::new(value))],
    }]);
    let messages = [note(value + 1_000)];
    let mut fork = state.fork(None).unwrap();
    let block = fork.build_block(tip + 1, tip + 1, body, &messages).unwrap();
    drop(fork);
    state.handle_block_and_messages(&block, &messages).unwrap();
    block
}

#[test]
fn rocksdb_state_survives_reopening() {
    let (storage, temp_dir) = setup_storage();
    let state = WorldState::open(storage, config(1)).unwrap();
    for value in 1..=4 {
        advance(&state, value);
    }
    state.set_finalised(3).unwrap();
    state.remove_historical_blocks(3).unwrap();
    let expected = state.get_committed().unwrap().get_state_reference().unwrap();
    state.close().unwrap();
    drop(state);

    let state = WorldState::open(reopen(&temp_dir), config(1)).unwrap();
    assert_eq!(
        state.status().unwrap(),
        ChainStatus {
            oldest_historical_block: 3,
            finalized_tip: 3,
            unfinalized_tip: 4
        }
    );
    let committed = state.get_committed().unwrap();
    assert_eq!(committed.get_state_reference().unwrap(), expected);
    assert_eq!(committed.find_leaf_index(TreeId::NoteHash, note(2)).unwrap(), Some(1));
    assert!(
        committed
            .get_previous_value_index(TreeId::Nullifier, Felt::new(4))
            .unwrap()
            .already_present
    );
    assert!(state.get_snapshot(2).is_err());
}

#[test]
fn rocksdb_unwind_and_reapply() {
    let (storage, _temp_dir) = setup_storage();
    let state = WorldState::open(storage, config(1)).unwrap();
    let blocks: Vec<L2Block> = (1..=3).map(|value| advance(&state, value)).collect();
    let expected = state.get_committed().unwrap().get_state_reference().unwrap();

    state.unwind_blocks(2).unwrap();
    let committed = state.get_committed().unwrap();
    assert_eq!(committed.find_leaf_index(TreeId::NoteHash, note(3)).unwrap(), None);
    assert_eq!(committed.find_leaf_index(TreeId::L1ToL2Message, note(1_002)).unwrap(), None);
    drop(committed);

    for block in &blocks[1..] {
        let messages = [note(block.number() + 1_000)];
        state.handle_block_and_messages(block, &messages).unwrap();
    }
    assert_eq!(state.get_committed().unwrap().get_state_reference().unwrap(), expected);
}

#[test]
fn rocksdb_other_chain_wipes_the_state() {
    let (storage, temp_dir) = setup_storage();
    let state = WorldState::open(storage, config(1)).unwrap();
    advance(&state, 1);
    state.close().unwrap();
    drop(state);

    let state = WorldState::open(reopen(&temp_dir), config(2)).unwrap();
    assert_eq!(state.status().unwrap(), ChainStatus::default());
    let committed = state.get_committed().unwrap();
    assert_eq!(committed.find_leaf_index(TreeId::NoteHash, note(1)).unwrap(), None);
}
