//! The chain progress tracker and the views it hands out.
//!
//! A [WorldState] owns the canonical chain: it applies blocks one at a time, tracks the
//! finalized and oldest retained blocks, and prunes or unwinds history. Every retained block is
//! a set of five roots in the shared [NodeStore]; [Fork]s and [Snapshot]s read through to it.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

use crate::{
    Word,
    merkle::{MerkleForest, NodeStore, TreeArray, TreeId, TreeKind},
    storage::{Column, Storage, StorageError, WriteBatch},
    utils::{Deserializable, Serializable},
};

mod block;
pub use block::{BlockBody, BlockHeader, L2Block, TxEffect};

mod config;
pub use config::{DEFAULT_PREFILL, DEFAULT_TREE_HEIGHTS, WorldStateConfig};

mod error;
pub use error::{Result, WorldStateError};

mod fork;
pub use fork::{Fork, Snapshot, StateView};

mod reference;
pub use reference::StateReference;

mod registry;
use registry::ForkRegistry;

mod status;
pub use status::ChainStatus;
use status::{BlockRecord, CHAIN_ID_KEY, GENESIS_HEADER_KEY, STATUS_KEY, TREE_HEIGHTS_KEY};

pub use crate::merkle::TreeSnapshot;


/// Target of the log events emitted by the world state.
const COMPONENT: &str = "world-state";

// SHARED STATE
// ================================================================================================

/// State shared between a [WorldState] and the views it handed out.
#[derive(Debug)]
pub(crate) struct Shared<S: Storage> {
    store: NodeStore<S>,
    heights: TreeArray<u8>,
    chain: Mutex<Chain>,
}

#[derive(Debug)]
struct Chain {
    status: ChainStatus,
    registry: ForkRegistry,
    closed: bool,
}

impl<S: Storage> Shared<S> {
    fn chain(&self) -> Result<MutexGuard<'_, Chain>> {
        Ok(self.chain.lock().map_err(StorageError::from)?)
    }

    /// Fails unless view `id` is registered and its base block is still retained.
    pub(crate) fn check_live(&self, id: u64, base_block: u64) -> Result<()> {
        if self.chain()?.registry.is_live(id) {
            Ok(())
        } else {
            Err(WorldStateError::ForkNotFound { fork: id, block: base_block })
        }
    }

    pub(crate) fn deregister(&self, id: u64) {
        // a poisoned lock means the world state is unusable anyway
        if let Ok(mut chain) = self.chain.lock() {
            chain.registry.deregister(id);
        }
    }

    fn block_record(&self, block: u64) -> Result<BlockRecord> {
        let bytes = self
            .store
            .storage()
            .get(Column::Blocks, &BlockRecord::key(block))?
            .ok_or(WorldStateError::BlockNotFound(block))?;
        Ok(BlockRecord::read_from_bytes(&bytes).map_err(StorageError::from)?)
    }

    fn forest_at(&self, state: &StateReference) -> MerkleForest<S> {
        MerkleForest::new(self.store.clone(), self.heights, *state.trees())
    }

    /// Registers a view of `block`, or of the current tip, and returns its id, base block and
    /// forest.
    fn open_view(&self, block: Option<u64>) -> Result<(u64, u64, MerkleForest<S>)> {
        let mut chain = self.chain()?;
        if chain.closed {
            return Err(WorldStateError::Closed);
        }
        let block = block.unwrap_or(chain.status.unfinalized_tip);
        if !chain.status.is_retained(block) {
            return Err(WorldStateError::BlockNotFound(block));
        }
        // the record cannot be removed while the chain lock is held
        let record = self.block_record(block)?;
        let id = chain.registry.register(block);
        Ok((id, block, self.forest_at(&record.state)))
    }
}

// WORLD STATE
// ================================================================================================

/// The canonical world state of the chain.
///
/// Chain progress is tracked by three watermarks, see [ChainStatus]. Mutations of the canonical
/// chain are serialized by an internal lock, and every block lands in storage as a single atomic
/// write: readers observe the state either before or after a block, never a part of it.
///
/// Forks and snapshots can be opened at any retained block and used concurrently with the
/// tracker; they are invalidated when their base block is pruned or unwound.
#[derive(Debug)]
pub struct WorldState<S: Storage> {
    shared: Arc<Shared<S>>,
    writer: Mutex<()>,
    initial_header: BlockHeader,
}

impl<S: Storage> WorldState<S> {
    // CONSTRUCTOR
    // --------------------------------------------------------------------------------------------

    /// Opens the world state persisted in `storage`, creating the genesis state if there is none.
    ///
    /// If `storage` holds the state of a chain with a different identifier, it is wiped first.
    ///
    /// # Errors
    /// Returns an error if:
    /// - the configuration is invalid.
    /// - `storage` was created with different tree heights.
    /// - reading from or writing to `storage` fails.
    pub fn open(storage: Arc<S>, config: WorldStateConfig) -> Result<Self> {
        config.validate()?;
        let store = NodeStore::new(storage);

        let (status, initial_header) = match load(&store, &config)? {
            Some(loaded) => loaded,
            None => create_genesis(&store, &config)?,
        };
        info!(target: COMPONENT, %status, "world state opened");

        let shared = Shared {
            store,
            heights: config.tree_heights,
            chain: Mutex::new(Chain {
                status,
                registry: ForkRegistry::default(),
                closed: false,
            }),
        };
        Ok(Self {
            shared: Arc::new(shared),
            writer: Mutex::new(()),
            initial_header,
        })
    }

    // PUBLIC ACCESSORS
    // --------------------------------------------------------------------------------------------

    pub fn status(&self) -> Result<ChainStatus> {
        let chain = self.shared.chain()?;
        if chain.closed {
            return Err(WorldStateError::Closed);
        }
        Ok(chain.status)
    }

    /// Returns the header of block 0.
    pub fn initial_header(&self) -> &BlockHeader {
        &self.initial_header
    }

    /// Returns the state the genesis header commits to: the prefilled trees and an empty archive.
    pub fn initial_state_reference(&self) -> StateReference {
        self.initial_header.state
    }

    pub fn tree_heights(&self) -> &TreeArray<u8> {
        &self.shared.heights
    }

    /// Opens a fork of the state as of `block`, or of the current tip if `block` is `None`.
    ///
    /// # Errors
    /// Returns [WorldStateError::BlockNotFound] if the state of `block` is not retained.
    pub fn fork(&self, block: Option<u64>) -> Result<Fork<S>> {
        let (id, base_block, forest) = self.shared.open_view(block)?;
        Ok(Fork::new(Arc::clone(&self.shared), id, base_block, forest))
    }

    /// Returns a read-only view of the current tip.
    pub fn get_committed(&self) -> Result<Snapshot<S>> {
        let (id, block, forest) = self.shared.open_view(None)?;
        Ok(Snapshot::new(Arc::clone(&self.shared), id, block, forest))
    }

    /// Returns a read-only view of the state as of `block`.
    pub fn get_snapshot(&self, block: u64) -> Result<Snapshot<S>> {
        let (id, block, forest) = self.shared.open_view(Some(block))?;
        Ok(Snapshot::new(Arc::clone(&self.shared), id, block, forest))
    }

    /// Returns the hash of the header of a retained block.
    pub fn block_hash(&self, block: u64) -> Result<Word> {
        let chain = self.shared.chain()?;
        if !chain.status.is_retained(block) {
            return Err(WorldStateError::BlockNotFound(block));
        }
        Ok(self.shared.block_record(block)?.header_hash)
    }

    /// Returns the block that appended each of the leaf `indices` of `tree`, as seen from `block`
    /// or from the current tip if `block` is `None`.
    ///
    /// Indices beyond the size of the tree at that block map to `None`. Prefilled leaves and the
    /// genesis header belong to block 0.
    ///
    /// # Errors
    /// Returns an error if:
    /// - the state of `block` is not retained.
    /// - one of the leaves was appended by a block that was pruned since.
    pub fn get_block_numbers_for_leaf_indices(
        &self,
        block: Option<u64>,
        tree: TreeId,
        indices: &[u64],
    ) -> Result<Vec<Option<u64>>> {
        // the block records cannot be removed while the chain lock is held
        let chain = self.shared.chain()?;
        if chain.closed {
            return Err(WorldStateError::Closed);
        }
        let status = chain.status;
        let block = block.unwrap_or(status.unfinalized_tip);
        if !status.is_retained(block) {
            return Err(WorldStateError::BlockNotFound(block));
        }

        let size_at = |block: u64| -> Result<u64> {
            Ok(self.shared.block_record(block)?.state[tree].size)
        };
        let first = status.first_retained_block();
        let first_size = size_at(first)?;
        let size = size_at(block)?;

        indices
            .iter()
            .map(|&index| {
                if index >= size {
                    return Ok(None);
                }
                if index < first_size {
                    return match first {
                        0 => Ok(Some(0)),
                        _ => Err(WorldStateError::AlreadyPruned {
                            block: first,
                            oldest: status.oldest_historical_block,
                        }),
                    };
                }
                // size(low) <= index < size(high)
                let (mut low, mut high) = (first, block);
                while high - low > 1 {
                    let mid = low + (high - low) / 2;
                    if size_at(mid)? > index {
                        high = mid;
                    } else {
                        low = mid;
                    }
                }
                Ok(Some(high))
            })
            .collect()
    }

    // CHAIN PROGRESS
    // --------------------------------------------------------------------------------------------

    /// Applies `block` and the L1-to-L2 `messages` it consumes on top of the current tip.
    ///
    /// Messages, note hashes, nullifiers and public data writes are applied in this order, then
    /// the header is appended to the archive tree.
    ///
    /// # Errors
    /// Returns an error if:
    /// - the block does not directly follow the current tip.
    /// - the resulting state differs from the one declared by the block header.
    /// - any of the effects cannot be applied, e.g. a nullifier is already present.
    ///
    /// Nothing is written in any of these cases.
    pub fn handle_block_and_messages(
        &self,
        block: &L2Block,
        messages: &[Word],
    ) -> Result<ChainStatus> {
        let _writer = self.writer.lock().map_err(StorageError::from)?;
        let status = self.status()?;

        let block_number = block.number();
        if block_number != status.unfinalized_tip + 1 {
            return Err(WorldStateError::NonSequentialBlock {
                block: block_number,
                tip: status.unfinalized_tip,
            });
        }

        let tip = self.shared.block_record(status.unfinalized_tip)?;
        let mut forest = self.shared.forest_at(&tip.state);
        block::apply_effects(&mut forest, &block.body, messages)?;

        let actual = StateReference::from(*forest.snapshots());
        let expected = block.header.state;
        if let Some(tree) = expected.first_difference(&actual) {
            return Err(WorldStateError::StateMismatch {
                block: block_number,
                tree,
                expected_root: expected[tree].root,
                expected_size: expected[tree].size,
                actual_root: actual[tree].root,
                actual_size: actual[tree].size,
            });
        }

        let header_hash = block.hash();
        forest.append_leaves(TreeId::Archive, &[header_hash])?;
        let record = BlockRecord {
            state: StateReference::from(*forest.snapshots()),
            header_hash,
        };
        let new_status = ChainStatus { unfinalized_tip: block_number, ..status };

        let mut staged = self.shared.store.stage();
        forest.stage_into(&mut staged)?;
        let batch = staged.batch_mut();
        batch.put(Column::Blocks, BlockRecord::key(block_number), record.to_bytes());
        put_status(batch, &new_status);
        staged.commit()?;

        self.shared.chain()?.status = new_status;
        info!(
            target: COMPONENT,
            block_number,
            archive_root = %record.state[TreeId::Archive].root,
            "block applied"
        );
        Ok(new_status)
    }

    /// Marks every block up to `block` as final.
    ///
    /// Finalizing a block at or below the current finalized tip does nothing.
    pub fn set_finalised(&self, block: u64) -> Result<ChainStatus> {
        let _writer = self.writer.lock().map_err(StorageError::from)?;
        let status = self.status()?;

        if block > status.unfinalized_tip {
            return Err(WorldStateError::FinalizeBeyondTip { block, tip: status.unfinalized_tip });
        }
        if block <= status.finalized_tip {
            return Ok(status);
        }

        let new_status = ChainStatus { finalized_tip: block, ..status };
        let mut batch = WriteBatch::new();
        put_status(&mut batch, &new_status);
        self.shared.store.storage().write(batch)?;

        self.shared.chain()?.status = new_status;
        info!(target: COMPONENT, block_number = block, "blocks finalized");
        Ok(new_status)
    }

    /// Discards the state of every block below `upto`.
    ///
    /// Forks and snapshots based on these blocks are invalidated, even if writing to the storage
    /// fails. The finalized tip is always retained, so the oldest historical block never passes
    /// it.
    ///
    /// # Errors
    /// Returns an error if:
    /// - blocks below `upto` were already pruned.
    /// - `upto` is beyond the finalized tip.
    /// - writing to the storage fails; the chain status is left unchanged.
    pub fn remove_historical_blocks(&self, upto: u64) -> Result<ChainStatus> {
        let _writer = self.writer.lock().map_err(StorageError::from)?;
        let status = self.status()?;

        if upto <= status.oldest_historical_block {
            return Err(WorldStateError::AlreadyPruned {
                block: upto,
                oldest: status.oldest_historical_block,
            });
        }
        let limit = status.finalized_tip;
        if upto > limit {
            return Err(WorldStateError::PruneBeyondFinalized { block: upto, limit });
        }

        let pruned = status.first_retained_block()..upto;
        let new_status = ChainStatus { oldest_historical_block: upto, ..status };

        let mut staged = self.shared.store.stage();
        for block in pruned.clone() {
            let record = self.shared.block_record(block)?;
            for (tree, snapshot) in record.state.iter() {
                staged.release_root(tree, self.shared.heights[tree], snapshot.root)?;
            }
            staged.batch_mut().delete(Column::Blocks, BlockRecord::key(block));
        }
        put_status(staged.batch_mut(), &new_status);

        let invalidated = {
            let mut chain = self.shared.chain()?;
            let invalidated = chain.registry.invalidate_below(upto);
            // views check their liveness under the chain lock, so none of them reads released
            // nodes while the batch is written
            staged.commit()?;
            chain.status = new_status;
            invalidated
        };

        info!(
            target: COMPONENT,
            from = pruned.start,
            upto,
            invalidated_forks = invalidated,
            "historical blocks removed"
        );
        Ok(new_status)
    }

    /// Discards the `count` most recent blocks, restoring the state of block `tip - count`.
    ///
    /// Forks and snapshots based on discarded blocks are invalidated. The finalized tip is an
    /// inclusive lower bound: unwinding to it is allowed, unwinding past it is not. If writing to
    /// the storage fails, the chain status is left unchanged.
    pub fn unwind_blocks(&self, count: u64) -> Result<ChainStatus> {
        let _writer = self.writer.lock().map_err(StorageError::from)?;
        let status = self.status()?;
        if count == 0 {
            return Ok(status);
        }

        let tip = status.unfinalized_tip;
        let finalized = status.finalized_tip;
        let target = match tip.checked_sub(count) {
            Some(target) if target >= finalized => target,
            target => {
                return Err(WorldStateError::CannotUnwindFinalized {
                    target: target.unwrap_or(0),
                    finalized,
                });
            },
        };
        if target < status.first_retained_block() {
            return Err(WorldStateError::AlreadyPruned {
                block: target,
                oldest: status.oldest_historical_block,
            });
        }

        let target_state = self.shared.block_record(target)?.state;
        let tip_forest = self.shared.forest_at(&self.shared.block_record(tip)?.state);
        let mut staged = self.shared.store.stage();

        // drop the positions of every leaf appended after the target block
        for (tree, snapshot) in target_state.iter() {
            let appended = snapshot.size..tip_forest.tree_info(tree).size;
            for index in appended {
                match tree.kind() {
                    TreeKind::AppendOnly => {
                        let leaf = tip_forest.get_leaf_hash(tree, index)?;
                        staged.unindex_appended(tree, &leaf, index);
                    },
                    TreeKind::Indexed => {
                        if let Some(leaf) = tip_forest.get_leaf_preimage(tree, index)? {
                            staged.unindex_value(tree, leaf.key(), index);
                        }
                    },
                }
            }
        }

        let new_status = ChainStatus { unfinalized_tip: target, ..status };
        for block in target + 1..=tip {
            let record = self.shared.block_record(block)?;
            for (tree, snapshot) in record.state.iter() {
                staged.release_root(tree, self.shared.heights[tree], snapshot.root)?;
            }
            staged.batch_mut().delete(Column::Blocks, BlockRecord::key(block));
        }
        put_status(staged.batch_mut(), &new_status);

        let invalidated = {
            let mut chain = self.shared.chain()?;
            let invalidated = chain.registry.invalidate_above(target);
            staged.commit()?;
            chain.status = new_status;
            invalidated
        };

        info!(
            target: COMPONENT,
            from = tip,
            to = target,
            invalidated_forks = invalidated,
            "blocks unwound"
        );
        Ok(new_status)
    }

    /// Flushes the storage and invalidates every fork and snapshot. Later calls fail with
    /// [WorldStateError::Closed].
    pub fn close(&self) -> Result<()> {
        let _writer = self.writer.lock().map_err(StorageError::from)?;
        let invalidated = {
            let mut chain = self.shared.chain()?;
            if chain.closed {
                return Ok(());
            }
            chain.closed = true;
            chain.registry.invalidate_all()
        };
        self.shared.store.storage().sync()?;
        info!(target: COMPONENT, invalidated_forks = invalidated, "world state closed");
        Ok(())
    }
}

// HELPERS
// ================================================================================================

fn put_status(batch: &mut WriteBatch, status: &ChainStatus) {
    batch.put(Column::Metadata, STATUS_KEY, status.to_bytes());
}

fn heights_to_bytes(heights: &TreeArray<u8>) -> Vec<u8> {
    heights.iter().map(|(_, height)| *height).collect()
}

fn read_metadata<S: Storage, T: Deserializable>(storage: &S, key: &[u8]) -> Result<Option<T>> {
    let Some(bytes) = storage.get(Column::Metadata, key)? else {
        return Ok(None);
    };
    Ok(Some(T::read_from_bytes(&bytes).map_err(StorageError::from)?))
}

/// Loads the chain status and genesis header persisted in `store`.
///
/// Returns `None` after wiping the storage if it holds no state, or the state of another chain.
fn load<S: Storage>(
    store: &NodeStore<S>,
    config: &WorldStateConfig,
) -> Result<Option<(ChainStatus, BlockHeader)>> {
    let storage = store.storage();
    let chain_id: Option<Word> = read_metadata(storage.as_ref(), CHAIN_ID_KEY)?;
    let status: Option<ChainStatus> = read_metadata(storage.as_ref(), STATUS_KEY)?;

    let status = match (chain_id, status) {
        (Some(chain_id), Some(status)) if chain_id == config.chain_id => status,
        (chain_id, _) => {
            if let Some(stored) = chain_id.filter(|stored| *stored != config.chain_id) {
                warn!(
                    target: COMPONENT,
                    %stored,
                    configured = %config.chain_id,
                    "chain id mismatch, wiping the world state"
                );
            }
            storage.clear()?;
            return Ok(None);
        },
    };

    let heights = storage.get(Column::Metadata, TREE_HEIGHTS_KEY)?.ok_or_else(|| {
        StorageError::Corrupted("tree heights are missing from the metadata".into())
    })?;
    if heights != heights_to_bytes(&config.tree_heights) {
        return Err(WorldStateError::InvalidConfig(format!(
            "the storage was created with tree heights {heights:?}"
        )));
    }

    let header = read_metadata(storage.as_ref(), GENESIS_HEADER_KEY)?.ok_or_else(|| {
        StorageError::Corrupted("genesis header is missing from the metadata".into())
    })?;
    Ok(Some((status, header)))
}

/// Writes the state of block 0: prefilled indexed trees, and the genesis header in the archive.
fn create_genesis<S: Storage>(
    store: &NodeStore<S>,
    config: &WorldStateConfig,
) -> Result<(ChainStatus, BlockHeader)> {
    let mut forest = MerkleForest::empty(store.clone(), config.tree_heights);
    for tree in TreeId::ALL.into_iter().filter(|tree| tree.is_indexed()) {
        forest.prefill(tree, config.prefill(tree))?;
    }

    let header = BlockHeader::genesis(StateReference::from(*forest.snapshots()));
    forest.append_leaves(TreeId::Archive, &[header.hash()])?;
    let record = BlockRecord {
        state: StateReference::from(*forest.snapshots()),
        header_hash: header.hash(),
    };
    let status = ChainStatus::default();

    let mut staged = store.stage();
    forest.stage_into(&mut staged)?;
    let batch = staged.batch_mut();
    batch.put(Column::Blocks, BlockRecord::key(0), record.to_bytes());
    batch.put(Column::Metadata, CHAIN_ID_KEY, config.chain_id.to_bytes());
    batch.put(Column::Metadata, TREE_HEIGHTS_KEY, heights_to_bytes(&config.tree_heights));
    batch.put(Column::Metadata, GENESIS_HEADER_KEY, header.to_bytes());
    put_status(batch, &status);
    staged.commit()?;

    info!(
        target: COMPONENT,
        archive_root = %record.state[TreeId::Archive].root,
        chain_id = %config.chain_id,
        "genesis state created"
    );
    Ok((status, header))
}
