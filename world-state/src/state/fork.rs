use std::sync::Arc;

use tracing::debug;

use super::{
    BlockBody, BlockHeader, COMPONENT, L2Block, Result, Shared, StateReference, WorldStateError,
    block::apply_effects,
};
use crate::{
    Felt, Word,
    merkle::{
        IndexedLeaf, IndexedLeafValue, LeafValue, MerkleError, MerkleForest, NullifierLeaf,
        PreviousValueIndex, PublicDataLeaf, SequentialInsertionResult, SiblingPath, TreeId,
        TreeInfo,
    },
    storage::Storage,
};

// STATE VIEW
// ================================================================================================

/// Read access to the trees of a world state, as seen by a [Fork] or a [Snapshot].
///
/// Every call fails with [WorldStateError::ForkNotFound] once the block the view is based on was
/// pruned or unwound.
pub trait StateView {
    type Storage: Storage;

    /// Returns the id the view is registered under.
    fn id(&self) -> u64;

    /// Returns the block the view was opened at.
    fn base_block(&self) -> u64;

    /// Runs a read-only operation against the trees of the view.
    fn read<T>(
        &self,
        op: impl FnOnce(&MerkleForest<Self::Storage>) -> Result<T, MerkleError>,
    ) -> Result<T>;

    // PROVIDED METHODS
    // --------------------------------------------------------------------------------------------

    fn get_tree_info(&self, tree: TreeId) -> Result<TreeInfo> {
        self.read(|forest| Ok(forest.tree_info(tree)))
    }

    fn get_state_reference(&self) -> Result<StateReference> {
        self.read(|forest| Ok(StateReference::from(*forest.snapshots())))
    }

    fn get_sibling_path(&self, tree: TreeId, index: u64) -> Result<SiblingPath> {
        self.read(|forest| forest.get_sibling_path(tree, index))
    }

    fn get_leaf_preimage(&self, tree: TreeId, index: u64) -> Result<Option<IndexedLeaf>> {
        self.read(|forest| forest.get_leaf_preimage(tree, index))
    }

    fn get_leaf_value(&self, tree: TreeId, index: u64) -> Result<Option<LeafValue>> {
        self.read(|forest| forest.get_leaf_value(tree, index))
    }

    fn find_leaf_index(&self, tree: TreeId, leaf: impl Into<LeafValue>) -> Result<Option<u64>> {
        self.find_leaf_index_after(tree, leaf, 0)
    }

    fn find_leaf_index_after(
        &self,
        tree: TreeId,
        leaf: impl Into<LeafValue>,
        start: u64,
    ) -> Result<Option<u64>> {
        let leaf = leaf.into();
        self.read(|forest| forest.find_leaf_index_after(tree, &leaf, start))
    }

    fn get_previous_value_index(&self, tree: TreeId, value: Felt) -> Result<PreviousValueIndex> {
        self.read(|forest| forest.get_previous_value_index(tree, value))
    }

    /// Returns the lowest index at or after `start` of each of `leaves`, in the same order.
    fn find_leaf_indices(
        &self,
        tree: TreeId,
        leaves: &[LeafValue],
        start: u64,
    ) -> Result<Vec<Option<u64>>> {
        self.read(|forest| {
            leaves.iter().map(|leaf| forest.find_leaf_index_after(tree, leaf, start)).collect()
        })
    }

    /// Returns the lowest index of each of `leaves` together with its sibling path.
    ///
    /// All paths are read from the same state, so they verify against a single root.
    fn find_sibling_paths(
        &self,
        tree: TreeId,
        leaves: &[LeafValue],
    ) -> Result<Vec<Option<(u64, SiblingPath)>>> {
        self.read(|forest| {
            leaves
                .iter()
                .map(|leaf| match forest.find_leaf_index_after(tree, leaf, 0)? {
                    Some(index) => Ok(Some((index, forest.get_sibling_path(tree, index)?))),
                    None => Ok(None),
                })
                .collect()
        })
    }
}

/// Runs `op` on behalf of view `id`.
///
/// Fails with [WorldStateError::ForkNotFound] if the view was invalidated before `op` started or
/// while it was running, whatever `op` returned.
fn run_on<S: Storage, F, T>(shared: &Shared<S>, id: u64, base_block: u64, op: F) -> Result<T>
where
    F: FnOnce() -> Result<T, MerkleError>,
{
    shared.check_live(id, base_block)?;
    let result = op();
    // a prune or unwind may have released the view's state while `op` was running
    shared.check_live(id, base_block)?;
    Ok(result?)
}

// FORK
// ================================================================================================

/// A private, mutable copy of the world state as of a retained block.
///
/// Creating a fork is O(1): it reads through to the committed store and keeps its own changes in
/// an overlay, so writes never affect the canonical chain or any other fork. Changes can be rolled
/// back in nested steps with checkpoints.
///
/// Dropping a fork closes it.
#[derive(Debug)]
pub struct Fork<S: Storage> {
    shared: Arc<Shared<S>>,
    id: u64,
    base_block: u64,
    forest: Option<MerkleForest<S>>,
}

impl<S: Storage> Fork<S> {
    pub(super) fn new(
        shared: Arc<Shared<S>>,
        id: u64,
        base_block: u64,
        forest: MerkleForest<S>,
    ) -> Self {
        debug!(target: COMPONENT, fork_id = id, block_number = base_block, "fork created");
        Self { shared, id, base_block, forest: Some(forest) }
    }

    // STATE MUTATORS
    // --------------------------------------------------------------------------------------------

    /// Appends leaves to an append-only tree.
    pub fn append_leaves(&mut self, tree: TreeId, leaves: &[Word]) -> Result<()> {
        self.write(|forest| forest.append_leaves(tree, leaves))
    }

    /// Inserts values into an indexed tree one at a time, returning the witnesses of every step.
    pub fn sequential_insert(
        &mut self,
        tree: TreeId,
        values: &[IndexedLeafValue],
    ) -> Result<SequentialInsertionResult> {
        self.write(|forest| forest.sequential_insert(tree, values))
    }

    /// Inserts nullifiers into the nullifier tree; an already present nullifier fails the batch.
    pub fn insert_nullifiers(&mut self, nullifiers: &[Felt]) -> Result<SequentialInsertionResult> {
        let values: Vec<IndexedLeafValue> =
            nullifiers.iter().map(|nullifier| NullifierLeaf::new(*nullifier).into()).collect();
        self.sequential_insert(TreeId::Nullifier, &values)
    }

    /// Writes values to public data slots, inserting new slots and updating existing ones.
    pub fn write_public_data(
        &mut self,
        writes: &[PublicDataLeaf],
    ) -> Result<SequentialInsertionResult> {
        let values: Vec<IndexedLeafValue> = writes.iter().map(|write| (*write).into()).collect();
        self.sequential_insert(TreeId::PublicData, &values)
    }

    /// Appends the hash of `header` to the archive tree.
    pub fn update_archive(&mut self, header: &BlockHeader) -> Result<()> {
        self.append_leaves(TreeId::Archive, &[header.hash()])
    }

    /// Applies the effects of a block to the fork, leaving the archive untouched.
    ///
    /// This is atomic: if any of the effects cannot be applied, the fork is left as it was.
    pub fn apply_block_effects(&mut self, body: &BlockBody, messages: &[Word]) -> Result<()> {
        self.write(|forest| forest.atomically(|forest| apply_effects(forest, body, messages)))
    }

    /// Builds block `block_number` on top of the fork.
    ///
    /// The effects of `body` and `messages` are applied, a header committing to the resulting
    /// state is produced and appended to the archive tree. The returned block can be handed to
    /// [super::WorldState::handle_block_and_messages] of a world state whose tip is the block
    /// this fork is based on.
    pub fn build_block(
        &mut self,
        block_number: u64,
        timestamp: u64,
        body: BlockBody,
        messages: &[Word],
    ) -> Result<L2Block> {
        let header = self.write(|forest| {
            forest.atomically(|forest| {
                apply_effects(forest, &body, messages)?;
                let state = StateReference::from(*forest.snapshots());
                let header = BlockHeader::new(block_number, timestamp, body.commitment(), state);
                forest.append_leaves(TreeId::Archive, &[header.hash()])?;
                Ok(header)
            })
        })?;
        Ok(L2Block::new(header, body))
    }

    // CHECKPOINTS
    // --------------------------------------------------------------------------------------------

    /// Opens a checkpoint on top of the checkpoint stack.
    pub fn create_checkpoint(&mut self) -> Result<()> {
        self.write(|forest| {
            forest.create_checkpoint();
            Ok(())
        })?;
        debug!(target: COMPONENT, fork_id = self.id, "checkpoint created");
        Ok(())
    }

    /// Closes the innermost checkpoint, keeping its changes as part of the enclosing one.
    pub fn commit_checkpoint(&mut self) -> Result<()> {
        self.write(|forest| forest.commit_checkpoint()).map_err(no_checkpoint)?;
        debug!(target: COMPONENT, fork_id = self.id, "checkpoint committed");
        Ok(())
    }

    /// Closes the innermost checkpoint, undoing every change made since it was opened.
    pub fn revert_checkpoint(&mut self) -> Result<()> {
        self.write(|forest| forest.revert_checkpoint()).map_err(no_checkpoint)?;
        debug!(target: COMPONENT, fork_id = self.id, "checkpoint reverted");
        Ok(())
    }

    /// Closes every open checkpoint, keeping all changes made since the outermost one.
    pub fn commit_all_checkpoints(&mut self) -> Result<()> {
        self.write(|forest| {
            forest.commit_all_checkpoints();
            Ok(())
        })?;
        debug!(target: COMPONENT, fork_id = self.id, "all checkpoints committed");
        Ok(())
    }

    /// Closes every open checkpoint, undoing every change made since the outermost one was
    /// opened. Does nothing if no checkpoint is open.
    pub fn revert_all_checkpoints(&mut self) -> Result<()> {
        self.write(|forest| {
            forest.revert_all_checkpoints();
            Ok(())
        })?;
        debug!(target: COMPONENT, fork_id = self.id, "all checkpoints reverted");
        Ok(())
    }

    // LIFECYCLE
    // --------------------------------------------------------------------------------------------

    /// Returns true if the fork was closed.
    pub fn is_closed(&self) -> bool {
        self.forest.is_none()
    }

    /// Releases the fork's overlay. Later calls fail with [WorldStateError::ForkClosed].
    pub fn close(&mut self) {
        if self.forest.take().is_some() {
            self.shared.deregister(self.id);
            debug!(target: COMPONENT, fork_id = self.id, "fork closed");
        }
    }

    // HELPERS
    // --------------------------------------------------------------------------------------------

    fn write<T>(
        &mut self,
        op: impl FnOnce(&mut MerkleForest<S>) -> Result<T, MerkleError>,
    ) -> Result<T> {
        let forest = self.forest.as_mut().ok_or(WorldStateError::ForkClosed { fork: self.id })?;
        run_on(&self.shared, self.id, self.base_block, || op(forest))
    }
}

impl<S: Storage> StateView for Fork<S> {
    type Storage = S;

    fn id(&self) -> u64 {
        self.id
    }

    fn base_block(&self) -> u64 {
        self.base_block
    }

    fn read<T>(&self, op: impl FnOnce(&MerkleForest<S>) -> Result<T, MerkleError>) -> Result<T> {
        let forest = self.forest.as_ref().ok_or(WorldStateError::ForkClosed { fork: self.id })?;
        run_on(&self.shared, self.id, self.base_block, || op(forest))
    }
}

impl<S: Storage> Drop for Fork<S> {
    fn drop(&mut self) {
        self.close();
    }
}

fn no_checkpoint(err: WorldStateError) -> WorldStateError {
    match err {
        WorldStateError::Merkle(MerkleError::NoCheckpoint) => WorldStateError::NoCheckpoint,
        err => err,
    }
}

// SNAPSHOT
// ================================================================================================

/// A read-only view of the world state as of a retained block.
#[derive(Debug)]
pub struct Snapshot<S: Storage> {
    shared: Arc<Shared<S>>,
    id: u64,
    block: u64,
    forest: MerkleForest<S>,
}

impl<S: Storage> Snapshot<S> {
    pub(super) fn new(shared: Arc<Shared<S>>, id: u64, block: u64, forest: MerkleForest<S>) -> Self {
        debug!(target: COMPONENT, fork_id = id, block_number = block, "snapshot opened");
        Self { shared, id, block, forest }
    }
}

impl<S: Storage> StateView for Snapshot<S> {
    type Storage = S;

    fn id(&self) -> u64 {
        self.id
    }

    fn base_block(&self) -> u64 {
        self.block
    }

    fn read<T>(&self, op: impl FnOnce(&MerkleForest<S>) -> Result<T, MerkleError>) -> Result<T> {
        run_on(&self.shared, self.id, self.block, || op(&self.forest))
    }
}

impl<S: Storage> Drop for Snapshot<S> {
    fn drop(&mut self) {
        self.shared.deregister(self.id);
    }
}
