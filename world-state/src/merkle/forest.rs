use super::{
    EmptySubtreeRoots, IndexedLeaf, IndexedLeafValue, InnerNode, LeafUpdateWitness, LeafValue,
    LowLeafWitness, MerkleError, NodeIndex, NodeStore, Overlay, SequentialInsertionResult,
    SiblingPath, StagedUpdate, TreeArray, TreeId, TreeInfo, TreeKind, TreeSnapshot,
    tree::capacity,
};
use crate::{Felt, Word, ZERO, storage::Storage};

// PREVIOUS VALUE INDEX
// ================================================================================================

/// Result of a predecessor search in an indexed tree.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PreviousValueIndex {
    /// Index of the leaf with the greatest key lower than or equal to the searched value.
    pub index: u64,
    /// True if the key of that leaf equals the searched value.
    pub already_present: bool,
}

// MERKLE FOREST
// ================================================================================================

/// The five trees of the world state as seen from one base block, plus a private overlay of
/// changes made on top of it.
///
/// Reads go to the overlay first and fall back to the committed [NodeStore]; writes only ever
/// touch the overlay. Creating a forest is O(1): nothing is copied from the committed store.
///
/// Committed leaf positions are filtered by the sizes of the base block, so a forest pinned to a
/// historical block never sees leaves appended by later blocks.
#[derive(Debug)]
pub struct MerkleForest<S: Storage> {
    store: NodeStore<S>,
    heights: TreeArray<u8>,
    base: TreeArray<TreeSnapshot>,
    trees: TreeArray<TreeSnapshot>,
    overlay: Overlay,
}

impl<S: Storage> MerkleForest<S> {
    // CONSTRUCTORS
    // --------------------------------------------------------------------------------------------

    /// Returns a forest over the committed state identified by `base`.
    pub fn new(store: NodeStore<S>, heights: TreeArray<u8>, base: TreeArray<TreeSnapshot>) -> Self {
        Self {
            store,
            heights,
            base,
            trees: base,
            overlay: Overlay::new(),
        }
    }

    /// Returns a forest of empty trees.
    pub fn empty(store: NodeStore<S>, heights: TreeArray<u8>) -> Self {
        let base = heights.map(|_, height| TreeSnapshot::empty(*height));
        Self::new(store, heights, base)
    }

    // PUBLIC ACCESSORS
    // --------------------------------------------------------------------------------------------

    pub fn store(&self) -> &NodeStore<S> {
        &self.store
    }

    pub fn height(&self, tree: TreeId) -> u8 {
        self.heights[tree]
    }

    pub fn heights(&self) -> &TreeArray<u8> {
        &self.heights
    }

    /// Returns the current `(root, size)` of every tree.
    pub fn snapshots(&self) -> &TreeArray<TreeSnapshot> {
        &self.trees
    }

    pub fn tree_info(&self, tree: TreeId) -> TreeInfo {
        let TreeSnapshot { root, size } = self.trees[tree];
        TreeInfo { tree_id: tree, root, size, depth: self.heights[tree] }
    }

    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    /// Returns the hash stored at leaf `index`; unoccupied slots hold the empty leaf.
    pub fn get_leaf_hash(&self, tree: TreeId, index: u64) -> Result<Word, MerkleError> {
        self.open(tree, index).map(|(leaf, _)| leaf)
    }

    /// Returns the sibling path of leaf `index`, which may be an unoccupied slot.
    ///
    /// # Errors
    /// Returns an error if `index` is beyond the capacity of the tree, or if a node on the way to
    /// the leaf is missing from the store.
    pub fn get_sibling_path(&self, tree: TreeId, index: u64) -> Result<SiblingPath, MerkleError> {
        self.open(tree, index).map(|(_, path)| path)
    }

    /// Returns the preimage of the indexed tree leaf at `index`, or `None` if the slot is not
    /// occupied.
    pub fn get_leaf_preimage(
        &self,
        tree: TreeId,
        index: u64,
    ) -> Result<Option<IndexedLeaf>, MerkleError> {
        self.require_kind(tree, TreeKind::Indexed, "get_leaf_preimage")?;
        if index >= self.trees[tree].size {
            return Ok(None);
        }
        let hash = self.get_leaf_hash(tree, index)?;
        self.preimage(tree, hash).map(Some)
    }

    /// Returns the value of the leaf at `index`, or `None` if the slot is not occupied.
    pub fn get_leaf_value(&self, tree: TreeId, index: u64) -> Result<Option<LeafValue>, MerkleError> {
        match tree.kind() {
            TreeKind::AppendOnly if index >= self.trees[tree].size => Ok(None),
            TreeKind::AppendOnly => self.get_leaf_hash(tree, index).map(|leaf| Some(leaf.into())),
            TreeKind::Indexed => Ok(self
                .get_leaf_preimage(tree, index)?
                .map(|preimage| LeafValue::Indexed(preimage.value))),
        }
    }

    /// Returns the lowest index at or after `start` holding `leaf`.
    ///
    /// Append-only trees are searched by leaf value, indexed trees by key: a public data write
    /// is found through its slot, regardless of the value currently stored in it.
    pub fn find_leaf_index_after(
        &self,
        tree: TreeId,
        leaf: &LeafValue,
        start: u64,
    ) -> Result<Option<u64>, MerkleError> {
        let base_size = self.base[tree].size;
        match (tree.kind(), leaf) {
            (TreeKind::AppendOnly, LeafValue::Append(word)) => {
                match self.store.appended_index(tree, word, start, base_size)? {
                    Some(index) => Ok(Some(index)),
                    None => Ok(self.overlay.appended_index(tree, word, start)),
                }
            },
            (TreeKind::Indexed, LeafValue::Indexed(value)) if value.belongs_to(tree) => {
                let key = value.key_u64();
                let index = match self.store.value_index(tree, key, base_size)? {
                    Some(index) => Some(index),
                    None => self.overlay.value_index(tree, key),
                };
                Ok(index.filter(|index| *index >= start))
            },
            _ => Err(MerkleError::LeafKindMismatch { tree }),
        }
    }

    /// Finds the leaf with the greatest key lower than or equal to `value`.
    ///
    /// The search runs over the key-to-index lookups and never walks the tree.
    pub fn get_previous_value_index(
        &self,
        tree: TreeId,
        value: Felt,
    ) -> Result<PreviousValueIndex, MerkleError> {
        self.require_kind(tree, TreeKind::Indexed, "get_previous_value_index")?;
        let key = value.as_int();

        let committed = self.store.floor_value(tree, key, self.base[tree].size)?;
        let local = self.overlay.floor_value(tree, key);
        let (found, index) = match (committed, local) {
            (Some(committed), Some(local)) => committed.max(local),
            (committed, local) => {
                committed.or(local).ok_or(MerkleError::LowLeafNotFound { tree, key })?
            },
        };

        Ok(PreviousValueIndex { index, already_present: found == key })
    }

    // STATE MUTATORS
    // --------------------------------------------------------------------------------------------

    /// Appends `leaves` to an append-only tree.
    ///
    /// # Errors
    /// Returns an error if:
    /// - the tree is an indexed tree.
    /// - the leaves do not fit in the tree; in this case nothing is appended.
    pub fn append_leaves(&mut self, tree: TreeId, leaves: &[Word]) -> Result<(), MerkleError> {
        self.require_kind(tree, TreeKind::AppendOnly, "append_leaves")?;
        let size = self.trees[tree].size;
        self.check_capacity(tree, leaves.len() as u64)?;

        self.atomically(|forest| {
            for (index, leaf) in (size..).zip(leaves) {
                forest.set_leaf(tree, index, *leaf)?;
                forest.overlay.insert_appended(tree, *leaf, index);
            }
            forest.trees[tree].size = size + leaves.len() as u64;
            Ok(())
        })
    }

    /// Inserts `values` into an indexed tree one at a time, producing a witness for every step.
    ///
    /// A value whose key is already present is rejected for the nullifier tree and overwrites the
    /// existing slot for the public data tree. Empty values are skipped and produce padding
    /// witnesses. The batch is atomic: on error, the tree is left as it was.
    pub fn sequential_insert(
        &mut self,
        tree: TreeId,
        values: &[IndexedLeafValue],
    ) -> Result<SequentialInsertionResult, MerkleError> {
        self.require_kind(tree, TreeKind::Indexed, "sequential_insert")?;
        if values.iter().any(|value| !value.belongs_to(tree)) {
            return Err(MerkleError::LeafKindMismatch { tree });
        }

        self.atomically(|forest| {
            let mut result = SequentialInsertionResult::default();
            for value in values {
                forest.insert_one(tree, *value, &mut result)?;
            }
            Ok(result)
        })
    }

    /// Fills an empty indexed tree with `count` leaves keyed `0..count`, linked in order.
    pub fn prefill(&mut self, tree: TreeId, count: u64) -> Result<(), MerkleError> {
        self.require_kind(tree, TreeKind::Indexed, "prefill")?;
        if self.trees[tree].size != 0 {
            return Err(MerkleError::UnsupportedOperation { tree, operation: "prefill" });
        }
        self.check_capacity(tree, count)?;

        self.atomically(|forest| {
            for index in 0..count {
                let (next_index, next_value) = if index + 1 == count {
                    (0, ZERO)
                } else {
                    (index + 1, Felt::new(index + 1))
                };
                let value = IndexedLeafValue::padding(tree, index)?;
                forest.write_indexed_leaf(tree, index, IndexedLeaf::new(value, next_index, next_value))?;
                forest.overlay.insert_value(tree, index, index);
            }
            forest.trees[tree].size = count;
            Ok(())
        })
    }

    /// Opens a checkpoint; changes made after it can be reverted as a whole.
    pub fn create_checkpoint(&mut self) {
        self.overlay.checkpoint(self.trees);
    }

    /// Closes the innermost checkpoint, keeping its changes.
    pub fn commit_checkpoint(&mut self) -> Result<(), MerkleError> {
        self.overlay.commit_checkpoint()
    }

    /// Closes the innermost checkpoint, restoring every tree to the state it had when the
    /// checkpoint was created.
    pub fn revert_checkpoint(&mut self) -> Result<(), MerkleError> {
        self.trees = self.overlay.revert_checkpoint()?;
        Ok(())
    }

    /// Closes every open checkpoint, keeping all changes.
    pub fn commit_all_checkpoints(&mut self) {
        self.overlay.commit_all_checkpoints();
    }

    /// Closes every open checkpoint, restoring every tree to the state it had when the outermost
    /// checkpoint was created. Does nothing if no checkpoint is open.
    pub fn revert_all_checkpoints(&mut self) {
        if let Some(trees) = self.overlay.revert_all_checkpoints() {
            self.trees = trees;
        }
    }

    /// Stages the current state of every tree for commitment: each root gains a reference and
    /// every node, leaf preimage and leaf position written by this forest is carried over.
    pub fn stage_into(&self, staged: &mut StagedUpdate<'_, S>) -> Result<(), MerkleError> {
        for (tree, snapshot) in self.trees.iter() {
            staged.retain_root(tree, self.heights[tree], snapshot.root, &self.overlay)?;
            match tree.kind() {
                TreeKind::Indexed => {
                    for (key, index) in self.overlay.values(tree) {
                        staged.index_value(tree, key, index);
                    }
                },
                TreeKind::AppendOnly => {
                    for (leaf, index) in self.overlay.appended(tree) {
                        staged.index_appended(tree, &leaf, index);
                    }
                },
            }
        }
        Ok(())
    }

    // HELPERS
    // --------------------------------------------------------------------------------------------

    fn insert_one(
        &mut self,
        tree: TreeId,
        value: IndexedLeafValue,
        result: &mut SequentialInsertionResult,
    ) -> Result<(), MerkleError> {
        let height = self.heights[tree];
        if value.is_empty() {
            let padding = LeafUpdateWitness::padding(tree, height)?;
            result.low_leaf_witnesses.push(LowLeafWitness {
                before: padding.clone(),
                after: padding.clone(),
            });
            result.insertion_witnesses.push(padding);
            return Ok(());
        }

        let PreviousValueIndex { index: low_index, already_present } =
            self.get_previous_value_index(tree, value.key())?;
        let (low_hash, low_path) = self.open(tree, low_index)?;
        let low_leaf = self.preimage(tree, low_hash)?;
        let before = LeafUpdateWitness::new(low_leaf, low_index, low_path.clone());

        if already_present {
            if let IndexedLeafValue::Nullifier(_) = value {
                return Err(MerkleError::DuplicateLeaf { tree, value: value.key() });
            }
            // the leaf's own siblings are unaffected by rewriting it
            let updated = IndexedLeaf { value, ..low_leaf };
            self.write_indexed_leaf(tree, low_index, updated)?;
            result.low_leaf_witnesses.push(LowLeafWitness {
                before,
                after: LeafUpdateWitness::new(updated, low_index, low_path),
            });
            result.insertion_witnesses.push(LeafUpdateWitness::padding(tree, height)?);
            return Ok(());
        }

        self.check_capacity(tree, 1)?;
        let new_index = self.trees[tree].size;

        let updated_low = IndexedLeaf::new(low_leaf.value, new_index, value.key());
        self.write_indexed_leaf(tree, low_index, updated_low)?;
        let after = LeafUpdateWitness::new(updated_low, low_index, low_path);

        let new_leaf = IndexedLeaf::new(value, low_leaf.next_index, low_leaf.next_value);
        let insertion_path = self.get_sibling_path(tree, new_index)?;
        self.write_indexed_leaf(tree, new_index, new_leaf)?;
        self.overlay.insert_value(tree, value.key_u64(), new_index);
        self.trees[tree].size = new_index + 1;

        result.low_leaf_witnesses.push(LowLeafWitness { before, after });
        result
            .insertion_witnesses
            .push(LeafUpdateWitness::new(new_leaf, new_index, insertion_path));
        Ok(())
    }

    /// Runs `op`, reverting every change it made if it fails.
    pub(crate) fn atomically<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> Result<T, MerkleError>,
    ) -> Result<T, MerkleError> {
        self.create_checkpoint();
        match op(self) {
            Ok(value) => {
                self.commit_checkpoint()?;
                Ok(value)
            },
            Err(err) => {
                self.revert_checkpoint()?;
                Err(err)
            },
        }
    }

    fn require_kind(
        &self,
        tree: TreeId,
        kind: TreeKind,
        operation: &'static str,
    ) -> Result<(), MerkleError> {
        if tree.kind() != kind {
            return Err(MerkleError::UnsupportedOperation { tree, operation });
        }
        Ok(())
    }

    fn check_capacity(&self, tree: TreeId, appended: u64) -> Result<(), MerkleError> {
        let size = self.trees[tree].size;
        let capacity = capacity(self.heights[tree]);
        match size.checked_add(appended) {
            Some(end) if end <= capacity => Ok(()),
            _ => Err(MerkleError::CapacityExceeded { tree, size, appended, capacity }),
        }
    }

    /// Walks from the root to leaf `index`, returning the leaf hash and its sibling path.
    fn open(&self, tree: TreeId, index: u64) -> Result<(Word, SiblingPath), MerkleError> {
        let height = self.heights[tree];
        let capacity = capacity(height);
        if index >= capacity {
            return Err(MerkleError::LeafIndexOutOfRange { tree, index, capacity });
        }

        let mut hash = self.trees[tree].root;
        let mut siblings = Vec::with_capacity(height.into());
        for level in (1..=height).rev() {
            let node = self.children(tree, hash, level)?;
            if (index >> (level - 1)) & 1 == 1 {
                siblings.push(node.left);
                hash = node.right;
            } else {
                siblings.push(node.right);
                hash = node.left;
            }
        }
        siblings.reverse();

        Ok((hash, SiblingPath::new(siblings)))
    }

    /// Returns the children of the node with `hash` sitting `level` levels above the leaves.
    fn children(&self, tree: TreeId, hash: Word, level: u8) -> Result<InnerNode, MerkleError> {
        if hash == EmptySubtreeRoots::at_level(level) {
            let child = EmptySubtreeRoots::at_level(level - 1);
            return Ok(InnerNode { left: child, right: child });
        }
        if let Some(node) = self.overlay.node(&hash) {
            return Ok(*node);
        }
        self.store.node(tree, &hash)?.ok_or(MerkleError::NodeNotFound(tree, hash))
    }

    fn preimage(&self, tree: TreeId, hash: Word) -> Result<IndexedLeaf, MerkleError> {
        if let Some(leaf) = self.overlay.leaf(&hash) {
            return Ok(*leaf);
        }
        self.store.leaf(tree, &hash)?.ok_or(MerkleError::LeafPreimageNotFound(tree, hash))
    }

    fn write_indexed_leaf(
        &mut self,
        tree: TreeId,
        index: u64,
        leaf: IndexedLeaf,
    ) -> Result<(), MerkleError> {
        let hash = leaf.hash();
        self.overlay.insert_leaf(hash, leaf);
        self.set_leaf(tree, index, hash)
    }

    /// Writes `leaf` at `index` and recomputes the nodes on the path to the root.
    fn set_leaf(&mut self, tree: TreeId, index: u64, leaf: Word) -> Result<(), MerkleError> {
        let path = self.get_sibling_path(tree, index)?;
        let mut node_index = NodeIndex::new(self.heights[tree], index)?;

        let mut hash = leaf;
        for (level, sibling) in (1..).zip(path.iter()) {
            let [left, right] = node_index.build_node(hash, *sibling);
            let node = InnerNode { left, right };
            hash = node.hash();
            if hash != EmptySubtreeRoots::at_level(level) {
                self.overlay.insert_node(hash, node);
            }
            node_index.move_up();
        }
        self.trees[tree].root = hash;

        Ok(())
    }
}
