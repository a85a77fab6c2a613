use std::{collections::HashMap, sync::Arc};

use super::{EmptySubtreeRoots, IndexedLeaf, InnerNode, MerkleError, Overlay, TreeId, TreeKind};
use crate::{
    Word,
    storage::{Column, Storage, StorageError, WriteBatch},
    utils::{Deserializable, Serializable},
};

// KEY LAYOUT
// ================================================================================================

const TREE_TAG_LEN: usize = 1;
const HASH_KEY_LEN: usize = TREE_TAG_LEN + Word::SERIALIZED_SIZE;
const VALUE_INDEX_KEY_LEN: usize = TREE_TAG_LEN + 8 + 8;
const APPENDED_INDEX_KEY_LEN: usize = TREE_TAG_LEN + Word::SERIALIZED_SIZE + 8;
const RC_LEN: usize = 8;

/// Key of a node or leaf preimage: `tree || hash`.
fn hash_key(tree: TreeId, hash: &Word) -> Vec<u8> {
    let mut key = Vec::with_capacity(HASH_KEY_LEN);
    key.push(tree.as_u8());
    key.extend_from_slice(&hash.as_bytes());
    key
}

/// Key of an indexed leaf position: `tree || key (BE) || index (BE)`.
fn value_index_key(tree: TreeId, key: u64, index: u64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(VALUE_INDEX_KEY_LEN);
    bytes.push(tree.as_u8());
    bytes.extend_from_slice(&key.to_be_bytes());
    bytes.extend_from_slice(&index.to_be_bytes());
    bytes
}

/// Key of an append-only leaf position: `tree || leaf || index (BE)`.
fn appended_index_key(tree: TreeId, leaf: &Word, index: u64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(APPENDED_INDEX_KEY_LEN);
    bytes.push(tree.as_u8());
    bytes.extend_from_slice(&leaf.as_bytes());
    bytes.extend_from_slice(&index.to_be_bytes());
    bytes
}

fn read_u64_be(bytes: &[u8], what: &'static str) -> Result<u64, StorageError> {
    let array: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StorageError::BadValueLen { what, expected: 8, found: bytes.len() })?;
    Ok(u64::from_be_bytes(array))
}

/// Splits a stored entry into its payload and trailing reference count.
fn split_rc<'a>(
    bytes: &'a [u8],
    what: &'static str,
) -> Result<(&'a [u8], u64), StorageError> {
    if bytes.len() < RC_LEN {
        return Err(StorageError::BadValueLen { what, expected: RC_LEN, found: bytes.len() });
    }
    let (payload, rc) = bytes.split_at(bytes.len() - RC_LEN);
    Ok((payload, read_u64_be(rc, what)?))
}

fn with_rc(payload: Vec<u8>, rc: u64) -> Vec<u8> {
    let mut bytes = payload;
    bytes.extend_from_slice(&rc.to_be_bytes());
    bytes
}

// NODE STORE
// ================================================================================================

/// The committed, content-addressed node store shared by the canonical state and all forks.
///
/// Nodes and leaf preimages are keyed by their hash and carry a reference count: one reference per
/// parent node and one per retained block whose root points at them. Zero subtrees are never
/// stored, they are recognised through [EmptySubtreeRoots]. Leaf positions are kept in a separate
/// lookup column so that predecessor searches never walk the trees.
///
/// Content is only ever added by committing a new block, and only removed for states that were
/// pruned or unwound; readers pinned to a retained block never observe either.
#[derive(Debug)]
pub struct NodeStore<S: Storage> {
    storage: Arc<S>,
}

impl<S: Storage> Clone for NodeStore<S> {
    fn clone(&self) -> Self {
        Self { storage: Arc::clone(&self.storage) }
    }
}

impl<S: Storage> NodeStore<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    // PUBLIC ACCESSORS
    // --------------------------------------------------------------------------------------------

    /// Returns the committed inner node with the provided hash.
    pub fn node(&self, tree: TreeId, hash: &Word) -> Result<Option<InnerNode>, StorageError> {
        Ok(self.node_entry(tree, hash)?.map(|(node, _)| node))
    }

    /// Returns the committed leaf preimage with the provided hash.
    pub fn leaf(&self, tree: TreeId, hash: &Word) -> Result<Option<IndexedLeaf>, StorageError> {
        Ok(self.leaf_entry(tree, hash)?.map(|(leaf, _)| leaf))
    }

    /// Returns the greatest committed key not above `key` whose leaf index is below `size`,
    /// together with that index.
    ///
    /// Leaf indices only grow, so filtering by `size` yields the view of any retained block.
    ///
    /// Each key is indexed once, so the search costs one storage seek plus one per key between
    /// the result and `key` that was inserted at or after `size`. At the tip this is a single
    /// seek; views of old blocks pay for the keys inserted since.
    pub fn floor_value(
        &self,
        tree: TreeId,
        key: u64,
        size: u64,
    ) -> Result<Option<(u64, u64)>, StorageError> {
        let mut seek_key = value_index_key(tree, key, u64::MAX);
        loop {
            let Some((found, _)) = self.storage.floor(Column::LeafIndices, &seek_key)? else {
                return Ok(None);
            };
            if found.first() != Some(&tree.as_u8()) {
                return Ok(None);
            }
            if found.len() != VALUE_INDEX_KEY_LEN {
                return Err(StorageError::BadKeyLen {
                    expected: VALUE_INDEX_KEY_LEN,
                    found: found.len(),
                });
            }
            let found_key = read_u64_be(&found[1..9], "leaf key")?;
            let index = read_u64_be(&found[9..], "leaf index")?;
            if index < size {
                return Ok(Some((found_key, index)));
            }
            // the entry belongs to a later block, continue strictly below it
            seek_key = if index > 0 {
                value_index_key(tree, found_key, index - 1)
            } else if found_key > 0 {
                value_index_key(tree, found_key - 1, u64::MAX)
            } else {
                return Ok(None);
            };
        }
    }

    /// Returns the committed index of the leaf with the provided key, if it is below `size`.
    pub fn value_index(
        &self,
        tree: TreeId,
        key: u64,
        size: u64,
    ) -> Result<Option<u64>, StorageError> {
        Ok(self
            .floor_value(tree, key, size)?
            .filter(|(found, _)| *found == key)
            .map(|(_, index)| index))
    }

    /// Returns the first committed index in `[start, size)` holding `leaf`.
    pub fn appended_index(
        &self,
        tree: TreeId,
        leaf: &Word,
        start: u64,
        size: u64,
    ) -> Result<Option<u64>, StorageError> {
        let seek_key = appended_index_key(tree, leaf, start);
        let Some((found, _)) = self.storage.ceiling(Column::LeafIndices, &seek_key)? else {
            return Ok(None);
        };
        if !found.starts_with(&seek_key[..HASH_KEY_LEN]) {
            return Ok(None);
        }
        if found.len() != APPENDED_INDEX_KEY_LEN {
            return Err(StorageError::BadKeyLen {
                expected: APPENDED_INDEX_KEY_LEN,
                found: found.len(),
            });
        }
        let index = read_u64_be(&found[HASH_KEY_LEN..], "leaf index")?;
        Ok((index < size).then_some(index))
    }

    /// Starts a set of changes to be committed to the store atomically.
    pub fn stage(&self) -> StagedUpdate<'_, S> {
        StagedUpdate {
            store: self,
            nodes: HashMap::new(),
            leaves: HashMap::new(),
            batch: WriteBatch::new(),
        }
    }

    // HELPERS
    // --------------------------------------------------------------------------------------------

    fn node_entry(
        &self,
        tree: TreeId,
        hash: &Word,
    ) -> Result<Option<(InnerNode, u64)>, StorageError> {
        let Some(bytes) = self.storage.get(Column::Nodes, &hash_key(tree, hash))? else {
            return Ok(None);
        };
        let (payload, rc) = split_rc(&bytes, "node")?;
        Ok(Some((InnerNode::read_from_bytes(payload)?, rc)))
    }

    fn leaf_entry(
        &self,
        tree: TreeId,
        hash: &Word,
    ) -> Result<Option<(IndexedLeaf, u64)>, StorageError> {
        let Some(bytes) = self.storage.get(Column::Leaves, &hash_key(tree, hash))? else {
            return Ok(None);
        };
        let (payload, rc) = split_rc(&bytes, "leaf")?;
        Ok(Some((IndexedLeaf::read_from_bytes(payload)?, rc)))
    }
}

// STAGED UPDATE
// ================================================================================================

/// A set of changes to a [NodeStore], written with a single atomic [WriteBatch].
///
/// Reference counts are tracked in memory while the update is being built, so the same node can
/// be retained or released any number of times before the batch is written.
pub struct StagedUpdate<'a, S: Storage> {
    store: &'a NodeStore<S>,
    nodes: HashMap<(TreeId, Word), Option<(InnerNode, u64)>>,
    leaves: HashMap<(TreeId, Word), Option<(IndexedLeaf, u64)>>,
    batch: WriteBatch,
}

impl<S: Storage> StagedUpdate<'_, S> {
    /// Adds a reference to the tree rooted at `root`, copying every node reachable from it that
    /// is not yet committed out of `overlay`.
    ///
    /// # Errors
    /// Returns an error if a node reachable from `root` is neither committed nor in `overlay`.
    pub fn retain_root(
        &mut self,
        tree: TreeId,
        height: u8,
        root: Word,
        overlay: &Overlay,
    ) -> Result<(), MerkleError> {
        self.retain(tree, root, height, overlay)
    }

    /// Drops a reference to the tree rooted at `root`, deleting nodes that are no longer
    /// referenced.
    pub fn release_root(&mut self, tree: TreeId, height: u8, root: Word) -> Result<(), MerkleError> {
        self.release(tree, root, height)
    }

    pub fn index_value(&mut self, tree: TreeId, key: u64, index: u64) {
        self.batch.put(Column::LeafIndices, value_index_key(tree, key, index), Vec::new());
    }

    pub fn unindex_value(&mut self, tree: TreeId, key: u64, index: u64) {
        self.batch.delete(Column::LeafIndices, value_index_key(tree, key, index));
    }

    pub fn index_appended(&mut self, tree: TreeId, leaf: &Word, index: u64) {
        self.batch.put(Column::LeafIndices, appended_index_key(tree, leaf, index), Vec::new());
    }

    pub fn unindex_appended(&mut self, tree: TreeId, leaf: &Word, index: u64) {
        self.batch.delete(Column::LeafIndices, appended_index_key(tree, leaf, index));
    }

    /// Returns the batch other records can be added to, to be written along with the staged
    /// tree changes.
    pub fn batch_mut(&mut self) -> &mut WriteBatch {
        &mut self.batch
    }

    /// Writes all staged changes to the underlying storage in one batch.
    pub fn commit(self) -> Result<(), StorageError> {
        let Self { store, nodes, leaves, mut batch } = self;
        for ((tree, hash), entry) in nodes {
            let key = hash_key(tree, &hash);
            match entry {
                Some((node, rc)) => batch.put(Column::Nodes, key, with_rc(node.to_bytes(), rc)),
                None => batch.delete(Column::Nodes, key),
            }
        }
        for ((tree, hash), entry) in leaves {
            let key = hash_key(tree, &hash);
            match entry {
                Some((leaf, rc)) => batch.put(Column::Leaves, key, with_rc(leaf.to_bytes(), rc)),
                None => batch.delete(Column::Leaves, key),
            }
        }
        store.storage.write(batch)
    }

    // HELPERS
    // --------------------------------------------------------------------------------------------

    fn retain(
        &mut self,
        tree: TreeId,
        hash: Word,
        level: u8,
        overlay: &Overlay,
    ) -> Result<(), MerkleError> {
        if hash == EmptySubtreeRoots::at_level(level) {
            return Ok(());
        }
        if level == 0 {
            return match tree.kind() {
                TreeKind::Indexed => self.retain_leaf(tree, hash, overlay),
                TreeKind::AppendOnly => Ok(()),
            };
        }

        match self.node_entry(tree, hash)? {
            Some((node, rc)) => {
                // already committed: its subtree is accounted for
                self.nodes.insert((tree, hash), Some((node, rc + 1)));
                Ok(())
            },
            None => {
                let node = *overlay.node(&hash).ok_or(MerkleError::NodeNotFound(tree, hash))?;
                self.nodes.insert((tree, hash), Some((node, 1)));
                self.retain(tree, node.left, level - 1, overlay)?;
                self.retain(tree, node.right, level - 1, overlay)
            },
        }
    }

    fn retain_leaf(&mut self, tree: TreeId, hash: Word, overlay: &Overlay) -> Result<(), MerkleError> {
        let entry = match self.leaf_entry(tree, hash)? {
            Some((leaf, rc)) => (leaf, rc + 1),
            None => {
                let leaf =
                    *overlay.leaf(&hash).ok_or(MerkleError::LeafPreimageNotFound(tree, hash))?;
                (leaf, 1)
            },
        };
        self.leaves.insert((tree, hash), Some(entry));
        Ok(())
    }

    fn release(&mut self, tree: TreeId, hash: Word, level: u8) -> Result<(), MerkleError> {
        if hash == EmptySubtreeRoots::at_level(level) {
            return Ok(());
        }
        if level == 0 {
            return match tree.kind() {
                TreeKind::Indexed => self.release_leaf(tree, hash),
                TreeKind::AppendOnly => Ok(()),
            };
        }

        let (node, rc) = self.node_entry(tree, hash)?.ok_or(MerkleError::NodeNotFound(tree, hash))?;
        debug_assert!(rc > 0, "stored nodes are always referenced");
        if rc > 1 {
            self.nodes.insert((tree, hash), Some((node, rc - 1)));
            return Ok(());
        }

        self.nodes.insert((tree, hash), None);
        self.release(tree, node.left, level - 1)?;
        self.release(tree, node.right, level - 1)
    }

    fn release_leaf(&mut self, tree: TreeId, hash: Word) -> Result<(), MerkleError> {
        let (leaf, rc) = self
            .leaf_entry(tree, hash)?
            .ok_or(MerkleError::LeafPreimageNotFound(tree, hash))?;
        let entry = (rc > 1).then_some((leaf, rc - 1));
        self.leaves.insert((tree, hash), entry);
        Ok(())
    }

    /// Returns the node entry as seen by this update: staged if touched, committed otherwise.
    fn node_entry(
        &self,
        tree: TreeId,
        hash: Word,
    ) -> Result<Option<(InnerNode, u64)>, StorageError> {
        match self.nodes.get(&(tree, hash)) {
            Some(entry) => Ok(*entry),
            None => self.store.node_entry(tree, &hash),
        }
    }

    fn leaf_entry(
        &self,
        tree: TreeId,
        hash: Word,
    ) -> Result<Option<(IndexedLeaf, u64)>, StorageError> {
        match self.leaves.get(&(tree, hash)) {
            Some(entry) => Ok(*entry),
            None => self.store.leaf_entry(tree, &hash),
        }
    }
}
