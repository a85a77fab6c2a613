use std::collections::HashMap;

use super::{IndexedLeaf, InnerNode, MerkleError, TreeArray, TreeId, TreeSnapshot};
use crate::{Map, Word};

// OVERLAY
// ================================================================================================

/// Tree data written by a fork on top of the committed store.
///
/// The overlay only ever grows while the fork is used; a checkpoint records the length of an
/// undo journal, and reverting it removes every entry inserted after that point. Nodes and leaf
/// preimages are content addressed, so entries left behind by superseded roots are harmless and
/// are simply not carried over when the overlay is committed.
#[derive(Debug, Default)]
pub struct Overlay {
    nodes: HashMap<Word, InnerNode>,
    leaves: HashMap<Word, IndexedLeaf>,
    /// Keys of indexed leaves appended by this fork, mapped to their leaf index.
    values: TreeArray<Map<u64, u64>>,
    /// Leaves appended to append-only trees by this fork, mapped to their leaf indices in
    /// ascending order.
    appended: TreeArray<HashMap<Word, Vec<u64>>>,
    journal: Vec<JournalEntry>,
    checkpoints: Vec<Checkpoint>,
}

#[derive(Debug, Copy, Clone)]
enum JournalEntry {
    Node(Word),
    Leaf(Word),
    Value { tree: TreeId, key: u64 },
    Appended { tree: TreeId, leaf: Word },
}

#[derive(Debug, Clone)]
struct Checkpoint {
    trees: TreeArray<TreeSnapshot>,
    journal_len: usize,
}

impl Overlay {
    pub fn new() -> Self {
        Self::default()
    }

    // PUBLIC ACCESSORS
    // --------------------------------------------------------------------------------------------

    pub fn node(&self, hash: &Word) -> Option<&InnerNode> {
        self.nodes.get(hash)
    }

    pub fn leaf(&self, hash: &Word) -> Option<&IndexedLeaf> {
        self.leaves.get(hash)
    }

    /// Returns the greatest key not above `key` written to `tree` by this fork, with its index.
    pub fn floor_value(&self, tree: TreeId, key: u64) -> Option<(u64, u64)> {
        self.values[tree].range(..=key).next_back().map(|(key, index)| (*key, *index))
    }

    pub fn value_index(&self, tree: TreeId, key: u64) -> Option<u64> {
        self.values[tree].get(&key).copied()
    }

    /// Returns the first index at or after `start` at which this fork appended `leaf` to `tree`.
    pub fn appended_index(&self, tree: TreeId, leaf: &Word, start: u64) -> Option<u64> {
        self.appended[tree].get(leaf)?.iter().copied().find(|index| *index >= start)
    }

    /// Returns the `(key, index)` pairs of every indexed leaf appended to `tree` by this fork.
    pub fn values(&self, tree: TreeId) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.values[tree].iter().map(|(key, index)| (*key, *index))
    }

    /// Returns the `(leaf, index)` pairs of every leaf appended to `tree` by this fork.
    pub fn appended(&self, tree: TreeId) -> impl Iterator<Item = (Word, u64)> + '_ {
        self.appended[tree]
            .iter()
            .flat_map(|(leaf, indices)| indices.iter().map(move |index| (*leaf, *index)))
    }

    // STATE MUTATORS
    // --------------------------------------------------------------------------------------------

    pub fn insert_node(&mut self, hash: Word, node: InnerNode) {
        if self.nodes.insert(hash, node).is_none() {
            self.record(JournalEntry::Node(hash));
        }
    }

    pub fn insert_leaf(&mut self, hash: Word, leaf: IndexedLeaf) {
        if self.leaves.insert(hash, leaf).is_none() {
            self.record(JournalEntry::Leaf(hash));
        }
    }

    pub fn insert_value(&mut self, tree: TreeId, key: u64, index: u64) {
        if self.values[tree].insert(key, index).is_none() {
            self.record(JournalEntry::Value { tree, key });
        }
    }

    pub fn insert_appended(&mut self, tree: TreeId, leaf: Word, index: u64) {
        self.appended[tree].entry(leaf).or_default().push(index);
        self.record(JournalEntry::Appended { tree, leaf });
    }

    /// Opens a checkpoint capturing the provided tree snapshots.
    pub fn checkpoint(&mut self, trees: TreeArray<TreeSnapshot>) {
        self.checkpoints.push(Checkpoint { trees, journal_len: self.journal.len() });
    }

    /// Closes the innermost checkpoint, keeping its changes.
    ///
    /// The changes become part of the enclosing checkpoint, if there is one.
    pub fn commit_checkpoint(&mut self) -> Result<(), MerkleError> {
        self.checkpoints.pop().ok_or(MerkleError::NoCheckpoint)?;
        if self.checkpoints.is_empty() {
            self.journal.clear();
        }
        Ok(())
    }

    /// Closes the innermost checkpoint, discarding its changes.
    ///
    /// Returns the tree snapshots captured when the checkpoint was opened.
    pub fn revert_checkpoint(&mut self) -> Result<TreeArray<TreeSnapshot>, MerkleError> {
        let checkpoint = self.checkpoints.pop().ok_or(MerkleError::NoCheckpoint)?;
        self.rewind(checkpoint.journal_len);
        Ok(checkpoint.trees)
    }

    /// Closes every open checkpoint, keeping all changes. Does nothing if none is open.
    pub fn commit_all_checkpoints(&mut self) {
        self.checkpoints.clear();
        self.journal.clear();
    }

    /// Closes every open checkpoint, discarding every change made since the outermost one.
    ///
    /// Returns the tree snapshots captured by the outermost checkpoint, or `None` if no
    /// checkpoint was open.
    pub fn revert_all_checkpoints(&mut self) -> Option<TreeArray<TreeSnapshot>> {
        self.checkpoints.truncate(1);
        let outermost = self.checkpoints.pop()?;
        self.rewind(outermost.journal_len);
        Some(outermost.trees)
    }

    // HELPERS
    // --------------------------------------------------------------------------------------------

    /// Undoes journal entries until the journal is `len` entries long.
    fn rewind(&mut self, len: usize) {
        while self.journal.len() > len {
            let Some(entry) = self.journal.pop() else { break };
            self.undo(entry);
        }
    }

    fn record(&mut self, entry: JournalEntry) {
        // without an open checkpoint nothing can be reverted
        if !self.checkpoints.is_empty() {
            self.journal.push(entry);
        }
    }

    fn undo(&mut self, entry: JournalEntry) {
        match entry {
            JournalEntry::Node(hash) => {
                self.nodes.remove(&hash);
            },
            JournalEntry::Leaf(hash) => {
                self.leaves.remove(&hash);
            },
            JournalEntry::Value { tree, key } => {
                self.values[tree].remove(&key);
            },
            JournalEntry::Appended { tree, leaf } => {
                if let Some(indices) = self.appended[tree].get_mut(&leaf) {
                    indices.pop();
                    if indices.is_empty() {
                        self.appended[tree].remove(&leaf);
                    }
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::merkle::int_to_node;

    fn snapshots(size: u64) -> TreeArray<TreeSnapshot> {
        TreeArray::from_fn(|_| TreeSnapshot::new(Word::empty(), size))
    }

    #[test]
    fn revert_removes_entries_inserted_after_the_checkpoint() {
        let mut overlay = Overlay::new();
        let node = InnerNode { left: int_to_node(1), right: int_to_node(2) };
        overlay.insert_node(node.hash(), node);
        overlay.insert_value(TreeId::Nullifier, 5, 1);

        overlay.checkpoint(snapshots(1));
        let other = InnerNode { left: int_to_node(3), right: int_to_node(4) };
        overlay.insert_node(other.hash(), other);
        overlay.insert_value(TreeId::Nullifier, 7, 2);
        overlay.insert_appended(TreeId::NoteHash, int_to_node(9), 0);

        let trees = overlay.revert_checkpoint().unwrap();
        assert_eq!(trees, snapshots(1));
        assert!(overlay.node(&node.hash()).is_some());
        assert!(overlay.node(&other.hash()).is_none());
        assert_eq!(overlay.value_index(TreeId::Nullifier, 5), Some(1));
        assert_eq!(overlay.value_index(TreeId::Nullifier, 7), None);
        assert_eq!(overlay.appended_index(TreeId::NoteHash, &int_to_node(9), 0), None);
    }

    #[test]
    fn committed_inner_checkpoint_is_reverted_by_the_outer_one() {
        let mut overlay = Overlay::new();
        overlay.checkpoint(snapshots(0));
        overlay.checkpoint(snapshots(1));
        overlay.insert_value(TreeId::PublicData, 3, 0);
        overlay.commit_checkpoint().unwrap();
        assert_eq!(overlay.value_index(TreeId::PublicData, 3), Some(0));

        assert_eq!(overlay.revert_checkpoint().unwrap(), snapshots(0));
        assert_eq!(overlay.value_index(TreeId::PublicData, 3), None);
        assert_matches!(overlay.revert_checkpoint(), Err(MerkleError::NoCheckpoint));
    }

    #[test]
    fn reverting_all_checkpoints_returns_to_the_outermost_one() {
        let mut overlay = Overlay::new();
        overlay.insert_value(TreeId::Nullifier, 1, 1);
        overlay.checkpoint(snapshots(2));
        overlay.insert_value(TreeId::Nullifier, 2, 2);
        overlay.checkpoint(snapshots(3));
        overlay.insert_value(TreeId::Nullifier, 3, 3);
        overlay.checkpoint(snapshots(4));

        assert_eq!(overlay.revert_all_checkpoints(), Some(snapshots(2)));
        assert_eq!(overlay.value_index(TreeId::Nullifier, 1), Some(1));
        assert_eq!(overlay.value_index(TreeId::Nullifier, 2), None);
        assert_eq!(overlay.value_index(TreeId::Nullifier, 3), None);
        assert_eq!(overlay.revert_all_checkpoints(), None);
    }

    #[test]
    fn committing_all_checkpoints_keeps_every_change() {
        let mut overlay = Overlay::new();
        overlay.checkpoint(snapshots(0));
        overlay.insert_value(TreeId::PublicData, 4, 0);
        overlay.checkpoint(snapshots(1));
        overlay.insert_appended(TreeId::NoteHash, int_to_node(5), 0);

        overlay.commit_all_checkpoints();
        assert_matches!(overlay.commit_checkpoint(), Err(MerkleError::NoCheckpoint));
        assert_eq!(overlay.value_index(TreeId::PublicData, 4), Some(0));
        assert_eq!(overlay.appended_index(TreeId::NoteHash, &int_to_node(5), 0), Some(0));
        // a later checkpoint cannot undo committed changes
        overlay.checkpoint(snapshots(2));
        assert_eq!(overlay.revert_all_checkpoints(), Some(snapshots(2)));
        assert_eq!(overlay.value_index(TreeId::PublicData, 4), Some(0));
    }

    #[test]
    fn closing_without_a_checkpoint_fails() {
        let mut overlay = Overlay::new();
        assert_matches!(overlay.commit_checkpoint(), Err(MerkleError::NoCheckpoint));
        assert_matches!(overlay.revert_checkpoint(), Err(MerkleError::NoCheckpoint));
    }

    #[test]
    fn appended_indices_are_searched_from_start() {
        let mut overlay = Overlay::new();
        overlay.insert_appended(TreeId::NoteHash, int_to_node(1), 3);
        overlay.insert_appended(TreeId::NoteHash, int_to_node(1), 8);
        assert_eq!(overlay.appended_index(TreeId::NoteHash, &int_to_node(1), 0), Some(3));
        assert_eq!(overlay.appended_index(TreeId::NoteHash, &int_to_node(1), 4), Some(8));
        assert_eq!(overlay.appended_index(TreeId::NoteHash, &int_to_node(1), 9), None);
    }
}
