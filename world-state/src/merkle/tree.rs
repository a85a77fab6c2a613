use core::{
    fmt,
    ops::{Index, IndexMut},
};

use super::{EmptySubtreeRoots, MerkleError};
use crate::{
    Word,
    utils::{ByteReader, ByteWriter, Deserializable, DeserializationError, Serializable},
};

// TREE ID
// ================================================================================================

/// Identifies one of the five trees of the world state.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum TreeId {
    NoteHash = 0,
    Nullifier = 1,
    PublicData = 2,
    L1ToL2Message = 3,
    Archive = 4,
}

impl TreeId {
    /// Number of trees in the world state.
    pub const COUNT: usize = 5;

    /// All trees, in the order their snapshots appear in a state reference.
    pub const ALL: [TreeId; Self::COUNT] = [
        TreeId::NoteHash,
        TreeId::Nullifier,
        TreeId::PublicData,
        TreeId::L1ToL2Message,
        TreeId::Archive,
    ];

    /// Returns the flavour of tree identified by this id.
    pub const fn kind(self) -> TreeKind {
        match self {
            TreeId::Nullifier | TreeId::PublicData => TreeKind::Indexed,
            TreeId::NoteHash | TreeId::L1ToL2Message | TreeId::Archive => TreeKind::AppendOnly,
        }
    }

    pub const fn is_indexed(self) -> bool {
        matches!(self.kind(), TreeKind::Indexed)
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns the tree for the provided byte tag, if there is one.
    pub const fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(TreeId::NoteHash),
            1 => Some(TreeId::Nullifier),
            2 => Some(TreeId::PublicData),
            3 => Some(TreeId::L1ToL2Message),
            4 => Some(TreeId::Archive),
            _ => None,
        }
    }

    const fn name(self) -> &'static str {
        match self {
            TreeId::NoteHash => "NOTE_HASH_TREE",
            TreeId::Nullifier => "NULLIFIER_TREE",
            TreeId::PublicData => "PUBLIC_DATA_TREE",
            TreeId::L1ToL2Message => "L1_TO_L2_MESSAGE_TREE",
            TreeId::Archive => "ARCHIVE",
        }
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The two flavours of trees in the world state.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TreeKind {
    /// Leaves are words appended at the next free index.
    AppendOnly,
    /// Leaves form a linked list sorted by key, supporting (non-)membership proofs.
    Indexed,
}

// TREE ARRAY
// ================================================================================================

/// A fixed-size container holding one value per tree, indexed by [TreeId].
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct TreeArray<T>([T; TreeId::COUNT]);

impl<T> TreeArray<T> {
    pub const fn new(values: [T; TreeId::COUNT]) -> Self {
        Self(values)
    }

    /// Builds an array by calling `f` for every tree.
    pub fn from_fn(mut f: impl FnMut(TreeId) -> T) -> Self {
        Self(TreeId::ALL.map(&mut f))
    }

    /// Returns an iterator over `(tree, value)` pairs in [TreeId::ALL] order.
    pub fn iter(&self) -> impl Iterator<Item = (TreeId, &T)> {
        TreeId::ALL.into_iter().zip(self.0.iter())
    }

    pub fn map<U>(&self, mut f: impl FnMut(TreeId, &T) -> U) -> TreeArray<U> {
        TreeArray::from_fn(|tree| f(tree, &self[tree]))
    }
}

impl<T> Index<TreeId> for TreeArray<T> {
    type Output = T;

    fn index(&self, tree: TreeId) -> &Self::Output {
        &self.0[tree as usize]
    }
}

impl<T> IndexMut<TreeId> for TreeArray<T> {
    fn index_mut(&mut self, tree: TreeId) -> &mut Self::Output {
        &mut self.0[tree as usize]
    }
}

// TREE SNAPSHOT
// ================================================================================================

/// The `(root, size)` pair identifying the state of a single tree.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct TreeSnapshot {
    pub root: Word,
    pub size: u64,
}

impl TreeSnapshot {
    pub const fn new(root: Word, size: u64) -> Self {
        Self { root, size }
    }

    /// Returns the snapshot of an empty tree of the specified height.
    pub fn empty(height: u8) -> Self {
        Self { root: EmptySubtreeRoots::at_level(height), size: 0 }
    }
}

impl Serializable for TreeSnapshot {
    fn write_into<W: ByteWriter>(&self, target: &mut W) {
        self.root.write_into(target);
        target.write_u64(self.size);
    }
}

impl Deserializable for TreeSnapshot {
    fn read_from<R: ByteReader>(source: &mut R) -> Result<Self, DeserializationError> {
        let root = source.read()?;
        let size = source.read_u64()?;
        Ok(Self { root, size })
    }
}

// TREE INFO
// ================================================================================================

/// Summary of a single tree as seen from a fork or a snapshot.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TreeInfo {
    pub tree_id: TreeId,
    pub root: Word,
    pub size: u64,
    pub depth: u8,
}

impl TreeInfo {
    /// Maximum number of leaves the tree can hold.
    pub fn capacity(&self) -> u64 {
        capacity(self.depth)
    }
}

/// Maximum number of leaves a tree of the provided height can hold.
pub(crate) fn capacity(height: u8) -> u64 {
    1u64 << height
}

/// Checks that the provided height can be used for a tree in the world state.
pub(crate) fn check_height(height: u8) -> Result<(), MerkleError> {
    if height == 0 {
        return Err(MerkleError::DepthTooSmall(height));
    }
    if height > super::MAX_TREE_HEIGHT {
        return Err(MerkleError::DepthTooBig(height as u64));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_ids_round_trip_through_tags() {
        for tree in TreeId::ALL {
            assert_eq!(TreeId::from_u8(tree.as_u8()), Some(tree));
        }
        assert_eq!(TreeId::from_u8(5), None);
    }

    #[test]
    fn only_nullifier_and_public_data_are_indexed() {
        let indexed: Vec<_> = TreeId::ALL.into_iter().filter(|tree| tree.is_indexed()).collect();
        assert_eq!(indexed, vec![TreeId::Nullifier, TreeId::PublicData]);
    }

    #[test]
    fn tree_array_is_indexed_by_tree_id() {
        let mut sizes = TreeArray::from_fn(|tree| tree.as_u8() as u64);
        sizes[TreeId::Archive] += 10;
        assert_eq!(sizes[TreeId::Archive], 14);
        assert_eq!(sizes.iter().map(|(_, size)| *size).sum::<u64>(), 20);
    }
}
