use core::ops::Index;

use crate::{
    Felt, SequentialCommit, Word,
    merkle::{TreeArray, TreeId, TreeSnapshot},
    utils::{ByteReader, ByteWriter, Deserializable, DeserializationError, Serializable},
};

// STATE REFERENCE
// ================================================================================================

/// The `(root, size)` of all five trees at one instant.
///
/// This is what block headers commit to: the archive tree holds header hashes, so its root is a
/// commitment to every state the chain went through.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct StateReference(TreeArray<TreeSnapshot>);

impl StateReference {
    pub const fn new(trees: TreeArray<TreeSnapshot>) -> Self {
        Self(trees)
    }

    pub fn trees(&self) -> &TreeArray<TreeSnapshot> {
        &self.0
    }

    /// Returns an iterator over the snapshots of all trees in [TreeId::ALL] order.
    pub fn iter(&self) -> impl Iterator<Item = (TreeId, &TreeSnapshot)> {
        self.0.iter()
    }

    /// Returns the first tree whose snapshot differs from the one in `other`.
    pub fn first_difference(&self, other: &Self) -> Option<TreeId> {
        TreeId::ALL.into_iter().find(|tree| self[*tree] != other[*tree])
    }
}

impl Index<TreeId> for StateReference {
    type Output = TreeSnapshot;

    fn index(&self, tree: TreeId) -> &Self::Output {
        &self.0[tree]
    }
}

impl From<TreeArray<TreeSnapshot>> for StateReference {
    fn from(trees: TreeArray<TreeSnapshot>) -> Self {
        Self(trees)
    }
}

impl SequentialCommit for StateReference {
    type Commitment = Word;

    fn to_elements(&self) -> Vec<Felt> {
        self.iter()
            .flat_map(|(_, snapshot)| {
                snapshot.root.as_elements().iter().copied().chain([Felt::new(snapshot.size)])
            })
            .collect()
    }
}

impl Serializable for StateReference {
    fn write_into<W: ByteWriter>(&self, target: &mut W) {
        for (_, snapshot) in self.iter() {
            snapshot.write_into(target);
        }
    }
}

impl Deserializable for StateReference {
    fn read_from<R: ByteReader>(source: &mut R) -> Result<Self, DeserializationError> {
        let mut trees = TreeArray::<TreeSnapshot>::default();
        for tree in TreeId::ALL {
            trees[tree] = source.read()?;
        }
        Ok(Self(trees))
    }
}
