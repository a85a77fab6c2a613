use core::ops::Deref;

use super::{EmptySubtreeRoots, MerkleError, NodeIndex};
use crate::{
    Word,
    hash::Rescue256,
    utils::{ByteReader, ByteWriter, Deserializable, DeserializationError, Serializable},
};

// SIBLING PATH
// ================================================================================================

/// The siblings of every node on the way from a leaf to the root of a tree.
///
/// Indexing into this type starts at the deepest part of the path and gets shallower. That is,
/// the sibling of the leaf is at index `0` and the sibling of the root's child is at index
/// `self.len() - 1`. A path for a tree of height `H` always has exactly `H` nodes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SiblingPath {
    nodes: Vec<Word>,
}

impl SiblingPath {
    // CONSTRUCTORS
    // --------------------------------------------------------------------------------------------

    /// Creates a new sibling path from a list of nodes.
    ///
    /// The list must be in order of deepest to shallowest.
    pub fn new(nodes: Vec<Word>) -> Self {
        assert!(nodes.len() <= u8::MAX.into(), "SiblingPath may have at most 255 items");
        Self { nodes }
    }

    /// Returns the path of any leaf of an empty tree of the specified height.
    pub fn empty(height: u8) -> Self {
        Self::new((0..height).map(EmptySubtreeRoots::at_level).collect())
    }

    // PROVIDERS
    // --------------------------------------------------------------------------------------------

    /// Returns the height of the tree this path is valid for.
    pub fn depth(&self) -> u8 {
        self.nodes.len() as u8
    }

    /// Returns the path's nodes, in order of deepest to shallowest.
    pub fn nodes(&self) -> &[Word] {
        &self.nodes
    }

    /// Computes the root of the tree obtained by placing `leaf` at `index`.
    ///
    /// # Errors
    /// Returns an error if `index` is not a valid leaf index for a tree of this path's depth.
    pub fn compute_root(&self, index: u64, leaf: Word) -> Result<Word, MerkleError> {
        let mut index = NodeIndex::new(self.depth(), index)?;
        let root = self.nodes.iter().copied().fold(leaf, |node, sibling| {
            let input = index.build_node(node, sibling);
            index.move_up();
            Rescue256::merge(&input)
        });
        Ok(root)
    }

    /// Verifies that `leaf` sits at `index` of the tree with the provided root.
    ///
    /// # Errors
    /// Returns an error if:
    /// - provided leaf index is invalid.
    /// - root calculated during the verification differs from the provided one.
    pub fn verify(&self, index: u64, leaf: Word, root: &Word) -> Result<(), MerkleError> {
        let computed_root = self.compute_root(index, leaf)?;
        if &computed_root != root {
            return Err(MerkleError::ConflictingRoots {
                expected_root: *root,
                actual_root: computed_root,
            });
        }

        Ok(())
    }
}

// CONVERSIONS
// ================================================================================================

impl From<SiblingPath> for Vec<Word> {
    fn from(path: SiblingPath) -> Self {
        path.nodes
    }
}

impl From<Vec<Word>> for SiblingPath {
    fn from(path: Vec<Word>) -> Self {
        Self::new(path)
    }
}

impl Deref for SiblingPath {
    type Target = [Word];

    fn deref(&self) -> &Self::Target {
        &self.nodes
    }
}

impl FromIterator<Word> for SiblingPath {
    fn from_iter<T: IntoIterator<Item = Word>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for SiblingPath {
    type Item = Word;
    type IntoIter = std::vec::IntoIter<Word>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_iter()
    }
}

// SERIALIZATION
// ================================================================================================

impl Serializable for SiblingPath {
    fn write_into<W: ByteWriter>(&self, target: &mut W) {
        assert!(self.nodes.len() <= u8::MAX.into(), "Length enforced in the constructor");
        target.write_u8(self.nodes.len() as u8);
        target.write_many(&self.nodes);
    }
}

impl Deserializable for SiblingPath {
    fn read_from<R: ByteReader>(source: &mut R) -> Result<Self, DeserializationError> {
        let count = source.read_u8()?.into();
        let nodes = source.read_many::<Word>(count)?;
        Ok(Self { nodes })
    }
}

// TESTS
// ================================================================================================

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::{EMPTY_WORD, merkle::int_to_node};

    #[test]
    fn empty_path_opens_to_the_empty_root() {
        let path = SiblingPath::empty(8);
        assert_eq!(path.depth(), 8);
        assert_eq!(path.compute_root(37, EMPTY_WORD).unwrap(), EmptySubtreeRoots::at_level(8));
    }

    #[test]
    fn verify_detects_a_wrong_leaf() {
        let path = SiblingPath::empty(4);
        let root = path.compute_root(3, int_to_node(7)).unwrap();
        assert!(path.verify(3, int_to_node(7), &root).is_ok());
        assert_matches!(
            path.verify(3, int_to_node(8), &root),
            Err(MerkleError::ConflictingRoots { .. })
        );
        assert_matches!(
            path.verify(2, int_to_node(7), &root),
            Err(MerkleError::ConflictingRoots { .. })
        );
    }

    #[test]
    fn compute_root_rejects_out_of_range_index() {
        let path = SiblingPath::empty(2);
        assert_matches!(
            path.compute_root(4, EMPTY_WORD),
            Err(MerkleError::InvalidNodeIndex { depth: 2, value: 4 })
        );
    }

    #[test]
    fn serialization() {
        let path: SiblingPath = (0..5).map(int_to_node).collect();
        let bytes = path.to_bytes();
        assert_eq!(SiblingPath::read_from_bytes(&bytes).unwrap(), path);
    }
}
