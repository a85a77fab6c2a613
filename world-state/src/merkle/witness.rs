use super::{IndexedLeaf, IndexedLeafValue, MerkleError, SiblingPath, TreeId};
use crate::{Word, ZERO};

// LEAF UPDATE WITNESS
// ================================================================================================

/// A leaf preimage of an indexed tree, its position and its sibling path.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct LeafUpdateWitness {
    pub leaf: IndexedLeaf,
    pub index: u64,
    pub path: SiblingPath,
}

impl LeafUpdateWitness {
    pub fn new(leaf: IndexedLeaf, index: u64, path: SiblingPath) -> Self {
        Self { leaf, index, path }
    }

    /// Returns the witness emitted in place of a real one for an empty (padding) input leaf.
    pub fn padding(tree: TreeId, height: u8) -> Result<Self, MerkleError> {
        let leaf = IndexedLeaf::new(IndexedLeafValue::empty(tree)?, 0, ZERO);
        Ok(Self { leaf, index: 0, path: SiblingPath::empty(height) })
    }

    /// Returns true if this witness was emitted for a padding input leaf.
    pub fn is_padding(&self) -> bool {
        self.index == 0
            && self.leaf.value.is_empty()
            && self.leaf.next_index == 0
            && self.leaf.next_value == ZERO
            && self.path == SiblingPath::empty(self.path.depth())
    }

    /// Verifies that the witnessed leaf sits at the witnessed index of the tree with `root`.
    pub fn verify(&self, root: &Word) -> Result<(), MerkleError> {
        self.path.verify(self.index, self.leaf.hash(), root)
    }
}

/// The state of a low leaf before and after it was rewritten by an insertion or an update.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct LowLeafWitness {
    pub before: LeafUpdateWitness,
    pub after: LeafUpdateWitness,
}

// SEQUENTIAL INSERTION RESULT
// ================================================================================================

/// Everything needed to prove a batch of leaves was inserted into an indexed tree one at a time.
///
/// Both vectors are aligned with the input batch: entry `i` describes the `i`-th leaf.
/// - Inserting a new key yields the low leaf before and after its pointers were redirected, plus
///   the new leaf with the path of the (then empty) slot it was written to.
/// - Updating an existing public data slot yields the leaf before and after the update, and a
///   padding insertion witness.
/// - Empty input leaves yield padding witnesses in both vectors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SequentialInsertionResult {
    pub low_leaf_witnesses: Vec<LowLeafWitness>,
    pub insertion_witnesses: Vec<LeafUpdateWitness>,
}

impl SequentialInsertionResult {
    pub fn len(&self) -> usize {
        self.insertion_witnesses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insertion_witnesses.is_empty()
    }
}
