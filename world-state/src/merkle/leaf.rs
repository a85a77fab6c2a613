use super::{MerkleError, TreeId};
use crate::{
    Felt, Word, ZERO,
    hash::Rescue256,
    utils::{ByteReader, ByteWriter, Deserializable, DeserializationError, Serializable},
};

// LEAF PAYLOADS
// ================================================================================================

/// A leaf of the nullifier tree.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct NullifierLeaf {
    pub nullifier: Felt,
}

impl NullifierLeaf {
    pub const fn new(nullifier: Felt) -> Self {
        Self { nullifier }
    }
}

/// A leaf of the public data tree: the current `value` of a storage `slot`.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct PublicDataLeaf {
    pub slot: Felt,
    pub value: Felt,
}

impl PublicDataLeaf {
    pub const fn new(slot: Felt, value: Felt) -> Self {
        Self { slot, value }
    }
}

/// The payload of a leaf of an indexed tree.
///
/// Every payload has a key that orders it in the tree's linked list: the nullifier itself, or the
/// storage slot of a public data write. Keys are compared through their canonical `u64` value.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum IndexedLeafValue {
    Nullifier(NullifierLeaf),
    PublicData(PublicDataLeaf),
}

impl IndexedLeafValue {
    /// Returns the empty payload of the specified tree.
    ///
    /// # Errors
    /// Returns an error if the tree is not an indexed tree.
    pub fn empty(tree: TreeId) -> Result<Self, MerkleError> {
        Self::padding(tree, 0)
    }

    /// Returns the payload of the `position`-th leaf an indexed tree is prefilled with.
    pub(crate) fn padding(tree: TreeId, position: u64) -> Result<Self, MerkleError> {
        let key = Felt::new(position);
        match tree {
            TreeId::Nullifier => Ok(Self::Nullifier(NullifierLeaf::new(key))),
            TreeId::PublicData => Ok(Self::PublicData(PublicDataLeaf::new(key, ZERO))),
            tree => Err(MerkleError::UnsupportedOperation { tree, operation: "indexed leaves" }),
        }
    }

    /// Returns the field element this payload is keyed by.
    pub fn key(&self) -> Felt {
        match self {
            Self::Nullifier(leaf) => leaf.nullifier,
            Self::PublicData(leaf) => leaf.slot,
        }
    }

    /// Returns the canonical integer value of the key, used to order leaves.
    pub fn key_u64(&self) -> u64 {
        self.key().as_int()
    }

    /// Returns true if every element of the payload is zero.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Nullifier(leaf) => leaf.nullifier == ZERO,
            Self::PublicData(leaf) => leaf.slot == ZERO && leaf.value == ZERO,
        }
    }

    /// Returns true if this payload can be stored in the specified tree.
    pub fn belongs_to(&self, tree: TreeId) -> bool {
        matches!(
            (self, tree),
            (Self::Nullifier(_), TreeId::Nullifier) | (Self::PublicData(_), TreeId::PublicData)
        )
    }

    fn elements(&self) -> Vec<Felt> {
        match self {
            Self::Nullifier(leaf) => vec![leaf.nullifier],
            Self::PublicData(leaf) => vec![leaf.slot, leaf.value],
        }
    }
}

impl From<NullifierLeaf> for IndexedLeafValue {
    fn from(leaf: NullifierLeaf) -> Self {
        Self::Nullifier(leaf)
    }
}

impl From<PublicDataLeaf> for IndexedLeafValue {
    fn from(leaf: PublicDataLeaf) -> Self {
        Self::PublicData(leaf)
    }
}

// INDEXED LEAF
// ================================================================================================

/// A leaf preimage of an indexed tree: a payload plus a pointer to the leaf holding the next
/// larger key.
///
/// A `next_value` of zero stands for +infinity, i.e. the leaf holds the largest key in the tree.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct IndexedLeaf {
    pub value: IndexedLeafValue,
    pub next_index: u64,
    pub next_value: Felt,
}

impl IndexedLeaf {
    pub const fn new(value: IndexedLeafValue, next_index: u64, next_value: Felt) -> Self {
        Self { value, next_index, next_value }
    }

    /// Returns the hash this leaf is committed to in the tree.
    pub fn hash(&self) -> Word {
        let mut elements = self.value.elements();
        elements.push(self.next_value);
        elements.push(Felt::new(self.next_index));
        Rescue256::hash_elements(&elements)
    }

    /// Returns the canonical integer value of this leaf's key.
    pub fn key(&self) -> u64 {
        self.value.key_u64()
    }

    /// Returns true if this leaf is the last one of the linked list.
    pub fn points_to_infinity(&self) -> bool {
        self.next_value == ZERO
    }

    /// Returns true if this leaf is the low leaf of `key`, i.e. `key` falls strictly between this
    /// leaf's key and the next one.
    ///
    /// Together with a sibling path of this leaf, this proves that `key` is not in the tree.
    pub fn proves_absence_of(&self, key: Felt) -> bool {
        let key = key.as_int();
        self.key() < key && (self.points_to_infinity() || key < self.next_value.as_int())
    }
}

impl Serializable for IndexedLeaf {
    fn write_into<W: ByteWriter>(&self, target: &mut W) {
        match self.value {
            IndexedLeafValue::Nullifier(leaf) => {
                target.write_u8(0);
                leaf.nullifier.write_into(target);
            },
            IndexedLeafValue::PublicData(leaf) => {
                target.write_u8(1);
                leaf.slot.write_into(target);
                leaf.value.write_into(target);
            },
        }
        target.write_u64(self.next_index);
        self.next_value.write_into(target);
    }
}

impl Deserializable for IndexedLeaf {
    fn read_from<R: ByteReader>(source: &mut R) -> Result<Self, DeserializationError> {
        let value = match source.read_u8()? {
            0 => IndexedLeafValue::Nullifier(NullifierLeaf::new(source.read()?)),
            1 => {
                let slot = source.read()?;
                let value = source.read()?;
                IndexedLeafValue::PublicData(PublicDataLeaf::new(slot, value))
            },
            tag => {
                return Err(DeserializationError::InvalidValue(format!(
                    "unknown indexed leaf tag {tag}"
                )));
            },
        };
        let next_index = source.read_u64()?;
        let next_value = source.read()?;
        Ok(Self { value, next_index, next_value })
    }
}

// LEAF VALUE
// ================================================================================================

/// The value of a leaf of any tree of the world state.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum LeafValue {
    /// A leaf of an append-only tree.
    Append(Word),
    /// The payload of an indexed tree leaf.
    Indexed(IndexedLeafValue),
}

impl From<Word> for LeafValue {
    fn from(word: Word) -> Self {
        Self::Append(word)
    }
}

impl From<IndexedLeafValue> for LeafValue {
    fn from(value: IndexedLeafValue) -> Self {
        Self::Indexed(value)
    }
}

impl From<NullifierLeaf> for LeafValue {
    fn from(leaf: NullifierLeaf) -> Self {
        Self::Indexed(leaf.into())
    }
}

impl From<PublicDataLeaf> for LeafValue {
    fn from(leaf: PublicDataLeaf) -> Self {
        Self::Indexed(leaf.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nullifier_leaf(key: u64, next_index: u64, next_value: u64) -> IndexedLeaf {
        IndexedLeaf::new(
            NullifierLeaf::new(Felt::new(key)).into(),
            next_index,
            Felt::new(next_value),
        )
    }

    #[test]
    fn low_leaf_proves_absence_of_keys_in_its_gap() {
        let low = nullifier_leaf(5, 3, 9);
        assert!(low.proves_absence_of(Felt::new(6)));
        assert!(low.proves_absence_of(Felt::new(8)));
        assert!(!low.proves_absence_of(Felt::new(5)));
        assert!(!low.proves_absence_of(Felt::new(9)));
        assert!(!low.proves_absence_of(Felt::new(4)));
    }

    #[test]
    fn last_leaf_covers_everything_above_it() {
        let last = nullifier_leaf(5, 0, 0);
        assert!(last.points_to_infinity());
        assert!(last.proves_absence_of(Felt::new(u32::MAX as u64)));
    }

    #[test]
    fn hash_commits_to_the_pointers() {
        assert_ne!(nullifier_leaf(5, 3, 9).hash(), nullifier_leaf(5, 4, 9).hash());
        assert_ne!(nullifier_leaf(5, 3, 9).hash(), nullifier_leaf(5, 3, 10).hash());
        // the sentinel leaf is distinguishable from an empty slot
        assert_ne!(nullifier_leaf(0, 0, 0).hash(), Word::empty());
    }

    #[test]
    fn public_data_and_nullifier_leaves_hash_differently() {
        let nullifier = IndexedLeaf::new(NullifierLeaf::new(Felt::new(1)).into(), 0, ZERO);
        let write = IndexedLeaf::new(PublicDataLeaf::new(Felt::new(1), ZERO).into(), 0, ZERO);
        assert_ne!(nullifier.hash(), write.hash());
        assert_eq!(nullifier.key(), write.key());
    }

    #[test]
    fn serialization() {
        let leaf = IndexedLeaf::new(PublicDataLeaf::new(Felt::new(7), Felt::new(11)).into(), 2, ZERO);
        let bytes = leaf.to_bytes();
        assert_eq!(IndexedLeaf::read_from_bytes(&bytes).unwrap(), leaf);
    }

    #[test]
    fn padding_is_only_defined_for_indexed_trees() {
        assert!(IndexedLeafValue::padding(TreeId::NoteHash, 0).is_err());
        let padding = IndexedLeafValue::padding(TreeId::PublicData, 3).unwrap();
        assert!(padding.belongs_to(TreeId::PublicData));
        assert!(!padding.belongs_to(TreeId::Nullifier));
        assert_eq!(padding.key_u64(), 3);
    }
}
