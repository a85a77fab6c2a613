use crate::{
    Word,
    hash::Rescue256,
    utils::{ByteReader, ByteWriter, Deserializable, DeserializationError, Serializable},
};

/// An inner node of a tree, identified by the hash of its two children.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct InnerNode {
    pub left: Word,
    pub right: Word,
}

impl InnerNode {
    pub fn hash(&self) -> Word {
        Rescue256::merge(&[self.left, self.right])
    }
}

impl Serializable for InnerNode {
    fn write_into<W: ByteWriter>(&self, target: &mut W) {
        self.left.write_into(target);
        self.right.write_into(target);
    }
}

impl Deserializable for InnerNode {
    fn read_from<R: ByteReader>(source: &mut R) -> Result<Self, DeserializationError> {
        let left = source.read()?;
        let right = source.read()?;
        Ok(Self { left, right })
    }
}
