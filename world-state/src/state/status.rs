use core::fmt;

use super::StateReference;
use crate::{
    Word,
    utils::{ByteReader, ByteWriter, Deserializable, DeserializationError, Serializable},
};

// CHAIN STATUS
// ================================================================================================

/// Watermarks tracking the progress of the canonical chain.
///
/// The state of every block in `[oldest_historical_block, unfinalized_tip]` is retained. Block 0,
/// the genesis state, is retained until the first pruning, so a fresh chain reports
/// `(1, 0, 0)`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ChainStatus {
    pub oldest_historical_block: u64,
    pub finalized_tip: u64,
    pub unfinalized_tip: u64,
}

impl Default for ChainStatus {
    fn default() -> Self {
        Self {
            oldest_historical_block: 1,
            finalized_tip: 0,
            unfinalized_tip: 0,
        }
    }
}

impl ChainStatus {
    /// Returns the lowest block whose state is still retained.
    pub fn first_retained_block(&self) -> u64 {
        if self.oldest_historical_block <= 1 {
            0
        } else {
            self.oldest_historical_block
        }
    }

    /// Returns true if the state of `block` can be read.
    pub fn is_retained(&self, block: u64) -> bool {
        (self.first_retained_block()..=self.unfinalized_tip).contains(&block)
    }
}

impl fmt::Display for ChainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "oldest: {}, finalized: {}, tip: {}",
            self.oldest_historical_block, self.finalized_tip, self.unfinalized_tip
        )
    }
}

impl Serializable for ChainStatus {
    fn write_into<W: ByteWriter>(&self, target: &mut W) {
        target.write_u64(self.oldest_historical_block);
        target.write_u64(self.finalized_tip);
        target.write_u64(self.unfinalized_tip);
    }
}

impl Deserializable for ChainStatus {
    fn read_from<R: ByteReader>(source: &mut R) -> Result<Self, DeserializationError> {
        Ok(Self {
            oldest_historical_block: source.read_u64()?,
            finalized_tip: source.read_u64()?,
            unfinalized_tip: source.read_u64()?,
        })
    }
}

// BLOCK RECORD
// ================================================================================================

/// What is kept for every retained block: the state after the block, archive included, and the
/// hash of its header.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct BlockRecord {
    pub state: StateReference,
    pub header_hash: Word,
}

impl BlockRecord {
    pub fn key(block: u64) -> [u8; 8] {
        block.to_be_bytes()
    }
}

impl Serializable for BlockRecord {
    fn write_into<W: ByteWriter>(&self, target: &mut W) {
        self.state.write_into(target);
        self.header_hash.write_into(target);
    }
}

impl Deserializable for BlockRecord {
    fn read_from<R: ByteReader>(source: &mut R) -> Result<Self, DeserializationError> {
        let state = source.read()?;
        let header_hash = source.read()?;
        Ok(Self { state, header_hash })
    }
}

// METADATA KEYS
// ================================================================================================

pub(crate) const CHAIN_ID_KEY: &[u8] = b"chain_id";
pub(crate) const STATUS_KEY: &[u8] = b"status";
pub(crate) const TREE_HEIGHTS_KEY: &[u8] = b"tree_heights";
pub(crate) const GENESIS_HEADER_KEY: &[u8] = b"genesis_header";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_is_retained_until_the_first_pruning() {
        let status = ChainStatus::default();
        assert_eq!(status.first_retained_block(), 0);
        assert!(status.is_retained(0));
        assert!(!status.is_retained(1));

        let pruned = ChainStatus {
            oldest_historical_block: 3,
            finalized_tip: 4,
            unfinalized_tip: 6,
        };
        assert!(!pruned.is_retained(0));
        assert!(!pruned.is_retained(2));
        assert!(pruned.is_retained(3));
        assert!(pruned.is_retained(6));
        assert!(!pruned.is_retained(7));
    }
}
