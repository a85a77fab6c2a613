use core::fmt::Display;

use super::{MAX_TREE_HEIGHT, MerkleError};
use crate::Word;

// NODE INDEX
// ================================================================================================

/// Position of a node in a tree, as the pair `(depth, value)` where the nodes at depth `d` are
/// numbered `0..2^d` from left to right.
///
/// ```text
/// depth
/// 0             0
/// 1         0        1
/// 2      0    1    2    3
/// 3     0 1  2 3  4 5  6 7
/// ```
///
/// Leaf `i` of a tree of height `h` is `(h, i)`; rehashing a leaf path walks from there to the
/// root with [NodeIndex::move_up].
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct NodeIndex {
    depth: u8,
    value: u64,
}

impl NodeIndex {
    /// Creates a new node index.
    ///
    /// # Errors
    /// Returns an error if:
    /// - `depth` is greater than the maximum tree height.
    /// - `value` is greater than or equal to `2^depth`.
    pub fn new(depth: u8, value: u64) -> Result<Self, MerkleError> {
        if depth > MAX_TREE_HEIGHT {
            Err(MerkleError::DepthTooBig(depth as u64))
        } else if (value >> depth) != 0 {
            Err(MerkleError::InvalidNodeIndex { depth, value })
        } else {
            Ok(Self { depth, value })
        }
    }

    /// Orders a node and its sibling as the `[left, right]` input of the parent hash.
    pub const fn build_node(&self, slf: Word, sibling: Word) -> [Word; 2] {
        if self.is_value_odd() { [sibling, slf] } else { [slf, sibling] }
    }

    pub const fn depth(&self) -> u8 {
        self.depth
    }

    pub const fn value(&self) -> u64 {
        self.value
    }

    /// Returns `true` if the node is a right child.
    pub const fn is_value_odd(&self) -> bool {
        (self.value & 1) == 1
    }

    /// Moves to the parent node.
    pub fn move_up(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.value >>= 1;
    }
}

impl Display for NodeIndex {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "depth={}, value={}", self.depth, self.value)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn values_must_fit_the_depth() {
        assert_eq!(NodeIndex::new(0, 0).unwrap(), NodeIndex { depth: 0, value: 0 });
        assert_matches!(NodeIndex::new(0, 1), Err(MerkleError::InvalidNodeIndex { depth: 0, value: 1 }));
        assert_eq!(NodeIndex::new(1, 1).unwrap(), NodeIndex { depth: 1, value: 1 });
        assert_matches!(NodeIndex::new(1, 2), Err(MerkleError::InvalidNodeIndex { depth: 1, value: 2 }));
        assert_matches!(NodeIndex::new(64, 0), Err(MerkleError::DepthTooBig(64)));
    }

    #[test]
    fn last_leaf_of_the_largest_tree_reaches_the_root() {
        let mut index = NodeIndex::new(MAX_TREE_HEIGHT, (1 << MAX_TREE_HEIGHT) - 1).unwrap();
        assert!(index.is_value_odd());
        for _ in 0..MAX_TREE_HEIGHT {
            index.move_up();
        }
        assert_eq!(index, NodeIndex::default());
    }

    proptest! {
        #[test]
        fn move_up_never_panics(
            depth in 0..=MAX_TREE_HEIGHT,
            seed in any::<u64>(),
            count in prop::num::u8::ANY,
        ) {
            let value = seed.checked_shr(64 - depth as u32).unwrap_or(0);
            let mut index = NodeIndex::new(depth, value).unwrap();
            for _ in 0..count {
                index.move_up();
            }
            prop_assert!(index.value() >> index.depth() == 0);
        }
    }
}
