use std::sync::OnceLock;

use super::MAX_TREE_HEIGHT;
use crate::{EMPTY_WORD, Word, hash::Rescue256};

// EMPTY SUBTREE ROOTS
// ================================================================================================

/// Number of distinct empty subtree roots: one per level, from a single empty leaf up to the root
/// of the tallest supported tree.
const NUM_LEVELS: usize = MAX_TREE_HEIGHT as usize + 1;

/// Roots of empty subtrees, indexed by their level (distance from the leaves).
///
/// Level `0` is the empty leaf [EMPTY_WORD], and level `l + 1` is the merge of two level `l`
/// roots. The roots do not depend on the tree a subtree belongs to, so one table serves every
/// tree of the world state.
pub struct EmptySubtreeRoots;

impl EmptySubtreeRoots {
    /// Returns the root of an empty subtree whose leaves are `level` levels below it.
    ///
    /// # Panics
    /// Panics if `level` exceeds the maximum tree height.
    pub fn at_level(level: u8) -> Word {
        Self::table()[level as usize]
    }

    fn table() -> &'static [Word; NUM_LEVELS] {
        static TABLE: OnceLock<[Word; NUM_LEVELS]> = OnceLock::new();
        TABLE.get_or_init(|| {
            let mut table = [EMPTY_WORD; NUM_LEVELS];
            for level in 1..NUM_LEVELS {
                table[level] = Rescue256::merge(&[table[level - 1], table[level - 1]]);
            }
            table
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_roots_are_built_from_empty_leaves() {
        assert_eq!(EmptySubtreeRoots::at_level(0), EMPTY_WORD);
        let level_one = Rescue256::merge(&[EMPTY_WORD, EMPTY_WORD]);
        assert_eq!(EmptySubtreeRoots::at_level(1), level_one);
        assert_eq!(EmptySubtreeRoots::at_level(2), Rescue256::merge(&[level_one, level_one]));
    }
}
