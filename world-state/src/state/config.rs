use super::{Result, WorldStateError};
use crate::{
    EMPTY_WORD, Word,
    merkle::{TreeArray, TreeId, capacity, check_height},
};

// DEFAULTS
// ================================================================================================

/// Default heights of the trees, in [TreeId::ALL] order.
pub const DEFAULT_TREE_HEIGHTS: [u8; TreeId::COUNT] = [40, 40, 40, 39, 29];

/// Default number of leaves indexed trees are prefilled with at genesis.
pub const DEFAULT_PREFILL: u64 = 1;

// WORLD STATE CONFIG
// ================================================================================================

/// Configuration of a [super::WorldState].
///
/// The tree heights are fixed for the lifetime of the underlying storage: reopening a storage
/// with different heights fails. A different chain identifier wipes the storage instead.
///
/// # Examples
/// ```
/// use world_state::{WorldStateConfig, merkle::TreeId};
///
/// let config = WorldStateConfig::default()
///     .with_tree_height(TreeId::Archive, 16)
///     .with_prefill(TreeId::Nullifier, 128);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldStateConfig {
    pub(crate) chain_id: Word,
    pub(crate) tree_heights: TreeArray<u8>,
    pub(crate) prefill: TreeArray<u64>,
}

impl Default for WorldStateConfig {
    fn default() -> Self {
        Self {
            chain_id: EMPTY_WORD,
            tree_heights: TreeArray::new(DEFAULT_TREE_HEIGHTS),
            prefill: TreeArray::from_fn(|tree| if tree.is_indexed() { DEFAULT_PREFILL } else { 0 }),
        }
    }
}

impl WorldStateConfig {
    /// Sets the identifier of the chain the state belongs to, e.g. the rollup contract address.
    pub fn with_chain_id(mut self, chain_id: Word) -> Self {
        self.chain_id = chain_id;
        self
    }

    pub fn with_tree_height(mut self, tree: TreeId, height: u8) -> Self {
        self.tree_heights[tree] = height;
        self
    }

    /// Sets the number of leaves an indexed tree is prefilled with at genesis.
    ///
    /// The prefilled leaves have keys `0..count`; the leaf with key `0` is the head of the
    /// tree's linked list, so at least one leaf is required.
    pub fn with_prefill(mut self, tree: TreeId, count: u64) -> Self {
        self.prefill[tree] = count;
        self
    }

    pub fn chain_id(&self) -> Word {
        self.chain_id
    }

    pub fn tree_heights(&self) -> &TreeArray<u8> {
        &self.tree_heights
    }

    pub fn prefill(&self, tree: TreeId) -> u64 {
        self.prefill[tree]
    }

    /// Checks that every tree height is supported and that every indexed tree has a valid prefill.
    pub fn validate(&self) -> Result<()> {
        for (tree, height) in self.tree_heights.iter() {
            check_height(*height)
                .map_err(|err| WorldStateError::InvalidConfig(format!("{tree}: {err}")))?;

            let prefill = self.prefill[tree];
            if tree.is_indexed() && !(1..=capacity(*height)).contains(&prefill) {
                return Err(WorldStateError::InvalidConfig(format!(
                    "{tree}: prefill of {prefill} leaves must be between 1 and the tree capacity"
                )));
            }
            if !tree.is_indexed() && prefill != 0 {
                return Err(WorldStateError::InvalidConfig(format!(
                    "{tree}: only indexed trees can be prefilled"
                )));
            }
        }
        Ok(())
    }
}
