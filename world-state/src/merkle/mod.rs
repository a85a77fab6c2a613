//! Append-only and indexed Merkle trees based on the Rescue-Prime hash function, and the
//! content-addressed store their nodes are shared through.

// SUBMODULES
// ================================================================================================

mod empty_roots;
mod error;
mod forest;
mod index;
mod leaf;
mod node;
mod overlay;
mod path;
mod store;
mod tree;
mod witness;


// REEXPORTS
// ================================================================================================

pub use empty_roots::EmptySubtreeRoots;
pub use error::MerkleError;
pub use forest::{MerkleForest, PreviousValueIndex};
pub use index::NodeIndex;
pub use leaf::{IndexedLeaf, IndexedLeafValue, LeafValue, NullifierLeaf, PublicDataLeaf};
pub use node::InnerNode;
pub use overlay::Overlay;
pub use path::SiblingPath;
pub use store::{NodeStore, StagedUpdate};
pub(crate) use tree::{capacity, check_height};
pub use tree::{TreeArray, TreeId, TreeInfo, TreeKind, TreeSnapshot};
pub use witness::{LeafUpdateWitness, LowLeafWitness, SequentialInsertionResult};

// CONSTANTS
// ================================================================================================

/// Maximum height of a tree in the world state; leaf indices must fit in a `u64`.
pub const MAX_TREE_HEIGHT: u8 = 63;

// HELPER FUNCTIONS
// ================================================================================================

#[cfg(test)]
const fn int_to_node(value: u64) -> crate::Word {
    crate::Word::new([crate::Felt::new(value), crate::ZERO, crate::ZERO, crate::ZERO])
}
