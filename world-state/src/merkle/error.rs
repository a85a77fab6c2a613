use thiserror::Error;

use super::TreeId;
use crate::{Felt, Word, storage::StorageError};

#[derive(Debug, Error)]
pub enum MerkleError {
    #[error("expected merkle root {expected_root} found {actual_root}")]
    ConflictingRoots { expected_root: Word, actual_root: Word },
    #[error("provided merkle tree depth {0} is too small")]
    DepthTooSmall(u8),
    #[error("provided merkle tree depth {0} is too big")]
    DepthTooBig(u64),
    #[error("node index value {value} is not valid for depth {depth}")]
    InvalidNodeIndex { depth: u8, value: u64 },
    #[error(
        "appending {appended} leaves to {tree} of size {size} exceeds its capacity of {capacity}"
    )]
    CapacityExceeded { tree: TreeId, size: u64, appended: u64, capacity: u64 },
    #[error("value {value} is already present in {tree}")]
    DuplicateLeaf { tree: TreeId, value: Felt },
    #[error("leaf index {index} is out of range for {tree} with capacity {capacity}")]
    LeafIndexOutOfRange { tree: TreeId, index: u64, capacity: u64 },
    #[error("node {1} of {0} is not in the store")]
    NodeNotFound(TreeId, Word),
    #[error("leaf preimage {1} of {0} is not in the store")]
    LeafPreimageNotFound(TreeId, Word),
    #[error("{tree} has no leaf with a key lower or equal to {key}")]
    LowLeafNotFound { tree: TreeId, key: u64 },
    #[error("operation `{operation}` is not supported by {tree}")]
    UnsupportedOperation { tree: TreeId, operation: &'static str },
    #[error("leaf of the wrong kind provided for {tree}")]
    LeafKindMismatch { tree: TreeId },
    #[error("commit or revert requested without an open checkpoint")]
    NoCheckpoint,
    #[error("storage operation failed")]
    Storage(#[from] StorageError),
}
