use thiserror::Error;

use crate::{
    Word,
    merkle::{MerkleError, TreeId},
    storage::StorageError,
};

#[derive(Debug, Error)]
pub enum WorldStateError {
    // STRUCTURAL
    // --------------------------------------------------------------------------------------------
    #[error("block {block} does not follow the current tip {tip}")]
    NonSequentialBlock { block: u64, tip: u64 },
    #[error(
        "block {block} declares {tree} root {expected_root} and size {expected_size}, \
         applying it yields root {actual_root} and size {actual_size}"
    )]
    StateMismatch {
        block: u64,
        tree: TreeId,
        expected_root: Word,
        expected_size: u64,
        actual_root: Word,
        actual_size: u64,
    },
    #[error(transparent)]
    Merkle(#[from] MerkleError),

    // LIFECYCLE
    // --------------------------------------------------------------------------------------------
    #[error("fork {fork} is closed")]
    ForkClosed { fork: u64 },
    #[error("fork {fork} based on block {block} no longer exists")]
    ForkNotFound { fork: u64, block: u64 },
    #[error("blocks below {block} were already pruned, the oldest retained block is {oldest}")]
    AlreadyPruned { block: u64, oldest: u64 },
    #[error("unwinding to block {target} would discard finalized block {finalized}")]
    CannotUnwindFinalized { target: u64, finalized: u64 },
    #[error("cannot finalize block {block} beyond the current tip {tip}")]
    FinalizeBeyondTip { block: u64, tip: u64 },
    #[error("cannot prune up to block {block}, the highest allowed bound is {limit}")]
    PruneBeyondFinalized { block: u64, limit: u64 },
    #[error("block {0} is not retained")]
    BlockNotFound(u64),
    #[error("commit or revert requested without an open checkpoint")]
    NoCheckpoint,
    #[error("the world state is closed")]
    Closed,

    // STORAGE AND CONFIGURATION
    // --------------------------------------------------------------------------------------------
    #[error("storage operation failed")]
    Storage(#[from] StorageError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T, E = WorldStateError> = core::result::Result<T, E>;
