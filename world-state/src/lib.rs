//! Versioned, forkable storage for the five Merkle trees that make up a rollup's world state.
//!
//! The crate is organised bottom-up:
//! - [word], [hash]: the 4-element field word and the Rescue-Prime hash the trees are built with.
//! - [merkle]: append-only and indexed tree primitives, sibling paths, insertion witnesses and the
//!   content-addressed node store shared between forks.
//! - [storage]: the ordered key-value backends the committed store is persisted to.
//! - [state]: the chain progress tracker ([state::WorldState]) and its forks.

pub mod hash;
pub mod merkle;
pub mod state;
pub mod storage;
pub mod utils;
pub mod word;

// RE-EXPORTS
// ================================================================================================

pub use state::{
    BlockBody, BlockHeader, ChainStatus, Fork, L2Block, Snapshot, StateReference, TreeSnapshot,
    TxEffect, WorldState, WorldStateConfig, WorldStateError,
};
pub use winter_math::{FieldElement, StarkField, fields::f64::BaseElement as Felt};
pub use word::{Word, WordError};

// TYPE ALIASES
// ================================================================================================

/// An alias for an ordered key-value map.
pub type Map<K, V> = std::collections::BTreeMap<K, V>;

// CONSTANTS
// ================================================================================================

/// Number of field elements in a word.
pub const WORD_SIZE: usize = 4;

/// Field element representing ZERO in the base field.
pub const ZERO: Felt = Felt::ZERO;

/// Field element representing ONE in the base field.
pub const ONE: Felt = Felt::ONE;

/// Array of field elements representing word of ZEROs in the base field.
pub const EMPTY_WORD: Word = Word::new([ZERO; WORD_SIZE]);

// TRAITS
// ================================================================================================

/// Defines how to compute a commitment to an object represented as a sequence of field elements.
pub trait SequentialCommit {
    /// A type of the commitment which must be derivable from [Word].
    type Commitment: From<Word>;

    /// Computes the commitment to the object.
    ///
    /// The default implementation hashes the sequence of elements returned from
    /// [Self::to_elements()] with [hash::Rescue256].
    fn to_commitment(&self) -> Self::Commitment {
        hash::Rescue256::hash_elements(&self.to_elements()).into()
    }

    /// Returns a representation of the object as a sequence of fields elements.
    fn to_elements(&self) -> Vec<Felt>;
}

// TESTS
// ================================================================================================

#[test]
#[should_panic]
fn debug_assert_is_checked() {
    // reference counts and tree sizes are guarded with `debug_assert`, make sure the checks are
    // active when running the test suite.
    debug_assert!(false);
}
