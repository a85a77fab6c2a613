//! The hash function all trees of the world state are built with.

use winter_crypto::hashers::Rp64_256;

use crate::{Felt, Word};

// RE-EXPORTS
// ================================================================================================

pub use winter_crypto::{Digest, ElementHasher, Hasher};

// RESCUE PRIME 256
// ================================================================================================

type RescueDigest = <Rp64_256 as Hasher>::Digest;

/// Rescue-Prime hash over the 64-bit Goldilocks field with a 256-bit (one [Word]) output.
///
/// This is a thin adapter exposing [Rp64_256] in terms of [Word]s, so that tree code never deals
/// with the hasher's digest type directly.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Rescue256;

impl Rescue256 {
    /// Returns a hash of two words. This is the compression function used for inner nodes.
    pub fn merge(values: &[Word; 2]) -> Word {
        let digests: [RescueDigest; 2] = [(*values[0]).into(), (*values[1]).into()];
        Word::new(Rp64_256::merge(&digests).into())
    }

    /// Returns a hash of the provided field elements.
    pub fn hash_elements(elements: &[Felt]) -> Word {
        Word::new(Rp64_256::hash_elements(elements).into())
    }
}

// TESTS
// ================================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EMPTY_WORD, ONE};

    #[test]
    fn merge_is_order_sensitive() {
        let a = Word::new([ONE; 4]);
        let b = EMPTY_WORD;
        assert_ne!(Rescue256::merge(&[a, b]), Rescue256::merge(&[b, a]));
        assert_eq!(Rescue256::merge(&[a, b]), Rescue256::merge(&[a, b]));
    }

    #[test]
    fn hash_elements_distinguishes_lengths() {
        let one = Rescue256::hash_elements(&[ONE]);
        let two = Rescue256::hash_elements(&[ONE, Felt::new(0)]);
        assert_ne!(one, two);
    }
}
