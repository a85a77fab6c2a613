use assert_matches::assert_matches;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use super::*;
use crate::{EMPTY_WORD, ONE};

fn random_word(rng: &mut impl Rng) -> Word {
    Word::new([
        Felt::new(rng.gen_range(0..Felt::MODULUS)),
        Felt::new(rng.gen_range(0..Felt::MODULUS)),
        Felt::new(rng.gen_range(0..Felt::MODULUS)),
        Felt::new(rng.gen_range(0..Felt::MODULUS)),
    ])
}

#[test]
fn word_serialization() {
    let mut rng = ChaCha20Rng::seed_from_u64(7);
    let word = random_word(&mut rng);

    let bytes = word.to_bytes();
    assert_eq!(bytes.len(), Word::SERIALIZED_SIZE);
    assert_eq!(Word::read_from_bytes(&bytes).unwrap(), word);
}

#[test]
fn word_hex_encoding_matches_bytes() {
    let word = Word::new([Felt::new(16), Felt::new(32), ZERO, ONE]);
    let hex = word.to_hex();
    assert_eq!(
        hex,
        "0x1000000000000000200000000000000000000000000000000100000000000000"
    );
    assert_eq!(Word::try_from(hex.as_str()).unwrap(), word);
}

#[test]
fn word_hex_rejects_out_of_range_elements() {
    let hex = format!("0x{}", "ff".repeat(32));
    assert_matches!(Word::try_from(hex.as_str()), Err(WordError::HexParse(HexParseError::OutOfRange)));
}

#[test]
fn word_ordering_is_element_wise() {
    let a = Word::new([ONE, ZERO, ZERO, ZERO]);
    let b = Word::new([ZERO, ONE, ZERO, ZERO]);
    assert!(b < a);
    assert!(EMPTY_WORD < b);
    assert!(EMPTY_WORD.is_empty());
    assert!(!a.is_empty());
}
