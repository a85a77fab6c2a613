use super::StateReference;
use crate::{
    EMPTY_WORD, Felt, SequentialCommit, Word,
    merkle::{IndexedLeafValue, MerkleError, MerkleForest, NullifierLeaf, PublicDataLeaf, TreeId},
    storage::Storage,
    utils::{ByteReader, ByteWriter, Deserializable, DeserializationError, Serializable},
};

// BLOCK HEADER
// ================================================================================================

/// The header of an L2 block.
///
/// `state` is the state reference after the effects of the block were applied and before the
/// header itself was appended to the archive tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub block_number: u64,
    pub timestamp: u64,
    /// Commitment to the body of the block, see [BlockBody::commitment].
    pub content_commitment: Word,
    pub state: StateReference,
}

impl BlockHeader {
    pub fn new(
        block_number: u64,
        timestamp: u64,
        content_commitment: Word,
        state: StateReference,
    ) -> Self {
        Self { block_number, timestamp, content_commitment, state }
    }

    /// Returns the header of block 0, committing to the initial state of the trees.
    pub fn genesis(state: StateReference) -> Self {
        Self::new(0, 0, EMPTY_WORD, state)
    }

    /// Returns the hash of this header, i.e. the leaf it is appended to the archive tree as.
    pub fn hash(&self) -> Word {
        self.to_commitment()
    }
}

impl SequentialCommit for BlockHeader {
    type Commitment = Word;

    fn to_elements(&self) -> Vec<Felt> {
        let mut elements = vec![Felt::new(self.block_number), Felt::new(self.timestamp)];
        elements.extend_from_slice(self.content_commitment.as_elements());
        elements.extend(self.state.to_elements());
        elements
    }
}

impl Serializable for BlockHeader {
    fn write_into<W: ByteWriter>(&self, target: &mut W) {
        target.write_u64(self.block_number);
        target.write_u64(self.timestamp);
        self.content_commitment.write_into(target);
        self.state.write_into(target);
    }
}

impl Deserializable for BlockHeader {
    fn read_from<R: ByteReader>(source: &mut R) -> Result<Self, DeserializationError> {
        let block_number = source.read_u64()?;
        let timestamp = source.read_u64()?;
        let content_commitment = source.read()?;
        let state = source.read()?;
        Ok(Self { block_number, timestamp, content_commitment, state })
    }
}

// BLOCK BODY
// ================================================================================================

/// The state changes made by a single transaction.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TxEffect {
    pub note_hashes: Vec<Word>,
    pub nullifiers: Vec<Felt>,
    pub public_data_writes: Vec<PublicDataLeaf>,
}

impl SequentialCommit for TxEffect {
    type Commitment = Word;

    fn to_elements(&self) -> Vec<Felt> {
        let mut elements = vec![Felt::new(self.note_hashes.len() as u64)];
        elements.extend(self.note_hashes.iter().flat_map(|hash| hash.as_elements().iter().copied()));
        elements.push(Felt::new(self.nullifiers.len() as u64));
        elements.extend_from_slice(&self.nullifiers);
        elements.push(Felt::new(self.public_data_writes.len() as u64));
        elements.extend(self.public_data_writes.iter().flat_map(|write| [write.slot, write.value]));
        elements
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BlockBody {
    pub tx_effects: Vec<TxEffect>,
}

impl BlockBody {
    pub fn new(tx_effects: Vec<TxEffect>) -> Self {
        Self { tx_effects }
    }

    /// Returns the commitment to the body carried by the block header.
    pub fn commitment(&self) -> Word {
        self.to_commitment()
    }
}

impl SequentialCommit for BlockBody {
    type Commitment = Word;

    fn to_elements(&self) -> Vec<Felt> {
        self.tx_effects
            .iter()
            .flat_map(|effect| effect.to_commitment().as_elements().to_vec())
            .collect()
    }
}

/// A block of the L2 chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L2Block {
    pub header: BlockHeader,
    pub body: BlockBody,
}

impl L2Block {
    pub fn new(header: BlockHeader, body: BlockBody) -> Self {
        Self { header, body }
    }

    pub fn number(&self) -> u64 {
        self.header.block_number
    }

    pub fn hash(&self) -> Word {
        self.header.hash()
    }
}

// BLOCK EFFECTS
// ================================================================================================

/// Applies the effects of a block to `forest`, excluding the archive update.
///
/// The order is fixed: L1-to-L2 messages, note hashes, the nullifiers of all transactions as one
/// batch, then the public data writes of every transaction as one batch per transaction.
pub(crate) fn apply_effects<S: Storage>(
    forest: &mut MerkleForest<S>,
    body: &BlockBody,
    messages: &[Word],
) -> Result<(), MerkleError> {
    forest.append_leaves(TreeId::L1ToL2Message, messages)?;

    let note_hashes: Vec<Word> =
        body.tx_effects.iter().flat_map(|effect| effect.note_hashes.iter().copied()).collect();
    forest.append_leaves(TreeId::NoteHash, &note_hashes)?;

    let nullifiers: Vec<IndexedLeafValue> = body
        .tx_effects
        .iter()
        .flat_map(|effect| effect.nullifiers.iter().map(|n| NullifierLeaf::new(*n).into()))
        .collect();
    forest.sequential_insert(TreeId::Nullifier, &nullifiers)?;

    for effect in &body.tx_effects {
        let writes: Vec<IndexedLeafValue> =
            effect.public_data_writes.iter().map(|write| (*write).into()).collect();
        forest.sequential_insert(TreeId::PublicData, &writes)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ONE,
        merkle::{TreeArray, TreeSnapshot},
    };

    #[test]
    fn header_hash_commits_to_every_field() {
        let state = StateReference::new(TreeArray::from_fn(|tree| {
            TreeSnapshot::new(EMPTY_WORD, tree.as_u8() as u64)
        }));
        let header = BlockHeader::new(1, 10, EMPTY_WORD, state);

        let mut later = header.clone();
        later.timestamp = 11;
        assert_ne!(header.hash(), later.hash());

        let mut other_state = header.clone();
        other_state.state = StateReference::default();
        assert_ne!(header.hash(), other_state.hash());

        let bytes = header.to_bytes();
        assert_eq!(BlockHeader::read_from_bytes(&bytes).unwrap(), header);
    }

    #[test]
    fn body_commitment_separates_transactions() {
        let note = Word::new([ONE; 4]);
        let one_tx = BlockBody::new(vec![TxEffect {
            note_hashes: vec![note, note],
            ..Default::default()
        }]);
        let two_txs = BlockBody::new(vec![
            TxEffect { note_hashes: vec![note], ..Default::default() },
            TxEffect { note_hashes: vec![note], ..Default::default() },
        ]);
        assert_ne!(one_tx.commitment(), two_txs.commitment());
    }
}
