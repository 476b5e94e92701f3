//! Transaction outpoint type.

use powledger_consensus::Hash256;

use crate::encoding::{Decodable, DecodeError, Decoder, Encodable, EncodeError, Encoder};

#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct OutPoint {
    pub hash: Hash256,
    pub index: u16,
}

impl OutPoint {
    pub fn new(hash: Hash256, index: u16) -> Self {
        Self { hash, index }
    }

    /// The prevout carried by a coinbase input: all-zero hash, index 0.
    pub fn coinbase() -> Self {
        Self {
            hash: [0u8; 32],
            index: 0,
        }
    }

    pub fn is_coinbase(&self) -> bool {
        self.index == 0 && self.hash == [0u8; 32]
    }
}

impl Encodable for OutPoint {
    fn consensus_encode(&self, encoder: &mut Encoder) -> Result<(), EncodeError> {
        encoder.write_hash(&self.hash);
        encoder.write_u16_be(self.index);
        Ok(())
    }
}

impl Decodable for OutPoint {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let hash = decoder.read_hash()?;
        let index = decoder.read_u16_be()?;
        Ok(Self { hash, index })
    }
}
