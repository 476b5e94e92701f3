//! Per-block undo records.

use powledger_consensus::Hash256;
use powledger_primitives::encoding::{
    decode, encode, Decodable, DecodeError, Decoder, Encodable, EncodeError, Encoder,
};
use powledger_primitives::transaction::TxOut;

use crate::utxo::{OutPointKey, OUTPOINT_KEY_LEN};

/// What `add_block` changed, enough to put the UTXO set back exactly.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BlockUndo {
    pub block_id: Hash256,
    /// Outputs the block spent, with their previous contents.
    pub restored: Vec<(OutPointKey, TxOut)>,
    /// Outputs the block created.
    pub created: Vec<OutPointKey>,
}

impl BlockUndo {
    pub fn new(block_id: Hash256) -> Self {
        Self {
            block_id,
            restored: Vec::new(),
            created: Vec::new(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        decode(bytes)
    }
}

impl Encodable for BlockUndo {
    fn consensus_encode(&self, encoder: &mut Encoder) -> Result<(), EncodeError> {
        encoder.write_hash(&self.block_id);
        encoder.write_len(self.restored.len())?;
        for (key, output) in &self.restored {
            encoder.write_bytes(key.as_bytes());
            encoder.write_framed(&encode(output)?)?;
        }
        encoder.write_len(self.created.len())?;
        for key in &self.created {
            encoder.write_bytes(key.as_bytes());
        }
        Ok(())
    }
}

impl Decodable for BlockUndo {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let block_id = decoder.read_hash()?;
        let restored_len = decoder.read_len()?;
        let mut restored = Vec::with_capacity(restored_len.min(decoder.remaining() / OUTPOINT_KEY_LEN));
        for _ in 0..restored_len {
            let key = OutPointKey::from_bytes(decoder.read_fixed::<OUTPOINT_KEY_LEN>()?);
            let output = decoder.read_framed_value::<TxOut>()?;
            restored.push((key, output));
        }
        let created_len = decoder.read_len()?;
        let mut created = Vec::with_capacity(created_len.min(decoder.remaining() / OUTPOINT_KEY_LEN));
        for _ in 0..created_len {
            created.push(OutPointKey::from_bytes(
                decoder.read_fixed::<OUTPOINT_KEY_LEN>()?,
            ));
        }
        Ok(Self {
            block_id,
            restored,
            created,
        })
    }
}
