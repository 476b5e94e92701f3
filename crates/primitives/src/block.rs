//! Block header and block types.

use powledger_consensus::constants::BLOCK_HEADER_SIZE;
use powledger_consensus::Hash256;

use crate::encoding::{decode, encode, Decodable, DecodeError, Decoder, Encodable, EncodeError, Encoder};
use crate::hash::{merkle_root, sha256d};
use crate::transaction::{read_framed_vec, write_framed_vec, Transaction};

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BlockHeader {
    pub prev_block: Hash256,
    pub merkle_root: Hash256,
    /// 96-bit nonce; values above `MAX_NONCE` do not encode.
    pub nonce: u128,
}

impl BlockHeader {
    pub fn to_bytes(&self) -> Result<[u8; BLOCK_HEADER_SIZE], EncodeError> {
        let bytes = encode(self)?;
        let mut out = [0u8; BLOCK_HEADER_SIZE];
        out.copy_from_slice(&bytes);
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        decode(bytes)
    }

    /// Block id: sha256d of the 76-byte header.
    pub fn hash(&self) -> Result<Hash256, EncodeError> {
        Ok(sha256d(&self.to_bytes()?))
    }
}

impl Encodable for BlockHeader {
    fn consensus_encode(&self, encoder: &mut Encoder) -> Result<(), EncodeError> {
        encoder.write_hash(&self.prev_block);
        encoder.write_hash(&self.merkle_root);
        encoder.write_nonce(self.nonce)
    }
}

impl Decodable for BlockHeader {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let prev_block = decoder.read_hash()?;
        let merkle_root = decoder.read_hash()?;
        let nonce = decoder.read_nonce()?;
        Ok(Self {
            prev_block,
            merkle_root,
            nonce,
        })
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>) -> Self {
        Self {
            header,
            transactions,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        encode(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        decode(bytes)
    }

    pub fn hash(&self) -> Result<Hash256, EncodeError> {
        self.header.hash()
    }

    pub fn txids(&self) -> Result<Vec<Hash256>, EncodeError> {
        self.transactions.iter().map(Transaction::txid).collect()
    }

    pub fn compute_merkle_root(&self) -> Result<Hash256, EncodeError> {
        Ok(merkle_root(&self.txids()?))
    }
}

impl Encodable for Block {
    fn consensus_encode(&self, encoder: &mut Encoder) -> Result<(), EncodeError> {
        self.header.consensus_encode(encoder)?;
        write_framed_vec(encoder, &self.transactions)
    }
}

impl Decodable for Block {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let header = BlockHeader::consensus_decode(decoder)?;
        let transactions = read_framed_vec(decoder)?;
        Ok(Self {
            header,
            transactions,
        })
    }
}
