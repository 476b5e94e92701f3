//! Transaction types and their consensus encoding.

use powledger_consensus::Hash256;

use crate::encoding::{encode, Decodable, DecodeError, Decoder, Encodable, EncodeError, Encoder};
use crate::hash::sha256d;
use crate::outpoint::OutPoint;
use crate::script::Script;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TxIn {
    pub prevout: OutPoint,
    pub unlocking_script: Script,
}

impl TxIn {
    pub fn new(prevout: OutPoint, unlocking_script: Script) -> Self {
        Self {
            prevout,
            unlocking_script,
        }
    }

    /// Input of a coinbase transaction; the script is free-form data.
    pub fn coinbase(unlocking_script: Script) -> Self {
        Self::new(OutPoint::coinbase(), unlocking_script)
    }

    pub fn is_coinbase(&self) -> bool {
        self.prevout.is_coinbase()
    }
}

impl Encodable for TxIn {
    fn consensus_encode(&self, encoder: &mut Encoder) -> Result<(), EncodeError> {
        self.prevout.consensus_encode(encoder)?;
        encoder.write_framed(&encode(&self.unlocking_script)?)
    }
}

impl Decodable for TxIn {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let prevout = OutPoint::consensus_decode(decoder)?;
        let unlocking_script = decoder.read_framed_value::<Script>()?;
        Ok(Self {
            prevout,
            unlocking_script,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TxOut {
    pub value: u64,
    pub locking_script: Script,
}

impl TxOut {
    pub fn new(value: u64, locking_script: Script) -> Self {
        Self {
            value,
            locking_script,
        }
    }
}

impl Encodable for TxOut {
    fn consensus_encode(&self, encoder: &mut Encoder) -> Result<(), EncodeError> {
        encoder.write_u64_be(self.value);
        encoder.write_framed(&encode(&self.locking_script)?)
    }
}

impl Decodable for TxOut {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let value = decoder.read_u64_be()?;
        let locking_script = decoder.read_framed_value::<Script>()?;
        Ok(Self {
            value,
            locking_script,
        })
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Transaction {
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
}

impl Transaction {
    pub fn new(inputs: Vec<TxIn>, outputs: Vec<TxOut>) -> Self {
        Self { inputs, outputs }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        encode(self)
    }

    pub fn txid(&self) -> Result<Hash256, EncodeError> {
        Ok(sha256d(&self.to_bytes()?))
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].is_coinbase()
    }

    pub fn output_value(&self) -> u128 {
        self.outputs
            .iter()
            .map(|output| u128::from(output.value))
            .sum()
    }
}

impl Encodable for Transaction {
    fn consensus_encode(&self, encoder: &mut Encoder) -> Result<(), EncodeError> {
        write_framed_vec(encoder, &self.inputs)?;
        write_framed_vec(encoder, &self.outputs)
    }
}

impl Decodable for Transaction {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let inputs = read_framed_vec(decoder)?;
        let outputs = read_framed_vec(decoder)?;
        Ok(Self { inputs, outputs })
    }
}

/// Writes `count || { len || element }*`.
pub(crate) fn write_framed_vec<T: Encodable>(
    encoder: &mut Encoder,
    values: &[T],
) -> Result<(), EncodeError> {
    encoder.write_len(values.len())?;
    for value in values {
        encoder.write_framed(&encode(value)?)?;
    }
    Ok(())
}

pub(crate) fn read_framed_vec<T: Decodable>(decoder: &mut Decoder) -> Result<Vec<T>, DecodeError> {
    let count = decoder.read_len()?;
    let mut values = Vec::with_capacity(count.min(decoder.remaining() / 2));
    for _ in 0..count {
        values.push(decoder.read_framed_value::<T>()?);
    }
    Ok(values)
}
