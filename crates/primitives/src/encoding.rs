//! Big-endian, length-prefixed wire codec.
//!
//! Every variable-length field carries its own 16-bit count or byte length. Nested
//! elements are framed by that length and must consume it exactly.

use powledger_consensus::constants::{MAX_LENGTH_PREFIX, NONCE_SIZE};
use powledger_consensus::Hash256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// A count or byte length does not fit the 16-bit prefix.
    LengthOverflow(usize),
    NonceOutOfRange,
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodeError::LengthOverflow(len) => {
                write!(f, "length {len} does not fit a 16-bit prefix")
            }
            EncodeError::NonceOutOfRange => write!(f, "nonce exceeds 96 bits"),
        }
    }
}

impl std::error::Error for EncodeError {}

#[derive(Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_u16_be(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u64_be(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_nonce(&mut self, value: u128) -> Result<(), EncodeError> {
        let bytes = value.to_be_bytes();
        let (high, low) = bytes.split_at(bytes.len() - NONCE_SIZE);
        if high.iter().any(|byte| *byte != 0) {
            return Err(EncodeError::NonceOutOfRange);
        }
        self.buf.extend_from_slice(low);
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_hash(&mut self, hash: &Hash256) {
        self.buf.extend_from_slice(hash);
    }

    /// Writes a 16-bit count or length prefix.
    pub fn write_len(&mut self, len: usize) -> Result<(), EncodeError> {
        if len > MAX_LENGTH_PREFIX {
            return Err(EncodeError::LengthOverflow(len));
        }
        self.write_u16_be(len as u16);
        Ok(())
    }

    /// Writes `len(bytes) || bytes`.
    pub fn write_framed(&mut self, bytes: &[u8]) -> Result<(), EncodeError> {
        self.write_len(bytes.len())?;
        self.write_bytes(bytes);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    UnexpectedEof,
    InvalidData(&'static str),
    TrailingBytes,
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::UnexpectedEof => write!(f, "declared length exceeds remaining input"),
            DecodeError::InvalidData(message) => write!(f, "{message}"),
            DecodeError::TrailingBytes => write!(f, "trailing bytes after decode"),
        }
    }
}

impl std::error::Error for DecodeError {}

pub struct Decoder<'a> {
    input: &'a [u8],
    cursor: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self { input, cursor: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.input.len().saturating_sub(self.cursor)
    }

    pub fn is_empty(&self) -> bool {
        self.cursor >= self.input.len()
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < len {
            return Err(DecodeError::UnexpectedEof);
        }
        let start = self.cursor;
        self.cursor += len;
        Ok(&self.input[start..start + len])
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.read_slice(1)?[0])
    }

    pub fn read_u16_be(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_be_bytes(self.read_fixed::<2>()?))
    }

    pub fn read_u64_be(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_be_bytes(self.read_fixed::<8>()?))
    }

    pub fn read_nonce(&mut self) -> Result<u128, DecodeError> {
        let mut bytes = [0u8; 16];
        bytes[16 - NONCE_SIZE..].copy_from_slice(self.read_slice(NONCE_SIZE)?);
        Ok(u128::from_be_bytes(bytes))
    }

    pub fn read_fixed<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let bytes = self.read_slice(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, DecodeError> {
        Ok(self.read_slice(len)?.to_vec())
    }

    pub fn read_hash(&mut self) -> Result<Hash256, DecodeError> {
        self.read_fixed::<32>()
    }

    pub fn read_len(&mut self) -> Result<usize, DecodeError> {
        Ok(self.read_u16_be()? as usize)
    }

    /// Reads a length prefix and returns a decoder confined to that many bytes.
    pub fn read_framed(&mut self) -> Result<Decoder<'a>, DecodeError> {
        let len = self.read_len()?;
        Ok(Decoder::new(self.read_slice(len)?))
    }

    /// Decodes one framed element and requires it to fill its frame exactly.
    pub fn read_framed_value<T: Decodable>(&mut self) -> Result<T, DecodeError> {
        let mut frame = self.read_framed()?;
        let value = T::consensus_decode(&mut frame)?;
        if !frame.is_empty() {
            return Err(DecodeError::TrailingBytes);
        }
        Ok(value)
    }
}

pub trait Encodable {
    fn consensus_encode(&self, encoder: &mut Encoder) -> Result<(), EncodeError>;
}

pub trait Decodable: Sized {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError>;
}

pub fn encode<T: Encodable>(value: &T) -> Result<Vec<u8>, EncodeError> {
    let mut encoder = Encoder::new();
    value.consensus_encode(&mut encoder)?;
    Ok(encoder.into_inner())
}

pub fn decode<T: Decodable>(bytes: &[u8]) -> Result<T, DecodeError> {
    let mut decoder = Decoder::new(bytes);
    let value = T::consensus_decode(&mut decoder)?;
    if !decoder.is_empty() {
        return Err(DecodeError::TrailingBytes);
    }
    Ok(value)
}
