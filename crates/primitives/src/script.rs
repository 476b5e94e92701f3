//! Register-script data model and wire format.
//!
//! A script is a flat list of expressions. Each expression names a target slot,
//! an opcode byte, and an operand whose meaning depends on the opcode; the
//! interpreter lives in the script crate, this module only carries the bytes.

use std::ops::Add;

use powledger_consensus::constants::MAX_SCRIPT_SIZE;

use crate::encoding::{encode, Decodable, DecodeError, Decoder, Encodable, EncodeError, Encoder};

/// Bytes taken by the target and opcode fields inside an expression frame.
const EXPRESSION_HEADER_LEN: usize = 2;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Expression {
    pub target: u8,
    pub opcode: u8,
    pub operand: Vec<u8>,
}

impl Expression {
    pub fn new(target: u8, opcode: u8, operand: impl Into<Vec<u8>>) -> Self {
        Self {
            target,
            opcode,
            operand: operand.into(),
        }
    }
}

impl Encodable for Expression {
    fn consensus_encode(&self, encoder: &mut Encoder) -> Result<(), EncodeError> {
        encoder.write_len(self.operand.len() + EXPRESSION_HEADER_LEN)?;
        encoder.write_u8(self.target);
        encoder.write_u8(self.opcode);
        encoder.write_bytes(&self.operand);
        Ok(())
    }
}

impl Decodable for Expression {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let mut frame = decoder.read_framed()?;
        if frame.remaining() < EXPRESSION_HEADER_LEN {
            return Err(DecodeError::InvalidData("expression shorter than its header"));
        }
        let target = frame.read_u8()?;
        let opcode = frame.read_u8()?;
        let operand = frame.read_bytes(frame.remaining())?;
        Ok(Self {
            target,
            opcode,
            operand,
        })
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Script {
    pub expressions: Vec<Expression>,
}

impl Script {
    pub fn new(expressions: Vec<Expression>) -> Self {
        Self { expressions }
    }

    pub fn is_empty(&self) -> bool {
        self.expressions.is_empty()
    }

    /// `self ++ other` as a new script; neither input is touched.
    pub fn concat(&self, other: &Script) -> Script {
        let mut expressions = Vec::with_capacity(self.expressions.len() + other.expressions.len());
        expressions.extend_from_slice(&self.expressions);
        expressions.extend_from_slice(&other.expressions);
        Script { expressions }
    }

    pub fn serialized_len(&self) -> usize {
        self.expressions
            .iter()
            .map(|expression| EXPRESSION_HEADER_LEN + 2 + expression.operand.len())
            .sum()
    }

    pub fn is_valid(&self) -> bool {
        self.serialized_len() < MAX_SCRIPT_SIZE
            && self
                .expressions
                .iter()
                .all(|expression| expression.operand.len() + EXPRESSION_HEADER_LEN <= u16::MAX as usize)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        encode(self)
    }
}

impl Add<&Script> for &Script {
    type Output = Script;

    fn add(self, other: &Script) -> Script {
        self.concat(other)
    }
}

impl Encodable for Script {
    fn consensus_encode(&self, encoder: &mut Encoder) -> Result<(), EncodeError> {
        for expression in &self.expressions {
            expression.consensus_encode(encoder)?;
        }
        Ok(())
    }
}

impl Decodable for Script {
    /// Consumes the whole decoder; scripts are always framed by their container.
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let mut expressions = Vec::new();
        while !decoder.is_empty() {
            expressions.push(Expression::consensus_decode(decoder)?);
        }
        Ok(Self { expressions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::decode;

    #[test]
    fn expression_layout() {
        let script = Script::new(vec![Expression::new(0x02, 0x00, vec![0xaa, 0xbb])]);
        let bytes = script.to_bytes().expect("encode");
        assert_eq!(bytes, vec![0x00, 0x04, 0x02, 0x00, 0xaa, 0xbb]);
        assert_eq!(script.serialized_len(), bytes.len());
        assert_eq!(decode::<Script>(&bytes).expect("decode"), script);
    }

    #[test]
    fn empty_script_is_empty_bytes() {
        assert_eq!(Script::default().to_bytes().expect("encode"), Vec::<u8>::new());
        assert_eq!(decode::<Script>(&[]).expect("decode"), Script::default());
    }

    #[test]
    fn concat_leaves_sources_untouched() {
        let locking = Script::new(vec![Expression::new(1, 0, vec![1])]);
        let unlocking = Script::new(vec![Expression::new(2, 0, vec![2])]);
        let joined = &locking + &unlocking;
        assert_eq!(joined.expressions.len(), 2);
        assert_eq!(joined.expressions[0], locking.expressions[0]);
        assert_eq!(joined.expressions[1], unlocking.expressions[0]);
        assert_eq!(locking.expressions.len(), 1);
        assert_eq!(unlocking.expressions.len(), 1);
    }

    #[test]
    fn short_expression_frame_is_malformed() {
        assert!(matches!(
            decode::<Script>(&[0x00, 0x01, 0x05]),
            Err(DecodeError::InvalidData(_))
        ));
        assert_eq!(
            decode::<Script>(&[0x00, 0x05, 0x01, 0x00]),
            Err(DecodeError::UnexpectedEof)
        );
    }

    #[test]
    fn oversized_script_is_invalid() {
        let chunk = vec![0u8; 60_000];
        let script = Script::new(vec![
            Expression::new(0, 0, chunk.clone()),
            Expression::new(1, 0, chunk),
        ]);
        assert!(!script.is_valid());
        assert!(Script::default().is_valid());
    }
}
