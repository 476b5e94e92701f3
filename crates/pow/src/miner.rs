//! Nonce search.

use std::ops::RangeInclusive;

use powledger_consensus::constants::MAX_NONCE;
use powledger_primitives::block::BlockHeader;
use powledger_primitives::encoding::EncodeError;
use primitive_types::U256;

use crate::work::block_work;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PowError {
    /// No nonce in the searched range produced enough work.
    NonceExhausted,
    Encode(EncodeError),
}

impl std::fmt::Display for PowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowError::NonceExhausted => write!(f, "nonce space exhausted before reaching target work"),
            PowError::Encode(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for PowError {}

impl From<EncodeError> for PowError {
    fn from(err: EncodeError) -> Self {
        PowError::Encode(err)
    }
}

/// First nonce after `header.nonce` whose block id is worth more than `target`.
///
/// The header itself is not modified; callers set the returned nonce.
pub fn find_nonce(header: &BlockHeader, target: U256) -> Result<u128, PowError> {
    let Some(start) = header.nonce.checked_add(1) else {
        return Err(PowError::NonceExhausted);
    };
    if start > MAX_NONCE {
        return Err(PowError::NonceExhausted);
    }
    find_nonce_in_range(header, target, start..=MAX_NONCE)
}

/// Same search confined to `range`, so disjoint ranges can run on separate threads.
/// The range is clamped to the 96-bit nonce space.
pub fn find_nonce_in_range(
    header: &BlockHeader,
    target: U256,
    range: RangeInclusive<u128>,
) -> Result<u128, PowError> {
    let (start, end) = range.into_inner();
    let end = end.min(MAX_NONCE);
    let mut candidate = header.clone();
    let mut nonce = start;
    while nonce <= end {
        candidate.nonce = nonce;
        if block_work(&candidate.hash()?) > target {
            return Ok(nonce);
        }
        nonce += 1;
    }
    Err(PowError::NonceExhausted)
}
