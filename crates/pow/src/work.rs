//! Work accounting.
//!
//! A block id read as a big-endian integer `v` is worth `floor(2^256 / v)`.
//! Smaller ids are worth more; cumulative work is the plain sum.

use powledger_consensus::Hash256;
use primitive_types::U256;

/// `floor(2^256 / int_be(id))`, saturating at `U256::MAX` for ids 0 and 1.
pub fn block_work(id: &Hash256) -> U256 {
    let value = U256::from_big_endian(id);
    if value <= U256::one() {
        return U256::MAX;
    }
    // 2^256 = MAX + 1, so floor((MAX + 1) / v) is MAX / v, plus one when v divides MAX + 1.
    let quotient = U256::MAX / value;
    let remainder = U256::MAX % value;
    if remainder + U256::one() == value {
        quotient + U256::one()
    } else {
        quotient
    }
}

pub fn chain_work<'a, I>(ids: I) -> U256
where
    I: IntoIterator<Item = &'a Hash256>,
{
    ids.into_iter()
        .fold(U256::zero(), |total, id| total.saturating_add(block_work(id)))
}

pub fn work_to_bytes(work: U256) -> [u8; 32] {
    work.to_big_endian()
}

pub fn work_from_bytes(bytes: &[u8; 32]) -> U256 {
    U256::from_big_endian(bytes)
}
