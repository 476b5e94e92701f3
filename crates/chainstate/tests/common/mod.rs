#![allow(dead_code)]

use std::sync::Arc;

use powledger_chainstate::ChainState;
use powledger_consensus::constants::SUBSIDY;
use powledger_consensus::{chain_params, Hash256, Network};
use powledger_pow::{block_work, U256};
use powledger_primitives::block::{Block, BlockHeader};
use powledger_primitives::outpoint::OutPoint;
use powledger_primitives::script::{Expression, Script};
use powledger_primitives::transaction::{Transaction, TxIn, TxOut};
use powledger_storage::MemoryStore;

pub const GENESIS: Hash256 = [0u8; 32];

pub fn tag_script(tag: u64) -> Script {
    Script::new(vec![Expression::new(0x10, 0x00, tag.to_be_bytes().to_vec())])
}

/// Output spendable with an empty unlocking script.
pub fn anyone(value: u64) -> TxOut {
    TxOut::new(value, Script::default())
}

pub fn coinbase(tag: u64, outputs: Vec<TxOut>) -> Transaction {
    Transaction::new(vec![TxIn::coinbase(tag_script(tag))], outputs)
}

pub fn spend(prevouts: &[OutPoint], outputs: Vec<TxOut>) -> Transaction {
    let inputs = prevouts
        .iter()
        .map(|prevout| TxIn::new(prevout.clone(), Script::default()))
        .collect();
    Transaction::new(inputs, outputs)
}

pub fn outpoint(tx: &Transaction, index: u16) -> OutPoint {
    OutPoint::new(tx.txid().expect("txid"), index)
}

pub fn make_block(prev_block: Hash256, transactions: Vec<Transaction>) -> Block {
    let mut block = Block::new(
        BlockHeader {
            prev_block,
            merkle_root: [0u8; 32],
            nonce: 0,
        },
        transactions,
    );
    block.header.merkle_root = block.compute_merkle_root().expect("merkle root");
    block
}

/// Grinds the nonce until the block id is worth exactly one unit of work, so
/// branch weight is just branch length.
pub fn unit_work(mut block: Block) -> Block {
    while block_work(&block.hash().expect("hash")) != U256::one() {
        block.header.nonce += 1;
    }
    block
}

pub fn block_id(block: &Block) -> Hash256 {
    block.hash().expect("hash")
}

/// `count` unit-work blocks paying the full subsidy to an anyone-can-spend output.
pub fn build_branch(prev: Hash256, first_tag: u64, count: usize) -> Vec<Block> {
    let mut blocks = Vec::with_capacity(count);
    let mut prev = prev;
    for offset in 0..count as u64 {
        let block = unit_work(make_block(
            prev,
            vec![coinbase(first_tag + offset, vec![anyone(SUBSIDY)])],
        ));
        prev = block_id(&block);
        blocks.push(block);
    }
    blocks
}

pub fn memory_chain() -> ChainState<MemoryStore> {
    ChainState::new(Arc::new(MemoryStore::new()), chain_params(Network::Regtest))
}
