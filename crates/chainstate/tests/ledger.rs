mod common;

use std::sync::Arc;

use powledger_chainstate::ledger::Ledger;
use powledger_chainstate::{ErrorKind, ValidationError};
use powledger_chainstate::state::ChainStateError;
use powledger_consensus::constants::SUBSIDY;
use powledger_primitives::outpoint::OutPoint;
use powledger_primitives::transaction::{Transaction, TxIn, TxOut};
use powledger_script::standard::{lock_p2pk, lock_p2pkh, pubkey_hash, sign_unlock, xonly_pubkey};
use powledger_script::{signature_hash, SchnorrChecker};
use powledger_storage::MemoryStore;
use secp256k1::SecretKey;

use common::{anyone, coinbase, make_block, outpoint, spend, GENESIS};

fn ledger() -> Ledger<Arc<MemoryStore>> {
    Ledger::new(Arc::new(MemoryStore::new()), SUBSIDY, Arc::new(SchnorrChecker))
}

fn kind(err: &ChainStateError) -> Option<ErrorKind> {
    err.kind()
}

fn secret(byte: u8) -> SecretKey {
    SecretKey::from_slice(&[byte; 32]).expect("secret key")
}

#[test]
fn coinbase_may_claim_exactly_the_subsidy() {
    let ledger = ledger();
    let block = make_block(GENESIS, vec![coinbase(1, vec![anyone(SUBSIDY)])]);
    let undo = ledger.add_block(&block).expect("add");
    assert_eq!(undo.created.len(), 1);
    assert!(undo.restored.is_empty());

    let entries = ledger.utxos().entries().expect("entries");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].1.value, 10_000_000_000);

    let greedy = make_block(GENESIS, vec![coinbase(2, vec![anyone(SUBSIDY + 1)])]);
    let err = ledger.add_block(&greedy).expect_err("overclaim");
    assert_eq!(kind(&err), Some(ErrorKind::ConsensusViolation));
    assert!(matches!(
        err,
        ChainStateError::Validation(ValidationError::FeeExceeded { .. })
    ));
    assert_eq!(ledger.utxos().entries().expect("entries").len(), 1);
}

#[test]
fn fee_bound_accepts_exact_and_rejects_one_more() {
    let ledger = ledger();
    let funding = coinbase(1, vec![anyone(SUBSIDY)]);
    let funded = outpoint(&funding, 0);
    ledger
        .add_block(&make_block(GENESIS, vec![funding]))
        .expect("fund");

    let fee = 4_000_000_000u64;
    let payment = spend(&[funded], vec![anyone(SUBSIDY - fee)]);

    let greedy = make_block(
        GENESIS,
        vec![coinbase(2, vec![anyone(SUBSIDY + fee + 1)]), payment.clone()],
    );
    let err = ledger.validate_block(&greedy).expect_err("fee + 1");
    assert_eq!(kind(&err), Some(ErrorKind::ConsensusViolation));

    let exact = make_block(
        GENESIS,
        vec![coinbase(2, vec![anyone(SUBSIDY + fee)]), payment],
    );
    ledger.validate_block(&exact).expect("exact bound");
    let undo = ledger.add_block(&exact).expect("add");
    assert_eq!(undo.restored.len(), 1);
    assert_eq!(undo.created.len(), 2);
}

#[test]
fn two_coinbases_are_structurally_invalid() {
    let ledger = ledger();
    let block = make_block(
        GENESIS,
        vec![
            coinbase(1, vec![anyone(1)]),
            coinbase(2, vec![anyone(1)]),
        ],
    );
    let err = ledger.add_block(&block).expect_err("two coinbases");
    assert_eq!(kind(&err), Some(ErrorKind::StructuralInvalid));
    assert!(ledger.utxos().entries().expect("entries").is_empty());
}

#[test]
fn spending_absent_output_index_is_unknown_reference() {
    let ledger = ledger();
    let funding = coinbase(1, vec![anyone(SUBSIDY)]);
    let txid = funding.txid().expect("txid");
    ledger
        .add_block(&make_block(GENESIS, vec![funding]))
        .expect("fund");

    let bogus = OutPoint::new(txid, 1);
    let block = make_block(
        GENESIS,
        vec![coinbase(2, vec![anyone(1)]), spend(&[bogus.clone()], vec![anyone(1)])],
    );
    let err = ledger.add_block(&block).expect_err("missing input");
    assert_eq!(kind(&err), Some(ErrorKind::UnknownReference));
    assert!(matches!(
        err,
        ChainStateError::Validation(ValidationError::MissingInput(ref missing)) if *missing == bogus
    ));
}

#[test]
fn in_block_double_spend_is_rejected() {
    let ledger = ledger();
    let funding = coinbase(1, vec![anyone(SUBSIDY)]);
    let funded = outpoint(&funding, 0);
    ledger
        .add_block(&make_block(GENESIS, vec![funding]))
        .expect("fund");

    let block = make_block(
        GENESIS,
        vec![
            coinbase(2, vec![anyone(1)]),
            spend(&[funded.clone()], vec![anyone(10)]),
            spend(&[funded.clone()], vec![anyone(20)]),
        ],
    );
    let err = ledger.add_block(&block).expect_err("double spend");
    assert_eq!(kind(&err), Some(ErrorKind::ConsensusViolation));
    assert!(matches!(
        err,
        ChainStateError::Validation(ValidationError::DoubleSpend(ref outpoint)) if *outpoint == funded
    ));
    assert!(ledger.utxos().get(&funded).expect("get").is_some());
}

#[test]
fn outputs_created_in_a_block_are_not_spendable_in_it() {
    let ledger = ledger();
    let funding = coinbase(1, vec![anyone(SUBSIDY)]);
    let funded = outpoint(&funding, 0);
    ledger
        .add_block(&make_block(GENESIS, vec![funding]))
        .expect("fund");

    let first = spend(&[funded], vec![anyone(1)]);
    let chained = spend(&[outpoint(&first, 0)], vec![anyone(1)]);
    let block = make_block(GENESIS, vec![coinbase(2, vec![anyone(1)]), first, chained]);
    let err = ledger.add_block(&block).expect_err("chained spend");
    assert_eq!(kind(&err), Some(ErrorKind::UnknownReference));
}

#[test]
fn reverse_restores_exact_snapshot() {
    let ledger = ledger();
    let funding = coinbase(1, vec![anyone(SUBSIDY / 2), anyone(SUBSIDY / 2)]);
    let left = outpoint(&funding, 0);
    ledger
        .add_block(&make_block(GENESIS, vec![funding]))
        .expect("fund");
    let before = ledger.utxos().entries().expect("entries");

    let block = make_block(
        GENESIS,
        vec![
            coinbase(2, vec![anyone(SUBSIDY)]),
            spend(&[left], vec![anyone(1), anyone(2), anyone(3)]),
        ],
    );
    let undo = ledger.add_block(&block).expect("add");
    assert_ne!(ledger.utxos().entries().expect("entries"), before);

    ledger.reverse_block(&undo).expect("reverse");
    assert_eq!(ledger.utxos().entries().expect("entries"), before);

    // A second reversal finds its created outputs gone.
    let err = ledger.reverse_block(&undo).expect_err("reversed twice");
    assert_eq!(kind(&err), Some(ErrorKind::UnknownReference));
    assert_eq!(ledger.utxos().entries().expect("entries"), before);
}

#[test]
fn undo_restoring_the_coinbase_sentinel_is_rejected() {
    let ledger = ledger();
    let mut undo = powledger_chainstate::BlockUndo::new([1u8; 32]);
    undo.restored.push((
        powledger_chainstate::utxo::OutPointKey::new(&OutPoint::coinbase()),
        anyone(1),
    ));
    let err = ledger.reverse_block(&undo).expect_err("sentinel");
    assert_eq!(kind(&err), Some(ErrorKind::StructuralInvalid));
}

fn signed_spend(key: &SecretKey, prevouts: &[OutPoint], outputs: Vec<TxOut>) -> Transaction {
    let mut tx = spend(prevouts, outputs);
    let sighash = signature_hash(&tx).expect("sighash");
    for input in &mut tx.inputs {
        input.unlocking_script = sign_unlock(key, &sighash);
    }
    tx
}

#[test]
fn p2pkh_spend_requires_the_owner_signature() {
    let ledger = ledger();
    let owner = secret(1);
    let thief = secret(2);
    let funding = coinbase(
        1,
        vec![TxOut::new(SUBSIDY, lock_p2pkh(&pubkey_hash(&xonly_pubkey(&owner))))],
    );
    let funded = outpoint(&funding, 0);
    ledger
        .add_block(&make_block(GENESIS, vec![funding]))
        .expect("fund");

    let stolen = signed_spend(&thief, &[funded.clone()], vec![anyone(SUBSIDY)]);
    ledger
        .validate_transaction(&stolen)
        .expect_err("thief signature");
    let block = make_block(GENESIS, vec![coinbase(2, vec![anyone(1)]), stolen]);
    let err = ledger.add_block(&block).expect_err("thief block");
    assert_eq!(kind(&err), Some(ErrorKind::UnknownReference));
    assert!(matches!(
        err,
        ChainStateError::Validation(ValidationError::ScriptFailed { input: 0, .. })
    ));

    let paid = signed_spend(&owner, &[funded.clone()], vec![anyone(SUBSIDY)]);
    ledger.validate_transaction(&paid).expect("owner signature");
    let block = make_block(GENESIS, vec![coinbase(3, vec![anyone(1)]), paid]);
    ledger.add_block(&block).expect("owner block");
    assert!(ledger.utxos().get(&funded).expect("get").is_none());
}

#[test]
fn wide_spend_reports_first_bad_signature() {
    let ledger = ledger();
    let owner = secret(3);
    let lock = lock_p2pk(&xonly_pubkey(&owner));
    let count = 24u16;
    let funding = coinbase(
        1,
        (0..count).map(|_| TxOut::new(1_000, lock.clone())).collect(),
    );
    let prevouts: Vec<OutPoint> = (0..count).map(|index| outpoint(&funding, index)).collect();
    ledger
        .add_block(&make_block(GENESIS, vec![funding]))
        .expect("fund");

    let mut tx = signed_spend(&owner, &prevouts, vec![anyone(1_000 * u64::from(count))]);
    let good = tx.clone();
    let wrong = sign_unlock(&secret(4), &[0u8; 32]);
    tx.inputs[7].unlocking_script = wrong.clone();
    tx.inputs[19].unlocking_script = wrong;
    let bad_block = make_block(GENESIS, vec![coinbase(2, vec![anyone(1)]), tx]);
    let err = ledger.add_block(&bad_block).expect_err("bad signature");
    assert!(matches!(
        err,
        ChainStateError::Validation(ValidationError::ScriptFailed { input: 7, .. })
    ));

    let block = make_block(GENESIS, vec![coinbase(3, vec![anyone(1)]), good]);
    let undo = ledger.add_block(&block).expect("wide spend");
    assert_eq!(undo.restored.len(), usize::from(count));
}

#[test]
fn coinbase_input_outside_coinbase_is_structural() {
    let ledger = ledger();
    let sneaky = Transaction::new(
        vec![
            TxIn::new(OutPoint::new([9u8; 32], 0), Default::default()),
            TxIn::coinbase(Default::default()),
        ],
        vec![anyone(1)],
    );
    let err = ledger.validate_transaction(&sneaky).expect_err("sneaky");
    assert_eq!(kind(&err), Some(ErrorKind::StructuralInvalid));
}

#[test]
fn input_free_transaction_is_structural() {
    let ledger = ledger();
    let empty = Transaction::new(vec![], vec![anyone(0)]);
    let err = ledger.validate_transaction(&empty).expect_err("no inputs");
    assert_eq!(kind(&err), Some(ErrorKind::StructuralInvalid));
    assert!(matches!(
        err,
        ChainStateError::Validation(ValidationError::InvalidTransaction(_))
    ));

    // Across blocks, a repeated copy would overwrite the first one's output.
    ledger
        .add_block(&make_block(GENESIS, vec![coinbase(1, vec![anyone(SUBSIDY)])]))
        .expect("fund");
    let before = ledger.utxos().entries().expect("entries");
    let err = ledger
        .add_block(&make_block(
            GENESIS,
            vec![coinbase(2, vec![anyone(SUBSIDY)]), empty.clone()],
        ))
        .expect_err("input-free tx in block");
    assert_eq!(kind(&err), Some(ErrorKind::StructuralInvalid));

    // Within one block, two copies would record the same created key twice.
    let err = ledger
        .add_block(&make_block(
            GENESIS,
            vec![coinbase(3, vec![anyone(SUBSIDY)]), empty.clone(), empty],
        ))
        .expect_err("repeated input-free tx");
    assert_eq!(kind(&err), Some(ErrorKind::StructuralInvalid));
    assert_eq!(ledger.utxos().entries().expect("entries"), before);
}

#[test]
fn coinbase_recreating_unspent_output_is_rejected() {
    let ledger = ledger();
    let reward = coinbase(1, vec![anyone(SUBSIDY)]);
    let paid = outpoint(&reward, 0);
    ledger
        .add_block(&make_block(GENESIS, vec![reward.clone()]))
        .expect("first");

    let err = ledger
        .add_block(&make_block([7u8; 32], vec![reward]))
        .expect_err("same coinbase again");
    assert_eq!(kind(&err), Some(ErrorKind::ConsensusViolation));
    match err {
        ChainStateError::Validation(ValidationError::DuplicateCoinbase(outpoint)) => {
            assert_eq!(outpoint, paid)
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(ledger.utxos().entries().expect("entries").len(), 1);
}

#[test]
fn spending_more_than_inputs_is_overspend() {
    let ledger = ledger();
    let funding = coinbase(1, vec![anyone(SUBSIDY)]);
    let funded = outpoint(&funding, 0);
    ledger
        .add_block(&make_block(GENESIS, vec![funding]))
        .expect("fund");

    ledger
        .validate_transaction(&spend(&[funded.clone()], vec![anyone(SUBSIDY)]))
        .expect("exact spend");
    let err = ledger
        .validate_transaction(&spend(&[funded], vec![anyone(SUBSIDY), anyone(1)]))
        .expect_err("one over");
    assert_eq!(kind(&err), Some(ErrorKind::ConsensusViolation));
    match err {
        ChainStateError::Validation(ValidationError::Overspend { inputs, outputs }) => {
            assert_eq!(inputs, u128::from(SUBSIDY));
            assert_eq!(outputs, u128::from(SUBSIDY) + 1);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn repeated_input_in_one_transaction_is_rejected() {
    let ledger = ledger();
    let funding = coinbase(1, vec![anyone(SUBSIDY)]);
    let funded = outpoint(&funding, 0);
    ledger
        .add_block(&make_block(GENESIS, vec![funding]))
        .expect("fund");

    let err = ledger
        .validate_transaction(&spend(&[funded.clone(), funded], vec![anyone(1)]))
        .expect_err("same input twice");
    assert_eq!(kind(&err), Some(ErrorKind::StructuralInvalid));
    assert!(matches!(
        err,
        ChainStateError::Validation(ValidationError::DuplicateInput)
    ));
}

#[test]
fn reversing_absent_created_output_is_rejected() {
    let ledger = ledger();
    let reward = coinbase(1, vec![anyone(SUBSIDY)]);
    let paid = outpoint(&reward, 0);
    ledger
        .add_block(&make_block(GENESIS, vec![reward]))
        .expect("fund");
    let before = ledger.utxos().entries().expect("entries");

    let absent = OutPoint::new([0x42; 32], 3);
    let mut undo = powledger_chainstate::BlockUndo::new([1u8; 32]);
    undo.created
        .push(powledger_chainstate::utxo::OutPointKey::new(&paid));
    undo.created
        .push(powledger_chainstate::utxo::OutPointKey::new(&absent));
    let err = ledger.reverse_block(&undo).expect_err("absent created output");
    assert_eq!(kind(&err), Some(ErrorKind::UnknownReference));
    match err {
        ChainStateError::Validation(ValidationError::MissingCreatedOutput(outpoint)) => {
            assert_eq!(outpoint, absent)
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(ledger.utxos().entries().expect("entries"), before);
}
