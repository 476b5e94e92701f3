//! Standard locking/unlocking templates and their classification.
//!
//! Slot layout shared by every template: the unlocking script pushes the x-only
//! public key to `0x00` and the signature to `0x01`; the locking script pushes
//! what it expects to `0x02`, hashes into `0x03` when it commits to a key hash,
//! and uses `0xff` as scratch for comparison results.

use powledger_consensus::Hash256;
use powledger_primitives::hash::sha256d;
use powledger_primitives::script::{Expression, Script};
use secp256k1::{Keypair, Message, SecretKey, XOnlyPublicKey};

use crate::interpreter::Opcode;
use crate::secp::secp256k1_all;

pub const PUBKEY_SLOT: u8 = 0x00;
pub const SIGNATURE_SLOT: u8 = 0x01;
pub const EXPECTED_SLOT: u8 = 0x02;
pub const HASH_SLOT: u8 = 0x03;
pub const SCRATCH_SLOT: u8 = 0xff;

pub const PUBKEY_SIZE: usize = 32;
pub const SIGNATURE_SIZE: usize = 64;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScriptType {
    P2Pk,
    P2Pkh,
    Unknown,
}

fn push(target: u8, data: &[u8]) -> Expression {
    Expression::new(target, Opcode::PushData as u8, data.to_vec())
}

fn verify_scratch() -> Expression {
    Expression::new(SCRATCH_SLOT, Opcode::Verify as u8, vec![SCRATCH_SLOT])
}

fn check_signature() -> [Expression; 2] {
    [
        Expression::new(
            SCRATCH_SLOT,
            Opcode::SchnorrCheckSig as u8,
            vec![PUBKEY_SLOT, SIGNATURE_SLOT],
        ),
        verify_scratch(),
    ]
}

pub fn lock_p2pk(pubkey: &[u8; PUBKEY_SIZE]) -> Script {
    let mut expressions = vec![
        push(EXPECTED_SLOT, pubkey),
        Expression::new(SCRATCH_SLOT, Opcode::Equal as u8, vec![EXPECTED_SLOT, PUBKEY_SLOT]),
        verify_scratch(),
    ];
    expressions.extend(check_signature());
    Script::new(expressions)
}

pub fn lock_p2pkh(pubkey_hash: &Hash256) -> Script {
    let mut expressions = vec![
        push(EXPECTED_SLOT, pubkey_hash),
        Expression::new(HASH_SLOT, Opcode::Hash256 as u8, vec![PUBKEY_SLOT]),
        Expression::new(SCRATCH_SLOT, Opcode::Equal as u8, vec![HASH_SLOT, EXPECTED_SLOT]),
        verify_scratch(),
    ];
    expressions.extend(check_signature());
    Script::new(expressions)
}

/// Unlocking script for both templates.
pub fn unlock(pubkey: &[u8; PUBKEY_SIZE], signature: &[u8; SIGNATURE_SIZE]) -> Script {
    Script::new(vec![push(PUBKEY_SLOT, pubkey), push(SIGNATURE_SLOT, signature)])
}

pub fn pubkey_hash(pubkey: &[u8]) -> Hash256 {
    sha256d(pubkey)
}

pub fn xonly_pubkey(secret: &SecretKey) -> [u8; PUBKEY_SIZE] {
    let keypair = Keypair::from_secret_key(secp256k1_all(), secret);
    let (pubkey, _parity) = XOnlyPublicKey::from_keypair(&keypair);
    pubkey.serialize()
}

/// Deterministic BIP-340 signature over `sighash`.
pub fn sign_sighash(secret: &SecretKey, sighash: &Hash256) -> [u8; SIGNATURE_SIZE] {
    let keypair = Keypair::from_secret_key(secp256k1_all(), secret);
    let message = Message::from_digest(*sighash);
    let signature = secp256k1_all().sign_schnorr_no_aux_rand(&message, &keypair);
    let bytes: &[u8; SIGNATURE_SIZE] = signature.as_ref();
    *bytes
}

/// Signs `sighash` and returns the matching unlocking script.
pub fn sign_unlock(secret: &SecretKey, sighash: &Hash256) -> Script {
    unlock(&xonly_pubkey(secret), &sign_sighash(secret, sighash))
}

pub fn classify_locking_script(script: &Script) -> ScriptType {
    match script.expressions.first() {
        Some(first) if first.target == EXPECTED_SLOT && first.opcode == Opcode::PushData as u8 => {
            if first.operand.len() != PUBKEY_SIZE {
                return ScriptType::Unknown;
            }
            let mut key = [0u8; PUBKEY_SIZE];
            key.copy_from_slice(&first.operand);
            if *script == lock_p2pkh(&key) {
                ScriptType::P2Pkh
            } else if *script == lock_p2pk(&key) {
                ScriptType::P2Pk
            } else {
                ScriptType::Unknown
            }
        }
        _ => ScriptType::Unknown,
    }
}
