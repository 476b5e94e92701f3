use std::sync::OnceLock;

use secp256k1::{schnorr, All, Message, Secp256k1, VerifyOnly, XOnlyPublicKey};

static SECP256K1_VERIFY: OnceLock<Secp256k1<VerifyOnly>> = OnceLock::new();
static SECP256K1_ALL: OnceLock<Secp256k1<All>> = OnceLock::new();

pub(crate) fn secp256k1_verify() -> &'static Secp256k1<VerifyOnly> {
    SECP256K1_VERIFY.get_or_init(Secp256k1::verification_only)
}

pub(crate) fn secp256k1_all() -> &'static Secp256k1<All> {
    SECP256K1_ALL.get_or_init(Secp256k1::new)
}

/// The `verify(pubkey, message, signature)` capability scripts call into.
///
/// Implementations must answer `false` for malformed inputs rather than fail;
/// the interpreter turns the answer into a `0x01`/`0x00` slot value.
pub trait SignatureChecker: Send + Sync {
    fn verify(&self, pubkey: &[u8], message: &[u8], signature: &[u8]) -> bool;
}

/// BIP-340 Schnorr over secp256k1: 32-byte x-only keys, 32-byte messages,
/// 64-byte signatures.
#[derive(Clone, Copy, Debug, Default)]
pub struct SchnorrChecker;

impl SignatureChecker for SchnorrChecker {
    fn verify(&self, pubkey: &[u8], message: &[u8], signature: &[u8]) -> bool {
        let Ok(pubkey) = XOnlyPublicKey::from_slice(pubkey) else {
            return false;
        };
        let Ok(signature) = schnorr::Signature::from_slice(signature) else {
            return false;
        };
        let Ok(message) = Message::from_digest_slice(message) else {
            return false;
        };
        secp256k1_verify()
            .verify_schnorr(&signature, &message, &pubkey)
            .is_ok()
    }
}
