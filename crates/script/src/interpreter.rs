//! Register-machine interpreter.
//!
//! Each expression writes at most one slot of a shared memory. Evaluation is
//! fail-closed: the first fault aborts the program, and only running every
//! expression to completion accepts.

use std::collections::HashMap;

use powledger_consensus::Hash256;
use powledger_primitives::hash::sha256d;
use powledger_primitives::script::{Expression, Script};

use crate::secp::SignatureChecker;

/// Slot identifier. Script operands address `0x00..=0xff`; wider ids are host-only.
pub type Slot = u16;

/// Holds the signature hash; seeded before execution, unreachable from operands.
pub const SIGHASH_SLOT: Slot = 0x100;

const TRUE: u8 = 0x01;
const FALSE: u8 = 0x00;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Opcode {
    PushData = 0x00,
    Equal = 0x01,
    Hash256 = 0x02,
    SchnorrCheckSig = 0x03,
    Verify = 0x04,
}

impl Opcode {
    /// Fixed operand width in bytes, or `None` for a literal of any length.
    pub fn operand_len(self) -> Option<usize> {
        match self {
            Opcode::PushData => None,
            Opcode::Equal | Opcode::SchnorrCheckSig => Some(2),
            Opcode::Hash256 | Opcode::Verify => Some(1),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Opcode::PushData => "PUSHDATA",
            Opcode::Equal => "EQUAL",
            Opcode::Hash256 => "HASH256",
            Opcode::SchnorrCheckSig => "SCHNORR_CHECKSIG",
            Opcode::Verify => "VERIFY",
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = ScriptError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Opcode::PushData),
            0x01 => Ok(Opcode::Equal),
            0x02 => Ok(Opcode::Hash256),
            0x03 => Ok(Opcode::SchnorrCheckSig),
            0x04 => Ok(Opcode::Verify),
            other => Err(ScriptError::UnknownOpcode(other)),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ScriptError {
    UnknownOpcode(u8),
    OperandLength {
        opcode: Opcode,
        expected: usize,
        actual: usize,
    },
    MissingSlot(Slot),
    VerifyFailed(u8),
}

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScriptError::UnknownOpcode(byte) => write!(f, "unknown opcode 0x{byte:02x}"),
            ScriptError::OperandLength {
                opcode,
                expected,
                actual,
            } => write!(
                f,
                "{} expects a {expected}-byte operand, got {actual}",
                opcode.as_str()
            ),
            ScriptError::MissingSlot(slot) => write!(f, "slot 0x{slot:02x} read before written"),
            ScriptError::VerifyFailed(slot) => write!(f, "verify failed on slot 0x{slot:02x}"),
        }
    }
}

impl std::error::Error for ScriptError {}

#[derive(Clone, Debug, Default)]
pub struct Memory {
    slots: HashMap<Slot, Vec<u8>>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Memory with the signature-hash register filled in.
    pub fn with_sighash(sighash: &Hash256) -> Self {
        let mut memory = Self::new();
        memory.set(SIGHASH_SLOT, sighash.to_vec());
        memory
    }

    pub fn get(&self, slot: Slot) -> Option<&[u8]> {
        self.slots.get(&slot).map(Vec::as_slice)
    }

    pub fn set(&mut self, slot: Slot, value: Vec<u8>) {
        self.slots.insert(slot, value);
    }

    fn read(&self, slot: Slot) -> Result<&[u8], ScriptError> {
        self.get(slot).ok_or(ScriptError::MissingSlot(slot))
    }
}

/// Runs every expression of `script` against `memory`.
pub fn execute(
    script: &Script,
    memory: &mut Memory,
    checker: &dyn SignatureChecker,
) -> Result<(), ScriptError> {
    for expression in &script.expressions {
        step(expression, memory, checker)?;
    }
    Ok(())
}

fn step(
    expression: &Expression,
    memory: &mut Memory,
    checker: &dyn SignatureChecker,
) -> Result<(), ScriptError> {
    let opcode = Opcode::try_from(expression.opcode)?;
    let operand = expression.operand.as_slice();
    if let Some(expected) = opcode.operand_len() {
        if operand.len() != expected {
            return Err(ScriptError::OperandLength {
                opcode,
                expected,
                actual: operand.len(),
            });
        }
    }
    let target = Slot::from(expression.target);

    match opcode {
        Opcode::PushData => {
            memory.set(target, operand.to_vec());
        }
        Opcode::Equal => {
            let equal = memory.read(Slot::from(operand[0]))? == memory.read(Slot::from(operand[1]))?;
            memory.set(target, vec![if equal { TRUE } else { FALSE }]);
        }
        Opcode::Hash256 => {
            let digest = sha256d(memory.read(Slot::from(operand[0]))?);
            memory.set(target, digest.to_vec());
        }
        Opcode::SchnorrCheckSig => {
            let pubkey = memory.read(Slot::from(operand[0]))?;
            let signature = memory.read(Slot::from(operand[1]))?;
            let sighash = memory.read(SIGHASH_SLOT)?;
            let valid = checker.verify(pubkey, sighash, signature);
            memory.set(target, vec![if valid { TRUE } else { FALSE }]);
        }
        Opcode::Verify => {
            if memory.read(Slot::from(operand[0]))? != [TRUE] {
                return Err(ScriptError::VerifyFailed(operand[0]));
            }
        }
    }
    Ok(())
}

/// Checks that `unlocking` satisfies `locking` under `sighash`.
///
/// Both halves run as one program over one memory. The unlocking half runs
/// first so the values it supplies are in place when the locking half checks
/// them; the spender's data can never overwrite what the lock has asserted.
pub fn verify_spend(
    locking: &Script,
    unlocking: &Script,
    sighash: &Hash256,
    checker: &dyn SignatureChecker,
) -> Result<(), ScriptError> {
    let program = unlocking.concat(locking);
    let mut memory = Memory::with_sighash(sighash);
    execute(&program, &mut memory, checker)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepts exactly when the signature equals `pubkey ++ message`.
    struct EchoChecker;

    impl SignatureChecker for EchoChecker {
        fn verify(&self, pubkey: &[u8], message: &[u8], signature: &[u8]) -> bool {
            signature == [pubkey, message].concat().as_slice()
        }
    }

    fn run(expressions: Vec<Expression>) -> Result<Memory, ScriptError> {
        let mut memory = Memory::with_sighash(&[7u8; 32]);
        execute(&Script::new(expressions), &mut memory, &EchoChecker)?;
        Ok(memory)
    }

    #[test]
    fn opcode_numbering_is_fixed() {
        for (byte, opcode) in [
            (0x00, Opcode::PushData),
            (0x01, Opcode::Equal),
            (0x02, Opcode::Hash256),
            (0x03, Opcode::SchnorrCheckSig),
            (0x04, Opcode::Verify),
        ] {
            assert_eq!(Opcode::try_from(byte), Ok(opcode));
            assert_eq!(opcode as u8, byte);
        }
        assert_eq!(Opcode::try_from(0x05), Err(ScriptError::UnknownOpcode(0x05)));
    }

    #[test]
    fn equal_and_hash_write_their_target() {
        let memory = run(vec![
            Expression::new(0x10, 0x00, b"abc".to_vec()),
            Expression::new(0x11, 0x00, b"abc".to_vec()),
            Expression::new(0x12, 0x00, b"abd".to_vec()),
            Expression::new(0x20, 0x01, vec![0x10, 0x11]),
            Expression::new(0x21, 0x01, vec![0x10, 0x12]),
            Expression::new(0x22, 0x02, vec![0x10]),
        ])
        .expect("run");
        assert_eq!(memory.get(0x20), Some(&[0x01][..]));
        assert_eq!(memory.get(0x21), Some(&[0x00][..]));
        assert_eq!(memory.get(0x22), Some(&sha256d(b"abc")[..]));
    }

    #[test]
    fn checksig_reads_the_sighash_register() {
        let mut signature = vec![0xaa];
        signature.extend_from_slice(&[7u8; 32]);
        let memory = run(vec![
            Expression::new(0x00, 0x00, vec![0xaa]),
            Expression::new(0x01, 0x00, signature),
            Expression::new(0x02, 0x03, vec![0x00, 0x01]),
            Expression::new(0x03, 0x03, vec![0x01, 0x00]),
            Expression::new(0xff, 0x04, vec![0x02]),
        ])
        .expect("run");
        assert_eq!(memory.get(0x02), Some(&[0x01][..]));
        assert_eq!(memory.get(0x03), Some(&[0x00][..]));
    }

    #[test]
    fn faults_reject() {
        assert_eq!(
            run(vec![Expression::new(0, 0x09, Vec::new())]).err(),
            Some(ScriptError::UnknownOpcode(0x09))
        );
        assert!(matches!(
            run(vec![Expression::new(0, 0x01, vec![0x00])]),
            Err(ScriptError::OperandLength { expected: 2, actual: 1, .. })
        ));
        assert_eq!(
            run(vec![Expression::new(0, 0x02, vec![0x42])]).err(),
            Some(ScriptError::MissingSlot(0x42))
        );
        assert_eq!(
            run(vec![
                Expression::new(0x05, 0x00, vec![0x01, 0x01]),
                Expression::new(0xff, 0x04, vec![0x05]),
            ])
            .err(),
            Some(ScriptError::VerifyFailed(0x05))
        );
    }

    #[test]
    fn empty_program_accepts() {
        assert!(run(Vec::new()).is_ok());
    }

    #[test]
    fn operands_cannot_reach_the_sighash_register() {
        // Slot 0x00 is not 0x100 even though the low byte matches.
        assert_eq!(
            run(vec![Expression::new(0x01, 0x02, vec![0x00])]).err(),
            Some(ScriptError::MissingSlot(0x00))
        );
    }

    #[test]
    fn spend_runs_unlocking_before_locking() {
        let locking = Script::new(vec![
            Expression::new(0x02, 0x00, b"secret".to_vec()),
            Expression::new(0xff, 0x01, vec![0x02, 0x00]),
            Expression::new(0xff, 0x04, vec![0xff]),
        ]);
        let good = Script::new(vec![Expression::new(0x00, 0x00, b"secret".to_vec())]);
        let bad = Script::new(vec![Expression::new(0x00, 0x00, b"guess".to_vec())]);
        assert!(verify_spend(&locking, &good, &[0u8; 32], &EchoChecker).is_ok());
        assert_eq!(
            verify_spend(&locking, &bad, &[0u8; 32], &EchoChecker),
            Err(ScriptError::VerifyFailed(0xff))
        );
        // Missing unlocking data is a fault, not a pass.
        assert_eq!(
            verify_spend(&locking, &Script::default(), &[0u8; 32], &EchoChecker),
            Err(ScriptError::MissingSlot(0x00))
        );
    }
}
