//! # Time-Locked Redeem Script
//!
//! ```text
//! <lock> OP_CHECKLOCKTIMEVERIFY OP_DROP OP_DUP OP_HASH160 <pkh> OP_EQUALVERIFY OP_CHECKSIG
//! ```
//!
//! The script is the redeem script of a P2SH address. Funds sent there can
//! only be spent by the key hashing to `pkh`, in a transaction whose lock
//! time has reached `lock` (a block height below 500,000,000, a UNIX
//! timestamp otherwise).

use crate::error::{LockError, LockResult};
use crate::hash::hash160;
use crate::locktime::LockKind;
use crate::script::{
    decode_script_num, opcodes::*, Builder, Instruction, Script, MAX_LOCKTIME_NUM_LEN,
};

/// Parameters committed to by a time-locked redeem script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockSpec {
    lock_value: u32,
    pub_key_hash: [u8; 20],
}

impl LockSpec {
    /// Validates `lock_value` is in `1..=u32::MAX`.
    pub fn new(lock_value: i64, pub_key_hash: [u8; 20]) -> LockResult<Self> {
        let lock_value = u32::try_from(lock_value)
            .ok()
            .filter(|v| *v > 0)
            .ok_or(LockError::InvalidLockValue { value: lock_value })?;
        Ok(Self {
            lock_value,
            pub_key_hash,
        })
    }

    pub fn lock_value(&self) -> u32 {
        self.lock_value
    }

    pub fn pub_key_hash(&self) -> &[u8; 20] {
        &self.pub_key_hash
    }

    pub fn kind(&self) -> LockKind {
        LockKind::of(self.lock_value)
    }

    pub fn locking_script(&self) -> Script {
        Builder::new()
            .push_int(i64::from(self.lock_value))
            .push_opcode(OP_CHECKLOCKTIMEVERIFY)
            .push_opcode(OP_DROP)
            .push_opcode(OP_DUP)
            .push_opcode(OP_HASH160)
            .push_slice(&self.pub_key_hash)
            .push_opcode(OP_EQUALVERIFY)
            .push_opcode(OP_CHECKSIG)
            .into_script()
    }

    /// Recover the parameters from a script built by [`LockSpec::locking_script`].
    pub fn from_locking_script(script: &Script) -> LockResult<Self> {
        let not_locked =
            || LockError::serialization(format!("not a time-locked script: {}", script.to_hex()));

        let instructions = script.instructions()?;
        let (lock, pkh) = match instructions.as_slice() {
            [
                lock,
                Instruction::Op(OP_CHECKLOCKTIMEVERIFY),
                Instruction::Op(OP_DROP),
                Instruction::Op(OP_DUP),
                Instruction::Op(OP_HASH160),
                Instruction::Push(pkh),
                Instruction::Op(OP_EQUALVERIFY),
                Instruction::Op(OP_CHECKSIG),
            ] => (lock, pkh),
            _ => return Err(not_locked()),
        };

        let lock_value = match lock {
            Instruction::Op(op @ OP_1..=OP_16) => i64::from(op - OP_1 + 1),
            Instruction::Push(data) => decode_script_num(data, MAX_LOCKTIME_NUM_LEN)?,
            _ => return Err(not_locked()),
        };
        let pub_key_hash: [u8; 20] = pkh.as_slice().try_into().map_err(|_| not_locked())?;

        Self::new(lock_value, pub_key_hash)
    }
}

/// Build the redeem script for `lock_value` and `pub_key_hash`.
pub fn build_locked_script(lock_value: i64, pub_key_hash: &[u8; 20]) -> LockResult<Script> {
    Ok(LockSpec::new(lock_value, *pub_key_hash)?.locking_script())
}

/// HASH160 of the serialized script, the payload of its P2SH address.
pub fn script_hash(script: &Script) -> [u8; 20] {
    hash160(script.as_bytes())
}
