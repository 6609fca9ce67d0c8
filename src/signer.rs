//! # Signing Inputs of the Locked Address
//!
//! Legacy (pre-segwit) signature hashing with `SIGHASH_ALL`, deterministic
//! low-R ECDSA over secp256k1 and the unlocking script
//! `<sig> <pubkey> <redeem script>`.
//!
//! [`verify_input`] checks a signed input the way a node would for this
//! template: the revealed redeem script, the lock time rule of
//! `OP_CHECKLOCKTIMEVERIFY`, the key hash and the signature itself.

use crate::config::tx::SEQUENCE_FINAL;
use crate::encode::Writer;
use crate::error::{LockError, LockResult};
use crate::hash::{hash160, sha256d};
use crate::keys::SigningKey;
use crate::locked_script::LockSpec;
use crate::locktime::LockKind;
use crate::script::{Builder, Instruction, Script};
use crate::transaction::Transaction;
use bitcoin::secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1};

/// Signature covers all inputs and all outputs.
pub const SIGHASH_ALL: u32 = 0x01;

/// Legacy signature hash of input `index` against `script_code`.
///
/// Every input script of a copy of `tx` is emptied, the signed input gets
/// `script_code`, and the sighash type is appended as four little-endian
/// bytes before double hashing.
pub fn signature_hash(
    tx: &Transaction,
    index: usize,
    script_code: &Script,
    sighash_type: u32,
) -> LockResult<[u8; 32]> {
    if index >= tx.input.len() {
        return Err(LockError::ScriptVerification {
            index,
            reason: format!("transaction has only {} inputs", tx.input.len()),
        });
    }

    let mut copy = tx.clone();
    for (i, input) in copy.input.iter_mut().enumerate() {
        input.script_sig = if i == index {
            script_code.clone()
        } else {
            Script::new()
        };
    }

    let mut writer = Writer::with_capacity(copy.size() + 4);
    writer.write_bytes(&copy.to_bytes());
    writer.write_u32_le(sighash_type);
    Ok(sha256d(&writer.into_bytes()))
}

/// DER signature of input `index` with the `SIGHASH_ALL` byte appended.
pub fn sign_input(
    tx: &Transaction,
    index: usize,
    locking_script: &Script,
    key: &SigningKey,
) -> LockResult<Vec<u8>> {
    let spec = LockSpec::from_locking_script(locking_script)?;
    if spec.pub_key_hash() != &key.pub_key_hash() {
        return Err(LockError::SigningKeyMismatch {
            expected: hex::encode(spec.pub_key_hash()),
            actual: hex::encode(key.pub_key_hash()),
        });
    }

    let sighash = signature_hash(tx, index, locking_script, SIGHASH_ALL)?;
    let message = Message::from_digest(sighash);
    let signature = Secp256k1::signing_only().sign_ecdsa_low_r(&message, key.secret_key());

    let mut sig = signature.serialize_der().to_vec();
    sig.push(SIGHASH_ALL as u8);
    Ok(sig)
}

pub fn build_unlock_script(signature: &[u8], public_key: &[u8], locking_script: &Script) -> Script {
    Builder::new()
        .push_slice(signature)
        .push_slice(public_key)
        .push_slice(locking_script.as_bytes())
        .into_script()
}

/// Sign every input of `tx` in place. All inputs spend the same locked address.
pub fn sign_all_inputs(
    tx: &mut Transaction,
    locking_script: &Script,
    key: &SigningKey,
) -> LockResult<()> {
    let public_key = key.public_key_bytes();
    let unsigned: &Transaction = tx;
    // signatures commit to empty input scripts, so order does not matter
    let signatures = (0..unsigned.input.len())
        .map(|index| sign_input(unsigned, index, locking_script, key))
        .collect::<LockResult<Vec<_>>>()?;

    for (input, signature) in tx.input.iter_mut().zip(signatures) {
        input.script_sig = build_unlock_script(&signature, &public_key, locking_script);
    }
    Ok(())
}

/// Check that input `index` satisfies the P2SH-wrapped `locking_script`.
pub fn verify_input(tx: &Transaction, index: usize, locking_script: &Script) -> LockResult<()> {
    let fail = |reason: String| LockError::ScriptVerification { index, reason };

    let input = tx
        .input
        .get(index)
        .ok_or_else(|| fail(format!("transaction has only {} inputs", tx.input.len())))?;

    let instructions = input
        .script_sig
        .instructions()
        .map_err(|e| fail(e.to_string()))?;
    let (signature, public_key, redeem) = match instructions.as_slice() {
        [Instruction::Push(sig), Instruction::Push(pk), Instruction::Push(redeem)] => {
            (sig, pk, redeem)
        }
        _ => return Err(fail("unlocking script is not <sig> <pubkey> <script>".to_string())),
    };

    if redeem.as_slice() != locking_script.as_bytes() {
        return Err(fail(format!(
            "redeem script hash {} does not match",
            hex::encode(hash160(redeem))
        )));
    }
    let spec = LockSpec::from_locking_script(locking_script).map_err(|e| fail(e.to_string()))?;

    if input.sequence == SEQUENCE_FINAL {
        return Err(fail("final sequence disables the lock time".to_string()));
    }
    if LockKind::of(tx.lock_time) != spec.kind() {
        return Err(fail(format!(
            "lock time {} is a {}, script expects a {}",
            tx.lock_time,
            LockKind::of(tx.lock_time),
            spec.kind()
        )));
    }
    if tx.lock_time < spec.lock_value() {
        return Err(fail(format!(
            "lock time {} is below {}",
            tx.lock_time,
            spec.lock_value()
        )));
    }

    if &hash160(public_key) != spec.pub_key_hash() {
        return Err(fail("public key does not match the key hash".to_string()));
    }

    let (sighash_type, der) = match signature.split_last() {
        Some((last, der)) => (u32::from(*last), der),
        None => return Err(fail("empty signature".to_string())),
    };
    if sighash_type != SIGHASH_ALL {
        return Err(fail(format!("unsupported sighash type {:#04x}", sighash_type)));
    }

    let signature = Signature::from_der(der).map_err(|e| fail(e.to_string()))?;
    let public_key = PublicKey::from_slice(public_key).map_err(|e| fail(e.to_string()))?;
    let sighash = signature_hash(tx, index, locking_script, sighash_type)?;

    Secp256k1::verification_only()
        .verify_ecdsa(&Message::from_digest(sighash), &signature, &public_key)
        .map_err(|e| fail(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tx::LOCKED_INPUT_SEQUENCE;
    use crate::locked_script::build_locked_script;
    use crate::transaction::{OutPoint, TxIn, TxOut, Txid};
    use bitcoin::hashes::Hash;

    const WIF: &str = "cSyZjejfhK5gaVYoG9pgfdMrZzw7rXufpiG4oDaYShanJhwpqGcE";

    fn key() -> SigningKey {
        WIF.parse().unwrap()
    }

    fn locking_script() -> Script {
        build_locked_script(1747851, &key().pub_key_hash()).unwrap()
    }

    fn unsigned(inputs: u8, lock_time: u32) -> Transaction {
        Transaction {
            version: 2,
            lock_time,
            input: (0..inputs)
                .map(|i| TxIn {
                    previous_output: OutPoint::new(
                        Txid::from_byte_array([i + 1; 32]),
                        u32::from(i),
                    ),
                    script_sig: Script::new(),
                    sequence: LOCKED_INPUT_SEQUENCE,
                })
                .collect(),
            output: vec![TxOut {
                value: 79_775,
                script_pubkey: key()
                    .p2pkh_address(crate::address::Network::Testnet)
                    .script_pubkey(),
            }],
        }
    }

    #[test]
    fn test_sighash_matches_reference() {
        let tx = unsigned(3, 1747851);
        let reference: bitcoin::Transaction =
            bitcoin::consensus::encode::deserialize(&tx.to_bytes()).unwrap();
        let cache = bitcoin::sighash::SighashCache::new(&reference);

        for index in 0..3 {
            let ours = signature_hash(&tx, index, &locking_script(), SIGHASH_ALL).unwrap();
            let theirs = cache
                .legacy_signature_hash(
                    index,
                    bitcoin::Script::from_bytes(locking_script().as_bytes()),
                    SIGHASH_ALL,
                )
                .unwrap();
            assert_eq!(ours, theirs.to_byte_array(), "input {index}");
        }
    }

    #[test]
    fn test_sighash_out_of_range() {
        let tx = unsigned(1, 1747851);
        assert!(signature_hash(&tx, 1, &locking_script(), SIGHASH_ALL).is_err());
    }

    #[test]
    fn test_sign_and_verify_all_inputs() {
        let mut tx = unsigned(2, 1747851);
        sign_all_inputs(&mut tx, &locking_script(), &key()).unwrap();

        for index in 0..2 {
            verify_input(&tx, index, &locking_script()).unwrap();
            let pushes = tx.input[index].script_sig.instructions().unwrap();
            assert_eq!(pushes.len(), 3);
            assert_eq!(pushes[2], Instruction::Push(locking_script().to_bytes()));
        }
    }

    #[test]
    fn test_signing_is_deterministic() {
        let tx = unsigned(1, 1747851);
        let a = sign_input(&tx, 0, &locking_script(), &key()).unwrap();
        let b = sign_input(&tx, 0, &locking_script(), &key()).unwrap();
        assert_eq!(a, b);
        assert_eq!(*a.last().unwrap(), 0x01);
    }

    #[test]
    fn test_signatures_are_low_r() {
        for inputs in 1..=4 {
            let tx = unsigned(inputs, 1747851);
            for index in 0..usize::from(inputs) {
                let sig = sign_input(&tx, index, &locking_script(), &key()).unwrap();
                // 30 len 02 rlen r ..., r encoded without a sign byte
                assert!(sig[3] <= 32, "r is {} bytes", sig[3]);
                assert!(sig.len() <= 71, "{} byte signature", sig.len());
            }
        }
    }

    #[test]
    fn test_key_mismatch() {
        let other = SigningKey::from_hex(&"11".repeat(32)).unwrap();
        let tx = unsigned(1, 1747851);
        assert!(matches!(
            sign_input(&tx, 0, &locking_script(), &other),
            Err(LockError::SigningKeyMismatch { .. })
        ));
    }

    #[test]
    fn test_verify_rejects_early_lock_time() {
        let mut tx = unsigned(1, 1747850);
        sign_all_inputs(&mut tx, &locking_script(), &key()).unwrap();
        assert!(matches!(
            verify_input(&tx, 0, &locking_script()),
            Err(LockError::ScriptVerification { index: 0, .. })
        ));
    }

    #[test]
    fn test_verify_rejects_tampered_output() {
        let mut tx = unsigned(1, 1747851);
        sign_all_inputs(&mut tx, &locking_script(), &key()).unwrap();
        tx.output[0].value -= 1;
        assert!(verify_input(&tx, 0, &locking_script()).is_err());
    }

    #[test]
    fn test_verify_rejects_final_sequence() {
        let mut tx = unsigned(1, 1747851);
        tx.input[0].sequence = SEQUENCE_FINAL;
        sign_all_inputs(&mut tx, &locking_script(), &key()).unwrap();
        assert!(verify_input(&tx, 0, &locking_script()).is_err());
    }
}
