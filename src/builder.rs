//! # Spend Construction
//!
//! Builds the transaction that sweeps every funding output of the locked
//! address to a single destination.
//!
//! The fee depends on the signed size, and the signed size depends on the
//! amount (through the signatures). The builder therefore iterates:
//!
//! 1. start with a fee of zero
//! 2. build with `amount = total - fee`, sign every input, measure the size
//! 3. raise the fee to `ceil(size * rate)` if the pass does not cover it
//!
//! It always runs [`MIN_FEE_PASSES`] passes and stops once a pass reproduces
//! the fee it was built with, or after [`MAX_FEE_PASSES`]. Signatures are
//! low-R, so the signed size rarely moves between passes.

use crate::address::Address;
use crate::config::fees::{MAX_FEE_PASSES, MIN_FEE_PASSES};
use crate::config::tx::{LOCKED_INPUT_SEQUENCE, TX_VERSION};
use crate::error::{LockError, LockResult};
use crate::keys::SigningKey;
use crate::locked_script::LockSpec;
use crate::script::Script;
use crate::signer::sign_all_inputs;
use crate::transaction::{Transaction, TxIn, TxOut};
use crate::utxo::UtxoSet;
use serde::Serialize;
use std::fmt;

/// Fee rate in satoshis per byte
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
pub struct FeeRate(f64);

impl FeeRate {
    pub fn from_sats_per_byte(rate: f64) -> LockResult<Self> {
        if !rate.is_finite() || rate < 0.0 {
            return Err(LockError::config(format!("invalid fee rate {}", rate)));
        }
        Ok(Self(rate))
    }

    pub fn sats_per_byte(&self) -> f64 {
        self.0
    }

    /// Fee for `size` bytes, rounded up to a whole satoshi
    pub fn fee_for_size(&self, size: usize) -> u64 {
        (size as f64 * self.0).ceil() as u64
    }
}

impl fmt::Display for FeeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3} sat/byte", self.0)
    }
}

/// What is left for the destination after paying `fee`. Must be positive.
pub fn spendable_amount(total: u64, fee: u64) -> LockResult<u64> {
    match total.checked_sub(fee) {
        Some(amount) if amount > 0 => Ok(amount),
        _ => Err(LockError::InsufficientFunds {
            required: fee.saturating_add(1),
            available: total,
        }),
    }
}

/// One build/sign/measure iteration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeePass {
    pub pass: usize,
    pub amount: u64,
    pub fee: u64,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeePlan {
    pub fee: u64,
    pub amount: u64,
    pub size: usize,
    pub passes: Vec<FeePass>,
}

/// Final transaction in both forms, with the fee history that produced it
#[derive(Debug, Clone)]
pub struct BuiltSpend {
    pub unsigned: Transaction,
    pub signed: Transaction,
    pub plan: FeePlan,
}

/// Unsigned transaction spending all of `utxos` to `destination`.
pub fn unsigned_spend(
    utxos: &UtxoSet,
    destination: &Script,
    amount: u64,
    lock: &LockSpec,
) -> Transaction {
    Transaction {
        version: TX_VERSION,
        lock_time: lock.lock_value(),
        input: utxos
            .iter()
            .map(|utxo| TxIn {
                previous_output: utxo.outpoint(),
                script_sig: Script::new(),
                sequence: LOCKED_INPUT_SEQUENCE,
            })
            .collect(),
        output: vec![TxOut {
            value: amount,
            script_pubkey: destination.clone(),
        }],
    }
}

/// Run the fee loop and return the signed spend.
pub fn build_spend(
    utxos: &UtxoSet,
    destination: &Address,
    lock: &LockSpec,
    key: &SigningKey,
    fee_rate: FeeRate,
) -> LockResult<BuiltSpend> {
    let locking_script = lock.locking_script();
    let destination_script = destination.script_pubkey();

    let ((unsigned, signed), plan) =
        converge_fee(utxos.total_value(), fee_rate, MAX_FEE_PASSES, |amount| {
            let unsigned = unsigned_spend(utxos, &destination_script, amount, lock);
            let mut signed = unsigned.clone();
            sign_all_inputs(&mut signed, &locking_script, key)?;
            let size = signed.size();
            Ok(((unsigned, signed), size))
        })?;

    Ok(BuiltSpend {
        unsigned,
        signed,
        plan,
    })
}

/// Fee loop over `measure`, which builds for an amount and returns the
/// result with its signed size.
///
/// The fee never decreases between passes, so a pass whose size fits the
/// fee it was built with ends the loop.
fn converge_fee<T, F>(
    total: u64,
    fee_rate: FeeRate,
    max_passes: usize,
    mut measure: F,
) -> LockResult<(T, FeePlan)>
where
    F: FnMut(u64) -> LockResult<(T, usize)>,
{
    let mut fee = 0;
    let mut passes = Vec::with_capacity(max_passes);

    loop {
        let pass = passes.len() + 1;
        let amount = spendable_amount(total, fee)?;
        let (built, size) = measure(amount)?;

        let required = fee_rate.fee_for_size(size);
        let next_fee = fee.max(required);
        log::debug!(
            "Fee pass {}: amount {} fee {} size {} -> next fee {}",
            pass,
            amount,
            fee,
            size,
            next_fee
        );
        passes.push(FeePass {
            pass,
            amount,
            fee,
            size,
        });

        let settled = pass >= MIN_FEE_PASSES && next_fee == fee;
        if settled || pass >= max_passes {
            if !settled {
                log::warn!(
                    "Fee did not settle after {} passes ({} paid, {} for the final size)",
                    pass,
                    fee,
                    required
                );
            }
            let plan = FeePlan {
                fee,
                amount,
                size,
                passes,
            };
            return Ok((built, plan));
        }

        fee = next_fee;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Network;
    use crate::signer::verify_input;
    use crate::transaction::Txid;
    use crate::utxo::Utxo;

    const WIF: &str = "cSyZjejfhK5gaVYoG9pgfdMrZzw7rXufpiG4oDaYShanJhwpqGcE";

    fn key() -> SigningKey {
        WIF.parse().unwrap()
    }

    fn funding(values: &[u64]) -> UtxoSet {
        values
            .iter()
            .enumerate()
            .map(|(i, value)| Utxo {
                txid: Txid::from_byte_array([i as u8 + 1; 32]),
                vout: i as u32,
                value: *value,
                confirmations: 1,
            })
            .collect()
    }

    fn lock() -> LockSpec {
        LockSpec::new(1747851, key().pub_key_hash()).unwrap()
    }

    #[test]
    fn test_fee_arithmetic() {
        let rate = FeeRate::from_sats_per_byte(1.0).unwrap();
        assert_eq!(rate.fee_for_size(225), 225);
        assert_eq!(spendable_amount(80_000, 225).unwrap(), 79_775);

        let fractional = FeeRate::from_sats_per_byte(2048.0 / 1024.0 + 0.001).unwrap();
        assert_eq!(fractional.fee_for_size(100), 201);

        assert!(FeeRate::from_sats_per_byte(-1.0).is_err());
        assert!(FeeRate::from_sats_per_byte(f64::NAN).is_err());
    }

    #[test]
    fn test_spendable_amount_must_be_positive() {
        assert!(matches!(
            spendable_amount(225, 225),
            Err(LockError::InsufficientFunds { available: 225, .. })
        ));
        assert!(spendable_amount(100, 225).is_err());
    }

    #[test]
    fn test_fee_converges() {
        let utxos = funding(&[50_000, 30_000]);
        let destination = key().p2pkh_address(Network::Testnet);
        let rate = FeeRate::from_sats_per_byte(1.0).unwrap();

        let built = build_spend(&utxos, &destination, &lock(), &key(), rate).unwrap();
        let plan = &built.plan;

        assert!(plan.passes.len() >= MIN_FEE_PASSES && plan.passes.len() <= MAX_FEE_PASSES);
        assert_eq!(plan.passes[0].fee, 0);
        assert_eq!(plan.passes[0].amount, 80_000);
        let expected = rate.fee_for_size(built.signed.size());
        assert!(plan.fee >= expected && plan.fee - expected <= 4, "{} vs {}", plan.fee, expected);

        assert_eq!(plan.amount + plan.fee, 80_000);
        assert_eq!(built.signed.total_output_value(), plan.amount);
        assert_eq!(plan.size, built.signed.size());
    }

    #[test]
    fn test_built_spend_layout() {
        let utxos = funding(&[50_000, 30_000]);
        let destination = key().p2pkh_address(Network::Testnet);
        let rate = FeeRate::from_sats_per_byte(3.7).unwrap();
        let built = build_spend(&utxos, &destination, &lock(), &key(), rate).unwrap();

        assert_eq!(built.signed.version, 2);
        assert_eq!(built.signed.lock_time, 1747851);
        assert_eq!(built.signed.output.len(), 1);
        assert_eq!(built.signed.output[0].script_pubkey, destination.script_pubkey());
        assert!(built.unsigned.input.iter().all(|i| i.script_sig.is_empty()));
        for (index, input) in built.signed.input.iter().enumerate() {
            assert_eq!(input.sequence, LOCKED_INPUT_SEQUENCE);
            verify_input(&built.signed, index, &lock().locking_script()).unwrap();
        }
    }

    #[test]
    fn test_deterministic() {
        let utxos = funding(&[50_000, 30_000]);
        let destination = key().p2pkh_address(Network::Testnet);
        let rate = FeeRate::from_sats_per_byte(1.0).unwrap();
        let a = build_spend(&utxos, &destination, &lock(), &key(), rate).unwrap();
        let b = build_spend(&utxos, &destination, &lock(), &key(), rate).unwrap();
        assert_eq!(a.signed, b.signed);
        assert_eq!(a.plan, b.plan);
    }

    #[test]
    fn test_dust_funding_is_insufficient() {
        let utxos = funding(&[150]);
        let destination = key().p2pkh_address(Network::Testnet);
        let rate = FeeRate::from_sats_per_byte(1.0).unwrap();
        assert!(matches!(
            build_spend(&utxos, &destination, &lock(), &key(), rate),
            Err(LockError::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn test_fee_matches_size_across_rates() {
        let destination = key().p2pkh_address(Network::Testnet);
        let rates = [
            0.37, 1.0, 1.5, 2.3, 3.7, 5.0, 7.77, 9.99, 12.5, 18.2, 25.0, 33.3, 47.3, 64.0, 88.8,
            111.0,
        ];
        let mut builds = 0;
        let mut unsettled = 0;

        for inputs in 1..=5 {
            let utxos = funding(&vec![100_000; inputs]);
            let total = utxos.total_value();
            for rate in rates {
                let rate = FeeRate::from_sats_per_byte(rate).unwrap();
                let built = build_spend(&utxos, &destination, &lock(), &key(), rate).unwrap();
                let plan = &built.plan;
                let required = rate.fee_for_size(built.signed.size());
                // a signature can shrink by up to two bytes between passes
                let slack = rate.fee_for_size(2 * inputs);

                assert_eq!(plan.amount + plan.fee, total);
                assert!(plan.passes.len() <= MAX_FEE_PASSES);
                assert!(plan.fee <= required + slack, "{} inputs at {}", inputs, rate);
                assert!(plan.fee + slack >= required, "{} inputs at {}", inputs, rate);

                builds += 1;
                if plan.fee < required {
                    unsettled += 1;
                }
            }
        }
        assert!(unsettled * 20 <= builds, "{} of {} underpay", unsettled, builds);
    }

    #[test]
    fn test_fee_never_shrinks_between_passes() {
        let rate = FeeRate::from_sats_per_byte(1.0).unwrap();
        // the second signature comes out a byte shorter
        let mut sizes = [226, 225, 226, 225].into_iter();
        let ((), plan) = converge_fee(80_000, rate, MAX_FEE_PASSES, |_| {
            Ok(((), sizes.next().unwrap()))
        })
        .unwrap();

        assert_eq!(plan.passes.len(), 2);
        assert_eq!(plan.fee, 226);
        assert_eq!(plan.size, 225);
        assert_eq!(plan.amount, 80_000 - 226);
    }

    #[test]
    fn test_unsettled_fee_stops_at_max_passes() {
        let rate = FeeRate::from_sats_per_byte(1.0).unwrap();
        let mut sizes = [200, 201, 202, 203, 204].into_iter();
        let ((), plan) = converge_fee(80_000, rate, MAX_FEE_PASSES, |_| {
            Ok(((), sizes.next().unwrap()))
        })
        .unwrap();

        assert_eq!(plan.passes.len(), MAX_FEE_PASSES);
        let fees: Vec<u64> = plan.passes.iter().map(|p| p.fee).collect();
        assert_eq!(fees, vec![0, 200, 201, 202]);
        assert_eq!(plan.fee, 202);
        assert_eq!(plan.size, 203);
        assert_eq!(plan.amount + plan.fee, 80_000);
    }

    #[test]
    fn test_insufficient_funds_inside_the_loop() {
        let rate = FeeRate::from_sats_per_byte(1.0).unwrap();
        let result = converge_fee(250, rate, MAX_FEE_PASSES, |amount| Ok((amount, 250)));
        assert!(matches!(
            result,
            Err(LockError::InsufficientFunds { available: 250, .. })
        ));
    }

    #[test]
    fn test_zero_rate_pays_no_fee() {
        let utxos = funding(&[10_000]);
        let destination = key().p2pkh_address(Network::Testnet);
        let rate = FeeRate::from_sats_per_byte(0.0).unwrap();
        let built = build_spend(&utxos, &destination, &lock(), &key(), rate).unwrap();
        assert_eq!(built.plan.fee, 0);
        assert_eq!(built.plan.passes.len(), MIN_FEE_PASSES);
    }
}
