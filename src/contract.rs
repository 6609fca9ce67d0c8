//! # Time-Locked Contract
//!
//! Ties the pieces together: the redeem script and its P2SH address on the
//! creation side, and funding discovery, fee convergence, signing and
//! submission on the spending side.

use crate::address::{Address, Network};
use crate::builder::{build_spend, BuiltSpend, FeeRate};
use crate::error::{LockError, LockResult};
use crate::keys::SigningKey;
use crate::locked_script::LockSpec;
use crate::locktime::{blocks_remaining, LockKind};
use crate::script::Script;
use crate::services::NodeRpc;
use crate::transaction::Txid;
use crate::utils::txid::format_short;
use crate::utxo::{collect_funding, UtxoSet};
use std::fmt;

/// A lock value and key hash, with the script and address derived from them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelockContract {
    lock: LockSpec,
    network: Network,
    locking_script: Script,
    address: Address,
}

/// Whether the chain has reached the lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Maturity {
    Mature,
    BlocksRemaining(u64),
    /// Median time past still has to move this many seconds
    SecondsRemaining(u64),
}

impl fmt::Display for Maturity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Maturity::Mature => write!(f, "spendable"),
            Maturity::BlocksRemaining(n) => write!(f, "{} blocks remaining", n),
            Maturity::SecondsRemaining(n) => write!(f, "{} seconds remaining", n),
        }
    }
}

/// A signed spend that has not been submitted yet
#[derive(Debug, Clone)]
pub struct PreparedSpend {
    pub utxos: UtxoSet,
    pub destination: Address,
    pub fee_rate: FeeRate,
    pub built: BuiltSpend,
}

impl PreparedSpend {
    pub fn unsigned_hex(&self) -> String {
        self.built.unsigned.to_hex()
    }

    pub fn signed_hex(&self) -> String {
        self.built.signed.to_hex()
    }

    pub fn txid(&self) -> Txid {
        self.built.signed.txid()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Broadcast { txid: Txid },
    /// The node refused the transaction; nothing was broadcast
    Rejected { reason: String },
}

impl TimelockContract {
    pub fn new(lock_value: i64, pub_key_hash: [u8; 20], network: Network) -> LockResult<Self> {
        let lock = LockSpec::new(lock_value, pub_key_hash)?;
        let locking_script = lock.locking_script();
        let address = Address::p2sh(&locking_script, network);
        Ok(Self {
            lock,
            network,
            locking_script,
            address,
        })
    }

    /// Fails when `key` is a WIF for another network.
    pub fn for_key(lock_value: i64, key: &SigningKey, network: Network) -> LockResult<Self> {
        key.require_network(network)?;
        Self::new(lock_value, key.pub_key_hash(), network)
    }

    /// Lock to the block after the current tip
    pub fn next_block<N: NodeRpc + ?Sized>(
        node: &N,
        pub_key_hash: [u8; 20],
        network: Network,
    ) -> LockResult<Self> {
        let tip = node.get_block_count()?;
        let lock_value = i64::try_from(tip + 1)
            .map_err(|_| LockError::InvalidLockValue { value: i64::MAX })?;
        log::info!("Chain tip is {}, locking until block {}", tip, lock_value);
        Self::new(lock_value, pub_key_hash, network)
    }

    pub fn lock(&self) -> &LockSpec {
        &self.lock
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn locking_script(&self) -> &Script {
        &self.locking_script
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Compare the chain against the lock before building anything
    pub fn maturity<N: NodeRpc + ?Sized>(&self, node: &N) -> LockResult<Maturity> {
        let lock_value = self.lock.lock_value();
        match self.lock.kind() {
            LockKind::BlockHeight => {
                let tip = node.get_block_count()?;
                match blocks_remaining(tip, lock_value) {
                    0 => Ok(Maturity::Mature),
                    n => Ok(Maturity::BlocksRemaining(n)),
                }
            }
            LockKind::Timestamp => {
                let median_time = node.get_median_time_past()?;
                if lock_value < median_time {
                    Ok(Maturity::Mature)
                } else {
                    Ok(Maturity::SecondsRemaining(u64::from(lock_value - median_time) + 1))
                }
            }
        }
    }

    /// Collect funding and build the signed spend to `destination`
    pub fn prepare_spend<N: NodeRpc + ?Sized>(
        &self,
        node: &N,
        key: &SigningKey,
        destination: &Address,
        fee_rate: FeeRate,
    ) -> LockResult<PreparedSpend> {
        key.require_network(self.network)?;
        let destination = destination.require_network(self.network)?;

        match self.maturity(node)? {
            Maturity::Mature => {}
            pending => log::warn!(
                "Lock has not matured ({}), the node will reject the spend",
                pending
            ),
        }

        let utxos = collect_funding(node, &self.address)?;
        log::info!(
            "Spending {} outputs worth {} sats at {}",
            utxos.len(),
            utxos.total_value(),
            fee_rate
        );

        let built = build_spend(&utxos, &destination, &self.lock, key, fee_rate)?;
        Ok(PreparedSpend {
            utxos,
            destination,
            fee_rate,
            built,
        })
    }

    /// Broadcast `spend` if the node would accept it into its mempool.
    /// Broadcast outputs are removed from `spend.utxos`.
    pub fn submit<N: NodeRpc + ?Sized>(
        &self,
        node: &N,
        spend: &mut PreparedSpend,
    ) -> LockResult<SubmitOutcome> {
        let raw = spend.signed_hex();
        let acceptance = node.test_mempool_accept(&raw)?;

        if !acceptance.allowed {
            let reason = acceptance.reason.unwrap_or_else(|| "unknown".to_string());
            let txid = format_short(&spend.txid().to_string());
            log::warn!("Node rejected {}: {}", txid, reason);
            return Ok(SubmitOutcome::Rejected { reason });
        }

        let txid = node.send_raw_transaction(&raw)?;
        spend.utxos.consume(&spend.built.signed);
        log::info!("Broadcast {}", txid);
        Ok(SubmitOutcome::Broadcast { txid })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_address() {
        let pkh: [u8; 20] = hex::decode("8880768c36754fd2ff1954f213303a680ba67c28")
            .unwrap()
            .try_into()
            .unwrap();
        let contract = TimelockContract::new(1747851, pkh, Network::Testnet).unwrap();
        assert_eq!(contract.address().to_string(), "2MwbgHJBG9mSp54CCG4zaLFyg3yGkZovAAE");
        assert_eq!(contract.lock().kind(), LockKind::BlockHeight);

        let mainnet = TimelockContract::new(1747851, pkh, Network::Mainnet).unwrap();
        assert_eq!(mainnet.locking_script(), contract.locking_script());
        assert!(mainnet.address().to_string().starts_with('3'));
    }

    #[test]
    fn test_invalid_lock() {
        assert!(matches!(
            TimelockContract::new(0, [0; 20], Network::Testnet),
            Err(LockError::InvalidLockValue { value: 0 })
        ));
    }

    #[test]
    fn test_maturity_display() {
        assert_eq!(Maturity::BlocksRemaining(3).to_string(), "3 blocks remaining");
        assert_eq!(Maturity::Mature.to_string(), "spendable");
    }
}
