//! # Funding Discovery
//!
//! Aggregates every output the node's wallet has seen paid to the locked
//! address. Each receiving transaction is inspected once, and outputs the
//! node reports as already spent are dropped.

use crate::address::Address;
use crate::error::{LockError, LockResult};
use crate::services::NodeRpc;
use crate::transaction::{OutPoint, Transaction, Txid};
use crate::utils::amount;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// An unspent output paying the locked address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Utxo {
    #[serde(serialize_with = "serialize_display")]
    pub txid: Txid,
    pub vout: u32,
    /// Value in satoshis
    pub value: u64,
    pub confirmations: u32,
}

impl Utxo {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.txid, self.vout)
    }
}

fn serialize_display<S: serde::Serializer>(txid: &Txid, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(txid)
}

/// Outputs keyed by outpoint, iterated in a stable order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtxoSet {
    utxos: BTreeMap<OutPoint, Utxo>,
}

impl UtxoSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an output. The same outpoint twice is an error.
    pub fn insert(&mut self, utxo: Utxo) -> LockResult<()> {
        let outpoint = utxo.outpoint();
        if self.utxos.contains_key(&outpoint) {
            return Err(LockError::DuplicateUtxo {
                txid: outpoint.txid.to_string(),
                vout: outpoint.vout,
            });
        }
        self.utxos.insert(outpoint, utxo);
        Ok(())
    }

    pub fn merge(&mut self, other: UtxoSet) -> LockResult<()> {
        for utxo in other.utxos.into_values() {
            self.insert(utxo)?;
        }
        Ok(())
    }

    pub fn total_value(&self) -> u64 {
        self.utxos.values().map(|u| u.value).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Utxo> {
        self.utxos.values()
    }

    pub fn len(&self) -> usize {
        self.utxos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty()
    }

    /// Smallest confirmation count in the set.
    pub fn min_confirmations(&self) -> Option<u32> {
        self.utxos.values().map(|u| u.confirmations).min()
    }

    /// Remove every output `tx` spends.
    pub fn consume(&mut self, tx: &Transaction) {
        for input in &tx.input {
            self.utxos.remove(&input.previous_output);
        }
    }
}

impl FromIterator<Utxo> for UtxoSet {
    /// Later duplicates are ignored.
    fn from_iter<I: IntoIterator<Item = Utxo>>(iter: I) -> Self {
        let mut set = UtxoSet::new();
        for utxo in iter {
            set.utxos.entry(utxo.outpoint()).or_insert(utxo);
        }
        set
    }
}

/// Gather the spendable outputs paying `address`.
///
/// Fails with [`LockError::NoFundsAvailable`] when the address never received
/// funds or everything it received is already spent.
pub fn collect_funding<N: NodeRpc + ?Sized>(node: &N, address: &Address) -> LockResult<UtxoSet> {
    let txids: BTreeSet<Txid> = node.list_received_by_address(address)?.into_iter().collect();
    log::debug!("{} receiving transactions for {}", txids.len(), address);

    let mut set = UtxoSet::new();
    for txid in &txids {
        for utxo in node.get_transaction_details(txid, address)? {
            if !node.is_unspent(&utxo.outpoint())? {
                log::info!("Skipping spent output {}", utxo.outpoint());
                continue;
            }
            log::info!(
                "Found {} at {}",
                amount::format_dual(utxo.value),
                utxo.outpoint()
            );
            set.insert(utxo)?;
        }
    }

    if set.is_empty() {
        return Err(LockError::NoFundsAvailable {
            address: address.to_string(),
        });
    }
    Ok(set)
}
