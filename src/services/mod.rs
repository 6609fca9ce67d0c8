//! # Services Module
//!
//! External service integrations.
//!
//! ## Components
//!
//! - **RPC Client**: Bitcoin Core wallet RPC for funding discovery, mempool
//!   checks and broadcast
//! - **Fee Client**: fee price feed used to pick a sat/byte rate

pub mod fee_client;
pub mod rpc_client;

pub use fee_client::FeeRateClient;
pub use rpc_client::BitcoinNodeClient;

use crate::address::Address;
use crate::error::LockResult;
use crate::transaction::{OutPoint, Txid};
use crate::utxo::Utxo;
use serde::Deserialize;

/// Result of `testmempoolaccept` for a single transaction
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MempoolAcceptance {
    pub allowed: bool,
    #[serde(rename = "reject-reason", default)]
    pub reason: Option<String>,
}

/// The node calls a time-locked spend needs.
///
/// Implemented by [`BitcoinNodeClient`] and by in-memory nodes in tests.
pub trait NodeRpc {
    /// Height of the current chain tip
    fn get_block_count(&self) -> LockResult<u64>;

    /// Median time of the last eleven blocks
    fn get_median_time_past(&self) -> LockResult<u32>;

    /// Transactions the wallet has seen paying `address`, unconfirmed included
    fn list_received_by_address(&self, address: &Address) -> LockResult<Vec<Txid>>;

    /// Outputs of `txid` that pay `address`
    fn get_transaction_details(&self, txid: &Txid, address: &Address) -> LockResult<Vec<Utxo>>;

    /// Whether `outpoint` is unspent, counting mempool spends
    fn is_unspent(&self, outpoint: &OutPoint) -> LockResult<bool>;

    fn test_mempool_accept(&self, raw_hex: &str) -> LockResult<MempoolAcceptance>;

    fn send_raw_transaction(&self, raw_hex: &str) -> LockResult<Txid>;
}
