use crate::address::Address;
use crate::config::NodeConfig;
use crate::error::{LockError, LockResult};
use crate::services::{MempoolAcceptance, NodeRpc};
use crate::transaction::{OutPoint, Txid};
use crate::utils::{amount, retry};
use crate::utxo::Utxo;
use bitcoincore_rpc::{Auth, Client, RpcApi};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;

/// Entry of `listreceivedbyaddress`
#[derive(Debug, Deserialize)]
struct ReceivedByAddress {
    address: String,
    #[serde(default)]
    txids: Vec<String>,
}

/// Subset of `gettransaction`
#[derive(Debug, Deserialize)]
struct WalletTransaction {
    #[serde(default)]
    confirmations: i64,
    #[serde(default)]
    details: Vec<WalletTransactionDetail>,
}

#[derive(Debug, Deserialize)]
struct WalletTransactionDetail {
    address: Option<String>,
    category: String,
    amount: f64,
    vout: u32,
}

#[derive(Debug, Deserialize)]
struct BlockchainInfo {
    mediantime: u32,
}

/// Bitcoin Core RPC client. The wallet must watch the locked address.
#[derive(Debug)]
pub struct BitcoinNodeClient {
    client: Client,
}

impl BitcoinNodeClient {
    pub fn new(config: &NodeConfig) -> LockResult<Self> {
        let url = config.url();
        let auth = Auth::UserPass(config.user.clone(), config.password.clone());
        let client = Client::new(&url, auth)?;
        log::debug!("RPC client for {}", url);
        Ok(Self { client })
    }

    /// Call `method`, retrying transport failures
    fn call<T: DeserializeOwned>(&self, method: &str, params: &[Value]) -> LockResult<T> {
        retry::blocking(|| {
            self.client
                .call::<T>(method, params)
                .map_err(LockError::from)
        })
    }
}

impl NodeRpc for BitcoinNodeClient {
    fn get_block_count(&self) -> LockResult<u64> {
        self.call("getblockcount", &[])
    }

    fn get_median_time_past(&self) -> LockResult<u32> {
        let info: BlockchainInfo = self.call("getblockchaininfo", &[])?;
        Ok(info.mediantime)
    }

    fn list_received_by_address(&self, address: &Address) -> LockResult<Vec<Txid>> {
        let target = address.to_string();
        // minconf 0, include empty, include watch-only, filtered to the address
        let entries: Vec<ReceivedByAddress> = self.call(
            "listreceivedbyaddress",
            &[json!(0), json!(true), json!(true), json!(target)],
        )?;

        entries
            .into_iter()
            .filter(|entry| entry.address == target)
            .flat_map(|entry| entry.txids)
            .map(|txid| Txid::from_str(&txid))
            .collect()
    }

    fn get_transaction_details(&self, txid: &Txid, address: &Address) -> LockResult<Vec<Utxo>> {
        let target = address.to_string();
        let tx: WalletTransaction =
            self.call("gettransaction", &[json!(txid.to_string()), json!(true)])?;
        let confirmations = u32::try_from(tx.confirmations.max(0)).unwrap_or(u32::MAX);

        tx.details
            .into_iter()
            .filter(|d| d.category == "receive" && d.address.as_deref() == Some(target.as_str()))
            .map(|d| {
                Ok(Utxo {
                    txid: *txid,
                    vout: d.vout,
                    value: amount::btc_to_sats(d.amount)?,
                    confirmations,
                })
            })
            .collect()
    }

    fn is_unspent(&self, outpoint: &OutPoint) -> LockResult<bool> {
        let out: Option<Value> = self.call(
            "gettxout",
            &[json!(outpoint.txid.to_string()), json!(outpoint.vout), json!(true)],
        )?;
        Ok(out.is_some())
    }

    fn test_mempool_accept(&self, raw_hex: &str) -> LockResult<MempoolAcceptance> {
        let results: Vec<MempoolAcceptance> = self.call("testmempoolaccept", &[json!([raw_hex])])?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| LockError::serialization("testmempoolaccept returned no result"))
    }

    fn send_raw_transaction(&self, raw_hex: &str) -> LockResult<Txid> {
        let txid: String = self.call("sendrawtransaction", &[json!(raw_hex)])?;
        Txid::from_str(&txid)
    }
}
