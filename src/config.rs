//! # Configuration
//!
//! Constants used throughout the crate, and the explicit node configuration
//! handed to the RPC client.

use crate::address::Network;
use crate::error::{LockError, LockResult};
use std::env as std_env;

/// Network and RPC configuration
pub mod network {
    use std::time::Duration;

    /// Default Bitcoin Core RPC host
    pub const DEFAULT_RPC_HOST: &str = "127.0.0.1";

    /// Default RPC username
    pub const DEFAULT_RPC_USER: &str = "test";

    /// Default RPC password
    pub const DEFAULT_RPC_PASSWORD: &str = "test";

    /// Request timeout for the fee price feed
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    /// Attempts per network call before giving up
    pub const MAX_RETRY_ATTEMPTS: u32 = 3;

    /// Base delay between attempts, doubled after each failure
    pub const RETRY_DELAY: Duration = Duration::from_millis(500);
}

/// Fee estimation constants
pub mod fees {
    /// Fallback rate when the price feed is unreachable (sat/byte)
    pub const DEFAULT_FEE_RATE: f64 = 1.0;

    /// Blockcypher chain summary for testnet
    pub const FEE_API_TESTNET: &str = "https://api.blockcypher.com/v1/btc/test3";

    /// Blockcypher chain summary for mainnet
    pub const FEE_API_MAINNET: &str = "https://api.blockcypher.com/v1/btc/main";

    /// The fee loop always runs at least this many build/sign/measure passes.
    pub const MIN_FEE_PASSES: usize = 2;

    /// Upper bound on fee passes. Low-R signatures keep the signed size
    /// stable, so the fee normally settles on the second pass.
    pub const MAX_FEE_PASSES: usize = 4;
}

/// Transaction layout constants
pub mod tx {
    /// Version of the spending transaction
    pub const TX_VERSION: i32 = 2;

    /// Sequence that disables lock time enforcement
    pub const SEQUENCE_FINAL: u32 = 0xFFFF_FFFF;

    /// Sequence used on inputs spending the locked address (non-final)
    pub const LOCKED_INPUT_SEQUENCE: u32 = 0xFFFF_FFFE;

    /// Lock values below this are block heights, at or above are UNIX times
    pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;
}

/// Environment variable names
pub mod env {
    /// RPC host override
    pub const RPC_HOST: &str = "RPC_HOST";

    /// RPC port override
    pub const RPC_PORT: &str = "RPC_PORT";

    /// RPC username override
    pub const RPC_USER: &str = "RPC_USER";

    /// RPC password override
    pub const RPC_PASSWORD: &str = "RPC_PASSWORD";

    /// Wallet name override (the wallet that imported the P2SH address)
    pub const RPC_WALLET: &str = "RPC_WALLET";

    /// WIF or hex private key
    pub const PRIVATE_KEY: &str = "PRIVATE_KEY";

    /// Fee price feed URL override
    pub const FEE_API_URL: &str = "FEE_API_URL";

    /// Fallback fee rate override (sat/byte)
    pub const DEFAULT_FEE_RATE: &str = "DEFAULT_FEE_RATE";
}

/// Connection settings for the Bitcoin Core node
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub wallet: Option<String>,
    pub network: Network,
}

impl NodeConfig {
    /// Defaults for the given network, without reading the environment
    pub fn new(network: Network) -> Self {
        Self {
            host: network::DEFAULT_RPC_HOST.to_string(),
            port: network.default_rpc_port(),
            user: network::DEFAULT_RPC_USER.to_string(),
            password: network::DEFAULT_RPC_PASSWORD.to_string(),
            wallet: None,
            network,
        }
    }

    /// Load configuration from `.env` and the process environment
    pub fn from_env(network: Network) -> LockResult<Self> {
        dotenv::dotenv().ok();

        let mut config = Self::new(network);
        if let Ok(host) = std_env::var(env::RPC_HOST) {
            config.host = host;
        }
        if let Ok(port) = std_env::var(env::RPC_PORT) {
            config.port = port.parse().map_err(|_| {
                LockError::config(format!("{} is not a port: {}", env::RPC_PORT, port))
            })?;
        }
        if let Ok(user) = std_env::var(env::RPC_USER) {
            config.user = user;
        }
        if let Ok(password) = std_env::var(env::RPC_PASSWORD) {
            config.password = password;
        }
        config.wallet = std_env::var(env::RPC_WALLET).ok().filter(|w| !w.is_empty());

        Ok(config)
    }

    /// JSON-RPC endpoint, scoped to the wallet when one is configured
    pub fn url(&self) -> String {
        match &self.wallet {
            Some(wallet) => format!("http://{}:{}/wallet/{}", self.host, self.port, wallet),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }
}

/// Fallback fee rate from the environment, or [`fees::DEFAULT_FEE_RATE`]
pub fn default_fee_rate() -> LockResult<f64> {
    match std_env::var(env::DEFAULT_FEE_RATE) {
        Ok(raw) => {
            let rate: f64 = raw.parse().map_err(|_| {
                LockError::config(format!("{} is not a number: {}", env::DEFAULT_FEE_RATE, raw))
            })?;
            if !rate.is_finite() || rate < 0.0 {
                return Err(LockError::config(format!(
                    "fee rate must be non-negative, got {}",
                    rate
                )));
            }
            Ok(rate)
        }
        Err(_) => Ok(fees::DEFAULT_FEE_RATE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_config_defaults() {
        let config = NodeConfig::new(Network::Testnet);
        assert_eq!(config.port, 18332);
        assert_eq!(config.url(), "http://127.0.0.1:18332");

        let regtest = NodeConfig::new(Network::Regtest);
        assert_eq!(regtest.port, 18443);
    }

    #[test]
    fn test_wallet_url() {
        let mut config = NodeConfig::new(Network::Mainnet);
        config.wallet = Some("locks".to_string());
        assert_eq!(config.url(), "http://127.0.0.1:8332/wallet/locks");
    }
}
