//! # Utility Functions
//!
//! Amount conversion and formatting, plus retry helpers for the node and the
//! fee price feed.

/// Amount conversion utilities
pub mod amount {
    use crate::error::{LockError, LockResult};
    use bitcoin::Amount;

    /// Convert satoshis to BTC with 8 decimal places
    pub fn sats_to_btc(sats: u64) -> f64 {
        Amount::from_sat(sats).to_btc()
    }

    /// Convert a BTC amount reported by the node to satoshis.
    ///
    /// Rounds to the nearest satoshi, so `0.0008` becomes exactly `80000`.
    pub fn btc_to_sats(btc: f64) -> LockResult<u64> {
        Amount::from_btc(btc)
            .map(Amount::to_sat)
            .map_err(|e| LockError::serialization(format!("invalid BTC amount {}: {}", btc, e)))
    }

    /// Format amount with both sats and BTC
    pub fn format_dual(sats: u64) -> String {
        format!("{} sats ({:.8} BTC)", sats, sats_to_btc(sats))
    }
}

/// Transaction ID utilities
pub mod txid {
    /// Format transaction ID for display
    pub fn format_short(txid: &str) -> String {
        if txid.len() > 16 {
            format!("{}...{}", &txid[..8], &txid[txid.len() - 8..])
        } else {
            txid.to_string()
        }
    }
}

/// Retry utilities
///
/// Only transport failures are retried. RPC error objects and validation
/// failures are returned on the first attempt.
pub mod retry {
    use crate::config::network::{MAX_RETRY_ATTEMPTS, RETRY_DELAY};
    use crate::error::LockResult;
    use std::future::Future;
    use std::time::Duration;
    use tokio::time::sleep;

    fn delay_for(attempt: u32) -> Duration {
        RETRY_DELAY * 2_u32.pow(attempt - 1)
    }

    /// Retry an async operation with exponential backoff
    pub async fn with_backoff<F, Fut, T>(mut operation: F) -> LockResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = LockResult<T>>,
    {
        let mut attempts = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    attempts += 1;
                    if attempts >= MAX_RETRY_ATTEMPTS || !error.is_retryable() {
                        return Err(error);
                    }

                    let delay = delay_for(attempts);
                    log::warn!(
                        "Operation failed (attempt {}), retrying in {:?}: {}",
                        attempts,
                        delay,
                        error
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    /// Blocking variant for the synchronous RPC client
    pub fn blocking<F, T>(mut operation: F) -> LockResult<T>
    where
        F: FnMut() -> LockResult<T>,
    {
        let mut attempts = 0;
        loop {
            match operation() {
                Ok(result) => return Ok(result),
                Err(error) => {
                    attempts += 1;
                    if attempts >= MAX_RETRY_ATTEMPTS || !error.is_retryable() {
                        return Err(error);
                    }

                    let delay = delay_for(attempts);
                    log::warn!(
                        "Node call failed (attempt {}), retrying in {:?}: {}",
                        attempts,
                        delay,
                        error
                    );
                    std::thread::sleep(delay);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LockError;
    use std::cell::Cell;

    #[test]
    fn test_amount_conversion() {
        assert_eq!(amount::sats_to_btc(100_000_000), 1.0);
        assert_eq!(amount::btc_to_sats(1.0).unwrap(), 100_000_000);
        assert_eq!(amount::btc_to_sats(0.0008).unwrap(), 80_000);
        assert_eq!(amount::btc_to_sats(0.00079775).unwrap(), 79_775);
        assert!(amount::btc_to_sats(-0.1).is_err());
    }

    #[test]
    fn test_amount_formatting() {
        assert_eq!(amount::format_dual(80_000), "80000 sats (0.00080000 BTC)");
    }

    #[test]
    fn test_txid_formatting() {
        let txid = "1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef";
        let formatted = txid::format_short(txid);
        assert_eq!(formatted, "12345678...90abcdef");
    }

    #[test]
    fn test_blocking_retry_stops_on_rpc_error() {
        let calls = Cell::new(0);
        let result: Result<(), _> = retry::blocking(|| {
            calls.set(calls.get() + 1);
            Err(LockError::NodeRpcError {
                code: -26,
                message: "non-final".to_string(),
            })
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_blocking_retry_recovers() {
        let calls = Cell::new(0);
        let result = retry::blocking(|| {
            calls.set(calls.get() + 1);
            if calls.get() < 2 {
                Err(LockError::NodeUnavailable {
                    message: "connection refused".to_string(),
                })
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn test_async_retry_gives_up() {
        let calls = Cell::new(0);
        let result: Result<(), _> = retry::with_backoff(|| {
            calls.set(calls.get() + 1);
            async {
                Err(LockError::NodeUnavailable {
                    message: "timeout".to_string(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.get(), crate::config::network::MAX_RETRY_ATTEMPTS);
    }
}
