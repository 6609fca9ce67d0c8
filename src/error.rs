//! # Error Types for Time-Locked Addresses
//!
//! This module provides error handling for script construction, address
//! encoding, transaction building and signing, and the two network
//! collaborators (Bitcoin Core RPC and the fee price feed).

use bitcoincore_rpc::jsonrpc;
use thiserror::Error;

/// Main error type for all locking and spending operations
#[derive(Debug, Error)]
pub enum LockError {
    /// Lock value outside `1..=u32::MAX`
    #[error("Invalid lock value {value}: must be between 1 and {max}", max = u32::MAX)]
    InvalidLockValue { value: i64 },

    /// Base58Check payload failed its double-SHA256 checksum
    #[error("Base58Check checksum mismatch")]
    ChecksumMismatch,

    /// Address or key prefix not in the version byte table
    #[error("Invalid version byte: 0x{version:02x}")]
    InvalidVersionByte { version: u8 },

    /// Base58 text that is not a well-formed address
    #[error("Invalid address: {address}")]
    InvalidAddress { address: String },

    /// Characters outside the Base58 alphabet or truncated payloads
    #[error("Base58 decoding failed: {message}")]
    Base58 { message: String },

    /// Private key could not be parsed
    #[error("Invalid private key: {message}")]
    InvalidPrivateKey { message: String },

    /// The locked address has never received anything spendable
    #[error("No funds available at {address}")]
    NoFundsAvailable { address: String },

    /// Funds do not cover the fee
    #[error("Insufficient funds: required {required} sats, available {available} sats")]
    InsufficientFunds { required: u64, available: u64 },

    /// The same outpoint was reported twice
    #[error("Duplicate UTXO: {txid}:{vout}")]
    DuplicateUtxo { txid: String, vout: u32 },

    /// Signing key does not hash to the key hash committed in the script
    #[error("Signing key mismatch: script expects {expected}, key hashes to {actual}")]
    SigningKeyMismatch { expected: String, actual: String },

    /// A signed input does not satisfy its locking script
    #[error("Input {index} failed verification: {reason}")]
    ScriptVerification { index: usize, reason: String },

    /// Node could not be reached
    #[error("Bitcoin node unavailable: {message}")]
    NodeUnavailable { message: String },

    /// Node answered with a JSON-RPC error object
    #[error("Bitcoin node RPC error {code}: {message}")]
    NodeRpcError { code: i32, message: String },

    /// Any other RPC client failure
    #[error("RPC communication failed: {source}")]
    Rpc {
        #[source]
        source: bitcoincore_rpc::Error,
    },

    /// Fee price feed failed after all retries
    #[error("Fee price feed unavailable: {message}")]
    PriceFeedUnavailable { message: String },

    /// Network request failures (fee feed)
    #[error("Network request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    /// Malformed bytes on decode
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// File I/O operations
    #[error("File operation failed: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON processing error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

/// Result type alias for locking and spending operations
pub type LockResult<T> = Result<T, LockError>;

impl LockError {
    /// Create a configuration error with a message
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a serialization error with a message
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Check if this error is retryable (transport-level failures only)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LockError::NodeUnavailable { .. } | LockError::Network { .. }
        )
    }

    /// Check if this error was caused by malformed caller input
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            LockError::InvalidLockValue { .. }
                | LockError::ChecksumMismatch
                | LockError::InvalidVersionByte { .. }
                | LockError::InvalidAddress { .. }
                | LockError::Base58 { .. }
                | LockError::InvalidPrivateKey { .. }
                | LockError::SigningKeyMismatch { .. }
        )
    }
}

impl From<bitcoincore_rpc::Error> for LockError {
    fn from(err: bitcoincore_rpc::Error) -> Self {
        match err {
            bitcoincore_rpc::Error::JsonRpc(jsonrpc::error::Error::Rpc(rpc)) => {
                LockError::NodeRpcError {
                    code: rpc.code,
                    message: rpc.message,
                }
            }
            bitcoincore_rpc::Error::JsonRpc(jsonrpc::error::Error::Transport(e)) => {
                LockError::NodeUnavailable {
                    message: e.to_string(),
                }
            }
            other => LockError::Rpc { source: other },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let config_err = LockError::config("missing rpc password");
        assert!(matches!(config_err, LockError::Configuration { .. }));

        let ser_err = LockError::serialization("truncated input");
        assert!(matches!(ser_err, LockError::Serialization { .. }));
        assert!(ser_err.to_string().contains("truncated input"));
    }

    #[test]
    fn test_error_classification() {
        let unavailable = LockError::NodeUnavailable {
            message: "connection refused".to_string(),
        };
        assert!(unavailable.is_retryable());
        assert!(!unavailable.is_caller_error());

        let rpc = LockError::NodeRpcError {
            code: -26,
            message: "non-final".to_string(),
        };
        assert!(!rpc.is_retryable());

        let lock = LockError::InvalidLockValue { value: 0 };
        assert!(lock.is_caller_error());
        assert!(!lock.is_retryable());

        assert!(LockError::ChecksumMismatch.is_caller_error());
        assert!(!LockError::NoFundsAvailable {
            address: "2MwbgHJBG9mSp54CCG4zaLFyg3yGkZovAAE".to_string()
        }
        .is_caller_error());
    }

    #[test]
    fn test_rpc_error_mapping() {
        let rpc = jsonrpc::error::RpcError {
            code: -5,
            message: "Invalid or non-wallet transaction id".to_string(),
            data: None,
        };
        let err: LockError =
            bitcoincore_rpc::Error::JsonRpc(jsonrpc::error::Error::Rpc(rpc)).into();
        match err {
            LockError::NodeRpcError { code, message } => {
                assert_eq!(code, -5);
                assert!(message.contains("non-wallet"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
