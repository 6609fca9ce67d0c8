//! # bitcoin-cltv: Time-Locked P2SH Addresses
//!
//! Lock funds to a block height or timestamp with `OP_CHECKLOCKTIMEVERIFY`
//! behind a P2SH address, then sweep them once the lock has matured.
//!
//! ## Flow
//!
//! ```text
//! lock value + key hash ──> redeem script ──> P2SH address
//!                                                  │ funded by anyone
//!                                                  ▼
//!   node wallet ──> UTXO aggregator ──> fee loop (build, sign, measure)
//!                                                  │
//!                                                  ▼
//!                              testmempoolaccept ──> sendrawtransaction
//! ```
//!
//! ## Module Structure
//!
//! - [`script`], [`locked_script`]: script encoding and the CLTV template
//! - [`address`], [`base58`], [`keys`]: Base58Check addresses and WIF keys
//! - [`transaction`], [`signer`]: wire format, legacy sighash, ECDSA signing
//! - [`utxo`], [`builder`], [`contract`]: funding discovery and spend construction
//! - [`services`]: Bitcoin Core RPC and the fee price feed
//! - [`tx_decoder`]: transaction reports for the `decode` command

pub mod address;
pub mod base58;
pub mod builder;
pub mod config;
pub mod contract;
pub mod encode;
pub mod error;
pub mod hash;
pub mod keys;
pub mod locked_script;
pub mod locktime;
pub mod script;
pub mod services;
pub mod signer;
pub mod transaction;
pub mod tx_decoder;
pub mod utils;
pub mod utxo;


// Re-export commonly used types
pub use address::{Address, AddressKind, Network};
pub use builder::FeeRate;
pub use contract::{PreparedSpend, SubmitOutcome, TimelockContract};
pub use error::{LockError, LockResult};
pub use keys::SigningKey;
pub use locked_script::{build_locked_script, script_hash, LockSpec};
pub use services::{BitcoinNodeClient, FeeRateClient, NodeRpc};
