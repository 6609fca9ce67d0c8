//! Base58Check encoding for addresses and WIF keys.
//!
//! The payload is followed by the first four bytes of its double SHA-256
//! and the whole buffer is rendered in Bitcoin's Base58 alphabet.

use crate::error::{LockError, LockResult};
use crate::hash::sha256d;

/// Length of the trailing checksum.
const CHECKSUM_LEN: usize = 4;

/// Encode `payload || sha256d(payload)[..4]` as Base58.
pub fn check_encode(payload: &[u8]) -> String {
    let checksum = sha256d(payload);
    let mut data = Vec::with_capacity(payload.len() + CHECKSUM_LEN);
    data.extend_from_slice(payload);
    data.extend_from_slice(&checksum[..CHECKSUM_LEN]);
    bs58::encode(data).into_string()
}

/// Decode a Base58Check string and return the payload without its checksum.
pub fn check_decode(s: &str) -> LockResult<Vec<u8>> {
    let decoded = bs58::decode(s).into_vec().map_err(|e| LockError::Base58 {
        message: e.to_string(),
    })?;
    if decoded.len() < CHECKSUM_LEN + 1 {
        return Err(LockError::Base58 {
            message: format!("{} bytes is too short for a checksummed payload", decoded.len()),
        });
    }

    let (payload, checksum) = decoded.split_at(decoded.len() - CHECKSUM_LEN);
    if checksum != &sha256d(payload)[..CHECKSUM_LEN] {
        return Err(LockError::ChecksumMismatch);
    }
    Ok(payload.to_vec())
}
