//! Lock time interpretation and the finality rule nodes apply before
//! accepting a transaction into the mempool.

use crate::config::tx::{LOCKTIME_THRESHOLD, SEQUENCE_FINAL};
use crate::transaction::Transaction;
use std::fmt;

/// How a lock value is interpreted, decided purely by its magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    BlockHeight,
    Timestamp,
}

impl LockKind {
    pub fn of(lock_value: u32) -> Self {
        if lock_value < LOCKTIME_THRESHOLD {
            LockKind::BlockHeight
        } else {
            LockKind::Timestamp
        }
    }
}

impl fmt::Display for LockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockKind::BlockHeight => write!(f, "block height"),
            LockKind::Timestamp => write!(f, "UNIX timestamp"),
        }
    }
}

/// Whether `tx` may be included in the block after `tip_height`.
///
/// Height locks compare against the next block height, timestamp locks
/// against the median time past. A lock time is ignored when every input
/// carries the final sequence number.
pub fn is_final(tx: &Transaction, tip_height: u32, median_time_past: u32) -> bool {
    if tx.lock_time == 0 {
        return true;
    }

    let satisfied = match LockKind::of(tx.lock_time) {
        LockKind::BlockHeight => tx.lock_time < tip_height.saturating_add(1),
        LockKind::Timestamp => tx.lock_time < median_time_past,
    };

    satisfied || tx.input.iter().all(|input| input.sequence == SEQUENCE_FINAL)
}

/// Blocks the chain still has to grow before a height lock can be spent.
pub fn blocks_remaining(tip_height: u64, lock_height: u32) -> u64 {
    u64::from(lock_height).saturating_sub(tip_height)
}
