//! Transaction finality.

use corvus_types::{Transaction, SEQUENCE_FINAL};

/// Lock-time values at or above this are unix timestamps, below are heights.
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// True when `tx` may be included in a block at `height` whose lock-time
/// cutoff is `block_time`.
///
/// A non-zero lock time only binds while at least one input keeps a
/// non-final sequence number.
pub fn is_final_tx(tx: &Transaction, height: u32, block_time: i64) -> bool {
    if tx.lock_time == 0 {
        return true;
    }
    let cutoff = if tx.lock_time < LOCKTIME_THRESHOLD {
        i64::from(height)
    } else {
        block_time
    };
    if i64::from(tx.lock_time) < cutoff {
        return true;
    }
    tx.inputs.iter().all(|i| i.sequence == SEQUENCE_FINAL)
}
