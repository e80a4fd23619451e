//! The shared miner handle.
//!
//! Owns the control flags and counters the original kept as process-wide
//! globals. One handle is created at node startup, passed into the driver
//! threads and queried by the RPC layer.

use corvus_types::Amount;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

struct RateSample {
    at: Instant,
    count: u64,
    hps: f64,
}

/// Miner control flags and counters.
pub struct MinerHandle {
    /// Should-run flag; clearing it is the cancellation signal.
    should_run: AtomicBool,
    /// Is-running flag maintained by the workers.
    running: AtomicBool,
    /// Worker thread count, surfaced by `getgenerate`.
    threads: AtomicUsize,
    /// Cumulative hash attempts.
    hash_count: AtomicU64,
    /// Last sample for the hashes-per-second estimate.
    rate: Mutex<RateSample>,
    /// Transaction count of the last assembled template.
    last_block_tx: AtomicU64,
    /// Size of the last assembled template.
    last_block_size: AtomicU64,
    /// Balance withheld from staking.
    reserve_balance: AtomicI64,
}

impl Default for MinerHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl MinerHandle {
    /// Fresh handle with mining off.
    pub fn new() -> Self {
        MinerHandle {
            should_run: AtomicBool::new(false),
            running: AtomicBool::new(false),
            threads: AtomicUsize::new(0),
            hash_count: AtomicU64::new(0),
            rate: Mutex::new(RateSample {
                at: Instant::now(),
                count: 0,
                hps: 0.0,
            }),
            last_block_tx: AtomicU64::new(0),
            last_block_size: AtomicU64::new(0),
            reserve_balance: AtomicI64::new(0),
        }
    }

    /// Request the workers to run.
    pub fn request_start(&self) {
        self.should_run.store(true, Ordering::SeqCst);
    }

    /// One-shot cancellation: workers observe this at their poll points.
    pub fn request_stop(&self) {
        self.should_run.store(false, Ordering::SeqCst);
    }

    /// True while workers should keep mining.
    pub fn should_run(&self) -> bool {
        self.should_run.load(Ordering::SeqCst)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    /// True while at least one worker is in its loop.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_threads(&self, threads: usize) {
        self.threads.store(threads, Ordering::SeqCst);
    }

    pub fn threads(&self) -> usize {
        self.threads.load(Ordering::SeqCst)
    }

    /// Record `n` hash attempts.
    pub fn note_hashes(&self, n: u64) {
        self.hash_count.fetch_add(n, Ordering::Relaxed);
    }

    /// Cumulative hash attempts.
    pub fn hash_count(&self) -> u64 {
        self.hash_count.load(Ordering::Relaxed)
    }

    /// Reset the counters when mining stops.
    pub fn reset_counters(&self) {
        self.hash_count.store(0, Ordering::Relaxed);
        let mut rate = self.rate.lock();
        rate.at = Instant::now();
        rate.count = 0;
        rate.hps = 0.0;
    }

    /// Rolling hashes-per-second estimate since the previous call.
    pub fn hashes_per_second(&self) -> f64 {
        let count = self.hash_count();
        let mut rate = self.rate.lock();
        let elapsed = rate.at.elapsed().as_secs_f64();
        if elapsed >= 0.1 {
            rate.hps = (count.saturating_sub(rate.count)) as f64 / elapsed;
            rate.at = Instant::now();
            rate.count = count;
        }
        rate.hps
    }

    /// Record the shape of the last assembled template.
    pub fn set_last_block(&self, size: u64, tx_count: u64) {
        self.last_block_size.store(size, Ordering::SeqCst);
        self.last_block_tx.store(tx_count, Ordering::SeqCst);
    }

    pub fn last_block_size(&self) -> u64 {
        self.last_block_size.load(Ordering::SeqCst)
    }

    pub fn last_block_tx(&self) -> u64 {
        self.last_block_tx.load(Ordering::SeqCst)
    }

    pub fn set_reserve_balance(&self, amount: Amount) {
        self.reserve_balance.store(amount, Ordering::SeqCst);
    }

    pub fn reserve_balance(&self) -> Amount {
        self.reserve_balance.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_stop_flags() {
        let handle = MinerHandle::new();
        assert!(!handle.should_run());
        handle.request_start();
        assert!(handle.should_run());
        handle.request_stop();
        assert!(!handle.should_run());
    }

    #[test]
    fn test_hash_counting() {
        let handle = MinerHandle::new();
        handle.note_hashes(10);
        handle.note_hashes(5);
        assert_eq!(handle.hash_count(), 15);
        handle.reset_counters();
        assert_eq!(handle.hash_count(), 0);
    }

    #[test]
    fn test_last_block_stats() {
        let handle = MinerHandle::new();
        handle.set_last_block(1_234, 7);
        assert_eq!(handle.last_block_size(), 1_234);
        assert_eq!(handle.last_block_tx(), 7);
    }

    #[test]
    fn test_reserve_balance() {
        let handle = MinerHandle::new();
        assert_eq!(handle.reserve_balance(), 0);
        handle.set_reserve_balance(5 * corvus_types::COIN);
        assert_eq!(handle.reserve_balance(), 5 * corvus_types::COIN);
    }
}
