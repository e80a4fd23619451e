//! Proof-of-stake mining.
//!
//! A single mint thread loops with a backoff schedule and asks the
//! assembler for templates; the kernel search itself happens inside
//! template construction. Cancellation is observed with at most one
//! sleep-tick of latency through an interruptible sleep primitive.

use crate::assembler::BlockAssembler;
use crate::handle::MinerHandle;
use crate::traits::{ProcessOutcome, Staker};
use crate::MinerContext;
use corvus_consensus::adjusted_time;
use corvus_types::Script;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Seconds between mintable-coin re-checks.
const MINTABLE_CHECK_INTERVAL: i64 = 60;

/// Interruptible sleep: a cancelled sleeper wakes immediately, and every
/// later sleep returns at once.
#[derive(Default)]
pub struct Interrupt {
    interrupted: Mutex<bool>,
    condvar: Condvar,
}

impl Interrupt {
    /// Fresh, un-interrupted primitive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the interrupt and wake every sleeper.
    pub fn interrupt(&self) {
        *self.interrupted.lock() = true;
        self.condvar.notify_all();
    }

    /// True once tripped.
    pub fn interrupted(&self) -> bool {
        *self.interrupted.lock()
    }

    /// Sleep for `duration`; returns false when interrupted instead.
    pub fn sleep_for(&self, duration: Duration) -> bool {
        let mut interrupted = self.interrupted.lock();
        if *interrupted {
            return false;
        }
        self.condvar.wait_for(&mut interrupted, duration);
        !*interrupted
    }
}

/// The PoS mint thread.
pub struct PosMiner {
    thread: Option<JoinHandle<()>>,
    interrupt: Arc<Interrupt>,
}

impl PosMiner {
    /// Spawn the mint loop.
    pub fn start(ctx: MinerContext, handle: Arc<MinerHandle>, staker: Arc<dyn Staker>) -> PosMiner {
        let interrupt = Arc::new(Interrupt::new());
        let thread_interrupt = Arc::clone(&interrupt);
        let thread = thread::Builder::new()
            .name("corvus-stake".to_string())
            .spawn(move || mint_loop(ctx, handle, staker, thread_interrupt))
            .expect("failed to spawn stake thread");
        PosMiner {
            thread: Some(thread),
            interrupt,
        }
    }

    /// Trip the interrupt and join the mint thread.
    pub fn stop(mut self) {
        self.interrupt.interrupt();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn mint_loop(
    ctx: MinerContext,
    handle: Arc<MinerHandle>,
    staker: Arc<dyn Staker>,
    interrupt: Arc<Interrupt>,
) {
    info!("PoS miner started");
    let mut assembler = BlockAssembler::new(
        Arc::clone(&ctx.params),
        ctx.options.clone(),
        ctx.deps.clone(),
    );
    // The coinbase destination comes from the staked output, not a script.
    let coinbase_script = Script::new();
    let mut mintable = false;
    let mut mintable_last_check = 0i64;
    let mut last_height: Option<u32> = None;

    while !interrupt.interrupted() {
        let now = adjusted_time();
        if now - mintable_last_check > MINTABLE_CHECK_INTERVAL {
            mintable_last_check = now;
            mintable = staker.has_mintable_coins();
        }

        let prev = ctx.chain.read().tip();
        let next_height = prev.height + 1;

        if !ctx.params.consensus.pos_enforced(next_height) && !prev.is_proof_of_stake() {
            if !interrupt.sleep_for(Duration::from_secs(10)) {
                break;
            }
            continue;
        }

        if staker.is_locked()
            || !mintable
            || handle.reserve_balance() >= staker.balance()
            || !ctx.sync.is_synced()
        {
            assembler.reset_stake_search();
            if !interrupt.sleep_for(Duration::from_secs(10)) {
                break;
            }
            continue;
        }

        // Rate-limit kernel attempts while the tip is unchanged.
        if last_height == Some(prev.height)
            && now - staker.hash_interval().max(1) < assembler.last_stake_search_time()
        {
            if !interrupt.sleep_for(Duration::from_secs(5)) {
                break;
            }
            continue;
        }
        last_height = Some(prev.height);

        let template = match assembler.create_new_block(
            &ctx.chain,
            &ctx.mempool,
            &coinbase_script,
            Some(staker.as_ref()),
        ) {
            Ok(template) => template,
            Err(e) => {
                debug!(error = %e, "stake template failed");
                if !interrupt.sleep_for(Duration::from_secs(1)) {
                    break;
                }
                continue;
            }
        };
        handle.set_last_block(template.size, template.tx_count);
        let block = template.block;

        if !ctx.processor.check_proof(&block.header) {
            // No kernel in this window; the next attempt waits its turn.
            continue;
        }

        let hash = block.header.hash();
        info!(%hash, "proof-of-stake block found");
        match ctx.processor.process_new_block(&block) {
            ProcessOutcome::AcceptedNew => info!(%hash, "block is submitted"),
            ProcessOutcome::Duplicate => info!(%hash, "block duplicate"),
            ProcessOutcome::Rejected(reason) => warn!(%hash, reason, "block is rejected"),
        }
    }
    info!("PoS miner stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::AssemblerOptions;
    use crate::traits::{
        AlwaysSynced, AssemblerDeps, BlockProcessor, CoinStake,
    };
    use corvus_consensus::{BlockIndex, Chain, ChainParams, SharedChain};
    use corvus_mempool::Mempool;
    use corvus_types::{Amount, Block, BlockHeader, Transaction};
    use parking_lot::RwLock;
    use std::time::Instant;

    struct IdleStaker;

    impl Staker for IdleStaker {
        fn is_locked(&self) -> bool {
            true
        }
        fn has_mintable_coins(&self) -> bool {
            false
        }
        fn balance(&self) -> Amount {
            0
        }
        fn hash_interval(&self) -> i64 {
            1
        }
        fn create_coin_stake(
            &self,
            _prev: &BlockIndex,
            _header: &BlockHeader,
            _search_interval: i64,
            _coinbase: &mut Transaction,
        ) -> Option<CoinStake> {
            None
        }
        fn sign_block(&self, _header: &mut BlockHeader) -> bool {
            false
        }
    }

    struct RejectAll;

    impl BlockProcessor for RejectAll {
        fn check_proof(&self, _header: &BlockHeader) -> bool {
            false
        }
        fn process_new_block(&self, _block: &Block) -> ProcessOutcome {
            ProcessOutcome::Rejected("test".to_string())
        }
    }

    fn idle_context() -> MinerContext {
        let params = Arc::new(ChainParams::regtest());
        let chain: SharedChain = Arc::new(RwLock::new(Chain::new(&params)));
        MinerContext {
            params,
            chain,
            mempool: Arc::new(Mempool::new()),
            options: AssemblerOptions::default(),
            deps: AssemblerDeps::null(),
            processor: Arc::new(RejectAll),
            sync: Arc::new(AlwaysSynced),
        }
    }

    #[test]
    fn test_interrupt_flags() {
        let interrupt = Interrupt::new();
        assert!(!interrupt.interrupted());
        interrupt.interrupt();
        assert!(interrupt.interrupted());
        assert!(!interrupt.sleep_for(Duration::from_secs(60)));
    }

    #[test]
    fn test_interrupt_wakes_sleeper() {
        let interrupt = Arc::new(Interrupt::new());
        let sleeper = Arc::clone(&interrupt);
        let started = Instant::now();
        let worker = thread::spawn(move || sleeper.sleep_for(Duration::from_secs(60)));
        thread::sleep(Duration::from_millis(50));
        interrupt.interrupt();
        assert!(!worker.join().unwrap());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_uninterrupted_sleep_completes() {
        let interrupt = Interrupt::new();
        assert!(interrupt.sleep_for(Duration::from_millis(10)));
    }

    #[test]
    fn test_pos_miner_stops_promptly_while_backing_off() {
        // PoS is far from enforced on regtest, so the loop sits in its
        // 10-second backoff; stop must cut that short.
        let ctx = idle_context();
        let handle = Arc::new(MinerHandle::new());
        let miner = PosMiner::start(ctx, handle, Arc::new(IdleStaker));

        thread::sleep(Duration::from_millis(50));
        let started = Instant::now();
        miner.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
