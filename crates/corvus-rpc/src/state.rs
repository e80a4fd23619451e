//! Shared application state.

use corvus_mempool::FeeRate;
use corvus_miner::{BlockTemplate, MinerContext, MinerHandle, PowMiner};
use corvus_types::{Hash256, Script};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;

/// Fee estimation, delegated to whichever estimator the node wires in.
pub trait FeeEstimator: Send + Sync {
    /// Fee rate expected to confirm within `conf_target` blocks.
    fn estimate_fee(&self, conf_target: u32) -> Option<FeeRate>;

    /// Smart estimate: rate plus the target it was actually found at.
    fn estimate_smart_fee(&self, conf_target: u32, conservative: bool) -> Option<(FeeRate, u32)>;

    /// Largest confirmation target the estimator tracks.
    fn highest_target_tracked(&self) -> u32 {
        1_008
    }
}

/// Estimator with no data; every estimate is unavailable.
#[derive(Debug, Default)]
pub struct NullFeeEstimator;

impl FeeEstimator for NullFeeEstimator {
    fn estimate_fee(&self, _conf_target: u32) -> Option<FeeRate> {
        None
    }

    fn estimate_smart_fee(
        &self,
        _conf_target: u32,
        _conservative: bool,
    ) -> Option<(FeeRate, u32)> {
        None
    }
}

/// The template `getblocktemplate` served last, kept until the tip moves or
/// the pool changes materially.
pub struct CachedTemplate {
    pub template: BlockTemplate,
    pub prev_hash: Hash256,
    /// Wall-clock second the template was assembled.
    pub created: i64,
    /// Pool mutation counter at assembly time.
    pub tx_updated: u64,
}

/// Shared application state for API handlers.
#[derive(Clone)]
pub struct AppState {
    /// Chain, mempool, parameters and collaborators for block building.
    pub miner: MinerContext,
    /// Miner control flags and counters.
    pub handle: Arc<MinerHandle>,
    /// Best-block hash, signalled on every tip change.
    pub tip_rx: watch::Receiver<Hash256>,
    /// `getblocktemplate` cache.
    pub gbt_cache: Arc<Mutex<Option<CachedTemplate>>>,
    /// The running PoW worker pool, controlled by `setgenerate`.
    pub pow_control: Arc<Mutex<Option<PowMiner>>>,
    /// Coinbase script used by `setgenerate` mining.
    pub mining_script: Script,
    /// Configured `-gen` flag.
    pub gen_config: bool,
    /// Whether governance has enabled superblock payments.
    pub superblocks_enabled: bool,
    /// Fee estimator backing the `estimate*` calls.
    pub estimator: Arc<dyn FeeEstimator>,
}
