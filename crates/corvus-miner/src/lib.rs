//! # corvus-miner
//!
//! Block assembly and mining for the Corvus blockchain.
//!
//! This crate provides:
//! - The block assembler: ancestor-package selection over a mempool
//!   snapshot, coinbase and special-payload construction, PoS kernel search
//! - The modified-package index tracking partially included packages
//! - Collaborator interfaces for the quorum, chain-lock, payment, staking
//!   and validation subsystems
//! - The PoW worker pool, the `generate` RPC backend and the PoS mint loop
//! - A shared miner handle owning the control flags and counters

mod assembler;
mod error;
mod handle;
mod modified;
mod pos;
mod pow;
mod template;
mod traits;

pub use assembler::{
    update_time, AssemblerOptions, BlockAssembler, COINBASE_RESERVE_SIGOPS, COINBASE_RESERVE_SIZE,
    DEFAULT_BLOCK_MAX_SIZE, DEFAULT_BLOCK_MIN_TX_FEE, MAX_CONSECUTIVE_FAILURES,
};
pub use error::{MinerError, MinerResult};
pub use handle::MinerHandle;
pub use modified::{ModifiedEntry, ModifiedIndex};
pub use pos::{Interrupt, PosMiner};
pub use pow::{
    coinbase_flags, generate_blocks, ExtraNonce, PowMiner, DEFAULT_MAX_TRIES, NONCE_INNER_LOOP,
};
pub use template::BlockTemplate;
pub use traits::{
    AlwaysSafe, AlwaysSynced, AssemblerDeps, BlockPayments, BlockProcessor, BlockValidity,
    CoinStake, NetworkSync, NullPayments, NullQuorums, NullSpecialRoots, NullValidity,
    ProcessOutcome, QuorumCommitments, SpecialTxRoots, Staker, TxMiningSafety,
};

use corvus_consensus::SharedChain;
use corvus_mempool::Mempool;
use std::sync::Arc;

/// Everything a miner driver needs to build and submit blocks.
#[derive(Clone)]
pub struct MinerContext {
    pub params: Arc<corvus_consensus::ChainParams>,
    pub chain: SharedChain,
    pub mempool: Arc<Mempool>,
    pub options: AssemblerOptions,
    pub deps: AssemblerDeps,
    pub processor: Arc<dyn BlockProcessor>,
    pub sync: Arc<dyn NetworkSync>,
}
