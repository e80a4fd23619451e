//! # corvus-consensus
//!
//! Consensus rules for the Corvus blockchain.
//!
//! This crate provides:
//! - Chain parameters per network (mainnet, testnet, regtest)
//! - Feature activation heights and version-bit deployments
//! - Compact difficulty bits, proof-of-work checks and retargeting
//! - The block subsidy schedule
//! - Transaction finality rules
//! - The in-memory chain view (block index, median-time-past, chain work)

mod chain;
mod error;
mod finality;
mod params;
mod pow;
mod subsidy;

pub use chain::{adjusted_time, BlockIndex, Chain, SharedChain, MEDIAN_TIME_SPAN};
pub use error::{ConsensusError, ConsensusResult};
pub use finality::{is_final_tx, LOCKTIME_THRESHOLD};
pub use params::{
    ChainParams, ConsensusParams, Deployment, DeploymentState, LlmqParams, Network,
};
pub use pow::{
    bits_to_difficulty, check_proof_of_work, compact_to_target, get_next_work_required,
    target_to_compact, work_for_bits,
};
pub use subsidy::block_subsidy;
