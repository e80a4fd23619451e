//! Consensus error types.

use corvus_types::Hash256;
use thiserror::Error;

/// Consensus errors.
#[derive(Error, Debug)]
pub enum ConsensusError {
    /// Compact difficulty bits decode to no valid target.
    #[error("invalid compact difficulty bits: {0:#010x}")]
    InvalidCompactBits(u32),

    /// A block does not extend the current tip.
    #[error("block {block} does not extend tip {tip}")]
    NotExtendingTip { block: Hash256, tip: Hash256 },

    /// A block with this hash is already connected.
    #[error("duplicate block: {0}")]
    DuplicateBlock(Hash256),

    /// Unknown network name in configuration.
    #[error("unknown network: {0}")]
    UnknownNetwork(String),
}

/// Result type for consensus operations.
pub type ConsensusResult<T> = Result<T, ConsensusError>;
