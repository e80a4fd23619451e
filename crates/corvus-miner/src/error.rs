//! Mining error types.

use thiserror::Error;

/// Mining errors.
///
/// Transient package skips are handled inside the selector and never
/// surface; block rejections are reported as values by the processor.
#[derive(Error, Debug)]
pub enum MinerError {
    /// Invalid miner configuration, fatal before mining begins.
    #[error("miner configuration error: {0}")]
    Config(String),

    /// A required collaborator is missing or in the wrong state.
    #[error("miner state error: {0}")]
    State(String),

    /// A mandatory coinbase-payload commitment could not be computed.
    #[error("consensus computation failed: {0}")]
    ConsensusCompute(String),

    /// Mining was cancelled; quiet, non-error termination.
    #[error("mining cancelled")]
    Cancelled,
}

/// Result type for mining operations.
pub type MinerResult<T> = Result<T, MinerError>;
