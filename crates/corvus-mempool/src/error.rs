//! Error types for the mempool.

use corvus_types::Hash256;
use thiserror::Error;

/// Mempool errors.
#[derive(Error, Debug)]
pub enum MempoolError {
    /// Transaction already exists in the pool.
    #[error("transaction already in mempool: {0}")]
    AlreadyExists(Hash256),

    /// Transaction not found.
    #[error("transaction not found: {0}")]
    NotFound(Hash256),

    /// A coinbase can never enter the pool.
    #[error("coinbase transactions are not poolable")]
    Coinbase,

    /// An input double-spends an in-pool transaction.
    #[error("input {txid}:{index} already spent in mempool")]
    DoubleSpend { txid: Hash256, index: u32 },
}

/// Result type for mempool operations.
pub type MempoolResult<T> = Result<T, MempoolError>;
