//! # corvus-mempool
//!
//! Transaction mempool for the Corvus blockchain.
//!
//! This crate provides:
//! - Fee-rate arithmetic as exact fractions (no division)
//! - Transaction entries with ancestor and descendant aggregates
//! - An identity index and an ancestor-score index over the same set
//! - Advisory fee prioritisation consumed through modified-fee aggregates
//! - A read-only snapshot view for block assembly

mod entry;
mod error;
mod feerate;
mod pool;

pub use entry::{AncestorScoreKey, EntryId, TxEntry};
pub use error::{MempoolError, MempoolResult};
pub use feerate::FeeRate;
pub use pool::{Mempool, MempoolView};
