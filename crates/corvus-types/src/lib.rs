//! # corvus-types
//!
//! Chain primitives for the Corvus blockchain.
//!
//! This crate provides:
//! - 256-bit hashes and the Blake2b-256 digest used throughout the chain
//! - The canonical wire encoding (little-endian integers, compact sizes)
//! - Scripts with legacy signature-operation counting
//! - Transactions, including versioned special-transaction payloads
//! - Block headers and blocks with the dual PoW/PoS wire format
//! - Merkle root computation over transaction ids

mod block;
mod encoding;
mod hash;
mod merkle;
mod payload;
mod script;
mod transaction;

pub use block::{Block, BlockHeader, POSV2_BITS, POS_BIT};
pub use encoding::{Decodable, DecodeError, Encodable, Reader};
pub use hash::{blake2b256, Hash256};
pub use merkle::merkle_root;
pub use payload::CoinbasePayload;
pub use script::{Script, OP_0, OP_1, OP_16, OP_CHECKMULTISIG, OP_CHECKSIG, OP_RETURN, OP_TRUE};
pub use transaction::{
    OutPoint, Transaction, TxIn, TxOut, SEQUENCE_FINAL, TX_TYPE_COINBASE, TX_TYPE_STANDARD,
};

/// Monetary amount in the base unit (corvids).
pub type Amount = i64;

/// Base units per whole coin.
pub const COIN: Amount = 100_000_000;

/// One hundredth of a coin, used for rounding reserve amounts.
pub const CENT: Amount = 1_000_000;
