//! The block template handed to miner drivers.

use corvus_types::{Amount, Block, TxOut};

/// A candidate block plus the bookkeeping the RPC layer exposes.
///
/// The fee and sigop vectors run parallel to the block's transactions.
/// Slot 0 carries the negated total fee and the coinbase sigop count; a
/// populated stake slot carries fee 0.
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    pub block: Block,
    pub fees: Vec<Amount>,
    pub sig_ops: Vec<i64>,
    /// Required masternode payment outputs.
    pub masternode_payments: Vec<TxOut>,
    /// Superblock payment outputs, when the height calls for them.
    pub superblock_payments: Vec<TxOut>,
    /// Difficulty bits of the parent, kept for RPC reporting.
    pub previous_bits: u32,
    /// Running block size including the coinbase reserve.
    pub size: u64,
    /// Number of selected transactions (coinbase and stake excluded).
    pub tx_count: u64,
}

impl BlockTemplate {
    /// Total fees collected from selected transactions.
    pub fn total_fees(&self) -> Amount {
        -self.fees.first().copied().unwrap_or(0)
    }

    /// Value of all coinbase outputs.
    pub fn coinbase_value(&self) -> Amount {
        self.block.coinbase().map_or(0, |tx| tx.value_out())
    }
}
