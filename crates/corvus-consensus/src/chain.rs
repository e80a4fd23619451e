//! In-memory chain view.
//!
//! The miner and RPC layers consume the chain through this read-only index;
//! writers connect headers under an exclusive lock. Holding the read side of
//! [`SharedChain`] for the duration of a template build gives the assembler
//! the immutable snapshot it relies on.

use crate::params::ChainParams;
use crate::pow::work_for_bits;
use crate::{ConsensusError, ConsensusResult};
use corvus_types::{BlockHeader, Hash256, POS_BIT};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Number of trailing blocks the median-time-past spans.
pub const MEDIAN_TIME_SPAN: usize = 11;

/// Index entry of one connected block.
#[derive(Debug, Clone)]
pub struct BlockIndex {
    pub height: u32,
    pub hash: Hash256,
    pub prev: Hash256,
    pub version: i32,
    pub time: u32,
    pub bits: u32,
    /// Cumulative expected work up to and including this block.
    pub chain_work: u128,
}

impl BlockIndex {
    /// True when the indexed block is proof-of-stake.
    pub fn is_proof_of_stake(&self) -> bool {
        (self.version as u32) & POS_BIT != 0
    }
}

/// The active chain: a contiguous run of block indices from genesis.
pub struct Chain {
    blocks: Vec<Arc<BlockIndex>>,
    by_hash: HashMap<Hash256, u32>,
}

/// Chain behind a reader-writer lock, shared between subsystems.
pub type SharedChain = Arc<RwLock<Chain>>;

impl Chain {
    /// Chain containing only the network's genesis block.
    pub fn new(params: &ChainParams) -> Self {
        let genesis = params.genesis_header();
        let index = Arc::new(BlockIndex {
            height: 0,
            hash: genesis.hash(),
            prev: Hash256::ZERO,
            version: genesis.version,
            time: genesis.time,
            bits: genesis.bits,
            chain_work: work_for_bits(genesis.bits),
        });
        let mut by_hash = HashMap::new();
        by_hash.insert(index.hash, 0);
        Chain {
            blocks: vec![index],
            by_hash,
        }
    }

    /// Height of the tip.
    pub fn height(&self) -> u32 {
        (self.blocks.len() - 1) as u32
    }

    /// The tip index. The chain always contains at least genesis.
    pub fn tip(&self) -> Arc<BlockIndex> {
        Arc::clone(self.blocks.last().expect("chain contains genesis"))
    }

    /// Index at `height`, if within the chain.
    pub fn at(&self, height: u32) -> Option<Arc<BlockIndex>> {
        self.blocks.get(height as usize).map(Arc::clone)
    }

    /// Index by block hash.
    pub fn get(&self, hash: &Hash256) -> Option<Arc<BlockIndex>> {
        self.by_hash.get(hash).and_then(|h| self.at(*h))
    }

    /// True when `hash` is a connected block.
    pub fn contains(&self, hash: &Hash256) -> bool {
        self.by_hash.contains_key(hash)
    }

    /// Connect a header on top of the tip.
    pub fn connect(&mut self, header: &BlockHeader) -> ConsensusResult<Arc<BlockIndex>> {
        let hash = header.hash();
        if self.contains(&hash) {
            return Err(ConsensusError::DuplicateBlock(hash));
        }
        let tip = self.tip();
        if header.prev_block != tip.hash {
            return Err(ConsensusError::NotExtendingTip {
                block: hash,
                tip: tip.hash,
            });
        }
        let index = Arc::new(BlockIndex {
            height: tip.height + 1,
            hash,
            prev: tip.hash,
            version: header.version,
            time: header.time,
            bits: header.bits,
            chain_work: tip.chain_work.saturating_add(work_for_bits(header.bits)),
        });
        self.by_hash.insert(hash, index.height);
        self.blocks.push(Arc::clone(&index));
        Ok(index)
    }

    /// Median time of the last [`MEDIAN_TIME_SPAN`] blocks ending at `height`.
    pub fn median_time_past(&self, height: u32) -> i64 {
        let end = (height as usize).min(self.blocks.len() - 1);
        let start = end.saturating_sub(MEDIAN_TIME_SPAN - 1);
        let mut times: Vec<i64> = self.blocks[start..=end]
            .iter()
            .map(|b| i64::from(b.time))
            .collect();
        times.sort_unstable();
        times[times.len() / 2]
    }
}

/// Wall-clock time in seconds.
///
/// The original consulted a peer-adjusted clock; without peer transport the
/// local clock is the adjusted time.
pub fn adjusted_time() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
