//! Collaborator interfaces.
//!
//! The assembler and the drivers talk to the quorum, chain-lock, payment,
//! staking, validation and sync subsystems through these traits. Null
//! implementations cover wiring on networks where a subsystem is inactive;
//! tests substitute purpose-built mocks.

use corvus_consensus::BlockIndex;
use corvus_types::{Amount, Block, BlockHeader, Hash256, OutPoint, Transaction, TxOut};
use std::sync::Arc;

/// Source of mandatory quorum-commitment transactions.
pub trait QuorumCommitments: Send + Sync {
    /// A minable commitment for the quorum type at `height`, if one is due.
    fn minable_commitment(&self, llmq_type: u8, height: u32) -> Option<Transaction>;
}

/// Chain-lock conflict check for mempool transactions.
pub trait TxMiningSafety: Send + Sync {
    /// False when a conflict of `txid` has been chain-locked.
    fn is_tx_safe_for_mining(&self, txid: &Hash256) -> bool;
}

/// Splits the block reward across the coinbase outputs.
pub trait BlockPayments: Send + Sync {
    /// Apply the payment split for `height` to `coinbase` and return the
    /// required masternode and superblock outputs for RPC reporting. The
    /// assembler must not second-guess the split.
    fn fill_block_payments(
        &self,
        coinbase: &mut Transaction,
        height: u32,
        block_reward: Amount,
    ) -> (Vec<TxOut>, Vec<TxOut>);
}

/// Merkle roots committed to by the special coinbase payload.
pub trait SpecialTxRoots: Send + Sync {
    /// Root of the deterministic masternode list after `block`.
    fn masternode_list_root(&self, block: &Block, prev: &BlockIndex) -> Result<Hash256, String>;

    /// Root of the active quorum set after `block`.
    fn quorum_commitments_root(&self, block: &Block, prev: &BlockIndex)
        -> Result<Hash256, String>;
}

/// A found stake kernel and the coinstake transaction built on it.
#[derive(Debug, Clone)]
pub struct CoinStake {
    pub tx: Transaction,
    pub stake: OutPoint,
}

/// The staking wallet.
pub trait Staker: Send + Sync {
    /// True while the wallet cannot sign.
    fn is_locked(&self) -> bool;

    /// True when the wallet holds outputs eligible for staking.
    fn has_mintable_coins(&self) -> bool;

    /// Spendable balance, compared against the reserve floor.
    fn balance(&self) -> Amount;

    /// Minimum seconds between kernel attempts on an unchanged tip.
    fn hash_interval(&self) -> i64;

    /// Search the kernel window ending at `header.time` and, on a hit,
    /// produce the coinstake for the prospective `coinbase`. The wallet may
    /// rewrite the coinbase outputs as the stake protocol requires.
    fn create_coin_stake(
        &self,
        prev: &BlockIndex,
        header: &BlockHeader,
        search_interval: i64,
        coinbase: &mut Transaction,
    ) -> Option<CoinStake>;

    /// Sign the header with the key of the staked output.
    fn sign_block(&self, header: &mut BlockHeader) -> bool;
}

/// Pre-submission self-check against full validation.
pub trait BlockValidity: Send + Sync {
    fn test_block_validity(
        &self,
        block: &Block,
        check_pow: bool,
        check_merkle: bool,
    ) -> Result<(), String>;
}

/// Outcome of submitting a block to validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Accepted and connected as a new block.
    AcceptedNew,
    /// Already known and valid.
    Duplicate,
    /// Rejected with a reason.
    Rejected(String),
}

impl ProcessOutcome {
    /// True for either accepted case.
    pub fn accepted(&self) -> bool {
        !matches!(self, ProcessOutcome::Rejected(_))
    }
}

/// The validation interface miner drivers submit through.
pub trait BlockProcessor: Send + Sync {
    /// Proof check for a completed header (PoW target or stake proof).
    fn check_proof(&self, header: &BlockHeader) -> bool;

    /// Hand a completed block to validation.
    fn process_new_block(&self, block: &Block) -> ProcessOutcome;
}

/// Network synchronisation state.
pub trait NetworkSync: Send + Sync {
    fn is_synced(&self) -> bool;
}

/// No quorums are ever due.
#[derive(Debug, Default)]
pub struct NullQuorums;

impl QuorumCommitments for NullQuorums {
    fn minable_commitment(&self, _llmq_type: u8, _height: u32) -> Option<Transaction> {
        None
    }
}

/// Every transaction is safe; no chain locks observed.
#[derive(Debug, Default)]
pub struct AlwaysSafe;

impl TxMiningSafety for AlwaysSafe {
    fn is_tx_safe_for_mining(&self, _txid: &Hash256) -> bool {
        true
    }
}

/// The whole reward stays on the coinbase; no masternode or superblock
/// outputs are required.
#[derive(Debug, Default)]
pub struct NullPayments;

impl BlockPayments for NullPayments {
    fn fill_block_payments(
        &self,
        _coinbase: &mut Transaction,
        _height: u32,
        _block_reward: Amount,
    ) -> (Vec<TxOut>, Vec<TxOut>) {
        (Vec::new(), Vec::new())
    }
}

/// Zeroed commitment roots for networks without a masternode layer.
#[derive(Debug, Default)]
pub struct NullSpecialRoots;

impl SpecialTxRoots for NullSpecialRoots {
    fn masternode_list_root(&self, _block: &Block, _prev: &BlockIndex) -> Result<Hash256, String> {
        Ok(Hash256::ZERO)
    }

    fn quorum_commitments_root(
        &self,
        _block: &Block,
        _prev: &BlockIndex,
    ) -> Result<Hash256, String> {
        Ok(Hash256::ZERO)
    }
}

/// Self-check that accepts every template.
#[derive(Debug, Default)]
pub struct NullValidity;

impl BlockValidity for NullValidity {
    fn test_block_validity(
        &self,
        _block: &Block,
        _check_pow: bool,
        _check_merkle: bool,
    ) -> Result<(), String> {
        Ok(())
    }
}

/// A node that is always synced (single-node networks).
#[derive(Debug, Default)]
pub struct AlwaysSynced;

impl NetworkSync for AlwaysSynced {
    fn is_synced(&self) -> bool {
        true
    }
}

/// The collaborator set the assembler is constructed with.
#[derive(Clone)]
pub struct AssemblerDeps {
    pub quorums: Arc<dyn QuorumCommitments>,
    pub chain_locks: Arc<dyn TxMiningSafety>,
    pub payments: Arc<dyn BlockPayments>,
    pub special_roots: Arc<dyn SpecialTxRoots>,
    pub validity: Arc<dyn BlockValidity>,
}

impl AssemblerDeps {
    /// Null collaborators: no quorums, no chain locks, no extra payments.
    pub fn null() -> Self {
        AssemblerDeps {
            quorums: Arc::new(NullQuorums),
            chain_locks: Arc::new(AlwaysSafe),
            payments: Arc::new(NullPayments),
            special_roots: Arc::new(NullSpecialRoots),
            validity: Arc::new(NullValidity),
        }
    }
}
