//! The block assembler.
//!
//! `create_new_block` snapshots the chain tip and the mempool, selects
//! transaction packages by ancestor fee rate, builds the coinbase (and its
//! special payload once DIP0003-class rules are active), runs the PoS kernel
//! search when the header calls for it, and returns a finished template.
//!
//! Package selection walks the mempool's ancestor-score index merged with
//! the modified-package index. Entries are never removed from the pool
//! during selection; instead, descendants of included transactions get
//! shadow rows with the included ancestors' contributions subtracted, and
//! each round compares the best shadow row against the next pool entry.

use crate::modified::ModifiedIndex;
use crate::template::BlockTemplate;
use crate::traits::{AssemblerDeps, Staker};
use crate::{MinerError, MinerResult};
use corvus_consensus::{
    adjusted_time, block_subsidy, get_next_work_required, is_final_tx, BlockIndex, Chain,
    ChainParams, ConsensusParams, SharedChain,
};
use corvus_mempool::{EntryId, FeeRate, Mempool, MempoolView};
use corvus_types::{
    Amount, Block, BlockHeader, CoinbasePayload, Encodable, Script, Transaction, TxIn, TxOut,
    OutPoint, OP_0, OP_RETURN, TX_TYPE_COINBASE,
};
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Default soft cap on assembled block size.
pub const DEFAULT_BLOCK_MAX_SIZE: u64 = 750_000;

/// Default fee-rate floor for block inclusion, per 1000 bytes.
pub const DEFAULT_BLOCK_MIN_TX_FEE: Amount = 1_000;

/// Size reserved up front for the coinbase transaction.
pub const COINBASE_RESERVE_SIZE: u64 = 1_000;

/// Sigops reserved up front for the coinbase transaction.
pub const COINBASE_RESERVE_SIGOPS: u64 = 100;

/// Failed package attempts tolerated once the block is nearly full.
pub const MAX_CONSECUTIVE_FAILURES: u64 = 1_000;

/// Lock times are evaluated against median-time-past under standard policy.
const LOCKTIME_USES_MEDIAN_TIME_PAST: bool = true;

/// Assembler options resolved from configuration.
#[derive(Debug, Clone)]
pub struct AssemblerOptions {
    /// Requested block size cap; clamped per build to
    /// `[1000, consensus max - 1000]`.
    pub block_max_size: u64,
    /// Packages below this ancestor fee rate end selection.
    pub block_min_fee_rate: FeeRate,
    /// Version override honoured on mine-on-demand networks only.
    pub block_version: Option<i32>,
}

impl Default for AssemblerOptions {
    fn default() -> Self {
        AssemblerOptions {
            block_max_size: DEFAULT_BLOCK_MAX_SIZE,
            block_min_fee_rate: FeeRate::from_per_kb(DEFAULT_BLOCK_MIN_TX_FEE),
            block_version: None,
        }
    }
}

/// Single-use scratch plus configuration for building block templates.
///
/// One assembler may build any number of templates; the scratch state is
/// reset at the start of every `create_new_block`. The stake-search
/// bookkeeping survives across builds, which is what lets the kernel search
/// advance its window between attempts.
pub struct BlockAssembler {
    params: Arc<ChainParams>,
    deps: AssemblerDeps,
    requested_max_size: u64,
    block_min_fee_rate: FeeRate,
    block_version_override: Option<i32>,

    // Scratch, reset per template.
    in_block: HashSet<EntryId>,
    max_block_size: u64,
    max_block_sigops: u64,
    block_size: u64,
    block_sig_ops: u64,
    block_tx: u64,
    fees: Amount,
    height: u32,
    lock_time_cutoff: i64,

    // Stake-search bookkeeping, persistent across builds.
    last_stake_search_time: i64,
    last_stake_search_interval: i64,
}

impl BlockAssembler {
    /// Assembler for `params` with the given options and collaborators.
    pub fn new(params: Arc<ChainParams>, options: AssemblerOptions, deps: AssemblerDeps) -> Self {
        BlockAssembler {
            params,
            deps,
            requested_max_size: options.block_max_size,
            block_min_fee_rate: options.block_min_fee_rate,
            block_version_override: options.block_version,
            in_block: HashSet::new(),
            max_block_size: 0,
            max_block_sigops: 0,
            block_size: 0,
            block_sig_ops: 0,
            block_tx: 0,
            fees: 0,
            height: 0,
            lock_time_cutoff: 0,
            last_stake_search_time: 0,
            last_stake_search_interval: 0,
        }
    }

    /// Seconds covered by the most recent kernel search window.
    pub fn last_stake_search_interval(&self) -> i64 {
        self.last_stake_search_interval
    }

    /// End of the most recent kernel search window.
    pub fn last_stake_search_time(&self) -> i64 {
        self.last_stake_search_time
    }

    /// Reset the kernel-search window (wallet locked, out of sync, reserve
    /// reached). Diagnostic bookkeeping only.
    pub fn reset_stake_search(&mut self) {
        self.last_stake_search_interval = 0;
    }

    fn reset_scratch(&mut self, consensus: &ConsensusParams, dip0001_active: bool) {
        self.in_block.clear();
        let consensus_max = consensus.max_block_size(dip0001_active);
        self.max_block_size = self
            .requested_max_size
            .clamp(1_000, consensus_max - 1_000);
        self.max_block_sigops = consensus.max_block_sigops(dip0001_active);
        self.block_size = COINBASE_RESERVE_SIZE;
        self.block_sig_ops = COINBASE_RESERVE_SIGOPS;
        self.block_tx = 0;
        self.fees = 0;
    }

    /// Build a candidate block extending the current tip.
    ///
    /// Holds a read lock on the chain and a mempool snapshot for the whole
    /// call (chain first, then mempool), so selection observes an immutable
    /// state. A wallet is required, and must be unlocked, whenever the
    /// computed block version flags proof-of-stake.
    pub fn create_new_block(
        &mut self,
        chain: &SharedChain,
        mempool: &Mempool,
        script_pub_key: &Script,
        staker: Option<&dyn Staker>,
    ) -> MinerResult<BlockTemplate> {
        let started = Instant::now();

        let chain = chain.read();
        let view = mempool.snapshot();

        let prev = chain.tip();
        self.height = prev.height + 1;
        let params = Arc::clone(&self.params);
        let consensus = &params.consensus;
        let dip0003_active = consensus.dip0003_active(self.height);
        let dip0008_active = consensus.dip0008_active(self.height);
        self.reset_scratch(consensus, consensus.dip0001_active(self.height));
        let mut sign_block = false;

        // Common header.
        let mut header = BlockHeader {
            version: params.compute_block_version(self.height),
            prev_block: prev.hash,
            ..BlockHeader::default()
        };
        if params.mine_blocks_on_demand {
            if let Some(version) = self.block_version_override {
                header.version = version;
            }
        }
        header.bits = get_next_work_required(&chain, &prev, adjusted_time(), consensus);
        header.time = adjusted_time() as u32;
        let is_pos = header.is_proof_of_stake();

        let mut block = Block {
            header: BlockHeader::default(),
            transactions: Vec::new(),
        };
        let mut fees: Vec<Amount> = Vec::new();
        let mut sig_ops: Vec<i64> = Vec::new();

        // Coinbase placeholder, backfilled at the end.
        block.transactions.push(Transaction::default());
        fees.push(-1);
        sig_ops.push(-1);
        if is_pos {
            // Coinstake placeholder.
            block.transactions.push(Transaction::default());
            fees.push(-1);
            sig_ops.push(-1);
        }

        let median_time_past = chain.median_time_past(prev.height);
        self.lock_time_cutoff = if LOCKTIME_USES_MEDIAN_TIME_PAST {
            median_time_past
        } else {
            i64::from(header.time)
        };

        // Mandatory quorum commitments go in ahead of selection. A
        // commitment that happens to be pooled is pre-seeded as in-block so
        // its descendants are scored through the modified index.
        if dip0003_active {
            for llmq in &consensus.llmqs {
                if let Some(commitment) = self
                    .deps
                    .quorums
                    .minable_commitment(llmq.llmq_type, self.height)
                {
                    if let Some(id) = view.get_id(&commitment.txid()) {
                        self.in_block.insert(id);
                    }
                    self.block_size += commitment.total_size();
                    self.block_tx += 1;
                    block.transactions.push(commitment);
                    fees.push(0);
                    sig_ops.push(0);
                }
            }
        }

        let (packages_selected, descendants_updated) =
            self.add_package_txs(&view, &mut block, &mut fees, &mut sig_ops);

        info!(
            version = format!("{:#x}", header.version),
            size = self.block_size,
            txs = self.block_tx,
            fees = self.fees,
            sig_ops = self.block_sig_ops,
            "assembled block transactions"
        );

        // Coinbase. The subsidy is keyed to the PARENT block's bits and
        // height.
        let block_reward =
            self.fees + block_subsidy(prev.bits, prev.height, consensus);
        let mut coinbase = Transaction {
            inputs: vec![TxIn::new(OutPoint::null(), Script::new())],
            outputs: vec![TxOut {
                value: block_reward,
                script_pubkey: script_pub_key.clone(),
            }],
            ..Transaction::default()
        };

        if !dip0003_active {
            coinbase.inputs[0].script_sig = Script::new()
                .push_num(i64::from(self.height))
                .push_op(OP_0);
        } else {
            coinbase.inputs[0].script_sig = Script::new().push_op(OP_RETURN);
            coinbase.version = 3;
            coinbase.tx_type = TX_TYPE_COINBASE;

            let mn_list_root = self
                .deps
                .special_roots
                .masternode_list_root(&block, &prev)
                .map_err(|e| {
                    MinerError::ConsensusCompute(format!("masternode list root: {e}"))
                })?;
            let payload = if dip0008_active {
                let quorum_root = self
                    .deps
                    .special_roots
                    .quorum_commitments_root(&block, &prev)
                    .map_err(|e| {
                        MinerError::ConsensusCompute(format!("quorum commitments root: {e}"))
                    })?;
                CoinbasePayload::v2(self.height, mn_list_root, quorum_root)
            } else {
                CoinbasePayload::v1(self.height, mn_list_root)
            };
            coinbase.extra_payload = payload.to_bytes();
        }

        // The payments module owns the reward split; masternode and
        // superblock vectors come back for the RPC to expose.
        let (masternode_payments, superblock_payments) =
            self.deps
                .payments
                .fill_block_payments(&mut coinbase, self.height, block_reward);

        // Correct the header time relative to the median before any kernel
        // search; min-difficulty networks retarget off the new time.
        update_time(&mut header, &chain, &prev, consensus);

        // PoS kernel search. The kernel depends on the exact coinbase that
        // will be produced, so the wallet gets the prospective coinbase.
        if is_pos {
            let staker = staker.ok_or_else(|| {
                MinerError::State("proof-of-stake template requires a wallet".to_string())
            })?;
            if staker.is_locked() {
                return Err(MinerError::State("staking wallet is locked".to_string()));
            }

            if self.last_stake_search_time == 0 {
                self.last_stake_search_time = i64::from(header.time);
            }
            let search_time = i64::from(header.time);
            let mut stake_found = false;

            if search_time > self.last_stake_search_time.max(i64::from(prev.time)) {
                self.last_stake_search_interval = search_time - self.last_stake_search_time;
                self.last_stake_search_time = search_time;

                if let Some(coin_stake) = staker.create_coin_stake(
                    &prev,
                    &header,
                    self.last_stake_search_interval,
                    &mut coinbase,
                ) {
                    header.stake_hash = coin_stake.stake.txid;
                    header.stake_index = coin_stake.stake.index;
                    sig_ops[Block::STAKE_INDEX] =
                        i64::from(coin_stake.tx.legacy_sigop_count());
                    fees[Block::STAKE_INDEX] = 0;
                    block.transactions[Block::STAKE_INDEX] = coin_stake.tx;
                    stake_found = true;
                }
            }

            if stake_found {
                sign_block = true;
            } else {
                block.transactions.remove(Block::STAKE_INDEX);
                fees.remove(Block::STAKE_INDEX);
                sig_ops.remove(Block::STAKE_INDEX);
            }
        }

        // Complete the block.
        sig_ops[Block::COINBASE_INDEX] = i64::from(coinbase.legacy_sigop_count());
        fees[Block::COINBASE_INDEX] = -self.fees;
        block.transactions[Block::COINBASE_INDEX] = coinbase;
        header.merkle_root = block.compute_merkle_root();
        block.header = header;

        if sign_block {
            let staker = staker.expect("stake requires a wallet");
            if !staker.sign_block(&mut block.header) {
                // Non-fatal: the driver discards unsigned templates.
                error!("failed to sign block");
            }
        }

        if let Err(reason) = self.deps.validity.test_block_validity(&block, false, false) {
            // Non-fatal: the same predicate runs again at acceptance.
            error!(reason, "template failed validity self-check");
        }

        debug!(
            packages = packages_selected,
            descendants_updated,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "template build finished"
        );

        Ok(BlockTemplate {
            block,
            fees,
            sig_ops,
            masternode_payments,
            superblock_payments,
            previous_bits: prev.bits,
            size: self.block_size,
            tx_count: self.block_tx,
        })
    }

    /// True when a package of this size and sigop weight still fits.
    fn test_package(&self, package_size: u64, package_sig_ops: u64) -> bool {
        if self.block_size + package_size >= self.max_block_size {
            return false;
        }
        if self.block_sig_ops + package_sig_ops >= self.max_block_sigops {
            return false;
        }
        true
    }

    /// Per-transaction gates: lock-time finality and chain-lock safety.
    fn test_package_transactions(
        &self,
        view: &MempoolView<'_>,
        package: &BTreeSet<EntryId>,
    ) -> bool {
        package.iter().all(|id| {
            let entry = view.entry(*id);
            is_final_tx(&entry.tx, self.height, self.lock_time_cutoff)
                && self.deps.chain_locks.is_tx_safe_for_mining(&entry.txid)
        })
    }

    fn add_to_block(
        &mut self,
        view: &MempoolView<'_>,
        id: EntryId,
        block: &mut Block,
        fees: &mut Vec<Amount>,
        sig_ops: &mut Vec<i64>,
    ) {
        let entry = view.entry(id);
        block.transactions.push((*entry.tx).clone());
        fees.push(entry.fee);
        sig_ops.push(i64::from(entry.sig_ops));
        self.block_size += entry.size;
        self.block_tx += 1;
        self.block_sig_ops += u64::from(entry.sig_ops);
        self.fees += entry.fee;
        self.in_block.insert(id);
        debug!(
            txid = %entry.txid,
            fee_rate = %FeeRate::new(entry.modified_fee(), entry.size),
            "transaction added to block"
        );
    }

    /// The package selection loop.
    ///
    /// Returns `(packages_selected, descendants_updated)`.
    fn add_package_txs(
        &mut self,
        view: &MempoolView<'_>,
        block: &mut Block,
        fees: &mut Vec<Amount>,
        sig_ops: &mut Vec<i64>,
    ) -> (u64, u64) {
        let mut modified = ModifiedIndex::new();
        // Entries that already failed a gate; their cached aggregates would
        // be wrong to re-evaluate.
        let mut failed: HashSet<EntryId> = HashSet::new();
        let mut packages_selected = 0u64;
        let mut descendants_updated = 0u64;

        // Descendants of pre-seeded entries (quorum commitments) start out
        // with their included ancestors subtracted.
        let pre_seeded: BTreeSet<EntryId> = self.in_block.iter().copied().collect();
        descendants_updated += update_packages_for_added(view, &pre_seeded, &mut modified);

        let mut cursor = view.ancestor_score_ids().peekable();
        let mut consecutive_failures = 0u64;

        loop {
            // Skip pool entries that are committed, shadowed by a modified
            // row (their stored aggregates are stale), or already failed.
            while let Some(&id) = cursor.peek() {
                if self.in_block.contains(&id) || modified.contains(id) || failed.contains(&id) {
                    cursor.next();
                } else {
                    break;
                }
            }

            let pool_next = cursor.peek().copied();
            let modified_best = modified.best();
            if pool_next.is_none() && modified_best.is_none() {
                break;
            }

            // Pick the higher-scoring anchor; an exact tie keeps the
            // modified row for stability.
            let (anchor, using_modified, package_size, package_fees, package_sig_ops) =
                match (pool_next, modified_best) {
                    (None, Some(m)) => (
                        m.id,
                        true,
                        m.size_with_ancestors,
                        m.fees_with_ancestors,
                        u64::from(m.sig_ops_with_ancestors),
                    ),
                    (Some(id), None) => {
                        cursor.next();
                        let e = view.entry(id);
                        (
                            id,
                            false,
                            e.size_with_ancestors,
                            e.fees_with_ancestors,
                            u64::from(e.sig_ops_with_ancestors),
                        )
                    }
                    (Some(id), Some(m)) => {
                        let e = view.entry(id);
                        let modified_rate =
                            FeeRate::new(m.fees_with_ancestors, m.size_with_ancestors);
                        let pool_rate =
                            FeeRate::new(e.fees_with_ancestors, e.size_with_ancestors);
                        if modified_rate.cmp(&pool_rate) != CmpOrdering::Less {
                            (
                                m.id,
                                true,
                                m.size_with_ancestors,
                                m.fees_with_ancestors,
                                u64::from(m.sig_ops_with_ancestors),
                            )
                        } else {
                            cursor.next();
                            (
                                id,
                                false,
                                e.size_with_ancestors,
                                e.fees_with_ancestors,
                                u64::from(e.sig_ops_with_ancestors),
                            )
                        }
                    }
                    (None, None) => unreachable!(),
                };
            debug_assert!(!self.in_block.contains(&anchor));

            // Both sources descend, so nothing after a floor miss can pass.
            if package_fees < self.block_min_fee_rate.fee_for(package_size) {
                break;
            }

            if !self.test_package(package_size, package_sig_ops) {
                if using_modified {
                    // The best modified row must go, or the next round would
                    // pick it again.
                    modified.remove(anchor);
                    failed.insert(anchor);
                }
                consecutive_failures += 1;
                if consecutive_failures > MAX_CONSECUTIVE_FAILURES
                    && self.block_size > self.max_block_size.saturating_sub(1_000)
                {
                    // Near-full block: stop burning attempts.
                    break;
                }
                continue;
            }

            // Materialise the package: unconfirmed ancestors plus the anchor.
            let mut package = view.ancestors_of(anchor);
            package.retain(|id| !self.in_block.contains(id));
            package.insert(anchor);

            if !self.test_package_transactions(view, &package) {
                if using_modified {
                    modified.remove(anchor);
                    failed.insert(anchor);
                }
                continue;
            }

            // This package makes it in.
            consecutive_failures = 0;

            // Parents before children: ancestor count ascending, txid as
            // the deterministic tie-break among equal counts.
            let mut sorted: Vec<EntryId> = package.iter().copied().collect();
            sorted.sort_by(|a, b| {
                let ea = view.entry(*a);
                let eb = view.entry(*b);
                ea.count_with_ancestors
                    .cmp(&eb.count_with_ancestors)
                    .then_with(|| ea.txid.cmp(&eb.txid))
            });
            for id in &sorted {
                self.add_to_block(view, *id, block, fees, sig_ops);
                modified.remove(*id);
            }

            packages_selected += 1;
            descendants_updated += update_packages_for_added(view, &package, &mut modified);
        }

        (packages_selected, descendants_updated)
    }
}

/// Push the modified rows of every not-yet-committed descendant of `added`.
fn update_packages_for_added(
    view: &MempoolView<'_>,
    added: &BTreeSet<EntryId>,
    modified: &mut ModifiedIndex,
) -> u64 {
    let mut updated = 0u64;
    for &included in added {
        let (size, modified_fee, sig_ops) = {
            let entry = view.entry(included);
            (entry.size, entry.modified_fee(), entry.sig_ops)
        };
        for descendant in view.descendants_of(included) {
            if added.contains(&descendant) {
                continue;
            }
            updated += 1;
            modified.subtract_ancestor(view, descendant, size, modified_fee, sig_ops);
        }
    }
    updated
}

/// Raise the header time to `max(median-time-past + 1, wall clock)`.
///
/// Never lowers the time. Recomputes the required work afterwards on
/// networks that allow minimum-difficulty blocks, because the fallback
/// depends on the block time.
pub fn update_time(
    header: &mut BlockHeader,
    chain: &Chain,
    prev: &BlockIndex,
    params: &ConsensusParams,
) -> i64 {
    let old_time = i64::from(header.time);
    let new_time = (chain.median_time_past(prev.height) + 1).max(adjusted_time());
    if old_time < new_time {
        header.time = new_time as u32;
    }
    if params.allow_min_difficulty_blocks {
        header.bits = get_next_work_required(chain, prev, i64::from(header.time), params);
    }
    new_time - old_time
}
