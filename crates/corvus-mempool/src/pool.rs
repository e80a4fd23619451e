//! Transaction pool implementation.
//!
//! The pool keeps every entry in a dense arena addressed by [`EntryId`] and
//! maintains two indices over the same set: the identity index (txid to
//! handle) and the ancestor-score index ordered by the fee rate of each
//! entry's ancestor package. The dependency graph is held as parent/child
//! adjacency lists; transitive closures are recomputed on demand.
//!
//! All state lives behind one reader-writer lock. [`Mempool::snapshot`]
//! hands out a read-guard-backed view, so a template build observes a
//! consistent pool for its whole duration while admissions wait.

use crate::entry::{AncestorScoreKey, EntryId, TxEntry};
use crate::{MempoolError, MempoolResult};
use corvus_types::{Amount, Hash256, OutPoint, Transaction};
use parking_lot::{RwLock, RwLockReadGuard};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Default)]
struct PoolInner {
    entries: Vec<Option<TxEntry>>,
    free: Vec<EntryId>,
    by_txid: HashMap<Hash256, EntryId>,
    by_spent_outpoint: HashMap<OutPoint, EntryId>,
    by_ancestor_score: BTreeSet<AncestorScoreKey>,
    total_size: u64,
    /// Prioritisation deltas, kept across removal and re-admission.
    deltas: HashMap<Hash256, Amount>,
}

impl PoolInner {
    fn entry(&self, id: EntryId) -> &TxEntry {
        self.entries[id.0 as usize]
            .as_ref()
            .expect("entry handle is live")
    }

    fn entry_mut(&mut self, id: EntryId) -> &mut TxEntry {
        self.entries[id.0 as usize]
            .as_mut()
            .expect("entry handle is live")
    }

    fn allocate(&mut self, entry: TxEntry) -> EntryId {
        match self.free.pop() {
            Some(id) => {
                self.entries[id.0 as usize] = Some(entry);
                id
            }
            None => {
                let id = EntryId(self.entries.len() as u32);
                self.entries.push(Some(entry));
                id
            }
        }
    }

    /// Transitive in-pool ancestors of `id`, excluding `id` itself.
    fn ancestors_of(&self, id: EntryId) -> BTreeSet<EntryId> {
        let mut out = BTreeSet::new();
        let mut stack: Vec<EntryId> = self.entry(id).parents.clone();
        while let Some(parent) = stack.pop() {
            if out.insert(parent) {
                stack.extend(self.entry(parent).parents.iter().copied());
            }
        }
        out
    }

    /// Transitive in-pool descendants of `id`, including `id` itself.
    fn descendants_of(&self, id: EntryId) -> BTreeSet<EntryId> {
        let mut out = BTreeSet::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if out.insert(current) {
                stack.extend(self.entry(current).children.iter().copied());
            }
        }
        out
    }

    /// Remove and re-insert the score key of `id` around a mutation.
    fn with_reindex(&mut self, id: EntryId, mutate: impl FnOnce(&mut TxEntry)) {
        let old_key = self.entry(id).ancestor_score_key(id);
        self.by_ancestor_score.remove(&old_key);
        mutate(self.entry_mut(id));
        let new_key = self.entry(id).ancestor_score_key(id);
        self.by_ancestor_score.insert(new_key);
    }
}

/// The transaction mempool.
pub struct Mempool {
    inner: RwLock<PoolInner>,
    /// Bumped on every admission and removal; consumed by long polling.
    transactions_updated: AtomicU64,
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new()
    }
}

impl Mempool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Mempool {
            inner: RwLock::new(PoolInner::default()),
            transactions_updated: AtomicU64::new(0),
        }
    }

    /// Admit a transaction paying `fee`.
    ///
    /// Policy checks (fee floors, size ceilings, eviction) are the caller's
    /// concern; the pool only enforces structural soundness.
    pub fn insert(&self, tx: Transaction, fee: Amount) -> MempoolResult<EntryId> {
        if tx.is_coinbase() {
            return Err(MempoolError::Coinbase);
        }
        let txid = tx.txid();
        let size = tx.total_size();
        let sig_ops = tx.legacy_sigop_count();

        let mut inner = self.inner.write();
        if inner.by_txid.contains_key(&txid) {
            return Err(MempoolError::AlreadyExists(txid));
        }
        for input in &tx.inputs {
            if inner.by_spent_outpoint.contains_key(&input.prevout) {
                return Err(MempoolError::DoubleSpend {
                    txid: input.prevout.txid,
                    index: input.prevout.index,
                });
            }
        }

        let mut parents: Vec<EntryId> = tx
            .inputs
            .iter()
            .filter_map(|i| inner.by_txid.get(&i.prevout.txid).copied())
            .collect();
        parents.sort_unstable();
        parents.dedup();

        // Ancestor closure of the new entry: the parents and all of theirs.
        let mut ancestors = BTreeSet::new();
        for parent in &parents {
            ancestors.insert(*parent);
            ancestors.extend(inner.ancestors_of(*parent));
        }

        let fee_delta = inner.deltas.get(&txid).copied().unwrap_or(0);
        let mut entry = TxEntry {
            tx: Arc::new(tx),
            txid,
            size,
            sig_ops,
            fee,
            fee_delta,
            parents: parents.clone(),
            children: Vec::new(),
            count_with_ancestors: 1,
            size_with_ancestors: size,
            fees_with_ancestors: fee + fee_delta,
            sig_ops_with_ancestors: sig_ops,
            descendant_count: 1,
        };
        for ancestor in &ancestors {
            let a = inner.entry(*ancestor);
            entry.count_with_ancestors += 1;
            entry.size_with_ancestors += a.size;
            entry.fees_with_ancestors += a.modified_fee();
            entry.sig_ops_with_ancestors += a.sig_ops;
        }

        let spent: Vec<OutPoint> = entry.tx.inputs.iter().map(|i| i.prevout).collect();
        let id = inner.allocate(entry);
        for ancestor in &ancestors {
            inner.entry_mut(*ancestor).descendant_count += 1;
        }
        for parent in &parents {
            inner.entry_mut(*parent).children.push(id);
        }
        for outpoint in spent {
            inner.by_spent_outpoint.insert(outpoint, id);
        }
        inner.by_txid.insert(txid, id);
        let key = inner.entry(id).ancestor_score_key(id);
        inner.by_ancestor_score.insert(key);
        inner.total_size += size;

        self.transactions_updated.fetch_add(1, Ordering::SeqCst);
        debug!(%txid, size, fee, pool = inner.by_txid.len(), "transaction admitted");
        Ok(id)
    }

    /// Remove a transaction, fixing up every dependent aggregate.
    pub fn remove(&self, txid: &Hash256) -> MempoolResult<()> {
        let mut inner = self.inner.write();
        let id = *inner
            .by_txid
            .get(txid)
            .ok_or(MempoolError::NotFound(*txid))?;

        let ancestors = inner.ancestors_of(id);
        let mut descendants = inner.descendants_of(id);
        descendants.remove(&id);
        let (size, modified_fee, sig_ops) = {
            let e = inner.entry(id);
            (e.size, e.modified_fee(), e.sig_ops)
        };

        for descendant in &descendants {
            inner.with_reindex(*descendant, |d| {
                d.count_with_ancestors -= 1;
                d.size_with_ancestors -= size;
                d.fees_with_ancestors -= modified_fee;
                d.sig_ops_with_ancestors -= sig_ops;
            });
        }
        for ancestor in &ancestors {
            inner.entry_mut(*ancestor).descendant_count -= 1;
        }

        let entry = inner.entries[id.0 as usize]
            .take()
            .expect("entry handle is live");
        let key = entry.ancestor_score_key(id);
        inner.by_ancestor_score.remove(&key);
        inner.by_txid.remove(txid);
        for input in &entry.tx.inputs {
            inner.by_spent_outpoint.remove(&input.prevout);
        }
        for parent in &entry.parents {
            inner.entry_mut(*parent).children.retain(|c| *c != id);
        }
        for child in &entry.children {
            inner.entry_mut(*child).parents.retain(|p| *p != id);
        }
        inner.total_size -= entry.size;
        inner.free.push(id);

        self.transactions_updated.fetch_add(1, Ordering::SeqCst);
        debug!(%txid, pool = inner.by_txid.len(), "transaction removed");
        Ok(())
    }

    /// Remove every transaction confirmed by a connected block.
    pub fn remove_for_block(&self, txids: &[Hash256]) {
        for txid in txids {
            let _ = self.remove(txid);
        }
    }

    /// Apply an advisory fee delta to `txid`.
    ///
    /// The delta is remembered even when the transaction is not currently
    /// pooled and applied on admission. For a pooled transaction the
    /// modified-fee aggregates of the entry and all its descendants are
    /// adjusted in place.
    pub fn prioritise(&self, txid: &Hash256, delta: Amount) {
        let mut inner = self.inner.write();
        *inner.deltas.entry(*txid).or_insert(0) += delta;
        if let Some(id) = inner.by_txid.get(txid).copied() {
            inner.with_reindex(id, |e| {
                e.fee_delta += delta;
                e.fees_with_ancestors += delta;
            });
            let mut descendants = inner.descendants_of(id);
            descendants.remove(&id);
            for descendant in descendants {
                inner.with_reindex(descendant, |d| d.fees_with_ancestors += delta);
            }
        }
        info!(%txid, delta, "transaction prioritised");
    }

    /// Monotone counter of pool mutations.
    pub fn transactions_updated(&self) -> u64 {
        self.transactions_updated.load(Ordering::SeqCst)
    }

    /// Number of pooled transactions.
    pub fn len(&self) -> usize {
        self.inner.read().by_txid.len()
    }

    /// True when the pool holds no transactions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take a consistent read-only snapshot.
    ///
    /// Writers block until the snapshot is dropped; the assembler holds it
    /// for the whole of one template build.
    pub fn snapshot(&self) -> MempoolView<'_> {
        MempoolView {
            inner: self.inner.read(),
        }
    }
}

/// Read-only snapshot of the pool.
pub struct MempoolView<'a> {
    inner: RwLockReadGuard<'a, PoolInner>,
}

impl MempoolView<'_> {
    /// Number of entries in the snapshot.
    pub fn len(&self) -> usize {
        self.inner.by_txid.len()
    }

    /// True when the snapshot holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.by_txid.is_empty()
    }

    /// Total serialized size of all entries.
    pub fn total_size(&self) -> u64 {
        self.inner.total_size
    }

    /// Handle of a pooled transaction.
    pub fn get_id(&self, txid: &Hash256) -> Option<EntryId> {
        self.inner.by_txid.get(txid).copied()
    }

    /// True when `txid` is pooled.
    pub fn contains(&self, txid: &Hash256) -> bool {
        self.inner.by_txid.contains_key(txid)
    }

    /// The entry behind a live handle.
    pub fn entry(&self, id: EntryId) -> &TxEntry {
        self.inner.entry(id)
    }

    /// Handles in ancestor-score order, best package first.
    pub fn ancestor_score_ids(&self) -> impl Iterator<Item = EntryId> + '_ {
        self.inner.by_ancestor_score.iter().map(|k| k.id)
    }

    /// Transitive in-pool ancestors of `id`, excluding `id` itself.
    pub fn ancestors_of(&self, id: EntryId) -> BTreeSet<EntryId> {
        self.inner.ancestors_of(id)
    }

    /// Transitive in-pool descendants of `id`, including `id` itself.
    pub fn descendants_of(&self, id: EntryId) -> BTreeSet<EntryId> {
        self.inner.descendants_of(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvus_types::{blake2b256, OutPoint, Script, TxIn, TxOut};

    /// A standalone transaction spending a unique confirmed outpoint.
    fn standalone_tx(seed: u8) -> Transaction {
        Transaction {
            inputs: vec![TxIn::new(
                OutPoint {
                    txid: blake2b256(&[seed, 0xaa]),
                    index: 0,
                },
                Script::new(),
            )],
            outputs: vec![TxOut {
                value: 1_000,
                script_pubkey: Script::new().push_slice(&[seed; 4]),
            }],
            ..Transaction::default()
        }
    }

    /// A transaction spending output 0 of `parent`.
    fn child_of(parent: &Transaction, seed: u8) -> Transaction {
        Transaction {
            inputs: vec![TxIn::new(
                OutPoint {
                    txid: parent.txid(),
                    index: 0,
                },
                Script::new(),
            )],
            outputs: vec![TxOut {
                value: 500,
                script_pubkey: Script::new().push_slice(&[seed; 4]),
            }],
            ..Transaction::default()
        }
    }

    #[test]
    fn test_insert_and_lookup() {
        let pool = Mempool::new();
        let tx = standalone_tx(1);
        let txid = tx.txid();
        pool.insert(tx, 1_000).unwrap();

        let view = pool.snapshot();
        assert_eq!(view.len(), 1);
        let id = view.get_id(&txid).unwrap();
        assert_eq!(view.entry(id).fee, 1_000);
        assert_eq!(view.entry(id).count_with_ancestors, 1);
    }

    #[test]
    fn test_insert_rejects_duplicate() {
        let pool = Mempool::new();
        let tx = standalone_tx(1);
        pool.insert(tx.clone(), 1_000).unwrap();
        assert!(matches!(
            pool.insert(tx, 1_000),
            Err(MempoolError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_insert_rejects_double_spend() {
        let pool = Mempool::new();
        let a = standalone_tx(1);
        let mut b = standalone_tx(2);
        b.inputs[0].prevout = a.inputs[0].prevout;
        pool.insert(a, 1_000).unwrap();
        assert!(matches!(
            pool.insert(b, 2_000),
            Err(MempoolError::DoubleSpend { .. })
        ));
    }

    #[test]
    fn test_insert_rejects_coinbase() {
        let pool = Mempool::new();
        let coinbase = Transaction {
            inputs: vec![TxIn::new(OutPoint::null(), Script::new().push_num(1))],
            ..Transaction::default()
        };
        assert!(matches!(
            pool.insert(coinbase, 0),
            Err(MempoolError::Coinbase)
        ));
    }

    #[test]
    fn test_child_aggregates_include_ancestors() {
        let pool = Mempool::new();
        let parent = standalone_tx(1);
        let child = child_of(&parent, 2);
        let parent_size = parent.total_size();
        let child_size = child.total_size();
        let child_txid = child.txid();

        pool.insert(parent, 700).unwrap();
        pool.insert(child, 300).unwrap();

        let view = pool.snapshot();
        let id = view.get_id(&child_txid).unwrap();
        let entry = view.entry(id);
        assert_eq!(entry.count_with_ancestors, 2);
        assert_eq!(entry.size_with_ancestors, parent_size + child_size);
        assert_eq!(entry.fees_with_ancestors, 1_000);
    }

    #[test]
    fn test_insert_child_updates_ancestor_descendant_count() {
        let pool = Mempool::new();
        let parent = standalone_tx(1);
        let parent_txid = parent.txid();
        let child = child_of(&parent, 2);
        let grandchild = child_of(&child, 3);

        pool.insert(parent, 100).unwrap();
        pool.insert(child, 100).unwrap();
        pool.insert(grandchild, 100).unwrap();

        let view = pool.snapshot();
        let id = view.get_id(&parent_txid).unwrap();
        assert_eq!(view.entry(id).descendant_count, 3);
    }

    #[test]
    fn test_ancestor_closures() {
        let pool = Mempool::new();
        let parent = standalone_tx(1);
        let child = child_of(&parent, 2);
        let grandchild = child_of(&child, 3);
        let parent_txid = parent.txid();
        let grandchild_txid = grandchild.txid();

        pool.insert(parent, 100).unwrap();
        pool.insert(child, 100).unwrap();
        pool.insert(grandchild, 100).unwrap();

        let view = pool.snapshot();
        let top = view.get_id(&parent_txid).unwrap();
        let bottom = view.get_id(&grandchild_txid).unwrap();

        assert_eq!(view.ancestors_of(bottom).len(), 2);
        assert!(!view.ancestors_of(bottom).contains(&bottom));
        // Descendant closure includes the entry itself.
        assert_eq!(view.descendants_of(top).len(), 3);
        assert!(view.descendants_of(top).contains(&top));
    }

    #[test]
    fn test_score_order_prefers_higher_ancestor_feerate() {
        let pool = Mempool::new();
        let cheap = standalone_tx(1);
        let rich = standalone_tx(2);
        let cheap_txid = cheap.txid();
        let rich_txid = rich.txid();
        pool.insert(cheap, 100).unwrap();
        pool.insert(rich, 10_000).unwrap();

        let view = pool.snapshot();
        let order: Vec<EntryId> = view.ancestor_score_ids().collect();
        assert_eq!(order[0], view.get_id(&rich_txid).unwrap());
        assert_eq!(order[1], view.get_id(&cheap_txid).unwrap());
    }

    #[test]
    fn test_remove_fixes_descendant_aggregates() {
        let pool = Mempool::new();
        let parent = standalone_tx(1);
        let child = child_of(&parent, 2);
        let parent_txid = parent.txid();
        let child_txid = child.txid();
        let child_size = child.total_size();

        pool.insert(parent, 700).unwrap();
        pool.insert(child, 300).unwrap();
        pool.remove(&parent_txid).unwrap();

        let view = pool.snapshot();
        assert!(!view.contains(&parent_txid));
        let id = view.get_id(&child_txid).unwrap();
        let entry = view.entry(id);
        assert_eq!(entry.count_with_ancestors, 1);
        assert_eq!(entry.size_with_ancestors, child_size);
        assert_eq!(entry.fees_with_ancestors, 300);
        assert!(entry.parents.is_empty());
    }

    #[test]
    fn test_remove_missing() {
        let pool = Mempool::new();
        assert!(matches!(
            pool.remove(&blake2b256(b"nope")),
            Err(MempoolError::NotFound(_))
        ));
    }

    #[test]
    fn test_prioritise_propagates_to_descendants() {
        let pool = Mempool::new();
        let parent = standalone_tx(1);
        let child = child_of(&parent, 2);
        let parent_txid = parent.txid();
        let child_txid = child.txid();

        pool.insert(parent, 100).unwrap();
        pool.insert(child, 100).unwrap();
        pool.prioritise(&parent_txid, 5_000);

        let view = pool.snapshot();
        let parent_entry = view.entry(view.get_id(&parent_txid).unwrap());
        let child_entry = view.entry(view.get_id(&child_txid).unwrap());
        assert_eq!(parent_entry.modified_fee(), 5_100);
        assert_eq!(parent_entry.fees_with_ancestors, 5_100);
        assert_eq!(child_entry.fees_with_ancestors, 5_200);
        // The raw fee is untouched.
        assert_eq!(parent_entry.fee, 100);
    }

    #[test]
    fn test_prioritise_before_admission() {
        let pool = Mempool::new();
        let tx = standalone_tx(1);
        let txid = tx.txid();
        pool.prioritise(&txid, 42);
        pool.insert(tx, 100).unwrap();

        let view = pool.snapshot();
        let entry = view.entry(view.get_id(&txid).unwrap());
        assert_eq!(entry.modified_fee(), 142);
    }

    #[test]
    fn test_prioritise_reorders_score_index() {
        let pool = Mempool::new();
        let low = standalone_tx(1);
        let high = standalone_tx(2);
        let low_txid = low.txid();
        let high_txid = high.txid();
        pool.insert(low, 100).unwrap();
        pool.insert(high, 1_000).unwrap();

        pool.prioritise(&low_txid, 100_000);
        let view = pool.snapshot();
        let first = view.ancestor_score_ids().next().unwrap();
        assert_eq!(first, view.get_id(&low_txid).unwrap());
        drop(view);

        // A negative delta can push it back down.
        pool.prioritise(&low_txid, -100_000);
        let view = pool.snapshot();
        let first = view.ancestor_score_ids().next().unwrap();
        assert_eq!(first, view.get_id(&high_txid).unwrap());
    }

    #[test]
    fn test_transactions_updated_counter() {
        let pool = Mempool::new();
        assert_eq!(pool.transactions_updated(), 0);
        let tx = standalone_tx(1);
        let txid = tx.txid();
        pool.insert(tx, 100).unwrap();
        assert_eq!(pool.transactions_updated(), 1);
        pool.remove(&txid).unwrap();
        assert_eq!(pool.transactions_updated(), 2);
    }

    #[test]
    fn test_handle_reuse_after_removal() {
        let pool = Mempool::new();
        let a = standalone_tx(1);
        let a_txid = a.txid();
        pool.insert(a, 100).unwrap();
        pool.remove(&a_txid).unwrap();

        let b = standalone_tx(2);
        let b_txid = b.txid();
        pool.insert(b, 200).unwrap();
        let view = pool.snapshot();
        assert_eq!(view.len(), 1);
        assert_eq!(view.entry(view.get_id(&b_txid).unwrap()).fee, 200);
    }
}
