//! Mempool entries and the ancestor-score ordering.

use crate::feerate::cmp_package;
use corvus_types::{Amount, Hash256, Transaction};
use std::cmp::Ordering;
use std::sync::Arc;

/// Stable handle of an entry in the pool's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(pub u32);

/// One transaction in the pool together with its cached aggregates.
///
/// Ancestor aggregates always include the entry itself; they are maintained
/// by the pool on insert, remove and prioritisation and never mutated by
/// readers.
#[derive(Debug, Clone)]
pub struct TxEntry {
    pub tx: Arc<Transaction>,
    pub txid: Hash256,
    /// Serialized size in bytes.
    pub size: u64,
    /// Legacy signature-operation count.
    pub sig_ops: u32,
    /// Fee actually paid.
    pub fee: Amount,
    /// Advisory prioritisation delta applied on top of `fee`.
    pub fee_delta: Amount,
    /// Direct in-pool parents.
    pub parents: Vec<EntryId>,
    /// Direct in-pool children.
    pub children: Vec<EntryId>,
    /// Number of in-pool ancestors, including this entry.
    pub count_with_ancestors: u64,
    /// Serialized size of this entry and all in-pool ancestors.
    pub size_with_ancestors: u64,
    /// Modified-fee sum of this entry and all in-pool ancestors.
    pub fees_with_ancestors: Amount,
    /// Sigop sum of this entry and all in-pool ancestors.
    pub sig_ops_with_ancestors: u32,
    /// Number of in-pool descendants, including this entry.
    pub descendant_count: u64,
}

impl TxEntry {
    /// Fee plus the prioritisation delta.
    pub fn modified_fee(&self) -> Amount {
        self.fee + self.fee_delta
    }

    /// Sort key for the ancestor-score index.
    pub fn ancestor_score_key(&self, id: EntryId) -> AncestorScoreKey {
        AncestorScoreKey {
            fees_with_ancestors: self.fees_with_ancestors,
            size_with_ancestors: self.size_with_ancestors,
            count_with_ancestors: self.count_with_ancestors,
            txid: self.txid,
            id,
        }
    }
}

/// Ordering key of the ancestor-score index.
///
/// Best package first: descending ancestor fee rate, ties broken by ancestor
/// count descending, then txid ascending so iteration is deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AncestorScoreKey {
    pub fees_with_ancestors: Amount,
    pub size_with_ancestors: u64,
    pub count_with_ancestors: u64,
    pub txid: Hash256,
    pub id: EntryId,
}

impl Ord for AncestorScoreKey {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_package(
            other.fees_with_ancestors,
            other.size_with_ancestors,
            self.fees_with_ancestors,
            self.size_with_ancestors,
        )
        .then_with(|| other.count_with_ancestors.cmp(&self.count_with_ancestors))
        .then_with(|| self.txid.cmp(&other.txid))
        .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for AncestorScoreKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvus_types::blake2b256;
    use std::collections::BTreeSet;

    fn key(fee: Amount, size: u64, count: u64, seed: u8) -> AncestorScoreKey {
        AncestorScoreKey {
            fees_with_ancestors: fee,
            size_with_ancestors: size,
            count_with_ancestors: count,
            txid: blake2b256(&[seed]),
            id: EntryId(u32::from(seed)),
        }
    }

    #[test]
    fn test_highest_feerate_first() {
        let mut set = BTreeSet::new();
        set.insert(key(100, 100, 1, 1)); // 1 per byte
        set.insert(key(500, 100, 1, 2)); // 5 per byte
        set.insert(key(300, 100, 1, 3)); // 3 per byte

        let order: Vec<u32> = set.iter().map(|k| k.id.0).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn test_tie_broken_by_ancestor_count_desc() {
        let mut set = BTreeSet::new();
        set.insert(key(200, 100, 1, 1));
        set.insert(key(200, 100, 3, 2));
        let order: Vec<u32> = set.iter().map(|k| k.id.0).collect();
        assert_eq!(order, vec![2, 1]);
    }

    #[test]
    fn test_full_tie_broken_by_txid() {
        let a = key(200, 100, 1, 1);
        let b = key(200, 100, 1, 2);
        let expected = if a.txid < b.txid { a.id } else { b.id };
        let mut set = BTreeSet::new();
        set.insert(a);
        set.insert(b);
        assert_eq!(set.iter().next().unwrap().id, expected);
    }

    #[test]
    fn test_equal_rates_at_different_scale_tie() {
        // 100/100 and 1000/1000 are the same rate; count decides.
        let small = key(100, 100, 1, 1);
        let large = key(1000, 1000, 2, 2);
        let mut set = BTreeSet::new();
        set.insert(small);
        set.insert(large);
        assert_eq!(set.iter().next().unwrap().id, EntryId(2));
    }
}
