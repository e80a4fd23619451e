//! The modified-package index.
//!
//! Once an entry is placed in the block, the stored ancestor aggregates of
//! its descendants overstate the remaining package. This index keeps a
//! mutable shadow row per affected descendant with the contributions of
//! already-included ancestors subtracted, ordered by the adjusted ancestor
//! score.

use corvus_mempool::{AncestorScoreKey, EntryId, MempoolView};
use corvus_types::{Amount, Hash256};
use std::collections::{BTreeSet, HashMap};

/// Shadow of a mempool entry with reduced ancestor aggregates.
///
/// The ancestor count is copied for tie-breaking only; the adjustments
/// touch size, fees and sigops.
#[derive(Debug, Clone, Copy)]
pub struct ModifiedEntry {
    pub id: EntryId,
    pub txid: Hash256,
    pub size_with_ancestors: u64,
    pub fees_with_ancestors: Amount,
    pub sig_ops_with_ancestors: u32,
    pub count_with_ancestors: u64,
}

impl ModifiedEntry {
    fn from_view(view: &MempoolView<'_>, id: EntryId) -> Self {
        let entry = view.entry(id);
        ModifiedEntry {
            id,
            txid: entry.txid,
            size_with_ancestors: entry.size_with_ancestors,
            fees_with_ancestors: entry.fees_with_ancestors,
            sig_ops_with_ancestors: entry.sig_ops_with_ancestors,
            count_with_ancestors: entry.count_with_ancestors,
        }
    }

    fn score_key(&self) -> AncestorScoreKey {
        AncestorScoreKey {
            fees_with_ancestors: self.fees_with_ancestors,
            size_with_ancestors: self.size_with_ancestors,
            count_with_ancestors: self.count_with_ancestors,
            txid: self.txid,
            id: self.id,
        }
    }
}

/// Rows keyed by entry handle, ordered by adjusted ancestor score.
#[derive(Default)]
pub struct ModifiedIndex {
    rows: HashMap<EntryId, ModifiedEntry>,
    by_score: BTreeSet<AncestorScoreKey>,
}

impl ModifiedIndex {
    /// Empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when no rows are present.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// True when `id` has a row.
    pub fn contains(&self, id: EntryId) -> bool {
        self.rows.contains_key(&id)
    }

    /// The row with the best adjusted ancestor score.
    pub fn best(&self) -> Option<ModifiedEntry> {
        self.by_score
            .first()
            .and_then(|key| self.rows.get(&key.id))
            .copied()
    }

    /// Row for `id`, if present.
    pub fn get(&self, id: EntryId) -> Option<&ModifiedEntry> {
        self.rows.get(&id)
    }

    /// Subtract an included ancestor's contribution from `id`'s row,
    /// creating the row from the entry's stored aggregates if absent.
    pub fn subtract_ancestor(
        &mut self,
        view: &MempoolView<'_>,
        id: EntryId,
        size: u64,
        modified_fee: Amount,
        sig_ops: u32,
    ) {
        let mut row = match self.rows.remove(&id) {
            Some(row) => {
                self.by_score.remove(&row.score_key());
                row
            }
            None => ModifiedEntry::from_view(view, id),
        };
        row.size_with_ancestors -= size;
        row.fees_with_ancestors -= modified_fee;
        row.sig_ops_with_ancestors -= sig_ops;
        self.by_score.insert(row.score_key());
        self.rows.insert(id, row);
    }

    /// Drop the row for `id`; true when one existed.
    pub fn remove(&mut self, id: EntryId) -> bool {
        match self.rows.remove(&id) {
            Some(row) => {
                self.by_score.remove(&row.score_key());
                true
            }
            None => false,
        }
    }
}
