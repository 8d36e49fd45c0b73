//! Fingerprint groupings and their merge rules.
//!
//! # Overview
//!
//! A [`HashGroups`] maps each fingerprint to the ordered set of item ids that
//! share it. Batches produce partial groupings that are folded together:
//!
//! * [`merge`] combines two groupings and drops every fingerprint with fewer
//!   than two ids. It is the operation used on finished groupings.
//! * [`DuplicateAggregator`] folds partial batch groupings *without* pruning,
//!   because a fingerprint seen once in one page may reappear in a later page.
//!   Duplicates are pruned only when read out.
//!
//! Both are set unions, so the result does not depend on the order in which
//! batches are applied, and re-applying a batch is harmless.
//!
//! # Example
//!
//! ```
//! use mediadupe::duplicates::{merge, HashGroups};
//! use mediadupe::scanner::Digest;
//!
//! let h1 = Digest::of_bytes(b"h1");
//! let first = HashGroups::from_pairs([(h1.clone(), 1), (h1.clone(), 2)]);
//! let second = HashGroups::from_pairs([(h1.clone(), 5)]);
//!
//! let merged = merge(&first, &second);
//! assert_eq!(merged.get(&h1).unwrap().len(), 3);
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::scanner::{Digest, ItemId};

/// Fingerprint to item-id grouping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashGroups(BTreeMap<Digest, BTreeSet<ItemId>>);

impl HashGroups {
    /// Create an empty grouping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a grouping from `(fingerprint, id)` pairs.
    #[must_use]
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (Digest, ItemId)>,
    {
        let mut groups = Self::new();
        for (digest, id) in pairs {
            groups.insert(digest, id);
        }
        groups
    }

    /// Add an id under a fingerprint. Returns `false` if it was already present.
    pub fn insert(&mut self, digest: Digest, id: ItemId) -> bool {
        self.0.entry(digest).or_default().insert(id)
    }

    /// Union `other` into `self`.
    pub fn absorb(&mut self, other: &HashGroups) {
        for (digest, ids) in &other.0 {
            self.0
                .entry(digest.clone())
                .or_default()
                .extend(ids.iter().copied());
        }
    }

    /// Drop every fingerprint with fewer than two ids.
    #[must_use]
    pub fn prune_singletons(mut self) -> Self {
        self.0.retain(|_, ids| ids.len() >= 2);
        self
    }

    /// Copy of this grouping restricted to actual duplicates.
    #[must_use]
    pub fn duplicates(&self) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(_, ids)| ids.len() >= 2)
                .map(|(d, ids)| (d.clone(), ids.clone()))
                .collect(),
        )
    }

    /// Ids sharing `digest`.
    #[must_use]
    pub fn get(&self, digest: &Digest) -> Option<&BTreeSet<ItemId>> {
        self.0.get(digest)
    }

    /// Number of fingerprints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total ids across all groups.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.0.values().map(BTreeSet::len).sum()
    }

    /// Whether every group has at least two ids.
    #[must_use]
    pub fn is_pruned(&self) -> bool {
        self.0.values().all(|ids| ids.len() >= 2)
    }

    /// Iterate groups in fingerprint order.
    pub fn iter(&self) -> impl Iterator<Item = (&Digest, &BTreeSet<ItemId>)> {
        self.0.iter()
    }

    /// Summary counts.
    #[must_use]
    pub fn stats(&self) -> GroupingStats {
        GroupingStats {
            duplicate_sets: self.0.values().filter(|ids| ids.len() >= 2).count(),
            duplicate_items: self
                .0
                .values()
                .filter(|ids| ids.len() >= 2)
                .map(BTreeSet::len)
                .sum(),
            redundant_copies: self
                .0
                .values()
                .map(|ids| ids.len().saturating_sub(1))
                .sum(),
        }
    }
}

impl<'a> IntoIterator for &'a HashGroups {
    type Item = (&'a Digest, &'a BTreeSet<ItemId>);
    type IntoIter = std::collections::btree_map::Iter<'a, Digest, BTreeSet<ItemId>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Counts describing a grouping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GroupingStats {
    /// Fingerprints shared by two or more items
    pub duplicate_sets: usize,
    /// Items that belong to a duplicate set
    pub duplicate_items: usize,
    /// Items beyond the first in each set
    pub redundant_copies: usize,
}

/// Merge two groupings: union ids per fingerprint, then prune singletons.
///
/// Pure and order-independent: `merge(a, b) == merge(b, a)` and
/// `merge(merge(a, b), b) == merge(a, b)`.
#[must_use]
pub fn merge(existing: &HashGroups, incoming: &HashGroups) -> HashGroups {
    let mut merged = existing.clone();
    merged.absorb(incoming);
    merged.prune_singletons()
}

/// Accumulates partial batch groupings across one scan generation.
///
/// Keeps every fingerprint seen so far, including singletons, so that items
/// sharing a fingerprint are paired no matter how the collection was paged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DuplicateAggregator {
    seen: HashGroups,
}

impl DuplicateAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a batch's partial grouping into the accumulated state.
    pub fn fold(&mut self, partial: &HashGroups) {
        self.seen.absorb(partial);
    }

    /// Duplicate groups found so far.
    #[must_use]
    pub fn duplicates(&self) -> HashGroups {
        self.seen.duplicates()
    }

    /// Number of distinct fingerprints seen.
    #[must_use]
    pub fn fingerprints_seen(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(name: &str) -> Digest {
        Digest::of_bytes(name.as_bytes())
    }

    fn ids(groups: &HashGroups, digest: &Digest) -> Vec<ItemId> {
        groups
            .get(digest)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_from_pairs_dedupes() {
        let groups = HashGroups::from_pairs([(d("h1"), 1), (d("h1"), 1), (d("h1"), 2)]);
        assert_eq!(ids(&groups, &d("h1")), vec![1, 2]);
    }

    #[test]
    fn test_merge_unions_and_prunes() {
        let a = HashGroups::from_pairs([(d("h1"), 1), (d("h1"), 2), (d("h2"), 3)]);
        let b = HashGroups::from_pairs([(d("h1"), 5), (d("h3"), 4)]);

        let merged = merge(&a, &b);
        assert_eq!(ids(&merged, &d("h1")), vec![1, 2, 5]);
        assert!(merged.get(&d("h2")).is_none());
        assert!(merged.get(&d("h3")).is_none());
        assert!(merged.is_pruned());
    }

    #[test]
    fn test_merge_joins_singletons_across_inputs() {
        let a = HashGroups::from_pairs([(d("h1"), 1)]);
        let b = HashGroups::from_pairs([(d("h1"), 9)]);
        assert_eq!(ids(&merge(&a, &b), &d("h1")), vec![1, 9]);
    }

    #[test]
    fn test_merge_is_idempotent_and_commutative() {
        let a = HashGroups::from_pairs([(d("h1"), 1), (d("h1"), 2)]);
        let b = HashGroups::from_pairs([(d("h1"), 2), (d("h1"), 3), (d("h2"), 4)]);

        let ab = merge(&a, &b);
        assert_eq!(ab, merge(&b, &a));
        assert_eq!(merge(&ab, &b), ab);
    }

    #[test]
    fn test_aggregator_pairs_across_batches() {
        let mut agg = DuplicateAggregator::new();
        agg.fold(&HashGroups::from_pairs([(d("h1"), 1), (d("h2"), 2)]));
        assert!(agg.duplicates().is_empty());

        agg.fold(&HashGroups::from_pairs([(d("h1"), 3)]));
        assert_eq!(ids(&agg.duplicates(), &d("h1")), vec![1, 3]);
        assert_eq!(agg.fingerprints_seen(), 2);
    }

    #[test]
    fn test_aggregator_refold_is_harmless() {
        let batch = HashGroups::from_pairs([(d("h1"), 1), (d("h1"), 2)]);
        let mut agg = DuplicateAggregator::new();
        agg.fold(&batch);
        let once = agg.clone();
        agg.fold(&batch);
        assert_eq!(agg, once);
    }

    #[test]
    fn test_stats() {
        let groups =
            HashGroups::from_pairs([(d("h1"), 1), (d("h1"), 2), (d("h1"), 3), (d("h2"), 4), (d("h2"), 5)]);
        let stats = groups.stats();
        assert_eq!(stats.duplicate_sets, 2);
        assert_eq!(stats.duplicate_items, 5);
        assert_eq!(stats.redundant_copies, 3);
    }

    #[test]
    fn test_serializes_as_map() {
        let groups = HashGroups::from_pairs([(d("h1"), 1), (d("h1"), 2)]);
        let json = serde_json::to_string(&groups).unwrap();
        assert!(json.starts_with('{'));
        let back: HashGroups = serde_json::from_str(&json).unwrap();
        assert_eq!(back, groups);
    }
}
