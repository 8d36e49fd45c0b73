//! Attached/orphan labelling of duplicate group members.
//!
//! Reference state changes underneath the engine (content gets edited), so
//! every question goes straight to the [`ReferenceOracle`]. Nothing is cached.

use std::sync::Arc;

use serde::Serialize;

use crate::scanner::ItemId;
use crate::store::{ReferenceOracle, StoreResult};

/// Reference state of one group member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemberStatus {
    pub id: ItemId,
    pub referenced: bool,
}

impl MemberStatus {
    #[must_use]
    pub fn is_orphan(&self) -> bool {
        !self.referenced
    }

    /// Display label, `attached` or `orphan`.
    #[must_use]
    pub fn label(&self) -> &'static str {
        if self.referenced {
            "attached"
        } else {
            "orphan"
        }
    }
}

/// Asks the oracle about each member of a group.
#[derive(Clone)]
pub struct ReferenceChecker {
    oracle: Arc<dyn ReferenceOracle>,
}

impl std::fmt::Debug for ReferenceChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceChecker").finish_non_exhaustive()
    }
}

impl ReferenceChecker {
    #[must_use]
    pub fn new(oracle: Arc<dyn ReferenceOracle>) -> Self {
        Self { oracle }
    }

    pub fn is_referenced(&self, id: ItemId) -> StoreResult<bool> {
        self.oracle.is_referenced(id)
    }

    /// Label each id, preserving input order.
    pub fn label_group<I>(&self, ids: I) -> StoreResult<Vec<MemberStatus>>
    where
        I: IntoIterator<Item = ItemId>,
    {
        ids.into_iter()
            .map(|id| {
                Ok(MemberStatus {
                    id,
                    referenced: self.oracle.is_referenced(id)?,
                })
            })
            .collect()
    }

    /// Ids not referenced by any content.
    pub fn orphans<I>(&self, ids: I) -> StoreResult<Vec<ItemId>>
    where
        I: IntoIterator<Item = ItemId>,
    {
        Ok(self
            .label_group(ids)?
            .into_iter()
            .filter(MemberStatus::is_orphan)
            .map(|m| m.id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_label_group() {
        let store = Arc::new(MemoryStore::new());
        store.set_referenced(2, true);
        let checker = ReferenceChecker::new(store);

        let labels = checker.label_group([1, 2, 5]).unwrap();
        assert_eq!(
            labels.iter().map(MemberStatus::label).collect::<Vec<_>>(),
            vec!["orphan", "attached", "orphan"]
        );
        assert_eq!(checker.orphans([1, 2, 5]).unwrap(), vec![1, 5]);
    }

    #[test]
    fn test_never_cached() {
        let store = Arc::new(MemoryStore::new());
        let checker = ReferenceChecker::new(store.clone());
        assert!(!checker.is_referenced(3).unwrap());
        store.set_referenced(3, true);
        assert!(checker.is_referenced(3).unwrap());
    }
}
