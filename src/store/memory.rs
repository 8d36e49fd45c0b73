//! In-process implementation of every collaborator interface.
//!
//! Useful for tests and for embedding the scan engine in a host that keeps
//! its own catalog. Ephemeral entries expire against a monotonic clock.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::scanner::{Item, ItemId};
use crate::store::{
    EphemeralStore, ItemCatalog, ItemRemover, MetaStore, OptionStore, ReferenceOracle,
    StoreError, StoreResult,
};

#[derive(Debug, Default)]
struct Inner {
    items: BTreeMap<ItemId, PathBuf>,
    meta: HashMap<(ItemId, String), String>,
    ephemeral: HashMap<String, (String, Instant)>,
    options: HashMap<String, String>,
    referenced: BTreeSet<ItemId>,
    deleted: Vec<ItemId>,
}

/// Thread-safe in-memory media library.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Register an item. Replaces the path if the id already exists.
    pub fn add_item(&self, id: ItemId, path: impl Into<PathBuf>) {
        if let Ok(mut inner) = self.lock() {
            inner.items.insert(id, path.into());
        }
    }

    /// Mark an item as referenced (or not) by other content.
    pub fn set_referenced(&self, id: ItemId, referenced: bool) {
        if let Ok(mut inner) = self.lock() {
            if referenced {
                inner.referenced.insert(id);
            } else {
                inner.referenced.remove(&id);
            }
        }
    }

    /// Ids removed through [`ItemRemover::delete_item`], in deletion order.
    #[must_use]
    pub fn deleted(&self) -> Vec<ItemId> {
        self.lock().map(|inner| inner.deleted.clone()).unwrap_or_default()
    }
}

impl ItemCatalog for MemoryStore {
    fn list_items(&self, offset: usize, limit: usize) -> StoreResult<Vec<Item>> {
        let inner = self.lock()?;
        Ok(inner
            .items
            .iter()
            .skip(offset)
            .take(limit)
            .map(|(id, path)| Item::new(*id, path.clone()))
            .collect())
    }

    fn count_items(&self) -> StoreResult<usize> {
        Ok(self.lock()?.items.len())
    }

    fn item_path(&self, id: ItemId) -> StoreResult<Option<PathBuf>> {
        Ok(self.lock()?.items.get(&id).cloned())
    }
}

impl MetaStore for MemoryStore {
    fn get_item_meta(&self, id: ItemId, key: &str) -> StoreResult<Option<String>> {
        Ok(self.lock()?.meta.get(&(id, key.to_string())).cloned())
    }

    fn set_item_meta(&self, id: ItemId, key: &str, value: &str) -> StoreResult<()> {
        self.lock()?
            .meta
            .insert((id, key.to_string()), value.to_string());
        Ok(())
    }
}

impl EphemeralStore for MemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut inner = self.lock()?;
        match inner.ephemeral.get(key) {
            Some((value, expires)) if Instant::now() < *expires => Ok(Some(value.clone())),
            Some(_) => {
                inner.ephemeral.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let expires = Instant::now() + ttl;
        self.lock()?
            .ephemeral
            .insert(key.to_string(), (value.to_string(), expires));
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        self.lock()?.ephemeral.remove(key);
        Ok(())
    }
}

impl OptionStore for MemoryStore {
    fn get_option(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.lock()?.options.get(key).cloned())
    }

    fn set_option(&self, key: &str, value: &str) -> StoreResult<()> {
        self.lock()?
            .options
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete_option(&self, key: &str) -> StoreResult<()> {
        self.lock()?.options.remove(key);
        Ok(())
    }
}

impl ReferenceOracle for MemoryStore {
    fn is_referenced(&self, id: ItemId) -> StoreResult<bool> {
        Ok(self.lock()?.referenced.contains(&id))
    }
}

impl ItemRemover for MemoryStore {
    fn delete_item(&self, id: ItemId) -> StoreResult<bool> {
        let mut inner = self.lock()?;
        if inner.items.remove(&id).is_none() {
            return Ok(false);
        }
        inner.meta.retain(|(item, _), _| *item != id);
        inner.referenced.remove(&id);
        inner.deleted.push(id);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_items_is_id_ordered() {
        let store = MemoryStore::new();
        store.add_item(30, "/c");
        store.add_item(10, "/a");
        store.add_item(20, "/b");

        let ids: Vec<_> = store.list_items(0, 10).unwrap().iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![10, 20, 30]);
        let page: Vec<_> = store.list_items(1, 1).unwrap().iter().map(|i| i.id).collect();
        assert_eq!(page, vec![20]);
        assert_eq!(store.count_items().unwrap(), 3);
    }

    #[test]
    fn test_ephemeral_ttl() {
        let store = MemoryStore::new();
        store.set("live", "1", Duration::from_secs(60)).unwrap();
        store.set("dead", "1", Duration::ZERO).unwrap();

        assert_eq!(store.get("live").unwrap().as_deref(), Some("1"));
        assert!(store.get("dead").unwrap().is_none());

        store.delete("live").unwrap();
        assert!(store.get("live").unwrap().is_none());
    }

    #[test]
    fn test_delete_item() {
        let store = MemoryStore::new();
        store.add_item(1, "/a");
        store.set_item_meta(1, "k", "v").unwrap();

        assert!(store.delete_item(1).unwrap());
        assert!(!store.delete_item(1).unwrap());
        assert!(store.get_item_meta(1, "k").unwrap().is_none());
        assert_eq!(store.deleted(), vec![1]);
    }

    #[test]
    fn test_references() {
        let store = MemoryStore::new();
        store.set_referenced(4, true);
        assert!(store.is_referenced(4).unwrap());
        store.set_referenced(4, false);
        assert!(!store.is_referenced(4).unwrap());
    }
}
