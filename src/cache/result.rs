//! Cached duplicate grouping, independent of scan progress.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::duplicates::HashGroups;
use crate::store::{EphemeralStore, StoreResult};

/// Ephemeral key holding the cached result.
pub const RESULT_KEY: &str = "mediadupe_scan_result";

/// The last finalized or stopped grouping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResult {
    /// Scan generation that produced this result.
    pub generation: String,
    /// Duplicate groups (never contains singletons).
    pub groups: HashGroups,
    /// True only when the generation ran to completion.
    pub complete: bool,
    /// When the result was written.
    pub stored_at: DateTime<Utc>,
}

impl CachedResult {
    #[must_use]
    pub fn new(generation: impl Into<String>, groups: HashGroups, complete: bool) -> Self {
        Self {
            generation: generation.into(),
            groups: groups.prune_singletons(),
            complete,
            stored_at: Utc::now(),
        }
    }
}

/// Reads and writes the cached result with a fixed time-to-live.
#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn EphemeralStore>,
    ttl: Duration,
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("store", &"<ephemeral store>")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl ResultCache {
    #[must_use]
    pub fn new(store: Arc<dyn EphemeralStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Load the cached result. Expired or undecodable entries read as `None`.
    pub fn load(&self) -> StoreResult<Option<CachedResult>> {
        let Some(raw) = self.store.get(RESULT_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(result) => Ok(Some(result)),
            Err(e) => {
                log::warn!("Ignoring corrupt cached result: {}", e);
                Ok(None)
            }
        }
    }

    /// Replace the cached result.
    pub fn save(&self, result: &CachedResult) -> StoreResult<()> {
        let raw = serde_json::to_string(result).map_err(|e| crate::store::StoreError::Corrupt {
            key: RESULT_KEY.to_string(),
            message: e.to_string(),
        })?;
        self.store.set(RESULT_KEY, &raw, self.ttl)
    }

    /// Drop the cached result so the next view requires a fresh scan.
    pub fn invalidate(&self) -> StoreResult<()> {
        log::debug!("Invalidating cached scan result");
        self.store.delete(RESULT_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::Digest;
    use crate::store::MemoryStore;

    fn groups() -> HashGroups {
        HashGroups::from_pairs([
            (Digest::of_bytes(b"h1"), 1),
            (Digest::of_bytes(b"h1"), 2),
            (Digest::of_bytes(b"h2"), 3),
        ])
    }

    #[test]
    fn test_save_and_load() {
        let store = Arc::new(MemoryStore::new());
        let cache = ResultCache::new(store, Duration::from_secs(60));

        assert!(cache.load().unwrap().is_none());
        cache.save(&CachedResult::new("g1", groups(), true)).unwrap();

        let loaded = cache.load().unwrap().unwrap();
        assert_eq!(loaded.generation, "g1");
        assert!(loaded.complete);
        assert_eq!(loaded.groups.len(), 1);
    }

    #[test]
    fn test_new_result_prunes_singletons() {
        let result = CachedResult::new("g", groups(), false);
        assert!(result.groups.get(&Digest::of_bytes(b"h2")).is_none());
    }

    #[test]
    fn test_invalidate() {
        let store = Arc::new(MemoryStore::new());
        let cache = ResultCache::new(store, Duration::from_secs(60));
        cache.save(&CachedResult::new("g1", groups(), true)).unwrap();
        cache.invalidate().unwrap();
        assert!(cache.load().unwrap().is_none());
    }

    #[test]
    fn test_expired_result_is_gone() {
        let store = Arc::new(MemoryStore::new());
        let cache = ResultCache::new(store, Duration::ZERO);
        cache.save(&CachedResult::new("g1", groups(), true)).unwrap();
        assert!(cache.load().unwrap().is_none());
    }

    #[test]
    fn test_corrupt_result_reads_as_none() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(RESULT_KEY, "{not json", Duration::from_secs(60))
            .unwrap();
        let cache = ResultCache::new(store, Duration::from_secs(60));
        assert!(cache.load().unwrap().is_none());
    }
}
