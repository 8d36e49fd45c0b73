//! One bounded page of fingerprinting.
//!
//! # Overview
//!
//! [`BatchProcessor::process_batch`] reads a single page of items, resolves
//! each item's fingerprint through the [`FingerprintStore`], and groups the
//! page's ids by fingerprint. It holds no state between calls, so any batch
//! can be retried on its own.
//!
//! Items whose file is missing still count towards `processed_count`, which
//! keeps progress accounting moving towards the collection total.

use std::sync::Arc;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::cache::{FingerprintStore, Lookup};
use crate::duplicates::HashGroups;
use crate::scanner::Item;
use crate::store::{ItemCatalog, StoreResult};

/// Result of processing one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Fingerprint to ids for this page only. Singletons are kept.
    pub partial_groups: HashGroups,
    /// Number of items read, including ones that could not be hashed.
    pub processed_count: usize,
    /// Fingerprints served from the cache.
    pub cached: usize,
    /// Fingerprints computed during this batch.
    pub hashed: usize,
    /// Items whose file was missing or unreadable.
    pub missing: usize,
}

/// Reads and fingerprints one page of the collection at a time.
pub struct BatchProcessor {
    catalog: Arc<dyn ItemCatalog>,
    fingerprints: Arc<FingerprintStore>,
    io_threads: usize,
    pool: Option<ThreadPool>,
}

impl std::fmt::Debug for BatchProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchProcessor")
            .field("catalog", &"<catalog>")
            .field("fingerprints", &self.fingerprints)
            .field("io_threads", &self.io_threads)
            .field("pooled", &self.pool.is_some())
            .finish()
    }
}

impl BatchProcessor {
    /// Create a processor hashing on a single thread.
    #[must_use]
    pub fn new(catalog: Arc<dyn ItemCatalog>, fingerprints: Arc<FingerprintStore>) -> Self {
        Self {
            catalog,
            fingerprints,
            io_threads: 1,
            pool: None,
        }
    }

    /// Hash up to `threads` files of a page concurrently.
    ///
    /// The pool is built here and reused by every batch. If it cannot be
    /// built, batches hash sequentially.
    #[must_use]
    pub fn with_io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads.max(1);
        self.pool = None;
        if self.io_threads > 1 {
            match ThreadPoolBuilder::new().num_threads(self.io_threads).build() {
                Ok(pool) => self.pool = Some(pool),
                Err(e) => {
                    log::warn!("Failed to create hashing pool, hashing sequentially: {}", e);
                }
            }
        }
        self
    }

    #[must_use]
    pub fn fingerprints(&self) -> &FingerprintStore {
        &self.fingerprints
    }

    /// Process the page of at most `page_size` items starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read or a new fingerprint
    /// cannot be persisted. No partial result is returned in that case, so
    /// the batch can simply be retried.
    pub fn process_batch(&self, offset: usize, page_size: usize) -> StoreResult<BatchOutcome> {
        let items = self.catalog.list_items(offset, page_size)?;
        let lookups = self.resolve(&items)?;

        let mut outcome = BatchOutcome {
            processed_count: items.len(),
            ..BatchOutcome::default()
        };

        for (item, lookup) in items.iter().zip(lookups) {
            match lookup {
                Lookup::Cached(digest) => {
                    outcome.cached += 1;
                    outcome.partial_groups.insert(digest, item.id);
                }
                Lookup::Computed(digest) => {
                    outcome.hashed += 1;
                    outcome.partial_groups.insert(digest, item.id);
                }
                Lookup::Missing => outcome.missing += 1,
            }
        }

        log::debug!(
            "Batch at offset {}: {} read, {} cached, {} hashed, {} missing",
            offset,
            outcome.processed_count,
            outcome.cached,
            outcome.hashed,
            outcome.missing
        );

        Ok(outcome)
    }

    /// Resolve fingerprints for a page, preserving page order.
    fn resolve(&self, items: &[Item]) -> StoreResult<Vec<Lookup>> {
        match &self.pool {
            Some(pool) if items.len() > 1 => pool.install(|| {
                items
                    .par_iter()
                    .map(|item| self.fingerprints.lookup(item.id, &item.path))
                    .collect()
            }),
            _ => items
                .iter()
                .map(|item| self.fingerprints.lookup(item.id, &item.path))
                .collect(),
        }
    }
}
