//! Item model, content hashing, and page-at-a-time batch processing.
//!
//! # Architecture
//!
//! The scanner is divided into submodules:
//! - [`hasher`]: BLAKE3 file hashing producing fixed-width hex [`Digest`]s
//! - [`batch`]: reads one bounded page of items and groups it by fingerprint
//!
//! # Example
//!
//! ```no_run
//! use mediadupe::cache::FingerprintStore;
//! use mediadupe::scanner::BatchProcessor;
//! use mediadupe::store::MemoryStore;
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let fingerprints = Arc::new(FingerprintStore::new(store.clone()));
//! let processor = BatchProcessor::new(store, fingerprints);
//!
//! let outcome = processor.process_batch(0, 50).unwrap();
//! println!("{} items read", outcome.processed_count);
//! ```

pub mod batch;
pub mod hasher;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use batch::{BatchOutcome, BatchProcessor};
pub use hasher::{Digest, Hasher};

/// Opaque unique key of an item in the media collection.
pub type ItemId = u64;

/// A media item as exposed by the collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Unique identifier
    pub id: ItemId,
    /// Location of the item's file
    pub path: PathBuf,
}

impl Item {
    /// Create a new item.
    #[must_use]
    pub fn new(id: ItemId, path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            path: path.into(),
        }
    }
}
