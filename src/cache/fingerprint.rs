//! Per-item fingerprint cache backed by item metadata.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::cache::entry::FingerprintEntry;
use crate::scanner::{Digest, Hasher, ItemId};
use crate::store::{MetaStore, StoreResult};

/// Metadata key under which fingerprints are persisted.
pub const FINGERPRINT_META_KEY: &str = "_mediadupe_fingerprint";

/// How a fingerprint was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Served from the persisted record without hashing.
    Cached(Digest),
    /// Hashed now and persisted.
    Computed(Digest),
    /// The file is missing or unreadable.
    Missing,
}

impl Lookup {
    /// The resolved digest, if any.
    #[must_use]
    pub fn digest(&self) -> Option<&Digest> {
        match self {
            Self::Cached(d) | Self::Computed(d) => Some(d),
            Self::Missing => None,
        }
    }

    #[must_use]
    pub fn into_digest(self) -> Option<Digest> {
        match self {
            Self::Cached(d) | Self::Computed(d) => Some(d),
            Self::Missing => None,
        }
    }
}

/// Lazily computes and persists content fingerprints.
///
/// A persisted fingerprint is returned as-is, even if the file changed since
/// it was hashed. Enable [`FingerprintStore::with_validation`] to compare the
/// recorded size and mtime and rehash changed files instead.
pub struct FingerprintStore {
    meta: Arc<dyn MetaStore>,
    hasher: Hasher,
    validate_metadata: bool,
}

impl std::fmt::Debug for FingerprintStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FingerprintStore")
            .field("meta", &"<meta store>")
            .field("hasher", &self.hasher)
            .field("validate_metadata", &self.validate_metadata)
            .finish()
    }
}

impl FingerprintStore {
    /// Create a fingerprint store persisting into `meta`.
    #[must_use]
    pub fn new(meta: Arc<dyn MetaStore>) -> Self {
        Self {
            meta,
            hasher: Hasher::new(),
            validate_metadata: false,
        }
    }

    /// Enable/disable size and mtime validation of persisted fingerprints.
    #[must_use]
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.validate_metadata = enabled;
        self
    }

    /// The hasher used for cache misses.
    #[must_use]
    pub fn hasher(&self) -> &Hasher {
        &self.hasher
    }

    /// Return the fingerprint for `id`, hashing `path` only if none is persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata store cannot be read or written.
    /// A missing file is not an error; it yields `Ok(None)`.
    pub fn get_or_compute(&self, id: ItemId, path: &Path) -> StoreResult<Option<Digest>> {
        Ok(self.lookup(id, path)?.into_digest())
    }

    /// Like [`get_or_compute`](Self::get_or_compute) but reports whether the
    /// digest came from the cache.
    pub fn lookup(&self, id: ItemId, path: &Path) -> StoreResult<Lookup> {
        if let Some(raw) = self.meta.get_item_meta(id, FINGERPRINT_META_KEY)? {
            match FingerprintEntry::decode(&raw) {
                Some(entry) if !self.validate_metadata => return Ok(Lookup::Cached(entry.digest)),
                Some(entry) => match fs::metadata(path) {
                    Ok(meta) if entry.matches(&meta) => return Ok(Lookup::Cached(entry.digest)),
                    Ok(_) => log::debug!("Item {} changed since hashed, rehashing", id),
                    Err(_) => return Ok(Lookup::Missing),
                },
                None => log::warn!("Discarding unreadable fingerprint for item {}", id),
            }
        }

        let Some(digest) = self.hasher.hash_file(path) else {
            return Ok(Lookup::Missing);
        };

        let entry = if self.validate_metadata {
            match fs::metadata(path) {
                Ok(meta) => FingerprintEntry::with_metadata(digest.clone(), &meta),
                Err(_) => FingerprintEntry::new(digest.clone()),
            }
        } else {
            FingerprintEntry::new(digest.clone())
        };
        self.meta
            .set_item_meta(id, FINGERPRINT_META_KEY, &entry.encode())?;

        Ok(Lookup::Computed(digest))
    }
}
