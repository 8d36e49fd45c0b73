//! Persisted fingerprint record.

use std::fs::Metadata;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};

use crate::scanner::Digest;

/// Fingerprint record stored as item metadata.
///
/// The size and mtime are captured alongside the digest so that optional
/// metadata validation can detect changed files. Records that carry only a
/// digest (a bare hex string in storage) are still accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintEntry {
    /// Content digest.
    pub digest: Digest,
    /// File size in bytes when hashed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Modification time when hashed, in nanoseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime_ns: Option<i64>,
}

impl FingerprintEntry {
    /// Create a record with no file metadata.
    #[must_use]
    pub fn new(digest: Digest) -> Self {
        Self {
            digest,
            size: None,
            mtime_ns: None,
        }
    }

    /// Create a record capturing the file's current size and mtime.
    #[must_use]
    pub fn with_metadata(digest: Digest, meta: &Metadata) -> Self {
        Self {
            digest,
            size: Some(meta.len()),
            mtime_ns: mtime_ns(meta),
        }
    }

    /// Serialize for storage.
    #[must_use]
    pub fn encode(&self) -> String {
        if self.size.is_none() && self.mtime_ns.is_none() {
            return self.digest.to_string();
        }
        // A struct of a string and two integers always serializes.
        serde_json::to_string(self).unwrap_or_else(|_| self.digest.to_string())
    }

    /// Decode a stored value, accepting either a bare digest or a JSON record.
    #[must_use]
    pub fn decode(raw: &str) -> Option<Self> {
        if let Some(digest) = Digest::parse(raw) {
            return Some(Self::new(digest));
        }
        serde_json::from_str(raw).ok()
    }

    /// Whether the record still describes the file with `meta`.
    ///
    /// Fields that were not captured are not compared.
    #[must_use]
    pub fn matches(&self, meta: &Metadata) -> bool {
        if let Some(size) = self.size {
            if size != meta.len() {
                return false;
            }
        }
        if let Some(recorded) = self.mtime_ns {
            if mtime_ns(meta) != Some(recorded) {
                return false;
            }
        }
        true
    }
}

fn mtime_ns(meta: &Metadata) -> Option<i64> {
    let modified = meta.modified().ok()?;
    let since_epoch = modified.duration_since(UNIX_EPOCH).ok()?;
    i64::try_from(since_epoch.as_nanos()).ok()
}
