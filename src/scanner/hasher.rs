//! BLAKE3 content hashing.
//!
//! # Overview
//! [`Hasher`] computes the content fingerprint of a file. Fingerprints are
//! rendered as fixed-width lowercase hex ([`Digest`]) so they can be persisted
//! as plain item metadata and used as map keys in serialized scan state.
//!
//! Missing or unreadable files produce `None` rather than an error: a file that
//! cannot be hashed is simply left out of the current grouping pass.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Hex-encoded content fingerprint (64 lowercase hex characters).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest(String);

impl Digest {
    /// Width of a digest in hex characters.
    pub const HEX_LEN: usize = 64;

    /// Parse a hex digest, accepting either case.
    ///
    /// Returns `None` if the input is not exactly [`Digest::HEX_LEN`] hex characters.
    #[must_use]
    pub fn parse(hex: &str) -> Option<Self> {
        let hex = hex.trim();
        if hex.len() != Self::HEX_LEN || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self(hex.to_ascii_lowercase()))
    }

    /// Digest of an in-memory buffer.
    #[must_use]
    pub fn of_bytes(data: &[u8]) -> Self {
        Self(blake3::hash(data).to_hex().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for compact displays.
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Digest {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid digest: {value:?}"))
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.0
    }
}

impl std::str::FromStr for Digest {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid digest: {s:?}"))
    }
}

/// Streaming BLAKE3 file hasher.
///
/// Keeps a count of hash computations so callers can verify that cached
/// fingerprints are not recomputed.
#[derive(Debug, Default)]
pub struct Hasher {
    computed: AtomicU64,
}

impl Hasher {
    /// Create a new hasher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash the contents of the file at `path`.
    ///
    /// Returns `None` if the file is missing, is not a regular file, or cannot
    /// be read.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use mediadupe::scanner::Hasher;
    /// use std::path::Path;
    ///
    /// let hasher = Hasher::new();
    /// if let Some(digest) = hasher.hash_file(Path::new("photo.jpg")) {
    ///     println!("{}", digest);
    /// }
    /// ```
    pub fn hash_file(&self, path: &Path) -> Option<Digest> {
        match fs::metadata(path) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                log::warn!("Not a regular file, skipping: {}", path.display());
                return None;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::warn!("File missing, skipping: {}", path.display());
                return None;
            }
            Err(e) => {
                log::warn!("Cannot stat {}: {}", path.display(), e);
                return None;
            }
        }

        let mut hasher = blake3::Hasher::new();
        if let Err(e) = hasher.update_mmap(path) {
            log::warn!("Failed to hash {}: {}", path.display(), e);
            return None;
        }

        self.computed.fetch_add(1, Ordering::Relaxed);
        log::trace!("Hashed {}", path.display());
        Some(Digest(hasher.finalize().to_hex().to_string()))
    }

    /// Number of files hashed by this instance.
    #[must_use]
    pub fn computed(&self) -> u64 {
        self.computed.load(Ordering::Relaxed)
    }
}
