//! Fingerprint and result caching.
//!
//! # Architecture
//!
//! * [`entry`]: the fingerprint record persisted as item metadata.
//! * [`fingerprint`]: lazily computes fingerprints and persists them, so repeat
//!   scans skip re-hashing.
//! * [`result`]: the last finalized (or stopped) duplicate grouping, kept with
//!   a long time-to-live independent of scan progress.
//!
//! # Cache Invalidation
//!
//! Fingerprints are recomputed only when absent. Optional metadata validation
//! compares the recorded size and mtime and rehashes files that changed.
//! The result cache is invalidated by `clear`, by a fresh scan, and by any
//! successful orphan deletion.

pub mod entry;
pub mod fingerprint;
pub mod result;

pub use entry::FingerprintEntry;
pub use fingerprint::{FingerprintStore, Lookup, FINGERPRINT_META_KEY};
pub use result::{CachedResult, ResultCache, RESULT_KEY};
