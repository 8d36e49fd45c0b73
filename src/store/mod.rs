//! Collaborator interfaces consumed by the scan engine.
//!
//! The engine never talks to a database or filesystem catalog directly. Every
//! external concern is expressed as a small trait so the coordinator can be
//! driven against any backing store:
//!
//! * [`ItemCatalog`]: stable, id-ordered enumeration of media items.
//! * [`MetaStore`]: per-item metadata, where fingerprints are persisted.
//! * [`EphemeralStore`]: keyed values with a time-to-live (scan progress, result cache).
//! * [`OptionStore`]: durable keyed values (last full-scan timestamp).
//! * [`ReferenceOracle`]: "is this item still used by other content?".
//! * [`ItemRemover`]: the delete primitive.
//!
//! Two implementations ship with the crate:
//!
//! * [`memory::MemoryStore`]: in-process maps, used by tests and embedders.
//! * [`sqlite::Library`]: a SQLite-backed media library used by the CLI.

pub mod memory;
pub mod sqlite;

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::scanner::{Item, ItemId};

pub use memory::MemoryStore;
pub use sqlite::Library;

/// Errors raised by backing stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The SQLite backend reported an error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Filesystem access failed.
    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A stored value could not be decoded.
    #[error("corrupt value for key {key}: {message}")]
    Corrupt { key: String, message: String },

    /// The referenced item does not exist.
    #[error("item not found: {0}")]
    ItemNotFound(ItemId),

    /// A store mutex was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    Poisoned,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Enumerates the items of the collection in a stable order.
///
/// Implementations must order by id ascending so that offsets stay
/// meaningful across calls within one scan generation.
pub trait ItemCatalog: Send + Sync {
    /// Return at most `limit` items starting at `offset`.
    fn list_items(&self, offset: usize, limit: usize) -> StoreResult<Vec<Item>>;

    /// Total number of items in the collection.
    fn count_items(&self) -> StoreResult<usize>;

    /// Resolve the on-disk location of an item, if it still exists.
    fn item_path(&self, id: ItemId) -> StoreResult<Option<PathBuf>>;
}

/// Per-item metadata persistence.
pub trait MetaStore: Send + Sync {
    fn get_item_meta(&self, id: ItemId, key: &str) -> StoreResult<Option<String>>;

    fn set_item_meta(&self, id: ItemId, key: &str, value: &str) -> StoreResult<()>;
}

/// Keyed storage whose entries expire after a time-to-live.
pub trait EphemeralStore: Send + Sync {
    /// Fetch a live value. Expired entries read as `None`.
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Store a value that expires `ttl` from now, replacing any previous value.
    fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    fn delete(&self, key: &str) -> StoreResult<()>;
}

/// Durable keyed storage.
pub trait OptionStore: Send + Sync {
    fn get_option(&self, key: &str) -> StoreResult<Option<String>>;

    fn set_option(&self, key: &str, value: &str) -> StoreResult<()>;

    fn delete_option(&self, key: &str) -> StoreResult<()>;
}

/// Answers whether an item is still referenced by other content.
pub trait ReferenceOracle: Send + Sync {
    fn is_referenced(&self, id: ItemId) -> StoreResult<bool>;
}

/// Removes an item from the collection.
pub trait ItemRemover: Send + Sync {
    /// Delete the item and its file. Returns `false` if nothing was removed.
    fn delete_item(&self, id: ItemId) -> StoreResult<bool>;
}

/// A backing store that provides every collaborator interface at once.
pub trait MediaLibrary:
    ItemCatalog + MetaStore + EphemeralStore + OptionStore + ReferenceOracle + ItemRemover
{
}

impl<T> MediaLibrary for T where
    T: ItemCatalog + MetaStore + EphemeralStore + OptionStore + ReferenceOracle + ItemRemover
{
}
