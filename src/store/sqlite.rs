//! SQLite-backed media library.
//!
//! # Schema
//!
//! * `items`: registered media files, ordered by `id`.
//! * `item_meta`: per-item key/value metadata (fingerprints live here).
//! * `ephemeral`: key/value entries with an absolute `expires_at` (ms since epoch).
//! * `options`: durable key/value settings.
//! * `contents`: content bodies that may embed `media_id="<id>"` markers.
//! * `content_refs`: structured content-to-item references.
//!
//! An item is referenced if any content body embeds its marker or any
//! `content_refs` row points at it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use walkdir::WalkDir;

use crate::scanner::{Item, ItemId};
use crate::store::{
    EphemeralStore, ItemCatalog, ItemRemover, MetaStore, OptionStore, ReferenceOracle,
    StoreError, StoreResult,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,
    added_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS item_meta (
    item_id INTEGER NOT NULL,
    meta_key TEXT NOT NULL,
    meta_value TEXT NOT NULL,
    PRIMARY KEY (item_id, meta_key)
);
CREATE TABLE IF NOT EXISTS ephemeral (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    expires_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS options (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS contents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    body TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS content_refs (
    content_id INTEGER NOT NULL,
    item_id INTEGER NOT NULL,
    PRIMARY KEY (content_id, item_id)
);
CREATE INDEX IF NOT EXISTS idx_content_refs_item ON content_refs (item_id);
";

/// Marker that content bodies embed to reference an item.
#[must_use]
pub fn reference_marker(id: ItemId) -> String {
    format!("media_id=\"{id}\"")
}

/// Counts from [`Library::import_dir`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Newly registered files
    pub added: usize,
    /// Files that were already registered
    pub existing: usize,
    /// Directory entries that could not be read
    pub errors: usize,
}

/// Media library persisted in a single SQLite database.
pub struct Library {
    conn: Mutex<Connection>,
    permanent_delete: bool,
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("permanent_delete", &self.permanent_delete)
            .finish_non_exhaustive()
    }
}

fn sql_id(id: ItemId) -> i64 {
    i64::try_from(id).unwrap_or(i64::MAX)
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

impl Library {
    /// Open or create a library at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the
    /// database cannot be opened.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        log::debug!("Opened library at {}", path.display());
        Self::init(conn)
    }

    /// Open a throwaway in-memory library.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            permanent_delete: false,
        })
    }

    /// Delete files permanently instead of moving them to the system trash.
    #[must_use]
    pub fn with_permanent_delete(mut self, permanent: bool) -> Self {
        self.permanent_delete = permanent;
        self
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Register a file, returning its id. Registering a path twice returns
    /// the existing id.
    pub fn add_item(&self, path: &Path) -> StoreResult<ItemId> {
        let conn = self.conn()?;
        let (id, _) = insert_item(&conn, path)?;
        Ok(id)
    }

    /// Register every regular file under `root`, in path order.
    pub fn import_dir(&self, root: &Path) -> StoreResult<ImportSummary> {
        let mut summary = ImportSummary::default();
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping unreadable entry: {}", e);
                    summary.errors += 1;
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path().canonicalize().unwrap_or_else(|_| entry.path().to_path_buf());
            let (_, added) = insert_item(&tx, &path)?;
            if added {
                summary.added += 1;
            } else {
                summary.existing += 1;
            }
        }

        tx.commit()?;
        log::info!(
            "Imported {} new file(s) from {} ({} already registered)",
            summary.added,
            root.display(),
            summary.existing
        );
        Ok(summary)
    }

    /// Store a content body. Bodies reference items through [`reference_marker`].
    pub fn add_content(&self, title: &str, body: &str) -> StoreResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO contents (title, body) VALUES (?1, ?2)",
            params![title, body],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Record a structured reference from content to an item.
    pub fn link_reference(&self, content_id: i64, item_id: ItemId) -> StoreResult<()> {
        self.conn()?.execute(
            "INSERT OR IGNORE INTO content_refs (content_id, item_id) VALUES (?1, ?2)",
            params![content_id, sql_id(item_id)],
        )?;
        Ok(())
    }

    /// Remove a content body and its structured references.
    pub fn remove_content(&self, content_id: i64) -> StoreResult<bool> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM content_refs WHERE content_id = ?1",
            params![content_id],
        )?;
        let removed = conn.execute("DELETE FROM contents WHERE id = ?1", params![content_id])?;
        Ok(removed > 0)
    }

    /// Drop expired ephemeral entries. Returns the number removed.
    pub fn purge_expired(&self) -> StoreResult<usize> {
        Ok(self.conn()?.execute(
            "DELETE FROM ephemeral WHERE expires_at <= ?1",
            params![now_ms()],
        )?)
    }
}

/// Insert a path if new. Returns the id and whether a row was added.
fn insert_item(conn: &Connection, path: &Path) -> StoreResult<(ItemId, bool)> {
    let path_str = path.to_string_lossy();
    let added = conn.execute(
        "INSERT OR IGNORE INTO items (path, added_at) VALUES (?1, ?2)",
        params![path_str, now_ms()],
    )? > 0;
    let id: i64 = conn.query_row(
        "SELECT id FROM items WHERE path = ?1",
        params![path_str],
        |row| row.get(0),
    )?;
    Ok((id as ItemId, added))
}

fn remove_file(path: &Path, permanent: bool) -> io::Result<()> {
    if permanent {
        fs::remove_file(path)
    } else {
        trash::delete(path).map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
    }
}

impl ItemCatalog for Library {
    fn list_items(&self, offset: usize, limit: usize) -> StoreResult<Vec<Item>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached("SELECT id, path FROM items ORDER BY id LIMIT ?1 OFFSET ?2")?;
        let rows = stmt.query_map(
            params![
                i64::try_from(limit).unwrap_or(i64::MAX),
                i64::try_from(offset).unwrap_or(i64::MAX)
            ],
            |row| {
                let id: i64 = row.get(0)?;
                let path: String = row.get(1)?;
                Ok(Item::new(id as ItemId, PathBuf::from(path)))
            },
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn count_items(&self) -> StoreResult<usize> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn item_path(&self, id: ItemId) -> StoreResult<Option<PathBuf>> {
        let path: Option<String> = self
            .conn()?
            .query_row(
                "SELECT path FROM items WHERE id = ?1",
                params![sql_id(id)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(path.map(PathBuf::from))
    }
}

impl MetaStore for Library {
    fn get_item_meta(&self, id: ItemId, key: &str) -> StoreResult<Option<String>> {
        Ok(self
            .conn()?
            .query_row(
                "SELECT meta_value FROM item_meta WHERE item_id = ?1 AND meta_key = ?2",
                params![sql_id(id), key],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn set_item_meta(&self, id: ItemId, key: &str, value: &str) -> StoreResult<()> {
        self.conn()?.execute(
            "INSERT INTO item_meta (item_id, meta_key, meta_value) VALUES (?1, ?2, ?3)
             ON CONFLICT (item_id, meta_key) DO UPDATE SET meta_value = excluded.meta_value",
            params![sql_id(id), key, value],
        )?;
        Ok(())
    }
}

impl EphemeralStore for Library {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self
            .conn()?
            .query_row(
                "SELECT value FROM ephemeral WHERE key = ?1 AND expires_at > ?2",
                params![key, now_ms()],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = now_ms().saturating_add(ttl_ms);
        self.conn()?.execute(
            "INSERT INTO ephemeral (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT (key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
            params![key, value, expires_at],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        self.conn()?
            .execute("DELETE FROM ephemeral WHERE key = ?1", params![key])?;
        Ok(())
    }
}

impl OptionStore for Library {
    fn get_option(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self
            .conn()?
            .query_row(
                "SELECT value FROM options WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn set_option(&self, key: &str, value: &str) -> StoreResult<()> {
        self.conn()?.execute(
            "INSERT INTO options (key, value) VALUES (?1, ?2)
             ON CONFLICT (key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn delete_option(&self, key: &str) -> StoreResult<()> {
        self.conn()?
            .execute("DELETE FROM options WHERE key = ?1", params![key])?;
        Ok(())
    }
}

impl ReferenceOracle for Library {
    fn is_referenced(&self, id: ItemId) -> StoreResult<bool> {
        let referenced: bool = self.conn()?.query_row(
            "SELECT EXISTS (SELECT 1 FROM contents WHERE instr(body, ?1) > 0)
                 OR EXISTS (SELECT 1 FROM content_refs WHERE item_id = ?2)",
            params![reference_marker(id), sql_id(id)],
            |row| row.get(0),
        )?;
        Ok(referenced)
    }
}

impl ItemRemover for Library {
    fn delete_item(&self, id: ItemId) -> StoreResult<bool> {
        let mut conn = self.conn()?;
        let path: Option<String> = conn
            .query_row(
                "SELECT path FROM items WHERE id = ?1",
                params![sql_id(id)],
                |row| row.get(0),
            )
            .optional()?;
        let Some(path) = path.map(PathBuf::from) else {
            return Ok(false);
        };

        if path.exists() {
            if let Err(e) = remove_file(&path, self.permanent_delete) {
                log::error!("Failed to remove {}: {}", path.display(), e);
                return Ok(false);
            }
        } else {
            log::warn!("File already gone, removing record: {}", path.display());
        }

        let tx = conn.transaction()?;
        tx.execute("DELETE FROM item_meta WHERE item_id = ?1", params![sql_id(id)])?;
        tx.execute("DELETE FROM content_refs WHERE item_id = ?1", params![sql_id(id)])?;
        tx.execute("DELETE FROM items WHERE id = ?1", params![sql_id(id)])?;
        tx.commit()?;

        log::info!(
            "{} item {} ({})",
            if self.permanent_delete { "Permanently deleted" } else { "Moved to trash" },
            id,
            path.display()
        );
        Ok(true)
    }
}
