//! SQLite catalog store

use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Result as SqlResult, Row, Transaction};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::data::{CatalogItem, ItemId, ItemTag, Tag, TagId};
use crate::error::{LibraryError, Result};

/// How long a connection waits on a locked database before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const ITEM_COLUMNS: &str = "id, path, name, is_folder, size, modified_at, duration_ms";

/// The Library manages the SQLite catalog database.
/// It stores catalog items, the tag table and the item/tag join table.
///
/// A `Library` only remembers where the database lives. Every operation
/// opens its own connection (rusqlite::Connection is not Send, so background
/// tasks can't share one) and mutations run inside a single transaction
/// that is either committed or rolled back before the call returns.
#[derive(Clone, Default)]
pub struct Library {
    db_path: Option<PathBuf>,
}

impl Library {
    /// A library that has not been opened yet. Every operation fails with
    /// `NotConnected` until `open` succeeds.
    pub fn disconnected() -> Self {
        Self::default()
    }

    /// Open or create the database at `db_path` and initialize the schema.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();

        // Ensure the parent directory exists; if it can't be created the
        // open below reports the failure
        if let Some(parent) = db_path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(dir = %parent.display(), error = %e, "Could not create database directory");
            }
        }

        let open_error = |source| LibraryError::Open {
            path: db_path.clone(),
            source,
        };
        let conn = Connection::open(&db_path).map_err(open_error)?;
        Self::configure(&conn).map_err(open_error)?;
        Self::init_schema(&conn).map_err(open_error)?;

        info!(path = %db_path.display(), "Library database initialized");

        Ok(Library {
            db_path: Some(db_path),
        })
    }

    /// Get the path where the database is stored by default
    ///
    /// - Linux: ~/.local/share/media-shelf/library.db
    /// - macOS: ~/Library/Application Support/media-shelf/library.db
    /// - Windows: %APPDATA%\media-shelf\library.db
    pub fn default_db_path() -> Result<PathBuf> {
        let mut path = dirs::data_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| LibraryError::Config("Could not determine user data directory".to_string()))?;

        path.push("media-shelf");
        path.push("library.db");
        Ok(path)
    }

    /// Session settings applied to every connection
    fn configure(conn: &Connection) -> SqlResult<()> {
        // SQLite requires foreign key enforcement per connection
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(())
    }

    /// Initialize the database schema.
    /// Creates all necessary tables and indexes if they don't exist.
    fn init_schema(conn: &Connection) -> SqlResult<()> {
        // Files and folders share one path namespace
        conn.execute(
            "CREATE TABLE IF NOT EXISTS items (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                path            TEXT NOT NULL UNIQUE,
                name            TEXT NOT NULL,
                is_folder       INTEGER NOT NULL DEFAULT 0,
                size            INTEGER NOT NULL,
                modified_at     TEXT NOT NULL,
                duration_ms     INTEGER NOT NULL
            )",
            [],
        )?;

        // Deleting a tag removes its whole subtree through the self reference
        conn.execute(
            "CREATE TABLE IF NOT EXISTS tags (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                name            TEXT NOT NULL,
                color           TEXT,
                parent_id       INTEGER,
                FOREIGN KEY(parent_id) REFERENCES tags(id) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS item_tags (
                item_id         INTEGER NOT NULL,
                tag_id          INTEGER NOT NULL,
                PRIMARY KEY (item_id, tag_id),
                FOREIGN KEY(item_id) REFERENCES items(id) ON DELETE CASCADE,
                FOREIGN KEY(tag_id) REFERENCES tags(id) ON DELETE CASCADE
            )",
            [],
        )?;

        // Create indexes for the cascade lookups
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tags_parent_id ON tags(parent_id)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_item_tags_tag_id ON item_tags(tag_id)",
            [],
        )?;

        debug!("Database schema initialized");

        Ok(())
    }

    /// Open a fresh connection for one logical operation
    fn connect(&self) -> Result<Connection> {
        let path = self.db_path.as_ref().ok_or(LibraryError::NotConnected)?;
        let conn = Connection::open(path)?;
        Self::configure(&conn)?;
        Ok(conn)
    }

    /// Get the path to the database file
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Get a count of items in the library
    pub fn item_count(&self) -> Result<i64> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
        Ok(count)
    }

    // ========== Items ==========

    /// Insert every item whose path is not yet in the catalog.
    ///
    /// Existing rows are left untouched, including when a later item in the
    /// same batch repeats a path. The whole batch is one transaction.
    /// Returns the number of rows actually inserted.
    pub fn insert_items_if_absent(&self, items: &[CatalogItem]) -> Result<usize> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO items (path, name, is_folder, size, modified_at, duration_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(path) DO NOTHING",
            )?;

            for item in items {
                inserted += stmt.execute(params![
                    item.path,
                    item.name,
                    item.is_folder,
                    to_sql_int(item.size),
                    item.modified_at,
                    to_sql_int(item.duration.as_millis()),
                ])?;
            }
        }

        tx.commit()?;

        debug!(offered = items.len(), inserted, "Merged items into catalog");
        Ok(inserted)
    }

    /// Get all items from the library, in insertion order
    pub fn list_items(&self) -> Result<Vec<CatalogItem>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!("SELECT {ITEM_COLUMNS} FROM items ORDER BY id"))?;

        let items = stmt
            .query_map([], item_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(items)
    }

    /// Remove items by id. Their tag associations go with them.
    /// Returns the number of items removed; unknown ids are skipped.
    pub fn delete_items(&self, ids: &[ItemId]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        let mut deleted = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM items WHERE id = ?1")?;
            for id in ids {
                deleted += stmt.execute([id])?;
            }
        }

        tx.commit()?;

        debug!(requested = ids.len(), deleted, "Deleted items");
        Ok(deleted)
    }

    /// Remove every item and association. Tags are kept.
    pub fn clear_items(&self) -> Result<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM item_tags", [])?;
        let removed = tx.execute("DELETE FROM items", [])?;
        tx.commit()?;

        info!(removed, "Cleared library items");
        Ok(())
    }

    // ========== Tags ==========

    /// Create a tag, optionally under an existing parent
    pub fn insert_tag(&self, name: &str, parent_id: Option<TagId>) -> Result<TagId> {
        let name = normalize_tag_name(name)?;

        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        if let Some(parent_id) = parent_id {
            if !tag_exists(&tx, parent_id)? {
                return Err(LibraryError::ForeignKeyViolation { parent_id });
            }
        }

        tx.execute(
            "INSERT INTO tags (name, parent_id) VALUES (?1, ?2)",
            params![name, parent_id],
        )
        .map_err(|e| foreign_key_error(e, parent_id))?;
        let id = tx.last_insert_rowid();

        tx.commit()?;

        debug!(id, name, ?parent_id, "Inserted tag");
        Ok(id)
    }

    pub fn rename_tag(&self, id: TagId, new_name: &str) -> Result<()> {
        let new_name = normalize_tag_name(new_name)?;
        let conn = self.connect()?;

        let changed = conn.execute(
            "UPDATE tags SET name = ?1 WHERE id = ?2",
            params![new_name, id],
        )?;
        if changed == 0 {
            return Err(LibraryError::tag_not_found(id));
        }

        debug!(id, name = new_name, "Renamed tag");
        Ok(())
    }

    /// Set or clear a tag's display color
    pub fn set_tag_color(&self, id: TagId, color: Option<&str>) -> Result<()> {
        let conn = self.connect()?;

        let changed = conn.execute(
            "UPDATE tags SET color = ?1 WHERE id = ?2",
            params![color, id],
        )?;
        if changed == 0 {
            return Err(LibraryError::tag_not_found(id));
        }

        Ok(())
    }

    /// Re-parent a tag. `None` makes it a root.
    ///
    /// Rejects a parent that is the tag itself or one of its descendants.
    pub fn move_tag(&self, id: TagId, new_parent: Option<TagId>) -> Result<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        if !tag_exists(&tx, id)? {
            return Err(LibraryError::tag_not_found(id));
        }

        if let Some(parent_id) = new_parent {
            if !tag_exists(&tx, parent_id)? {
                return Err(LibraryError::ForeignKeyViolation { parent_id });
            }
            if subtree_ids(&tx, id)?.contains(&parent_id) {
                return Err(LibraryError::CycleDetected { tag_id: id, parent_id });
            }
        }

        tx.execute(
            "UPDATE tags SET parent_id = ?1 WHERE id = ?2",
            params![new_parent, id],
        )
        .map_err(|e| foreign_key_error(e, new_parent))?;

        tx.commit()?;

        debug!(id, ?new_parent, "Moved tag");
        Ok(())
    }

    /// Delete a tag with its entire subtree and every association touching it.
    /// Returns the number of tags removed.
    pub fn delete_tag(&self, id: TagId) -> Result<usize> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        let subtree = subtree_ids(&tx, id)?;
        if subtree.is_empty() {
            return Err(LibraryError::tag_not_found(id));
        }

        // ON DELETE CASCADE takes care of descendants and item_tags
        tx.execute("DELETE FROM tags WHERE id = ?1", [id])?;
        tx.commit()?;

        info!(id, removed = subtree.len(), "Deleted tag subtree");
        Ok(subtree.len())
    }

    /// Get all tags as a flat list ordered by id; `children` is left empty
    pub fn list_tags(&self) -> Result<Vec<Tag>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT id, name, color, parent_id FROM tags ORDER BY id")?;

        let tags = stmt
            .query_map([], tag_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(tags)
    }

    // ========== Associations ==========

    /// Attach a tag to an item. Returns false if the pair already existed.
    pub fn assign_tag(&self, item_id: ItemId, tag_id: TagId) -> Result<bool> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        let item_exists = tx
            .query_row("SELECT 1 FROM items WHERE id = ?1", [item_id], |_| Ok(()))
            .optional()?
            .is_some();
        if !item_exists {
            return Err(LibraryError::item_not_found(item_id));
        }
        if !tag_exists(&tx, tag_id)? {
            return Err(LibraryError::tag_not_found(tag_id));
        }

        let added = tx.execute(
            "INSERT INTO item_tags (item_id, tag_id) VALUES (?1, ?2)
             ON CONFLICT(item_id, tag_id) DO NOTHING",
            [item_id, tag_id],
        )?;
        tx.commit()?;

        Ok(added > 0)
    }

    /// Detach a tag from an item. Returns false if they weren't associated.
    pub fn unassign_tag(&self, item_id: ItemId, tag_id: TagId) -> Result<bool> {
        let conn = self.connect()?;
        let removed = conn.execute(
            "DELETE FROM item_tags WHERE item_id = ?1 AND tag_id = ?2",
            [item_id, tag_id],
        )?;
        Ok(removed > 0)
    }

    pub fn tags_for_item(&self, item_id: ItemId) -> Result<Vec<Tag>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT t.id, t.name, t.color, t.parent_id
             FROM tags t
             JOIN item_tags it ON it.tag_id = t.id
             WHERE it.item_id = ?1
             ORDER BY t.id",
        )?;

        let tags = stmt
            .query_map([item_id], tag_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(tags)
    }

    pub fn items_for_tag(&self, tag_id: TagId) -> Result<Vec<CatalogItem>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT i.id, i.path, i.name, i.is_folder, i.size, i.modified_at, i.duration_ms
             FROM items i
             JOIN item_tags it ON it.item_id = i.id
             WHERE it.tag_id = ?1
             ORDER BY i.id",
        )?;

        let items = stmt
            .query_map([tag_id], item_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(items)
    }

    pub fn list_associations(&self) -> Result<Vec<ItemTag>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT item_id, tag_id FROM item_tags ORDER BY item_id, tag_id")?;

        let pairs = stmt
            .query_map([], |row| {
                Ok(ItemTag {
                    item_id: row.get(0)?,
                    tag_id: row.get(1)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(pairs)
    }
}

fn item_from_row(row: &Row<'_>) -> SqlResult<CatalogItem> {
    let size: i64 = row.get(4)?;
    let duration_ms: i64 = row.get(6)?;

    Ok(CatalogItem {
        id: Some(row.get(0)?),
        path: row.get(1)?,
        name: row.get(2)?,
        is_folder: row.get(3)?,
        size: size.max(0) as u64,
        modified_at: row.get(5)?,
        duration: Duration::from_millis(duration_ms.max(0) as u64),
    })
}

fn tag_from_row(row: &Row<'_>) -> SqlResult<Tag> {
    Ok(Tag {
        id: row.get(0)?,
        name: row.get(1)?,
        color: row.get(2)?,
        parent_id: row.get(3)?,
        children: Vec::new(),
    })
}

fn tag_exists(tx: &Transaction<'_>, id: TagId) -> SqlResult<bool> {
    let found = tx
        .query_row("SELECT 1 FROM tags WHERE id = ?1", [id], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

/// Ids of `root` and all of its descendants; empty if `root` doesn't exist
fn subtree_ids(tx: &Transaction<'_>, root: TagId) -> SqlResult<Vec<TagId>> {
    // UNION (not UNION ALL) so a corrupt parent cycle still terminates
    let mut stmt = tx.prepare(
        "WITH RECURSIVE subtree(id) AS (
            SELECT id FROM tags WHERE id = ?1
            UNION
            SELECT t.id FROM tags t JOIN subtree s ON t.parent_id = s.id
         )
         SELECT id FROM subtree",
    )?;

    let ids = stmt
        .query_map([root], |row| row.get(0))?
        .collect::<SqlResult<Vec<TagId>>>()?;
    Ok(ids)
}

/// Translate a foreign key constraint failure into the typed error
fn foreign_key_error(err: rusqlite::Error, parent_id: Option<TagId>) -> LibraryError {
    match (&err, parent_id) {
        (rusqlite::Error::SqliteFailure(e, _), Some(parent_id))
            if e.code == ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
        {
            LibraryError::ForeignKeyViolation { parent_id }
        }
        _ => LibraryError::Database(err),
    }
}

fn normalize_tag_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LibraryError::InvalidInput("tag name must not be empty".to_string()));
    }
    Ok(name)
}

/// SQLite integers are signed; saturate rather than wrap
fn to_sql_int<T: TryInto<i64>>(value: T) -> i64 {
    value.try_into().unwrap_or(i64::MAX)
}

// Implement Debug for better error messages
impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("db_path", &self.db_path)
            .finish()
    }
}
