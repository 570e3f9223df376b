use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::debug;

use crate::{DiscoveredItem, Result, StoreError};

/// Discovered-gist log for a single workspace
///
/// SQLite was chosen because:
/// - Zero-config embedded database
/// - UNIQUE constraints give us idempotent inserts for free
/// - Each write is a single statement, so a crash mid-run leaves
///   everything recorded so far intact
pub struct WorkspaceStore {
    conn: Connection,
}

impl WorkspaceStore {
    /// Open an existing workspace database
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Create the database for a new workspace and stamp its metadata
    pub(crate) fn create(db_path: &Path, name: &str, created_at: DateTime<Utc>) -> Result<Self> {
        let store = Self::open(db_path)?;
        store.conn.execute(
            "INSERT INTO workspace_meta (name, created_at) VALUES (?1, ?2)",
            params![name, created_at.timestamp()],
        )?;
        Ok(store)
    }

    /// Scratch store for tests and dry runs
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS workspace_meta (
                name TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS discovered_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                remote_id TEXT NOT NULL UNIQUE,
                owner TEXT,
                url TEXT NOT NULL,
                matched_terms TEXT NOT NULL,
                discovered_at INTEGER NOT NULL,
                seen INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS scan_log (
                remote_id TEXT NOT NULL,
                search_key TEXT NOT NULL,
                scanned_at INTEGER NOT NULL,
                PRIMARY KEY (remote_id, search_key)
            );",
        )?;
        Ok(())
    }

    /// Name and creation time recorded when the workspace was defined
    pub(crate) fn metadata(&self) -> Result<Option<(String, DateTime<Utc>)>> {
        let meta = self
            .conn
            .query_row(
                "SELECT name, created_at FROM workspace_meta LIMIT 1",
                [],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;

        Ok(meta.map(|(name, ts)| (name, from_timestamp(ts))))
    }

    /// Whether a remote id is already recorded as a match in this workspace
    pub fn has_seen(&self, remote_id: &str) -> Result<bool> {
        let seen: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM discovered_items WHERE remote_id = ?1)",
            params![remote_id],
            |row| row.get(0),
        )?;
        Ok(seen)
    }

    /// Whether a search identified by `search_key` already evaluated this id
    pub fn was_scanned(&self, remote_id: &str, search_key: &str) -> Result<bool> {
        let scanned: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM scan_log WHERE remote_id = ?1 AND search_key = ?2)",
            params![remote_id, search_key],
            |row| row.get(0),
        )?;
        Ok(scanned)
    }

    /// Record a match. Returns `false` when the remote id was already there.
    pub fn record(&self, item: &DiscoveredItem) -> Result<bool> {
        let terms = serde_json::to_string(&item.matched_terms)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO discovered_items
                (remote_id, owner, url, matched_terms, discovered_at, seen)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                item.remote_id,
                item.owner,
                item.url,
                terms,
                item.discovered_at.timestamp(),
                item.seen
            ],
        )?;

        if inserted == 0 {
            debug!("{} already recorded, skipping", item.remote_id);
        }

        Ok(inserted > 0)
    }

    /// Remember that a search evaluated a remote id, whatever the outcome
    pub fn mark_scanned(&self, remote_id: &str, search_key: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO scan_log (remote_id, search_key, scanned_at)
             VALUES (?1, ?2, ?3)",
            params![remote_id, search_key, Utc::now().timestamp()],
        )?;
        Ok(())
    }

    /// Every recorded match in discovery order
    pub fn list(&self) -> Result<Vec<DiscoveredItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT remote_id, owner, url, matched_terms, discovered_at, seen
             FROM discovered_items ORDER BY id",
        )?;

        let items = stmt
            .query_map([], item_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(items)
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM discovered_items", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Look up a match by its 1-based position in [`list`](Self::list)
    pub fn get(&self, index: usize) -> Result<DiscoveredItem> {
        if index == 0 {
            return Err(StoreError::OutOfRange {
                index,
                len: self.count()?,
            });
        }

        let item = self
            .conn
            .query_row(
                "SELECT remote_id, owner, url, matched_terms, discovered_at, seen
                 FROM discovered_items ORDER BY id LIMIT 1 OFFSET ?1",
                params![(index - 1) as i64],
                item_from_row,
            )
            .optional()?;

        match item {
            Some(item) => Ok(item),
            None => Err(StoreError::OutOfRange {
                index,
                len: self.count()?,
            }),
        }
    }

    /// 1-based position of a recorded remote id in [`list`](Self::list)
    pub fn index_of(&self, remote_id: &str) -> Result<Option<usize>> {
        let position: Option<i64> = self
            .conn
            .query_row(
                "SELECT (SELECT COUNT(*) FROM discovered_items AS earlier WHERE earlier.id <= d.id)
                 FROM discovered_items AS d WHERE d.remote_id = ?1",
                params![remote_id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(position.map(|p| p as usize))
    }

    /// Flag the match at `index` as looked at
    pub fn mark_seen(&self, index: usize) -> Result<()> {
        let item = self.get(index)?;
        self.conn.execute(
            "UPDATE discovered_items SET seen = 1 WHERE remote_id = ?1",
            params![item.remote_id],
        )?;
        Ok(())
    }
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<DiscoveredItem> {
    let terms: String = row.get(3)?;
    let matched_terms: Vec<String> = serde_json::from_str(&terms).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(DiscoveredItem {
        remote_id: row.get(0)?,
        owner: row.get(1)?,
        url: row.get(2)?,
        matched_terms,
        discovered_at: from_timestamp(row.get(4)?),
        seen: row.get(5)?,
    })
}

fn from_timestamp(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}
