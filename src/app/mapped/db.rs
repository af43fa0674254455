//! SQLite-backed path database
//!
//! Holds three tables: `path_map` (one row per logical entry), `reverse_map`
//! (append-only versions of each content id's reference set) and `reclaim`
//! (blobs whose reference set became empty). Every mutating operation runs
//! in a single transaction so that readers never observe a half-applied
//! insert, delete, copy or mkdirs.

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::errors::{CacheError, CacheResult};

use super::model::{ContentId, PathKey, PathMap, Reclaim, ReverseMap};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS path_map (
        file_system TEXT NOT NULL,
        parent_path TEXT NOT NULL,
        filename TEXT NOT NULL,
        content_id TEXT,
        size INTEGER NOT NULL DEFAULT 0,
        creation INTEGER NOT NULL,
        storage_pointer TEXT,
        PRIMARY KEY (file_system, parent_path, filename)
    );
    CREATE INDEX IF NOT EXISTS idx_path_map_content ON path_map(content_id);
    CREATE TABLE IF NOT EXISTS reverse_map (
        content_id TEXT NOT NULL,
        version INTEGER NOT NULL,
        paths TEXT NOT NULL,
        PRIMARY KEY (content_id, version)
    );
    CREATE TABLE IF NOT EXISTS reclaim (
        content_id TEXT PRIMARY KEY,
        queued_at INTEGER NOT NULL,
        storage_pointer TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_reclaim_queued ON reclaim(queued_at);";

/// Path database shared by a path-mapped store
#[derive(Debug)]
pub struct PathDb {
    conn: Mutex<Connection>,
}

impl PathDb {
    /// Open or create the database at `path`
    pub fn open(path: &Path) -> CacheResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|_| CacheError::DirectoryNotAccessible {
                path: parent.to_path_buf(),
            })?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::with_connection(conn)
    }

    /// Database living only in memory, for tests and throwaway stores
    pub fn open_in_memory() -> CacheResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> CacheResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Entry at `key`; the root is always an implicit directory
    pub fn get(&self, key: &PathKey) -> CacheResult<Option<PathMap>> {
        if key.is_root() {
            return Ok(Some(PathMap::directory(key.clone())));
        }
        let conn = self.conn.lock();
        fetch(&conn, key)
    }

    /// Direct children of the directory `dir`, ordered by name
    pub fn list(&self, dir: &PathKey) -> CacheResult<Vec<PathMap>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT file_system, parent_path, filename, content_id, size, creation, storage_pointer
             FROM path_map WHERE file_system = ?1 AND parent_path = ?2
             ORDER BY filename",
        )?;
        let rows = stmt
            .query_map(params![dir.file_system, dir.path()], RawRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RawRow::into_path_map).collect()
    }

    /// Record a finished file (or a directory) at `map.key`
    ///
    /// A file already at the key is deleted first, with its reference set
    /// updated. Missing ancestor directories are created.
    pub fn insert(&self, map: &PathMap) -> CacheResult<()> {
        if map.key.is_root() {
            return Err(CacheError::InvalidState {
                reason: "cannot replace the root directory".to_string(),
            });
        }
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        if map.is_directory() {
            materialize(&tx, &map.key)?;
        } else {
            displace(&tx, &map.key)?;
            if let Some(parent) = map.key.parent() {
                materialize(&tx, &parent)?;
            }
            insert_row(&tx, map)?;
            if let Some(content_id) = &map.content_id {
                add_reference(&tx, content_id, &map.key)?;
            }
        }

        tx.commit()?;
        debug!("Inserted path entry {}", map.key);
        Ok(())
    }

    /// Remove the entry at `key`, returning whether one existed
    ///
    /// Directories must be empty. Removing the last path referencing a
    /// content id queues its blob for reclaim.
    pub fn delete(&self, key: &PathKey) -> CacheResult<bool> {
        self.delete_matching(key, None)
    }

    /// Delete the file at `key` only while it still holds `content_id`
    ///
    /// An entry rewritten since the caller read it is left alone.
    pub fn delete_if_content(&self, key: &PathKey, content_id: &ContentId) -> CacheResult<bool> {
        self.delete_matching(key, Some(content_id))
    }

    fn delete_matching(&self, key: &PathKey, expected: Option<&ContentId>) -> CacheResult<bool> {
        if key.is_root() {
            return Ok(false);
        }
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let Some(existing) = fetch(&tx, key)? else {
            return Ok(false);
        };
        if let Some(expected) = expected {
            if existing.content_id.as_ref() != Some(expected) {
                debug!("Kept {}: content changed since it was read", key);
                return Ok(false);
            }
        }
        if existing.is_directory() && has_children(&tx, key)? {
            return Err(CacheError::InvalidState {
                reason: format!("directory {} is not empty", key),
            });
        }
        remove_row(&tx, key)?;
        if let (Some(content_id), Some(pointer)) = (&existing.content_id, &existing.storage_pointer)
        {
            remove_reference(&tx, content_id, key, pointer)?;
        }

        tx.commit()?;
        debug!("Deleted path entry {}", key);
        Ok(true)
    }

    /// Point `to` at the same content as `from`
    ///
    /// Any file at `to` is replaced. Both entries share one content id and
    /// one blob afterwards.
    pub fn copy(&self, from: &PathKey, to: &PathKey) -> CacheResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let source = fetch(&tx, from)?.ok_or_else(|| CacheError::NotFound {
            path: from.to_string(),
        })?;
        let (Some(content_id), Some(pointer)) = (source.content_id, source.storage_pointer) else {
            return Err(CacheError::NotAFile {
                path: from.to_string(),
            });
        };
        if from == to {
            return Ok(());
        }
        if to.is_root() {
            return Err(CacheError::NotAFile {
                path: to.to_string(),
            });
        }

        displace(&tx, to)?;
        if let Some(parent) = to.parent() {
            materialize(&tx, &parent)?;
        }
        let copy = PathMap {
            key: to.clone(),
            content_id: Some(content_id),
            size: source.size,
            creation: Utc::now(),
            storage_pointer: Some(pointer),
        };
        insert_row(&tx, &copy)?;
        add_reference(&tx, &content_id, to)?;

        tx.commit()?;
        debug!("Copied path entry {} to {} (content {})", from, to, content_id);
        Ok(())
    }

    /// Create the directory `key` and every missing ancestor
    pub fn mkdirs(&self, key: &PathKey) -> CacheResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        materialize(&tx, key)?;
        tx.commit()?;
        Ok(())
    }

    /// Latest reverse-map version of `content_id`
    pub fn reverse_map(&self, content_id: &ContentId) -> CacheResult<Option<ReverseMap>> {
        let conn = self.conn.lock();
        latest_reverse(&conn, content_id)
    }

    /// Paths currently referencing `content_id`
    pub fn references(&self, content_id: &ContentId) -> CacheResult<Vec<PathKey>> {
        Ok(self
            .reverse_map(content_id)?
            .map(|reverse| reverse.paths)
            .unwrap_or_default())
    }

    /// Every queued reclaim, oldest first
    pub fn pending_reclaims(&self) -> CacheResult<Vec<Reclaim>> {
        self.reclaims_queued_before(i64::MAX)
    }

    /// Reclaims queued at or before `cutoff`
    pub fn reclaim_candidates(&self, cutoff: DateTime<Utc>) -> CacheResult<Vec<Reclaim>> {
        self.reclaims_queued_before(cutoff.timestamp_millis())
    }

    fn reclaims_queued_before(&self, cutoff_millis: i64) -> CacheResult<Vec<Reclaim>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT content_id, queued_at, storage_pointer FROM reclaim
             WHERE queued_at <= ?1 ORDER BY queued_at",
        )?;
        let rows = stmt
            .query_map(params![cutoff_millis], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(content_id, queued_at, storage_pointer)| {
                Ok(Reclaim {
                    content_id: ContentId::from_hex(&content_id)?,
                    queued_at: from_millis(queued_at),
                    storage_pointer,
                })
            })
            .collect()
    }

    /// Drop the reclaim record and reverse-map history of a deleted blob
    pub fn complete_reclaim(&self, content_id: &ContentId) -> CacheResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let still_referenced = latest_reverse(&tx, content_id)?
            .map(|reverse| !reverse.paths.is_empty())
            .unwrap_or(false);
        if still_referenced {
            return Err(CacheError::InvalidState {
                reason: format!("content {} is referenced again", content_id),
            });
        }
        let hex = content_id.to_hex();
        tx.execute("DELETE FROM reclaim WHERE content_id = ?1", params![hex])?;
        tx.execute("DELETE FROM reverse_map WHERE content_id = ?1", params![hex])?;

        tx.commit()?;
        info!("Reclaimed content {}", content_id);
        Ok(())
    }
}

/// Row as stored, before content ids and timestamps are parsed
struct RawRow {
    file_system: String,
    parent_path: String,
    filename: String,
    content_id: Option<String>,
    size: i64,
    creation: i64,
    storage_pointer: Option<String>,
}

impl RawRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            file_system: row.get(0)?,
            parent_path: row.get(1)?,
            filename: row.get(2)?,
            content_id: row.get(3)?,
            size: row.get(4)?,
            creation: row.get(5)?,
            storage_pointer: row.get(6)?,
        })
    }

    fn into_path_map(self) -> CacheResult<PathMap> {
        Ok(PathMap {
            key: PathKey {
                file_system: self.file_system,
                parent_path: self.parent_path,
                filename: self.filename,
            },
            content_id: self
                .content_id
                .as_deref()
                .map(ContentId::from_hex)
                .transpose()?,
            size: self.size.max(0) as u64,
            creation: from_millis(self.creation),
            storage_pointer: self.storage_pointer,
        })
    }
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or_default()
}

fn fetch(conn: &Connection, key: &PathKey) -> CacheResult<Option<PathMap>> {
    if key.is_root() {
        return Ok(Some(PathMap::directory(key.clone())));
    }
    let raw = conn
        .query_row(
            "SELECT file_system, parent_path, filename, content_id, size, creation, storage_pointer
             FROM path_map WHERE file_system = ?1 AND parent_path = ?2 AND filename = ?3",
            params![key.file_system, key.parent_path, key.filename],
            RawRow::from_row,
        )
        .optional()?;
    raw.map(RawRow::into_path_map).transpose()
}

fn has_children(conn: &Connection, key: &PathKey) -> CacheResult<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM path_map WHERE file_system = ?1 AND parent_path = ?2",
        params![key.file_system, key.path()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn insert_row(conn: &Connection, map: &PathMap) -> CacheResult<()> {
    conn.execute(
        "INSERT INTO path_map
             (file_system, parent_path, filename, content_id, size, creation, storage_pointer)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            map.key.file_system,
            map.key.parent_path,
            map.key.filename,
            map.content_id.map(|id| id.to_hex()),
            map.size as i64,
            map.creation.timestamp_millis(),
            map.storage_pointer,
        ],
    )?;
    Ok(())
}

fn remove_row(conn: &Connection, key: &PathKey) -> CacheResult<()> {
    conn.execute(
        "DELETE FROM path_map WHERE file_system = ?1 AND parent_path = ?2 AND filename = ?3",
        params![key.file_system, key.parent_path, key.filename],
    )?;
    Ok(())
}

/// Clear the way for a file at `key`
fn displace(conn: &Connection, key: &PathKey) -> CacheResult<()> {
    let Some(occupant) = fetch(conn, key)? else {
        return Ok(());
    };
    match (&occupant.content_id, &occupant.storage_pointer) {
        (Some(content_id), Some(pointer)) => {
            remove_row(conn, key)?;
            remove_reference(conn, content_id, key, pointer)?;
            debug!("Displaced previous content {} at {}", content_id, key);
            Ok(())
        }
        _ => Err(CacheError::NotAFile {
            path: key.to_string(),
        }),
    }
}

/// Insert directory entries for `key` and its missing ancestors
fn materialize(conn: &Connection, key: &PathKey) -> CacheResult<()> {
    let mut missing = Vec::new();
    let mut current = Some(key.clone());
    while let Some(candidate) = current {
        match fetch(conn, &candidate)? {
            Some(existing) if existing.is_directory() => break,
            Some(_) => {
                return Err(CacheError::InvalidState {
                    reason: format!("{} is a file, not a directory", candidate),
                })
            }
            None => {
                current = candidate.parent();
                missing.push(candidate);
            }
        }
    }

    for dir in missing {
        insert_row(conn, &PathMap::directory(dir))?;
    }
    Ok(())
}

fn latest_reverse(conn: &Connection, content_id: &ContentId) -> CacheResult<Option<ReverseMap>> {
    let row = conn
        .query_row(
            "SELECT version, paths FROM reverse_map WHERE content_id = ?1
             ORDER BY version DESC LIMIT 1",
            params![content_id.to_hex()],
            |row| Ok((row.get::<_, u32>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?;

    match row {
        Some((version, paths)) => Ok(Some(ReverseMap {
            content_id: *content_id,
            version,
            paths: serde_json::from_str(&paths)?,
        })),
        None => Ok(None),
    }
}

fn append_reverse(
    conn: &Connection,
    content_id: &ContentId,
    version: u32,
    paths: &[PathKey],
) -> CacheResult<()> {
    conn.execute(
        "INSERT INTO reverse_map (content_id, version, paths) VALUES (?1, ?2, ?3)",
        params![content_id.to_hex(), version, serde_json::to_string(paths)?],
    )?;
    Ok(())
}

fn add_reference(conn: &Connection, content_id: &ContentId, key: &PathKey) -> CacheResult<()> {
    let (version, mut paths) = match latest_reverse(conn, content_id)? {
        Some(reverse) => (reverse.version, reverse.paths),
        None => (0, Vec::new()),
    };
    if !paths.contains(key) {
        paths.push(key.clone());
    }
    append_reverse(conn, content_id, version + 1, &paths)?;
    conn.execute(
        "DELETE FROM reclaim WHERE content_id = ?1",
        params![content_id.to_hex()],
    )?;
    Ok(())
}

/// Drop `key` from the reference set, queueing a reclaim when it empties
fn remove_reference(
    conn: &Connection,
    content_id: &ContentId,
    key: &PathKey,
    storage_pointer: &str,
) -> CacheResult<()> {
    let (version, mut paths) = match latest_reverse(conn, content_id)? {
        Some(reverse) => (reverse.version, reverse.paths),
        None => (0, Vec::new()),
    };
    paths.retain(|path| path != key);
    append_reverse(conn, content_id, version + 1, &paths)?;

    if paths.is_empty() {
        conn.execute(
            "INSERT OR REPLACE INTO reclaim (content_id, queued_at, storage_pointer)
             VALUES (?1, ?2, ?3)",
            params![
                content_id.to_hex(),
                Utc::now().timestamp_millis(),
                storage_pointer
            ],
        )?;
        debug!("Queued content {} for reclaim", content_id);
    }
    Ok(())
}
