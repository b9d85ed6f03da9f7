//! SQLite persistence layer for burstpick sessions.
//!
//! Each triaged folder gets a session database at:
//!   ~/.burstpick/cache/{session-hash}/meta.db
//!
//! Stores: the groups of the last triage pass with their picks, per-photo
//! timestamps and sharpness scores, the export selection, and free-form
//! session metadata. The whole session is rewritten on every save.
//!
//! Uses WAL mode so a second reader never blocks on a save in progress.

pub mod session;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub use session::{ExportSummary, Session, SessionGroup, SessionPhoto};

/// Metadata key holding the session's root folder.
const ROOT_KEY: &str = "root_folder";

/// Session database handle.
pub struct SessionDb {
    conn: Connection,
    db_path: PathBuf,
}

impl SessionDb {
    /// Open or create the session database for the given folder.
    /// Creates the cache directory and database file if needed.
    pub fn open(folder: &Path) -> Result<Self> {
        let cache_dir = Self::cache_dir(folder);
        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create cache dir: {}", cache_dir.display()))?;

        Self::open_at(&cache_dir.join("meta.db"))
    }

    /// Open a database at a specific path.
    pub fn open_at(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA synchronous=NORMAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let db = Self {
            conn,
            db_path: db_path.to_path_buf(),
        };
        db.create_tables()?;
        Ok(db)
    }

    /// Check if a session database already exists for this folder.
    pub fn exists(folder: &Path) -> bool {
        Self::cache_dir(folder).join("meta.db").exists()
    }

    /// Get the database file path.
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn cache_dir(folder: &Path) -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".burstpick")
            .join("cache")
            .join(hash_path(&folder.to_string_lossy()))
    }

    // -- Schema --

    fn create_tables(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS burst_groups (
                position INTEGER PRIMARY KEY,
                id TEXT NOT NULL,
                pick TEXT
            );

            CREATE TABLE IF NOT EXISTS photos (
                path TEXT PRIMARY KEY,
                group_position INTEGER NOT NULL REFERENCES burst_groups(position) ON DELETE CASCADE,
                frame_index INTEGER NOT NULL,
                timestamp REAL NOT NULL,
                sharpness REAL NOT NULL DEFAULT 0,
                selected INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS session_meta (
                key TEXT PRIMARY KEY,
                value TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_photos_group ON photos(group_position, frame_index);
            CREATE INDEX IF NOT EXISTS idx_photos_selected ON photos(selected);
            ",
        )?;
        Ok(())
    }

    // -- Session metadata --

    /// Store a session metadata key-value pair.
    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO session_meta (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Get a session metadata value.
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let result = self
            .conn
            .query_row(
                "SELECT value FROM session_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(result)
    }

    // -- Sessions --

    /// Replace the stored session with `session` in a single transaction.
    pub fn save_session(&self, session: &Session) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        self.conn.execute("DELETE FROM photos", [])?;
        self.conn.execute("DELETE FROM burst_groups", [])?;

        for (position, group) in session.groups.iter().enumerate() {
            self.conn.execute(
                "INSERT INTO burst_groups (position, id, pick) VALUES (?1, ?2, ?3)",
                params![position as i64, group.id, group.pick],
            )?;
            for (frame_index, photo) in group.photos.iter().enumerate() {
                self.conn.execute(
                    "INSERT OR REPLACE INTO photos (
                        path, group_position, frame_index, timestamp, sharpness, selected
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        photo.path,
                        position as i64,
                        frame_index as i64,
                        photo.timestamp,
                        photo.sharpness,
                        session.selected.contains(&photo.path) as i32,
                    ],
                )?;
            }
        }

        self.conn.execute(
            "INSERT OR REPLACE INTO session_meta (key, value) VALUES (?1, ?2)",
            params![ROOT_KEY, session.root],
        )?;
        tx.commit()?;

        tracing::debug!(
            db = %self.db_path.display(),
            groups = session.groups.len(),
            photos = session.photo_count(),
            "saved session"
        );
        Ok(())
    }

    /// Load the stored session, or `None` if nothing was saved yet.
    pub fn load_session(&self) -> Result<Option<Session>> {
        let Some(root) = self.get_meta(ROOT_KEY)? else {
            return Ok(None);
        };

        let mut stmt = self
            .conn
            .prepare("SELECT id, pick FROM burst_groups ORDER BY position")?;
        let mut groups = stmt
            .query_map([], |row| {
                Ok(SessionGroup {
                    id: row.get(0)?,
                    photos: Vec::new(),
                    pick: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT group_position, path, timestamp, sharpness, selected
             FROM photos ORDER BY group_position, frame_index",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                SessionPhoto {
                    path: row.get(1)?,
                    timestamp: row.get(2)?,
                    sharpness: row.get(3)?,
                },
                row.get::<_, i32>(4)? != 0,
            ))
        })?;

        let mut selected = BTreeSet::new();
        for row in rows {
            let (position, photo, is_selected) = row?;
            let group = usize::try_from(position)
                .ok()
                .and_then(|p| groups.get_mut(p))
                .with_context(|| format!("photo {} references missing group {}", photo.path, position))?;
            if is_selected {
                selected.insert(photo.path.clone());
            }
            group.photos.push(photo);
        }

        Ok(Some(Session {
            root,
            groups,
            selected,
        }))
    }

    // -- Statistics --

    /// Get photo count.
    pub fn photo_count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM photos", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Get group count.
    pub fn group_count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM burst_groups", [], |row| row.get(0))?;
        Ok(count)
    }
}

/// Deterministic FNV-1a hash of a folder path, used as the cache directory name.
fn hash_path(path: &str) -> String {
    let mut hash: u64 = 0xcbf29ce484222325; // FNV offset basis
    for byte in path.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3); // FNV prime
    }
    format!("{:016x}", hash)
}
