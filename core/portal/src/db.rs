//! SQLite persistence for the portal.
//!
//! Every operation opens its own connection (WAL, busy timeout) so callers on
//! the blocking pool never share a handle. This module owns the schema plus
//! the presence and account tables; content and metrics queries live next to
//! their services as further `impl Db` blocks.

use portal_protocol::{PresenceRecord, StreamKind};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Db {
    path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSessionRow {
    pub token: String,
    pub user_id: i64,
    pub created_at: String,
    pub expires_at: String,
}

const PRESENCE_COLUMNS: &str =
    "session_id, stream_type, ip_address, user_agent, is_watching, joined_at, last_seen";

impl Db {
    pub fn new(path: PathBuf) -> Result<Self, String> {
        let db = Self { path };
        db.init_schema()?;
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ─────────────────────────────────────────────────────────────────────
    // Presence
    // ─────────────────────────────────────────────────────────────────────

    /// Insert-or-replace keyed on (session_id, stream_type). A re-join resets
    /// both timestamps and the diagnostics in the same statement.
    pub fn upsert_presence(
        &self,
        session_id: &str,
        kind: StreamKind,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
        now: &str,
    ) -> Result<PresenceRecord, String> {
        self.with_connection(|conn| {
            conn.query_row(
                &format!(
                    "INSERT INTO active_users \
                        (session_id, stream_type, ip_address, user_agent, is_watching, joined_at, last_seen) \
                     VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5) \
                     ON CONFLICT(session_id, stream_type) DO UPDATE SET \
                        ip_address = excluded.ip_address, \
                        user_agent = excluded.user_agent, \
                        is_watching = 1, \
                        joined_at = excluded.joined_at, \
                        last_seen = excluded.last_seen \
                     RETURNING {}",
                    PRESENCE_COLUMNS
                ),
                params![session_id, kind.as_str(), ip_address, user_agent, now],
                presence_from_row,
            )
            .map_err(|err| format!("Failed to upsert presence: {}", err))
        })
    }

    /// Returns false when no row matched; the caller decides whether that
    /// matters.
    pub fn touch_presence(
        &self,
        session_id: &str,
        kind: StreamKind,
        now: &str,
    ) -> Result<bool, String> {
        self.with_connection(|conn| {
            conn.execute(
                "UPDATE active_users SET last_seen = ?3, is_watching = 1 \
                 WHERE session_id = ?1 AND stream_type = ?2",
                params![session_id, kind.as_str(), now],
            )
            .map(|count| count > 0)
            .map_err(|err| format!("Failed to refresh presence: {}", err))
        })
    }

    pub fn delete_presence(&self, session_id: &str, kind: StreamKind) -> Result<bool, String> {
        self.with_connection(|conn| {
            conn.execute(
                "DELETE FROM active_users WHERE session_id = ?1 AND stream_type = ?2",
                params![session_id, kind.as_str()],
            )
            .map(|count| count > 0)
            .map_err(|err| format!("Failed to delete presence: {}", err))
        })
    }

    pub fn get_presence(
        &self,
        session_id: &str,
        kind: StreamKind,
    ) -> Result<Option<PresenceRecord>, String> {
        self.with_connection(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM active_users WHERE session_id = ?1 AND stream_type = ?2",
                    PRESENCE_COLUMNS
                ),
                params![session_id, kind.as_str()],
                presence_from_row,
            )
            .optional()
            .map_err(|err| format!("Failed to query presence: {}", err))
        })
    }

    /// Watching rows for `kind` seen strictly after `live_after`.
    pub fn count_live_presence(&self, kind: StreamKind, live_after: &str) -> Result<u64, String> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM active_users \
                 WHERE stream_type = ?1 AND is_watching = 1 AND last_seen > ?2",
                params![kind.as_str(), live_after],
                |row| row.get::<_, i64>(0),
            )
            .map(|count| count.max(0) as u64)
            .map_err(|err| format!("Failed to count presence: {}", err))
        })
    }

    pub fn list_live_presence(
        &self,
        kind: Option<StreamKind>,
        live_after: &str,
    ) -> Result<Vec<PresenceRecord>, String> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM active_users \
                     WHERE is_watching = 1 AND last_seen > ?1 \
                       AND (?2 IS NULL OR stream_type = ?2) \
                     ORDER BY last_seen DESC",
                    PRESENCE_COLUMNS
                ))
                .map_err(|err| format!("Failed to prepare presence query: {}", err))?;

            let rows = stmt
                .query_map(
                    params![live_after, kind.map(|kind| kind.as_str())],
                    presence_from_row,
                )
                .map_err(|err| format!("Failed to query presence: {}", err))?;

            let mut records = Vec::new();
            for row in rows {
                records.push(row.map_err(|err| format!("Failed to decode presence row: {}", err))?);
            }
            Ok(records)
        })
    }

    /// Physical row count regardless of liveness.
    pub fn count_presence_rows(&self, kind: Option<StreamKind>) -> Result<u64, String> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM active_users WHERE (?1 IS NULL OR stream_type = ?1)",
                params![kind.map(|kind| kind.as_str())],
                |row| row.get::<_, i64>(0),
            )
            .map(|count| count.max(0) as u64)
            .map_err(|err| format!("Failed to count presence rows: {}", err))
        })
    }

    pub fn prune_presence(&self, seen_before: &str) -> Result<u64, String> {
        self.with_connection(|conn| {
            conn.execute(
                "DELETE FROM active_users WHERE last_seen < ?1",
                params![seen_before],
            )
            .map(|count| count as u64)
            .map_err(|err| format!("Failed to prune presence: {}", err))
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Accounts
    // ─────────────────────────────────────────────────────────────────────

    pub fn insert_user(
        &self,
        username: &str,
        password_hash: &str,
        is_admin: bool,
        now: &str,
    ) -> Result<i64, String> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO users (username, password_hash, is_admin, created_at) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![username, password_hash, is_admin, now],
            )
            .map_err(|err| format!("Failed to insert user: {}", err))?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>, String> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT id, username, password_hash, is_admin, created_at \
                 FROM users WHERE username = ?1",
                params![username],
                user_from_row,
            )
            .optional()
            .map_err(|err| format!("Failed to query user: {}", err))
        })
    }

    pub fn get_user(&self, id: i64) -> Result<Option<UserRow>, String> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT id, username, password_hash, is_admin, created_at \
                 FROM users WHERE id = ?1",
                params![id],
                user_from_row,
            )
            .optional()
            .map_err(|err| format!("Failed to query user: {}", err))
        })
    }

    pub fn count_admins(&self) -> Result<u64, String> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM users WHERE is_admin = 1",
                [],
                |row| row.get::<_, i64>(0),
            )
            .map(|count| count.max(0) as u64)
            .map_err(|err| format!("Failed to count admins: {}", err))
        })
    }

    pub fn insert_auth_session(&self, row: &AuthSessionRow) -> Result<(), String> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO auth_sessions (token, user_id, created_at, expires_at) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![row.token, row.user_id, row.created_at, row.expires_at],
            )
            .map_err(|err| format!("Failed to insert auth session: {}", err))?;
            Ok(())
        })
    }

    pub fn get_auth_session(&self, token: &str) -> Result<Option<AuthSessionRow>, String> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT token, user_id, created_at, expires_at FROM auth_sessions WHERE token = ?1",
                params![token],
                |row| {
                    Ok(AuthSessionRow {
                        token: row.get(0)?,
                        user_id: row.get(1)?,
                        created_at: row.get(2)?,
                        expires_at: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(|err| format!("Failed to query auth session: {}", err))
        })
    }

    pub fn delete_auth_session(&self, token: &str) -> Result<(), String> {
        self.with_connection(|conn| {
            conn.execute(
                "DELETE FROM auth_sessions WHERE token = ?1",
                params![token],
            )
            .map_err(|err| format!("Failed to delete auth session: {}", err))?;
            Ok(())
        })
    }

    pub fn prune_auth_sessions(&self, now: &str) -> Result<u64, String> {
        self.with_connection(|conn| {
            conn.execute(
                "DELETE FROM auth_sessions WHERE expires_at <= ?1",
                params![now],
            )
            .map(|count| count as u64)
            .map_err(|err| format!("Failed to prune auth sessions: {}", err))
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Connection + schema
    // ─────────────────────────────────────────────────────────────────────

    fn init_schema(&self) -> Result<(), String> {
        self.with_connection(|conn| {
            conn.execute_batch(
                "BEGIN;
                 CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    username TEXT NOT NULL UNIQUE,
                    password_hash TEXT NOT NULL,
                    is_admin INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS auth_sessions (
                    token TEXT PRIMARY KEY,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    created_at TEXT NOT NULL,
                    expires_at TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS active_users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    session_id TEXT NOT NULL,
                    stream_type TEXT NOT NULL,
                    ip_address TEXT,
                    user_agent TEXT,
                    is_watching INTEGER NOT NULL DEFAULT 1,
                    joined_at TEXT NOT NULL,
                    last_seen TEXT NOT NULL,
                    UNIQUE(session_id, stream_type)
                 );
                 CREATE INDEX IF NOT EXISTS idx_active_users_stream_seen
                    ON active_users(stream_type, last_seen);
                 CREATE TABLE IF NOT EXISTS programs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    description TEXT,
                    host TEXT,
                    schedule TEXT,
                    stream_type TEXT NOT NULL,
                    image_url TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS news (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    summary TEXT,
                    content TEXT NOT NULL,
                    image_url TEXT,
                    category TEXT,
                    author TEXT,
                    published INTEGER NOT NULL DEFAULT 0,
                    views INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS events (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    description TEXT,
                    location TEXT,
                    starts_at TEXT NOT NULL,
                    ends_at TEXT,
                    image_url TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS event_rsvps (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    event_id INTEGER NOT NULL REFERENCES events(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    email TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    UNIQUE(event_id, email)
                 );
                 CREATE TABLE IF NOT EXISTS contacts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    email TEXT NOT NULL,
                    subject TEXT,
                    message TEXT NOT NULL,
                    created_at TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS subscribers (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    email TEXT NOT NULL UNIQUE,
                    created_at TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS comments (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    news_id INTEGER NOT NULL REFERENCES news(id) ON DELETE CASCADE,
                    author_name TEXT NOT NULL,
                    content TEXT NOT NULL,
                    created_at TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS live_comments (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    stream_type TEXT NOT NULL,
                    author_name TEXT NOT NULL,
                    content TEXT NOT NULL,
                    created_at TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS live_reactions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    stream_type TEXT NOT NULL,
                    emoji TEXT NOT NULL,
                    created_at TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS song_requests (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    requester_name TEXT NOT NULL,
                    song_title TEXT NOT NULL,
                    artist TEXT,
                    message TEXT,
                    status TEXT NOT NULL DEFAULT 'pending',
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS interview_requests (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    email TEXT NOT NULL,
                    organization TEXT,
                    topic TEXT NOT NULL,
                    preferred_date TEXT,
                    created_at TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS program_proposals (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    email TEXT NOT NULL,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL,
                    created_at TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS site_settings (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                 );
                 COMMIT;",
            )
            .map_err(|err| format!("Failed to initialize schema: {}", err))?;
            Ok(())
        })
    }

    pub(crate) fn with_connection<T>(
        &self,
        op: impl FnOnce(&mut Connection) -> Result<T, String>,
    ) -> Result<T, String> {
        let mut conn = self.open()?;
        op(&mut conn)
    }

    fn open(&self) -> Result<Connection, String> {
        if let Some(parent) = self.path.parent() {
            fs_err::create_dir_all(parent)
                .map_err(|err| format!("Failed to create portal data dir: {}", err))?;
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

        let conn = Connection::open_with_flags(&self.path, flags)
            .map_err(|err| format!("Failed to open sqlite db: {}", err))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|err| format!("Failed to enable WAL: {}", err))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|err| format!("Failed to set synchronous: {}", err))?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(|err| format!("Failed to set busy_timeout: {}", err))?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|err| format!("Failed to enable foreign keys: {}", err))?;

        Ok(conn)
    }
}

/// Maps a stored stream type back to the enum, surfacing unknown values as a
/// conversion failure rather than silently dropping the row.
pub(crate) fn stream_kind_at(row: &Row<'_>, index: usize) -> rusqlite::Result<StreamKind> {
    let raw: String = row.get(index)?;
    StreamKind::parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Unknown stream type: {}", raw),
            )),
        )
    })
}

fn presence_from_row(row: &Row<'_>) -> rusqlite::Result<PresenceRecord> {
    Ok(PresenceRecord {
        session_id: row.get(0)?,
        stream_type: stream_kind_at(row, 1)?,
        ip_address: row.get(2)?,
        user_agent: row.get(3)?,
        is_watching: row.get(4)?,
        joined_at: row.get(5)?,
        last_seen: row.get(6)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        is_admin: row.get(3)?,
        created_at: row.get(4)?,
    })
}
