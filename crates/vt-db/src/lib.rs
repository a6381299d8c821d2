//! Storage layer for the voice channel time tracker.
//!
//! Persists the join/leave audit log and per-user cumulative totals using
//! `rusqlite`.
//!
//! # Thread Safety
//!
//! [`Database`] wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! The async tracker shares it through [`SharedDatabase`], which serializes
//! access with a mutex and runs each query on the blocking thread pool.
//!
//! # Schema
//!
//! Timestamps are stored as TEXT in ISO 8601 UTC with millisecond precision
//! (e.g. `2025-03-01T12:00:00.000Z`), so lexicographic order matches
//! chronological order. Durations are stored as whole seconds.

mod shared;

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use thiserror::Error;
use tracing::debug;

use vt_core::{
    AuditAction, AuditEntry, CumulativeTimeRecord, InvalidAuditAction, SessionDuration, UserId,
    ValidationError,
};

pub use shared::SharedDatabase;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored timestamp could not be parsed.
    #[error("invalid timestamp for {context}: {timestamp}")]
    TimestampParse {
        context: String,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A stored audit action was not `join` or `leave`.
    #[error(transparent)]
    InvalidAction(#[from] InvalidAuditAction),
    /// A stored identifier failed validation.
    #[error(transparent)]
    InvalidId(#[from] ValidationError),
    /// A duration does not fit in a SQLite integer.
    #[error("duration out of range: {0} seconds")]
    DurationOverflow(u64),
    /// A stored duration was negative.
    #[error("negative stored duration for user {user_id}: {seconds}")]
    NegativeDuration { user_id: String, seconds: i64 },
    /// The blocking task running a query panicked or was cancelled.
    #[error("database task failed: {0}")]
    Task(String),
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// An audit log row as stored, without interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRow {
    pub id: i64,
    pub user_id: String,
    pub username: String,
    pub action: String,
    pub timestamp: String,
}

impl AuditRow {
    /// Interprets the row as a typed audit entry.
    pub fn to_entry(&self) -> Result<AuditEntry, DbError> {
        Ok(AuditEntry {
            username: self.username.clone(),
            user_id: UserId::new(self.user_id.clone())?,
            action: self.action.parse::<AuditAction>()?,
            timestamp: parse_timestamp(&self.timestamp, &format!("audit entry {}", self.id))?,
        })
    }
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        debug!(path = %path.display(), "opened database");
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            -- Append-only join/leave log
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                username TEXT NOT NULL,
                action TEXT NOT NULL CHECK (action IN ('join', 'leave')),
                timestamp TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_audit_log_user ON audit_log(user_id);
            CREATE INDEX IF NOT EXISTS idx_audit_log_timestamp ON audit_log(timestamp);

            -- One row per user
            CREATE TABLE IF NOT EXISTS user_total_time (
                user_id TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                total_seconds INTEGER NOT NULL DEFAULT 0,
                last_updated_at TEXT NOT NULL
            );
            ",
        )?;
        debug!("database schema ready");
        Ok(())
    }

    /// Appends one entry to the audit log.
    pub fn append_audit_entry(&self, entry: &AuditEntry) -> Result<i64, DbError> {
        self.conn.execute(
            "
            INSERT INTO audit_log (user_id, username, action, timestamp)
            VALUES (?, ?, ?, ?)
            ",
            params![
                entry.user_id.as_str(),
                entry.username,
                entry.action.as_str(),
                format_timestamp(entry.timestamp),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Inserts or replaces the user's cumulative record.
    pub fn upsert_cumulative_time(
        &self,
        user_id: &UserId,
        record: &CumulativeTimeRecord,
    ) -> Result<(), DbError> {
        let seconds = record.cumulative.total_seconds();
        let stored = i64::try_from(seconds).map_err(|_| DbError::DurationOverflow(seconds))?;
        self.conn.execute(
            "
            INSERT INTO user_total_time (user_id, username, total_seconds, last_updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                username = excluded.username,
                total_seconds = excluded.total_seconds,
                last_updated_at = excluded.last_updated_at
            ",
            params![
                user_id.as_str(),
                record.username,
                stored,
                format_timestamp(record.last_updated_at),
            ],
        )?;
        Ok(())
    }

    /// Looks up the user's cumulative record.
    pub fn find_cumulative_time(
        &self,
        user_id: &UserId,
    ) -> Result<Option<CumulativeTimeRecord>, DbError> {
        let row = self
            .conn
            .query_row(
                "
                SELECT user_id, username, total_seconds, last_updated_at
                FROM user_total_time
                WHERE user_id = ?
                ",
                [user_id.as_str()],
                TotalRow::from_row,
            )
            .optional()?;
        row.map(TotalRow::into_record).transpose()
    }

    /// Lists all cumulative records, largest total first.
    pub fn list_cumulative_times(&self) -> Result<Vec<CumulativeTimeRecord>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT user_id, username, total_seconds, last_updated_at
            FROM user_total_time
            ORDER BY total_seconds DESC, user_id ASC
            ",
        )?;
        let rows = stmt.query_map([], TotalRow::from_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_record()?);
        }
        Ok(records)
    }

    /// Lists audit rows in chronological order.
    ///
    /// With a `limit`, only the most recent `limit` rows are returned (still
    /// oldest first).
    pub fn list_audit_rows(
        &self,
        user_id: Option<&UserId>,
        limit: Option<usize>,
    ) -> Result<Vec<AuditRow>, DbError> {
        // SQLite treats a negative LIMIT as unbounded.
        let limit = limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));
        let mut stmt = self.conn.prepare(
            "
            SELECT id, user_id, username, action, timestamp FROM (
                SELECT id, user_id, username, action, timestamp
                FROM audit_log
                WHERE ?1 IS NULL OR user_id = ?1
                ORDER BY timestamp DESC, id DESC
                LIMIT ?2
            )
            ORDER BY timestamp ASC, id ASC
            ",
        )?;
        let rows = stmt.query_map(params![user_id.map(UserId::as_str), limit], |row| {
            Ok(AuditRow {
                id: row.get(0)?,
                user_id: row.get(1)?,
                username: row.get(2)?,
                action: row.get(3)?,
                timestamp: row.get(4)?,
            })
        })?;
        let mut audit = Vec::new();
        for row in rows {
            audit.push(row?);
        }
        Ok(audit)
    }
}

struct TotalRow {
    user_id: String,
    username: String,
    total_seconds: i64,
    last_updated_at: String,
}

impl TotalRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            user_id: row.get(0)?,
            username: row.get(1)?,
            total_seconds: row.get(2)?,
            last_updated_at: row.get(3)?,
        })
    }

    fn into_record(self) -> Result<CumulativeTimeRecord, DbError> {
        let seconds =
            u64::try_from(self.total_seconds).map_err(|_| DbError::NegativeDuration {
                user_id: self.user_id.clone(),
                seconds: self.total_seconds,
            })?;
        let last_updated_at =
            parse_timestamp(&self.last_updated_at, &format!("user {}", self.user_id))?;
        Ok(CumulativeTimeRecord {
            user_id: UserId::new(self.user_id)?,
            username: self.username,
            cumulative: SessionDuration::from_seconds(seconds),
            last_updated_at,
        })
    }
}

fn parse_timestamp(timestamp: &str, context: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            context: context.to_string(),
            timestamp: timestamp.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
