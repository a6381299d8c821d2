//! Collaborator seams: durable storage and outbound notifications.
//!
//! The coordinator only talks to the outside world through these traits, so
//! the Discord and SQLite implementations can be swapped for fakes in tests.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::duration::SessionDuration;
use crate::record::{AuditEntry, CumulativeTimeRecord};
use crate::types::UserId;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A read or write against the durable store failed.
#[derive(Debug, Error)]
#[error("persistence failure: {source}")]
pub struct PersistenceError {
    #[source]
    source: BoxError,
}

impl PersistenceError {
    pub fn new(source: impl Into<BoxError>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

/// An outbound notification could not be delivered.
#[derive(Debug, Error)]
#[error("notification failure: {source}")]
pub struct NotifyError {
    #[source]
    source: BoxError,
}

impl NotifyError {
    pub fn new(source: impl Into<BoxError>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

/// Durable storage for audit entries and cumulative totals.
#[async_trait]
pub trait PresenceStore: Send + Sync {
    async fn append_audit_entry(&self, entry: &AuditEntry) -> Result<(), PersistenceError>;

    async fn upsert_cumulative_time(
        &self,
        user_id: &UserId,
        record: &CumulativeTimeRecord,
    ) -> Result<(), PersistenceError>;

    async fn find_cumulative_time(
        &self,
        user_id: &UserId,
    ) -> Result<Option<CumulativeTimeRecord>, PersistenceError>;
}

/// Which external destination a notification is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelRole {
    Enter,
    Leave,
    TotalTime,
}

impl ChannelRole {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Enter => "enter",
            Self::Leave => "leave",
            Self::TotalTime => "total_time",
        }
    }
}

impl fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The facts behind an outbound message. Phrasing belongs to the notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Joined {
        username: String,
        at: DateTime<Utc>,
    },
    Left {
        username: String,
        at: DateTime<Utc>,
    },
    TotalTime {
        username: String,
        total: SessionDuration,
        as_of: DateTime<Utc>,
    },
}

impl Notification {
    /// The destination this notification is normally routed to.
    #[must_use]
    pub const fn role(&self) -> ChannelRole {
        match self {
            Self::Joined { .. } => ChannelRole::Enter,
            Self::Left { .. } => ChannelRole::Leave,
            Self::TotalTime { .. } => ChannelRole::TotalTime,
        }
    }
}

/// Outbound notification sink.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, role: ChannelRole, notification: &Notification) -> Result<(), NotifyError>;

    /// Surfaces a recovered failure to an operator. Ignored by default.
    async fn report_failure(&self, _message: &str) -> Result<(), NotifyError> {
        Ok(())
    }
}
