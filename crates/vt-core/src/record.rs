//! Audit entries and cumulative-time records handed to the persistence layer.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::duration::SessionDuration;
use crate::types::UserId;

/// An unrecognised audit action string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid audit action: {0}")]
pub struct InvalidAuditAction(pub String);

/// What an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Join,
    Leave,
}

impl AuditAction {
    /// String representation for database storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Join => "join",
            Self::Leave => "leave",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuditAction {
    type Err = InvalidAuditAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "join" => Ok(Self::Join),
            "leave" => Ok(Self::Leave),
            _ => Err(InvalidAuditAction(s.to_string())),
        }
    }
}

/// One append-only line of the join/leave audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub username: String,
    pub user_id: UserId,
    pub action: AuditAction,
    pub timestamp: DateTime<Utc>,
}

/// A user's durable time-in-channel total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CumulativeTimeRecord {
    pub user_id: UserId,
    pub username: String,
    pub cumulative: SessionDuration,
    pub last_updated_at: DateTime<Utc>,
}

impl CumulativeTimeRecord {
    /// A fresh record with nothing accrued yet.
    pub fn zero(user_id: UserId, username: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            username: username.into(),
            cumulative: SessionDuration::ZERO,
            last_updated_at: at,
        }
    }
}

/// How a closed session's elapsed time is merged into the stored total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccumulationMode {
    /// The stored total becomes the last session's elapsed time.
    #[default]
    Overwrite,
    /// The elapsed time is added to the stored total.
    Additive,
}

impl AccumulationMode {
    /// Combines the previously stored total with a just-closed session.
    #[must_use]
    pub fn merge(self, previous: Option<SessionDuration>, session: SessionDuration) -> SessionDuration {
        match self {
            Self::Overwrite => session,
            Self::Additive => previous.unwrap_or_default().saturating_add(session),
        }
    }
}
