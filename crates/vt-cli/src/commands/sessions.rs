//! Sessions command: pairs audit log joins and leaves back into sessions.
//!
//! Open sessions are not persisted, so this is the only view of session
//! history. Pairing is per user in log order; a join followed by another join
//! means the leave was lost (typically a restart), and a leave with no join
//! comes from a session adopted on a same-channel update.

use std::collections::HashMap;
use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, Utc};

use vt_core::{
    AuditAction, DurationError, SessionDuration, UserId, elapsed_from_text, elapsed_or_zero,
};
use vt_db::{AuditRow, Database};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Join and leave both recorded.
    Closed,
    /// Join recorded, user still in channel.
    Open,
    /// Join recorded, followed by another join instead of a leave.
    Superseded,
    /// Leave recorded without a preceding join.
    MissingStart,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLine {
    pub user_id: String,
    pub username: String,
    pub start: Option<String>,
    pub end: Option<String>,
    pub duration: SessionDuration,
    pub status: SessionStatus,
}

/// Rebuilds sessions from audit rows given in chronological order.
///
/// Unparsable timestamps produce zero-length sessions rather than errors.
pub fn reconstruct(rows: &[AuditRow], now: DateTime<Utc>) -> Vec<SessionLine> {
    let mut lines: Vec<SessionLine> = Vec::new();
    let mut pending: HashMap<&str, usize> = HashMap::new();

    for row in rows {
        match row.action.parse::<AuditAction>() {
            Ok(AuditAction::Join) => {
                if let Some(index) = pending.remove(row.user_id.as_str()) {
                    lines[index].status = SessionStatus::Superseded;
                }
                pending.insert(&row.user_id, lines.len());
                lines.push(SessionLine {
                    user_id: row.user_id.clone(),
                    username: row.username.clone(),
                    start: Some(row.timestamp.clone()),
                    end: None,
                    duration: SessionDuration::ZERO,
                    status: SessionStatus::Open,
                });
            }
            Ok(AuditAction::Leave) => match pending.remove(row.user_id.as_str()) {
                Some(index) => {
                    let line = &mut lines[index];
                    line.duration = between(line.start.as_deref(), &row.timestamp);
                    line.end = Some(row.timestamp.clone());
                    line.status = SessionStatus::Closed;
                }
                None => lines.push(SessionLine {
                    user_id: row.user_id.clone(),
                    username: row.username.clone(),
                    start: None,
                    end: Some(row.timestamp.clone()),
                    duration: between(None, &row.timestamp),
                    status: SessionStatus::MissingStart,
                }),
            },
            Err(err) => {
                tracing::warn!(id = row.id, error = %err, "skipping audit row");
            }
        }
    }

    for index in pending.into_values() {
        let line = &mut lines[index];
        line.duration = elapsed_or_zero(elapsed_from_text(line.start.as_deref(), now));
    }

    lines
}

fn between(start: Option<&str>, end: &str) -> SessionDuration {
    let result = DateTime::parse_from_rfc3339(end)
        .map_err(|_| DurationError::MalformedTimestamp {
            value: end.to_string(),
        })
        .and_then(|end| elapsed_from_text(start, end.with_timezone(&Utc)));
    elapsed_or_zero(result)
}

pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    user: Option<&UserId>,
    now: DateTime<Utc>,
) -> Result<()> {
    let rows = db.list_audit_rows(user, None)?;
    let lines = reconstruct(&rows, now);
    if lines.is_empty() {
        writeln!(writer, "No sessions recorded.")?;
        return Ok(());
    }

    for line in lines {
        let start = line.start.as_deref().unwrap_or("?");
        let end = match line.status {
            SessionStatus::Closed | SessionStatus::MissingStart => {
                line.end.as_deref().unwrap_or("?")
            }
            SessionStatus::Open => "(open)",
            SessionStatus::Superseded => "(no leave recorded)",
        };
        writeln!(
            writer,
            "{} ({}) {start} -> {end}  {}",
            line.username, line.user_id, line.duration
        )?;
    }
    Ok(())
}
