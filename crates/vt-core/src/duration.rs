//! Elapsed-time arithmetic for presence sessions.
//!
//! Everything here is pure: the caller always supplies "now", so results are
//! deterministic for fixed inputs.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 60 * SECONDS_PER_MINUTE;

/// Errors produced while computing an elapsed interval.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DurationError {
    /// The start of the interval was missing, unparsable, or after its end.
    #[error("malformed timestamp: {value:?}")]
    MalformedTimestamp { value: String },
}

/// A non-negative duration split into hours, minutes and seconds.
///
/// `minutes` and `seconds` are always in `[0, 59]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionDuration {
    pub hours: u64,
    pub minutes: u8,
    pub seconds: u8,
}

impl SessionDuration {
    /// The zero duration.
    pub const ZERO: Self = Self {
        hours: 0,
        minutes: 0,
        seconds: 0,
    };

    /// Splits a number of whole seconds into components.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "remainders are bounded by 60"
    )]
    pub const fn from_seconds(total: u64) -> Self {
        Self {
            hours: total / SECONDS_PER_HOUR,
            minutes: ((total % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE) as u8,
            seconds: (total % SECONDS_PER_MINUTE) as u8,
        }
    }

    /// Total length in whole seconds.
    #[must_use]
    pub const fn total_seconds(self) -> u64 {
        self.hours
            .saturating_mul(SECONDS_PER_HOUR)
            .saturating_add(self.minutes as u64 * SECONDS_PER_MINUTE)
            .saturating_add(self.seconds as u64)
    }

    /// Adds two durations, saturating at the largest representable value.
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self::from_seconds(self.total_seconds().saturating_add(other.total_seconds()))
    }

    pub const fn is_zero(self) -> bool {
        self.total_seconds() == 0
    }
}

impl fmt::Display for SessionDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}h {}m {}s", self.hours, self.minutes, self.seconds)
    }
}

/// Computes the elapsed time between `start` and `end`.
///
/// Sub-second remainders are truncated. A `start` later than `end` is treated
/// as malformed input rather than silently clamped.
pub fn elapsed(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<SessionDuration, DurationError> {
    let seconds = end.signed_duration_since(start).num_seconds();
    let seconds = u64::try_from(seconds).map_err(|_| DurationError::MalformedTimestamp {
        value: start.to_rfc3339_opts(SecondsFormat::Secs, true),
    })?;
    Ok(SessionDuration::from_seconds(seconds))
}

/// Computes the elapsed time from an RFC 3339 start timestamp.
pub fn elapsed_from_text(
    start: Option<&str>,
    end: DateTime<Utc>,
) -> Result<SessionDuration, DurationError> {
    let Some(raw) = start else {
        return Err(DurationError::MalformedTimestamp {
            value: String::new(),
        });
    };
    let parsed = DateTime::parse_from_rfc3339(raw).map_err(|_| DurationError::MalformedTimestamp {
        value: raw.to_string(),
    })?;
    elapsed(parsed.with_timezone(&Utc), end)
}

/// Resolves a duration result to zero on failure, logging the condition.
pub fn elapsed_or_zero(result: Result<SessionDuration, DurationError>) -> SessionDuration {
    result.unwrap_or_else(|err| {
        tracing::warn!(error = %err, "treating malformed interval as zero duration");
        SessionDuration::ZERO
    })
}
